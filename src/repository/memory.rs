//! In-process repository guarded by a mutex.

use super::{
    AttestationReceipt, Event, EventFullName, KeyLeakAcknowledgement, KeyMaterial, KeyPurpose,
    KeyReference, Keystore, Oracle, OracleKeyRepository, RepositoryState,
};
use crate::error::{DlcError, DlcResult};
use crate::oracle::Attestation;
use bitcoin::secp256k1::{All, Secp256k1, XOnlyPublicKey};
use std::sync::{Mutex, MutexGuard};

/// Repository kept entirely in memory, for tests and embedding.
pub struct InMemoryRepository {
    secp: Secp256k1<All>,
    state: Mutex<RepositoryState>,
    keystore: Mutex<Option<Keystore>>,
}

impl InMemoryRepository {
    /// Repository without local keys: events can be tracked but not attested.
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
            state: Mutex::new(RepositoryState::default()),
            keystore: Mutex::new(None),
        }
    }

    pub fn with_keystore(keystore: Keystore) -> Self {
        Self {
            keystore: Mutex::new(Some(keystore)),
            ..Self::new()
        }
    }

    fn state(&self) -> DlcResult<MutexGuard<'_, RepositoryState>> {
        self.state
            .lock()
            .map_err(|_| DlcError::lock_poisoned("repository"))
    }

    fn keystore(&self) -> DlcResult<MutexGuard<'_, Option<Keystore>>> {
        self.keystore
            .lock()
            .map_err(|_| DlcError::lock_poisoned("keystore"))
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl OracleKeyRepository for InMemoryRepository {
    fn get_oracle(&self, name: &str) -> DlcResult<Option<Oracle>> {
        Ok(self.state()?.oracle(name))
    }

    fn get_event(&self, name: &EventFullName) -> DlcResult<Option<Event>> {
        Ok(self.state()?.event(name))
    }

    fn get_key(&self, reference: &KeyReference) -> DlcResult<Option<KeyMaterial>> {
        match self.keystore()?.as_ref() {
            Some(keystore) => keystore.get(&self.secp, reference),
            None => Ok(None),
        }
    }

    fn generate_key(&self, purpose: KeyPurpose) -> DlcResult<(KeyReference, XOnlyPublicKey)> {
        let mut keystore = self.keystore()?;
        let keystore = keystore
            .as_mut()
            .ok_or_else(|| DlcError::config("this repository holds no keystore"))?;
        keystore.derive_next(&self.secp, purpose)
    }

    fn add_oracle(&self, oracle: Oracle) -> DlcResult<()> {
        self.state()?.add_oracle(oracle)
    }

    fn set_oracle(&self, name: &str, pubkey: XOnlyPublicKey) -> DlcResult<()> {
        self.state()?.set_oracle(name, pubkey)
    }

    fn remove_oracle(&self, name: &str) -> DlcResult<bool> {
        Ok(self.state()?.remove_oracle(name))
    }

    fn list_oracles(&self) -> DlcResult<Vec<Oracle>> {
        Ok(self.state()?.oracles.values().cloned().collect())
    }

    fn add_event(&self, event: Event) -> DlcResult<()> {
        self.state()?.add_event(event)
    }

    fn list_events(&self, oracle: Option<&str>) -> DlcResult<Vec<Event>> {
        Ok(self.state()?.list_events(oracle))
    }

    fn record_attestation(
        &self,
        name: &EventFullName,
        attestation: Attestation,
        ack: Option<&KeyLeakAcknowledgement>,
    ) -> DlcResult<AttestationReceipt> {
        self.state()?.record_attestation(&self.secp, name, attestation, ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::attestation;
    use crate::oracle::OracleCommitment;
    use bitcoin::Network;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_watch_only_repository_has_no_keys() {
        let repo = InMemoryRepository::new();
        assert!(repo.get_key(&"m/0'/0'".parse().unwrap()).unwrap().is_none());
        assert!(repo.generate_key(KeyPurpose::OracleKey).is_err());
    }

    #[test]
    fn test_generated_keys_are_retrievable() {
        let repo = InMemoryRepository::with_keystore(Keystore::from_seed(Network::Regtest, &[1u8; 32]).unwrap());
        let (reference, pubkey) = repo.generate_key(KeyPurpose::OracleKey).unwrap();
        let key = repo.get_key(&reference).unwrap().unwrap();
        assert_eq!(key.x_only_public_key(&repo.secp).0, pubkey);
    }

    #[test]
    fn test_concurrent_attestations_only_one_wins() {
        let repo = Arc::new(InMemoryRepository::with_keystore(
            Keystore::from_seed(Network::Regtest, &[2u8; 32]).unwrap(),
        ));
        let (oracle_ref, pubkey) = repo.generate_key(KeyPurpose::OracleKey).unwrap();
        let (nonce_ref, nonce) = repo.generate_key(KeyPurpose::EventNonce).unwrap();
        repo.add_oracle(Oracle::owned("olivia", pubkey, oracle_ref)).unwrap();

        let labels = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let name: EventFullName = "olivia/race".parse().unwrap();
        let event = Event::new(name.clone(), OracleCommitment::new(pubkey, nonce), labels)
            .unwrap()
            .with_nonce_key(nonce_ref);
        repo.add_event(event.clone()).unwrap();

        let x = repo.get_key(&oracle_ref).unwrap().unwrap();
        let k = repo.get_key(&nonce_ref).unwrap().unwrap();
        let attestations: Vec<Attestation> = event
            .outcomes()
            .iter()
            .map(|o| attestation::sign(&repo.secp, &x, &k, &o.digest()).unwrap())
            .collect();

        let handles: Vec<_> = attestations
            .into_iter()
            .map(|a| {
                let repo = Arc::clone(&repo);
                let name = name.clone();
                thread::spawn(move || repo.add_attestation(&name, a).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(repo.get_event(&name).unwrap().unwrap().attestations().len(), 1);
    }
}
