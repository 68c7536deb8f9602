//! # Keystore
//!
//! Hierarchical key custody for locally owned oracles. Every key is derived
//! from one BIP-32 master key at a hardened path:
//!
//! ```text
//! m/0'/i'   oracle long-term keys
//! m/1'/j'   event nonces
//! ```
//!
//! Only paths this keystore has issued can be dereferenced.

use crate::config::derivation;
use crate::error::{DlcError, DlcResult};
use crate::oracle::KeyMaterial;
use bitcoin::bip32::{ChildNumber, Xpriv};
use bitcoin::secp256k1::{Secp256k1, SecretKey, Signing, XOnlyPublicKey};
use bitcoin::Network;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// What a derived key is for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPurpose {
    OracleKey,
    EventNonce,
}

impl KeyPurpose {
    fn account(self) -> u32 {
        match self {
            KeyPurpose::OracleKey => derivation::ORACLE_ACCOUNT,
            KeyPurpose::EventNonce => derivation::NONCE_ACCOUNT,
        }
    }
}

/// Reference to a key held by the keystore, written `m/<account>'/<index>'`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyReference {
    account: u32,
    index: u32,
}

impl KeyReference {
    pub fn new(purpose: KeyPurpose, index: u32) -> Self {
        Self {
            account: purpose.account(),
            index,
        }
    }

    fn path(&self) -> DlcResult<[ChildNumber; 2]> {
        Ok([
            ChildNumber::from_hardened_idx(self.account)?,
            ChildNumber::from_hardened_idx(self.index)?,
        ])
    }
}

impl fmt::Display for KeyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m/{}'/{}'", self.account, self.index)
    }
}

impl FromStr for KeyReference {
    type Err = DlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DlcError::InvalidKeyReference {
            reference: s.to_string(),
        };
        let mut parts = s.trim().split('/');
        if parts.next() != Some("m") {
            return Err(invalid());
        }
        let mut hardened = || -> DlcResult<u32> {
            parts
                .next()
                .and_then(|p| p.strip_suffix('\''))
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)
        };
        let account = hardened()?;
        let index = hardened()?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self { account, index })
    }
}

impl Serialize for KeyReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KeyReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Master key and derivation counters, erased when dropped
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keystore {
    master: Xpriv,
    next_oracle_index: u32,
    next_nonce_index: u32,
}

impl Keystore {
    /// Create a keystore from 32 fresh random bytes.
    pub fn generate(network: Network) -> DlcResult<Self> {
        let mut seed = Zeroizing::new([0u8; 32]);
        rand::rng().fill_bytes(&mut seed[..]);
        Self::from_seed(network, &seed[..])
    }

    pub fn from_seed(network: Network, seed: &[u8]) -> DlcResult<Self> {
        Ok(Self {
            master: Xpriv::new_master(network, seed)?,
            next_oracle_index: 0,
            next_nonce_index: 0,
        })
    }

    fn counter(&mut self, purpose: KeyPurpose) -> &mut u32 {
        match purpose {
            KeyPurpose::OracleKey => &mut self.next_oracle_index,
            KeyPurpose::EventNonce => &mut self.next_nonce_index,
        }
    }

    /// Derive the next key for `purpose` and advance its counter.
    pub fn derive_next<C: Signing>(
        &mut self,
        secp: &Secp256k1<C>,
        purpose: KeyPurpose,
    ) -> DlcResult<(KeyReference, XOnlyPublicKey)> {
        let index = *self.counter(purpose);
        let reference = KeyReference::new(purpose, index);
        let secret = self.derive(secp, &reference)?;
        let (pubkey, _) = secret.x_only_public_key(secp);
        *self.counter(purpose) = index
            .checked_add(1)
            .ok_or_else(|| DlcError::config("keystore derivation index exhausted"))?;
        log::debug!("Derived {:?} key at {}", purpose, reference);
        Ok((reference, pubkey))
    }

    /// Secret at `reference` if this keystore issued it.
    pub fn get<C: Signing>(&self, secp: &Secp256k1<C>, reference: &KeyReference) -> DlcResult<Option<KeyMaterial>> {
        let issued = match reference.account {
            a if a == derivation::ORACLE_ACCOUNT => reference.index < self.next_oracle_index,
            a if a == derivation::NONCE_ACCOUNT => reference.index < self.next_nonce_index,
            _ => false,
        };
        if !issued {
            return Ok(None);
        }
        self.derive(secp, reference).map(Some)
    }

    fn derive<C: Signing>(&self, secp: &Secp256k1<C>, reference: &KeyReference) -> DlcResult<KeyMaterial> {
        let mut child = self.master.derive_priv(secp, &reference.path()?)?;
        let key = KeyMaterial::new(child.private_key);
        child.private_key.non_secure_erase();
        Ok(key)
    }

    fn erase(&mut self) {
        self.master.private_key.non_secure_erase();
    }
}

impl Drop for Keystore {
    fn drop(&mut self) {
        self.erase();
    }
}

impl fmt::Debug for Keystore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keystore")
            .field("next_oracle_index", &self.next_oracle_index)
            .field("next_nonce_index", &self.next_nonce_index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keystore() -> Keystore {
        Keystore::from_seed(Network::Regtest, &[7u8; 32]).unwrap()
    }

    #[test]
    fn test_key_reference_format() {
        let reference = KeyReference::new(KeyPurpose::EventNonce, 12);
        assert_eq!(reference.to_string(), "m/1'/12'");
        assert_eq!("m/1'/12'".parse::<KeyReference>().unwrap(), reference);

        for bad in ["1'/12'", "m/1/12'", "m/1'", "m/1'/2'/3'", "m/x'/1'"] {
            assert!(
                matches!(
                    bad.parse::<KeyReference>().unwrap_err(),
                    DlcError::InvalidKeyReference { .. }
                ),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let secp = Secp256k1::new();
        let mut a = keystore();
        let mut b = keystore();
        let (ref_a, pk_a) = a.derive_next(&secp, KeyPurpose::OracleKey).unwrap();
        let (ref_b, pk_b) = b.derive_next(&secp, KeyPurpose::OracleKey).unwrap();
        assert_eq!(ref_a, ref_b);
        assert_eq!(pk_a, pk_b);

        let (next, next_pk) = a.derive_next(&secp, KeyPurpose::OracleKey).unwrap();
        assert_eq!(next.to_string(), "m/0'/1'");
        assert_ne!(next_pk, pk_a);

        let (nonce, nonce_pk) = a.derive_next(&secp, KeyPurpose::EventNonce).unwrap();
        assert_eq!(nonce.to_string(), "m/1'/0'");
        assert_ne!(nonce_pk, pk_a);
    }

    #[test]
    fn test_only_issued_keys_are_returned() {
        let secp = Secp256k1::new();
        let mut ks = keystore();
        let (reference, pubkey) = ks.derive_next(&secp, KeyPurpose::OracleKey).unwrap();

        let key = ks.get(&secp, &reference).unwrap().unwrap();
        assert_eq!(key.x_only_public_key(&secp).0, pubkey);

        assert!(ks.get(&secp, &KeyReference::new(KeyPurpose::OracleKey, 1)).unwrap().is_none());
        assert!(ks.get(&secp, &KeyReference::new(KeyPurpose::EventNonce, 0)).unwrap().is_none());
        assert!(ks.get(&secp, &"m/9'/0'".parse().unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_keystore_json_roundtrip() {
        let secp = Secp256k1::new();
        let mut ks = keystore();
        let (reference, pubkey) = ks.derive_next(&secp, KeyPurpose::EventNonce).unwrap();

        let json = serde_json::to_string(&ks).unwrap();
        let back: Keystore = serde_json::from_str(&json).unwrap();
        let key = back.get(&secp, &reference).unwrap().unwrap();
        assert_eq!(key.x_only_public_key(&secp).0, pubkey);
        assert!(!format!("{:?}", key).contains(&hex::encode(key.secret_bytes())));
    }

    #[test]
    fn test_erase_wipes_master_key() {
        let secp = Secp256k1::new();
        let mut ks = keystore();
        let (reference, pubkey) = ks.derive_next(&secp, KeyPurpose::OracleKey).unwrap();
        let master = ks.master.private_key;

        ks.erase();
        assert_ne!(ks.master.private_key, master);
        let key = ks.get(&secp, &reference).unwrap().unwrap();
        assert_ne!(key.x_only_public_key(&secp).0, pubkey);
    }
}
