//! # File Repository
//!
//! JSON files in a data directory:
//!
//! ```text
//! <datadir>/repository.json   oracles, events, attestations
//! <datadir>/keystore.json     master key and derivation counters
//! <datadir>/repository.lock   locked while a mutation is in progress
//! ```
//!
//! Every mutation takes an exclusive OS lock on `repository.lock`, reloads
//! the current state, applies the change and writes it back atomically. A
//! failed mutation writes nothing. Separate processes pointed at the same
//! directory serialize on the same lock, and the OS drops it when a holder
//! exits, so a crashed process never leaves the repository wedged.

use super::{
    AttestationReceipt, Event, EventFullName, KeyLeakAcknowledgement, KeyMaterial, KeyPurpose,
    KeyReference, Keystore, Oracle, OracleKeyRepository, RepositoryState,
};
use crate::config::files;
use crate::error::{DlcError, DlcResult};
use crate::oracle::Attestation;
use crate::utils::fs::{ensure_dir_exists, read_json, write_json};
use bitcoin::secp256k1::{All, Secp256k1, XOnlyPublicKey};
use bitcoin::Network;
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Advisory lock on `repository.lock`, released when the handle closes
struct LockFile {
    file: File,
}

impl LockFile {
    /// Block until the exclusive lock on `path` is held.
    ///
    /// The file itself is never removed. A lock file left behind by a dead
    /// process holds no lock and does not block.
    fn acquire(path: &Path) -> DlcResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                log::debug!("Waiting for repository lock {}", path.display());
                file.lock()?;
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }
        Ok(Self { file })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log::warn!("Failed to release repository lock: {}", e);
        }
    }
}

/// Repository persisted under a data directory
pub struct FileRepository {
    dir: PathBuf,
    network: Network,
    secp: Secp256k1<All>,
    guard: Mutex<()>,
}

impl FileRepository {
    /// Open (creating if needed) the repository in `dir`.
    pub fn open(dir: impl Into<PathBuf>, network: Network) -> DlcResult<Self> {
        let dir = dir.into();
        ensure_dir_exists(&dir)?;
        log::debug!("Opened repository at {} ({})", dir.display(), network);
        Ok(Self {
            dir,
            network,
            secp: Secp256k1::new(),
            guard: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    pub fn network(&self) -> Network {
        self.network
    }

    fn repository_path(&self) -> PathBuf {
        self.dir.join(files::REPOSITORY)
    }

    fn keystore_path(&self) -> PathBuf {
        self.dir.join(files::KEYSTORE)
    }

    fn load_state(&self) -> DlcResult<RepositoryState> {
        Ok(read_json(&self.repository_path())?.unwrap_or_default())
    }

    fn load_keystore(&self) -> DlcResult<Option<Keystore>> {
        read_json(&self.keystore_path())
    }

    fn lock(&self) -> DlcResult<(MutexGuard<'_, ()>, LockFile)> {
        let guard = self
            .guard
            .lock()
            .map_err(|_| DlcError::lock_poisoned("file repository"))?;
        let file = LockFile::acquire(&self.dir.join(files::LOCK))?;
        Ok((guard, file))
    }

    /// Apply `f` to the freshly loaded state and persist it on success.
    fn mutate<T>(&self, f: impl FnOnce(&mut RepositoryState) -> DlcResult<T>) -> DlcResult<T> {
        let _lock = self.lock()?;
        let mut state = self.load_state()?;
        let result = f(&mut state)?;
        write_json(&self.repository_path(), &state)?;
        Ok(result)
    }
}

impl OracleKeyRepository for FileRepository {
    fn get_oracle(&self, name: &str) -> DlcResult<Option<Oracle>> {
        Ok(self.load_state()?.oracle(name))
    }

    fn get_event(&self, name: &EventFullName) -> DlcResult<Option<Event>> {
        Ok(self.load_state()?.event(name))
    }

    fn get_key(&self, reference: &KeyReference) -> DlcResult<Option<KeyMaterial>> {
        match self.load_keystore()? {
            Some(keystore) => keystore.get(&self.secp, reference),
            None => Ok(None),
        }
    }

    fn generate_key(&self, purpose: KeyPurpose) -> DlcResult<(KeyReference, XOnlyPublicKey)> {
        let _lock = self.lock()?;
        let mut keystore = match self.load_keystore()? {
            Some(keystore) => keystore,
            None => {
                log::info!("Creating keystore at {}", self.keystore_path().display());
                Keystore::generate(self.network)?
            }
        };
        let generated = keystore.derive_next(&self.secp, purpose)?;
        write_json(&self.keystore_path(), &keystore)?;
        Ok(generated)
    }

    fn add_oracle(&self, oracle: Oracle) -> DlcResult<()> {
        self.mutate(|state| state.add_oracle(oracle))
    }

    fn set_oracle(&self, name: &str, pubkey: XOnlyPublicKey) -> DlcResult<()> {
        self.mutate(|state| state.set_oracle(name, pubkey))
    }

    fn remove_oracle(&self, name: &str) -> DlcResult<bool> {
        self.mutate(|state| Ok(state.remove_oracle(name)))
    }

    fn list_oracles(&self) -> DlcResult<Vec<Oracle>> {
        Ok(self.load_state()?.oracles.into_values().collect())
    }

    fn add_event(&self, event: Event) -> DlcResult<()> {
        self.mutate(|state| state.add_event(event))
    }

    fn list_events(&self, oracle: Option<&str>) -> DlcResult<Vec<Event>> {
        Ok(self.load_state()?.list_events(oracle))
    }

    fn record_attestation(
        &self,
        name: &EventFullName,
        attestation: Attestation,
        ack: Option<&KeyLeakAcknowledgement>,
    ) -> DlcResult<AttestationReceipt> {
        self.mutate(|state| state.record_attestation(&self.secp, name, attestation, ack))
    }
}
