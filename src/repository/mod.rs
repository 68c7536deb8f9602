//! # Oracle Key Repository
//!
//! Persisted oracles, events, key references and recorded attestations.
//!
//! The repository is the only component that turns a [`KeyReference`] into
//! secret material, and the only place attestations are recorded. Recording
//! runs its check-then-write under an exclusive lock so that at most one
//! outcome per event is ever attested without an explicit
//! [`KeyLeakAcknowledgement`].

pub mod file;
pub mod keystore;
pub mod memory;

pub use file::FileRepository;
pub use crate::oracle::KeyMaterial;
pub use keystore::{KeyPurpose, KeyReference, Keystore};
pub use memory::InMemoryRepository;

use crate::error::{DlcError, DlcResult};
use crate::oracle::attestation::{self, Attestation, AttestationState};
use crate::oracle::{OracleCommitment, Outcome};
use bitcoin::secp256k1::{Secp256k1, Signing, Verification, XOnlyPublicKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// `oracle/event` name of an event
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventFullName {
    oracle: String,
    event: String,
}

impl EventFullName {
    pub fn new(oracle: impl Into<String>, event: impl Into<String>) -> DlcResult<Self> {
        let oracle = oracle.into();
        let event = event.into();
        if oracle.trim().is_empty() || event.trim().is_empty() || oracle.contains('/') || event.contains('/') {
            return Err(DlcError::InvalidEventName {
                name: format!("{}/{}", oracle, event),
            });
        }
        Ok(Self {
            oracle: oracle.trim().to_string(),
            event: event.trim().to_string(),
        })
    }

    pub fn oracle(&self) -> &str {
        &self.oracle
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl FromStr for EventFullName {
    type Err = DlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (oracle, event) = s.split_once('/').ok_or_else(|| DlcError::InvalidEventName {
            name: s.to_string(),
        })?;
        Self::new(oracle, event).map_err(|_| DlcError::InvalidEventName {
            name: s.to_string(),
        })
    }
}

impl fmt::Display for EventFullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.oracle, self.event)
    }
}

impl Serialize for EventFullName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventFullName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A named signer, owned when its private key is held locally
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Oracle {
    pub name: String,
    pub pubkey: XOnlyPublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ref: Option<KeyReference>,
}

impl Oracle {
    pub fn new(name: impl Into<String>, pubkey: XOnlyPublicKey) -> Self {
        Self {
            name: name.into(),
            pubkey,
            key_ref: None,
        }
    }

    pub fn owned(name: impl Into<String>, pubkey: XOnlyPublicKey, key_ref: KeyReference) -> Self {
        Self {
            name: name.into(),
            pubkey,
            key_ref: Some(key_ref),
        }
    }

    pub fn is_owned(&self) -> bool {
        self.key_ref.is_some()
    }
}

/// Explicit consent to record a second attestation for one event.
///
/// Two attestations under one nonce reveal the oracle private key to anyone
/// holding both. The reason is written to the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyLeakAcknowledgement {
    reason: String,
}

impl KeyLeakAcknowledgement {
    pub fn accept_key_leak(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Result of recording an attestation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttestationReceipt {
    /// First attestation for the event
    Recorded { outcome: Outcome },
    /// Forced second attestation: the oracle key must be considered compromised
    UnsafeReattestation { outcome: Outcome, previous: Vec<Outcome> },
}

impl AttestationReceipt {
    pub fn outcome(&self) -> &Outcome {
        match self {
            AttestationReceipt::Recorded { outcome } => outcome,
            AttestationReceipt::UnsafeReattestation { outcome, .. } => outcome,
        }
    }

    pub fn is_unsafe(&self) -> bool {
        matches!(self, AttestationReceipt::UnsafeReattestation { .. })
    }
}

/// One oracle commitment bound to a fixed outcome set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "EventRecord")]
pub struct Event {
    pub name: EventFullName,
    pub commitment: OracleCommitment,
    outcomes: Vec<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce_key_ref: Option<KeyReference>,
    #[serde(default)]
    attestations: BTreeMap<String, Attestation>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new<I, S>(name: EventFullName, commitment: OracleCommitment, outcomes: I) -> DlcResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            name,
            commitment,
            outcomes: Outcome::declare(outcomes)?,
            nonce_key_ref: None,
            attestations: BTreeMap::new(),
            created_at: Utc::now(),
        })
    }

    pub fn with_nonce_key(mut self, reference: KeyReference) -> Self {
        self.nonce_key_ref = Some(reference);
        self
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn attestations(&self) -> &BTreeMap<String, Attestation> {
        &self.attestations
    }

    pub fn attested_outcomes(&self) -> Vec<Outcome> {
        self.outcomes
            .iter()
            .filter(|o| self.attestations.contains_key(o.label()))
            .cloned()
            .collect()
    }

    pub fn state(&self) -> AttestationState {
        if self.attestations.is_empty() {
            AttestationState::NoncePublished
        } else {
            AttestationState::Attested(self.attested_outcomes())
        }
    }

    /// Verify and record an attestation.
    ///
    /// The outcome is discovered by verifying against every declared outcome.
    /// Nothing is written unless the call succeeds.
    pub fn record_attestation<C: Signing + Verification>(
        &mut self,
        secp: &Secp256k1<C>,
        attestation: Attestation,
        ack: Option<&KeyLeakAcknowledgement>,
    ) -> DlcResult<AttestationReceipt> {
        let outcome = attestation::identify(secp, &self.commitment, &self.outcomes, &attestation)?.clone();

        let previous = self.attested_outcomes();
        let already_attested = || DlcError::AttestationAlreadyExists {
            event: self.name.to_string(),
            outcomes: previous.iter().map(|o| o.label().to_string()).collect(),
        };
        if self.attestations.contains_key(outcome.label()) {
            return Err(already_attested());
        }
        if !previous.is_empty() && ack.is_none() {
            return Err(already_attested());
        }

        self.attestations.insert(outcome.label().to_string(), attestation);

        match ack {
            Some(ack) if !previous.is_empty() => {
                log::warn!(
                    "Forced second attestation on {} ({}), previous: {:?}. The oracle private key {} is now recoverable by anyone holding both attestations",
                    self.name,
                    ack.reason(),
                    previous.iter().map(Outcome::label).collect::<Vec<_>>(),
                    hex::encode(self.commitment.pubkey().serialize())
                );
                Ok(AttestationReceipt::UnsafeReattestation { outcome, previous })
            }
            _ => {
                log::info!("Recorded attestation for {} outcome '{}'", self.name, outcome);
                Ok(AttestationReceipt::Recorded { outcome })
            }
        }
    }
}

/// Persisted form of [`Event`], checked before it becomes one
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRecord {
    name: EventFullName,
    commitment: OracleCommitment,
    outcomes: Vec<String>,
    #[serde(default)]
    nonce_key_ref: Option<KeyReference>,
    #[serde(default)]
    attestations: BTreeMap<String, Attestation>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRecord> for Event {
    type Error = DlcError;

    fn try_from(record: EventRecord) -> DlcResult<Self> {
        let outcomes = Outcome::declare(&record.outcomes)?;
        if let Some(label) = record
            .attestations
            .keys()
            .find(|label| !outcomes.iter().any(|o| o.label() == label.as_str()))
        {
            return Err(DlcError::OutcomeNotFound {
                outcome: label.clone(),
            });
        }
        Ok(Self {
            name: record.name,
            commitment: record.commitment,
            outcomes,
            nonce_key_ref: record.nonce_key_ref,
            attestations: record.attestations,
            created_at: record.created_at,
        })
    }
}

/// Storage and key custody behind the oracle workflows.
///
/// Implementations must hold an exclusive lock across the read-check-write of
/// [`OracleKeyRepository::record_attestation`].
pub trait OracleKeyRepository {
    fn get_oracle(&self, name: &str) -> DlcResult<Option<Oracle>>;

    fn get_event(&self, name: &EventFullName) -> DlcResult<Option<Event>>;

    /// Secret behind `reference`, `None` if it is not held locally.
    fn get_key(&self, reference: &KeyReference) -> DlcResult<Option<KeyMaterial>>;

    /// Derive and persist a fresh key, returning its reference and public key.
    fn generate_key(&self, purpose: KeyPurpose) -> DlcResult<(KeyReference, XOnlyPublicKey)>;

    fn add_oracle(&self, oracle: Oracle) -> DlcResult<()>;

    /// Replace an oracle's public key, dropping its key reference if it changed.
    fn set_oracle(&self, name: &str, pubkey: XOnlyPublicKey) -> DlcResult<()>;

    /// Remove an oracle and its events; `false` if it did not exist.
    fn remove_oracle(&self, name: &str) -> DlcResult<bool>;

    fn list_oracles(&self) -> DlcResult<Vec<Oracle>>;

    fn add_event(&self, event: Event) -> DlcResult<()>;

    fn list_events(&self, oracle: Option<&str>) -> DlcResult<Vec<Event>>;

    /// Verify and record under lock; `ack` permits a second outcome.
    fn record_attestation(
        &self,
        name: &EventFullName,
        attestation: Attestation,
        ack: Option<&KeyLeakAcknowledgement>,
    ) -> DlcResult<AttestationReceipt>;

    /// Record the first attestation of an event.
    fn add_attestation(&self, name: &EventFullName, attestation: Attestation) -> DlcResult<Outcome> {
        self.record_attestation(name, attestation, None)
            .map(|receipt| receipt.outcome().clone())
    }

    /// Record an attestation even if another outcome was already attested.
    fn force_add_attestation(
        &self,
        name: &EventFullName,
        attestation: Attestation,
        ack: &KeyLeakAcknowledgement,
    ) -> DlcResult<AttestationReceipt> {
        self.record_attestation(name, attestation, Some(ack))
    }
}

/// Oracle and event records shared by the repository implementations
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct RepositoryState {
    #[serde(default)]
    oracles: BTreeMap<String, Oracle>,
    #[serde(default)]
    events: BTreeMap<String, Event>,
}

impl RepositoryState {
    fn oracle(&self, name: &str) -> Option<Oracle> {
        self.oracles.get(name).cloned()
    }

    fn event(&self, name: &EventFullName) -> Option<Event> {
        self.events.get(&name.to_string()).cloned()
    }

    fn add_oracle(&mut self, oracle: Oracle) -> DlcResult<()> {
        if self.oracles.contains_key(&oracle.name) {
            return Err(DlcError::OracleAlreadyExists { name: oracle.name });
        }
        if oracle.name.trim().is_empty() || oracle.name.contains('/') {
            return Err(DlcError::InvalidOracleName { name: oracle.name });
        }
        log::info!("Added oracle {}", oracle.name);
        self.oracles.insert(oracle.name.clone(), oracle);
        Ok(())
    }

    fn set_oracle(&mut self, name: &str, pubkey: XOnlyPublicKey) -> DlcResult<()> {
        let oracle = self.oracles.get_mut(name).ok_or_else(|| DlcError::OracleNotFound {
            name: name.to_string(),
        })?;
        if oracle.pubkey != pubkey {
            oracle.pubkey = pubkey;
            oracle.key_ref = None;
            log::info!("Updated public key of oracle {}", name);
        }
        Ok(())
    }

    fn remove_oracle(&mut self, name: &str) -> bool {
        if self.oracles.remove(name).is_none() {
            return false;
        }
        self.events.retain(|_, event| event.name.oracle() != name);
        log::info!("Removed oracle {} and its events", name);
        true
    }

    fn add_event(&mut self, event: Event) -> DlcResult<()> {
        let oracle = self.oracles.get(event.name.oracle()).ok_or_else(|| DlcError::OracleNotFound {
            name: event.name.oracle().to_string(),
        })?;
        if oracle.pubkey != event.commitment.pubkey() {
            return Err(DlcError::key_mismatch(format!(
                "commitment of {} is not signed by oracle {}",
                event.name, oracle.name
            )));
        }
        let key = event.name.to_string();
        if self.events.contains_key(&key) {
            return Err(DlcError::EventAlreadyExists { name: key });
        }
        log::info!("Added event {} with {} outcomes", key, event.outcomes.len());
        self.events.insert(key, event);
        Ok(())
    }

    fn list_events(&self, oracle: Option<&str>) -> Vec<Event> {
        self.events
            .values()
            .filter(|e| oracle.map_or(true, |o| e.name.oracle() == o))
            .cloned()
            .collect()
    }

    fn record_attestation<C: Signing + Verification>(
        &mut self,
        secp: &Secp256k1<C>,
        name: &EventFullName,
        attestation: Attestation,
        ack: Option<&KeyLeakAcknowledgement>,
    ) -> DlcResult<AttestationReceipt> {
        let event = self
            .events
            .get_mut(&name.to_string())
            .ok_or_else(|| DlcError::EventNotFound {
                name: name.to_string(),
            })?;
        event.record_attestation(secp, attestation, ack)
    }
}
