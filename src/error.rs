//! # Error Types for the DLC Oracle
//!
//! This module provides the error taxonomy shared by the protocol primitives,
//! the payoff curve validation and the oracle key repository.

use thiserror::Error;

/// Main error type for all oracle and contract operations
#[derive(Debug, Error)]
pub enum DlcError {
    /// Oracle commitment bytes fail length or curve-membership checks
    #[error("Malformed oracle commitment: {reason}")]
    MalformedCommitment { reason: String },

    /// Attestation bytes are not a 32-byte scalar
    #[error("Malformed attestation: {reason}")]
    MalformedAttestation { reason: String },

    /// Outcome label cannot be used (empty after trimming, etc.)
    #[error("Invalid outcome: {reason}")]
    InvalidOutcome { reason: String },

    /// Outcome is not part of the declared outcome set
    #[error("Outcome '{outcome}' does not exist in this event")]
    OutcomeNotFound { outcome: String },

    /// Same outcome listed more than once
    #[error("Outcome '{outcome}' appears more than once")]
    DuplicateOutcome { outcome: String },

    /// Payoff curve does not cover every declared outcome
    #[error("Payoff curve is missing outcomes: {}", missing.join(", "))]
    IncompleteCurve { missing: Vec<String> },

    /// Payoff curve carries a negative settlement amount
    #[error("Payout for outcome '{outcome}' is negative ({payout} sats)")]
    NegativePayout { outcome: String, payout: i64 },

    /// Payout string could not be parsed into an amount
    #[error("Invalid payout '{input}': {reason}")]
    InvalidPayout { input: String, reason: String },

    /// Contract timeouts are inconsistent
    #[error("Contract timeout {timeout} must be after contract maturity {maturity}")]
    InvalidTimeouts { maturity: u32, timeout: u32 },

    /// Repository lookup miss for an event
    #[error("Event '{name}' does not exist")]
    EventNotFound { name: String },

    /// Repository lookup miss for an oracle
    #[error("Oracle '{name}' does not exist")]
    OracleNotFound { name: String },

    /// Oracle name already registered
    #[error("Oracle '{name}' already exists")]
    OracleAlreadyExists { name: String },

    /// Event name already registered
    #[error("Event '{name}' already exists")]
    EventAlreadyExists { name: String },

    /// Event full name is not of the form `oracle/event`
    #[error("Invalid event name '{name}', expected 'oraclename/eventname'")]
    InvalidEventName { name: String },

    /// Oracle name is empty or contains a path separator
    #[error("Invalid oracle name '{name}'")]
    InvalidOracleName { name: String },

    /// Key reference is not of the form `m/<purpose>'/<index>'`
    #[error("Invalid key reference '{reference}', expected m/0'/<index>' or m/1'/<index>'")]
    InvalidKeyReference { reference: String },

    /// Key reference cannot be dereferenced locally
    #[error("You do not control the key '{reference}'")]
    KeyNotOwned { reference: String },

    /// Oracle is tracked watch-only, no private key is linked to it
    #[error("You do not own the private key of oracle '{name}'")]
    OracleNotOwned { name: String },

    /// Event was not generated locally, no nonce key is linked to it
    #[error("You do not own the nonce of event '{name}'")]
    EventNotOwned { name: String },

    /// Locally held key does not match the published commitment
    #[error("Key mismatch: {message}")]
    KeyMismatch { message: String },

    /// A second attestation was attempted without an explicit override
    #[error(
        "Event '{event}' has already been attested ({}); attesting another outcome could leak the oracle private key",
        outcomes.join(", ")
    )]
    AttestationAlreadyExists { event: String, outcomes: Vec<String> },

    /// Attestation does not satisfy the Schnorr equation for any declared outcome
    #[error("Invalid attestation: {reason}")]
    VerificationFailure { reason: String },

    /// Configuration errors (data directory, network, ...)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A thread panicked while holding a repository lock
    #[error("The {resource} lock is poisoned")]
    LockPoisoned { resource: String },

    /// Low level secp256k1 failures
    #[error("Cryptographic operation failed: {source}")]
    Secp256k1 {
        #[from]
        source: bitcoin::secp256k1::Error,
    },

    /// Key derivation failures
    #[error("Key derivation failed: {source}")]
    Bip32 {
        #[from]
        source: bitcoin::bip32::Error,
    },

    /// File I/O operations
    #[error("File operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON processing error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// Result type alias for oracle and contract operations
pub type DlcResult<T> = Result<T, DlcError>;

impl DlcError {
    /// Create a malformed commitment error
    pub fn malformed_commitment(reason: impl Into<String>) -> Self {
        Self::MalformedCommitment {
            reason: reason.into(),
        }
    }

    /// Create a verification failure
    pub fn verification(reason: impl Into<String>) -> Self {
        Self::VerificationFailure {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a poisoned lock error
    pub fn lock_poisoned(resource: impl Into<String>) -> Self {
        Self::LockPoisoned {
            resource: resource.into(),
        }
    }

    /// Create a key mismatch error
    pub fn key_mismatch(message: impl Into<String>) -> Self {
        Self::KeyMismatch {
            message: message.into(),
        }
    }

    /// Check if this error is a repository lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DlcError::EventNotFound { .. }
                | DlcError::OracleNotFound { .. }
                | DlcError::OutcomeNotFound { .. }
        )
    }

    /// Check if this error indicates a security issue
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            DlcError::AttestationAlreadyExists { .. }
                | DlcError::VerificationFailure { .. }
                | DlcError::KeyMismatch { .. }
        )
    }
}
