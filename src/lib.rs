//! # Bitcoin DLC Oracle Library
//!
//! Oracle commitments, outcome attestations and payoff curves for Discreet
//! Log Contracts, built on BIP-340 Schnorr signatures over secp256k1.
//!
//! An oracle publishes a public key and a per-event nonce. Counterparties
//! derive one signature point per outcome and lock settlement transactions
//! to them. When the event resolves the oracle reveals a single scalar that
//! unlocks exactly one of those transactions.

pub mod config;
pub mod contract;
pub mod error;
pub mod oracle;
pub mod repository;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use contract::{DlcMessage, Offer, PayoffCurve, Timeouts};
pub use error::{DlcError, DlcResult};
pub use oracle::{Attestation, OracleCommitment, Outcome, OutcomeDigest};
pub use repository::{
    AttestationReceipt, Event, EventFullName, FileRepository, InMemoryRepository,
    KeyLeakAcknowledgement, Oracle, OracleKeyRepository,
};
pub use services::OracleService;
