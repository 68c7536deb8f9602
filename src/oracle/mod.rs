//! # Oracle Protocol
//!
//! Outcome digests, oracle commitments and the attestation signing and
//! verification algorithm.
//!
//! ## Flow
//!
//! 1. **Commit**: the oracle publishes `pubkey || nonce` for an event
//! 2. **Prepare**: counterparties derive one signature point per outcome
//! 3. **Attest**: the oracle reveals the scalar for the realized outcome
//! 4. **Settle**: anyone verifies the scalar against the commitment

pub mod attestation;
pub mod commitment;
pub mod outcome;
pub mod secret;


pub use attestation::{Attestation, AttestationState};
pub use commitment::OracleCommitment;
pub use outcome::{Outcome, OutcomeDigest};
pub use secret::KeyMaterial;
