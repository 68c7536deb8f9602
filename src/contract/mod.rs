//! # Contracts
//!
//! Payoff curves and the offer message that binds a curve to an oracle
//! commitment.

pub mod offer;
pub mod payoff;

pub use offer::{AttestationMessage, DlcMessage, Offer, Timeouts};
pub use payoff::{ContractInfo, PayoffCurve, PayoffEntry};
