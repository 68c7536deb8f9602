//! # Services Module
//!
//! Workflows that combine the protocol primitives with a repository.
//!
//! ## Components
//!
//! - **Oracle Service**: oracle and event management, attestation signing,
//!   offer creation and review

pub mod oracle_service;

pub use oracle_service::{
    EventDetails, OfferRequest, OfferReview, OracleService, OracleSource, SignedAttestation,
};
