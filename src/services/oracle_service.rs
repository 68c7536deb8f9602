//! # Oracle Service
//!
//! Command-level workflows over an [`OracleKeyRepository`]: managing oracles
//! and events, signing and importing attestations, and building and
//! reviewing contract offers.

use crate::contract::{AttestationMessage, DlcMessage, Offer, PayoffCurve, Timeouts};
use crate::error::{DlcError, DlcResult};
use crate::oracle::{attestation, Attestation, OracleCommitment, Outcome};
use crate::repository::{
    AttestationReceipt, Event, EventFullName, KeyLeakAcknowledgement, KeyPurpose, Oracle,
    OracleKeyRepository,
};
use bitcoin::secp256k1::{All, PublicKey, Secp256k1, XOnlyPublicKey};
use std::str::FromStr;

/// Where an offer takes its oracle commitment from
#[derive(Clone, Debug)]
pub enum OracleSource {
    /// Commitment given directly; the payoff curve defines the outcome set
    Commitment(OracleCommitment),
    /// Event tracked by the repository; its declared outcomes are binding
    Event(EventFullName),
}

/// Parameters of `offer create`
#[derive(Clone, Debug)]
pub struct OfferRequest {
    pub oracle: OracleSource,
    /// `label:payout` entries
    pub outcomes: Vec<String>,
    pub maturity: u32,
    pub expiration: u32,
    /// sat/vB
    pub fee_rate: Option<u64>,
}

/// Event with the per-outcome signature points counterparties build against
#[derive(Clone, Debug)]
pub struct EventDetails {
    pub event: Event,
    pub signature_points: Vec<(Outcome, PublicKey)>,
}

/// A freshly signed attestation and how it was recorded
#[derive(Clone, Debug)]
pub struct SignedAttestation {
    pub event: EventFullName,
    pub outcome: Outcome,
    pub attestation: Attestation,
    pub receipt: AttestationReceipt,
}

impl SignedAttestation {
    /// Envelope handed to counterparties, accepted back by `attest_add`.
    pub fn to_message(&self) -> DlcMessage {
        DlcMessage::Attestation(AttestationMessage {
            event: self.event.to_string(),
            outcome: self.outcome.clone(),
            attestation: self.attestation,
        })
    }
}

/// Validated offer with its signature points
#[derive(Clone, Debug)]
pub struct OfferReview {
    pub offer: Offer,
    /// Local event the offer refers to, when it is known
    pub event: Option<Event>,
    pub signature_points: Vec<(Outcome, PublicKey)>,
}

/// Workflows shared by the command line tool and library users
pub struct OracleService<R> {
    repo: R,
    secp: Secp256k1<All>,
}

impl<R: OracleKeyRepository> OracleService<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            secp: Secp256k1::new(),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    fn oracle(&self, name: &str) -> DlcResult<Oracle> {
        self.repo.get_oracle(name)?.ok_or_else(|| DlcError::OracleNotFound {
            name: name.to_string(),
        })
    }

    fn event(&self, name: &EventFullName) -> DlcResult<Event> {
        self.repo.get_event(name)?.ok_or_else(|| DlcError::EventNotFound {
            name: name.to_string(),
        })
    }

    /// Generate an oracle whose private key is kept in the keystore.
    pub fn generate_oracle(&self, name: &str) -> DlcResult<Oracle> {
        if self.repo.get_oracle(name)?.is_some() {
            return Err(DlcError::OracleAlreadyExists {
                name: name.to_string(),
            });
        }
        let (key_ref, pubkey) = self.repo.generate_key(KeyPurpose::OracleKey)?;
        let oracle = Oracle::owned(name, pubkey, key_ref);
        self.repo.add_oracle(oracle.clone())?;
        Ok(oracle)
    }

    /// Track a third-party oracle by its public key.
    pub fn add_oracle(&self, name: &str, pubkey: &str) -> DlcResult<Oracle> {
        let oracle = Oracle::new(name, parse_pubkey(pubkey, "oracle public key")?);
        self.repo.add_oracle(oracle.clone())?;
        Ok(oracle)
    }

    pub fn set_oracle(&self, name: &str, pubkey: &str) -> DlcResult<()> {
        self.repo.set_oracle(name, parse_pubkey(pubkey, "oracle public key")?)
    }

    pub fn remove_oracle(&self, name: &str) -> DlcResult<()> {
        if !self.repo.remove_oracle(name)? {
            return Err(DlcError::OracleNotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn list_oracles(&self) -> DlcResult<Vec<Oracle>> {
        self.repo.list_oracles()
    }

    /// An oracle, with its private key in hex when `show_sensitive` is set
    /// and the key is held locally.
    pub fn show_oracle(&self, name: &str, show_sensitive: bool) -> DlcResult<(Oracle, Option<String>)> {
        let oracle = self.oracle(name)?;
        let secret = match (&oracle.key_ref, show_sensitive) {
            (Some(reference), true) => self
                .repo
                .get_key(reference)?
                .map(|key| hex::encode(key.secret_bytes())),
            _ => None,
        };
        Ok((oracle, secret))
    }

    /// Create an event for an owned oracle with a freshly derived nonce.
    pub fn generate_event<S: AsRef<str>>(&self, name: &EventFullName, outcomes: &[S]) -> DlcResult<Event> {
        let declared = Outcome::declare(outcomes)?;
        let oracle = self.oracle(name.oracle())?;
        let key_ref = oracle.key_ref.ok_or_else(|| DlcError::OracleNotOwned {
            name: oracle.name.clone(),
        })?;
        if self.repo.get_key(&key_ref)?.is_none() {
            return Err(DlcError::KeyNotOwned {
                reference: key_ref.to_string(),
            });
        }
        if self.repo.get_event(name)?.is_some() {
            return Err(DlcError::EventAlreadyExists {
                name: name.to_string(),
            });
        }

        let (nonce_ref, nonce) = self.repo.generate_key(KeyPurpose::EventNonce)?;
        let commitment = OracleCommitment::new(oracle.pubkey, nonce);
        let event = Event::new(name.clone(), commitment, declared.iter().map(Outcome::label))?
            .with_nonce_key(nonce_ref);
        self.repo.add_event(event.clone())?;
        Ok(event)
    }

    /// Track an event announced by a third-party oracle.
    pub fn add_event<S: AsRef<str>>(&self, name: &EventFullName, nonce: &str, outcomes: &[S]) -> DlcResult<Event> {
        let oracle = self.oracle(name.oracle())?;
        let nonce = parse_pubkey(nonce, "nonce")?;
        let event = Event::new(name.clone(), OracleCommitment::new(oracle.pubkey, nonce), outcomes)?;
        self.repo.add_event(event.clone())?;
        Ok(event)
    }

    pub fn list_events(&self, oracle: Option<&str>) -> DlcResult<Vec<Event>> {
        self.repo.list_events(oracle)
    }

    pub fn show_event(&self, name: &EventFullName) -> DlcResult<EventDetails> {
        let event = self.event(name)?;
        let signature_points = event
            .outcomes()
            .iter()
            .map(|o| -> DlcResult<(Outcome, PublicKey)> {
                Ok((o.clone(), event.commitment.signature_point(&self.secp, &o.digest())?))
            })
            .collect::<DlcResult<Vec<_>>>()?;
        Ok(EventDetails {
            event,
            signature_points,
        })
    }

    /// Sign `outcome` for an event this repository generated.
    ///
    /// Refuses before signing when the event already carries an attestation,
    /// unless `ack` is given and the outcome differs from the attested ones.
    pub fn attest_sign(
        &self,
        name: &EventFullName,
        outcome: &str,
        ack: Option<&KeyLeakAcknowledgement>,
    ) -> DlcResult<SignedAttestation> {
        let oracle = self.oracle(name.oracle())?;
        let event = self.event(name)?;
        let nonce_ref = event.nonce_key_ref.ok_or_else(|| DlcError::EventNotOwned {
            name: name.to_string(),
        })?;
        let outcome = Outcome::resolve(event.outcomes(), outcome)?.clone();

        let key_ref = oracle.key_ref.ok_or_else(|| DlcError::OracleNotOwned {
            name: oracle.name.clone(),
        })?;
        let private_key = self.repo.get_key(&key_ref)?.ok_or_else(|| DlcError::KeyNotOwned {
            reference: key_ref.to_string(),
        })?;

        let attested = event.attested_outcomes();
        if attested.contains(&outcome) || (!attested.is_empty() && ack.is_none()) {
            return Err(DlcError::AttestationAlreadyExists {
                event: name.to_string(),
                outcomes: attested.iter().map(|o| o.label().to_string()).collect(),
            });
        }

        let nonce_secret = self.repo.get_key(&nonce_ref)?.ok_or_else(|| DlcError::KeyNotOwned {
            reference: nonce_ref.to_string(),
        })?;
        let attestation = attestation::sign_committed(
            &self.secp,
            &event.commitment,
            &private_key,
            &nonce_secret,
            &outcome.digest(),
        )?;

        let receipt = match ack {
            None => AttestationReceipt::Recorded {
                outcome: self.repo.add_attestation(name, attestation)?,
            },
            Some(ack) => self.repo.force_add_attestation(name, attestation, ack)?,
        };
        if receipt.outcome() != &outcome {
            return Err(DlcError::verification(format!(
                "attestation was recorded for '{}' instead of '{}'",
                receipt.outcome(),
                outcome
            )));
        }

        Ok(SignedAttestation {
            event: name.clone(),
            outcome,
            attestation,
            receipt,
        })
    }

    /// Record an attestation received from an oracle, returning the outcome it attests.
    ///
    /// `input` is either the 64-character hex scalar or an attestation message.
    pub fn attest_add(&self, name: &EventFullName, input: &str) -> DlcResult<Outcome> {
        let attestation = if input.trim_start().starts_with('{') {
            let message = DlcMessage::parse_attestation(input)?;
            if message.event != name.to_string() {
                return Err(DlcError::MalformedAttestation {
                    reason: format!("message is for event {}, not {}", message.event, name),
                });
            }
            message.attestation
        } else {
            Attestation::parse(input)?
        };
        self.event(name)?;
        self.repo.add_attestation(name, attestation)
    }

    /// Build and validate an offer.
    pub fn create_offer(&self, request: &OfferRequest) -> DlcResult<Offer> {
        let curve = PayoffCurve::parse(&request.outcomes)?;
        let timeouts = Timeouts::new(request.maturity, request.expiration)?;

        let offer = match &request.oracle {
            OracleSource::Commitment(commitment) => {
                let declared = Outcome::declare(curve.entries().iter().map(|e| e.outcome.label()))?;
                Offer::new(&curve, &declared, *commitment, timeouts)?
            }
            OracleSource::Event(name) => {
                let event = self.event(name)?;
                Offer::new(&curve, event.outcomes(), event.commitment, timeouts)?
                    .with_event_id(Some(name.to_string()))
            }
        };
        log::debug!(
            "Created offer over {} outcomes for oracle {}",
            offer.contract_info.len(),
            hex::encode(offer.oracle_info.pubkey().serialize())
        );
        Ok(offer.with_fee_rate(request.fee_rate))
    }

    /// Parse and validate a received offer.
    ///
    /// When the offer names an event this repository tracks, the event's
    /// commitment must match and its declared outcomes are binding.
    pub fn review_offer(&self, json: &str) -> DlcResult<OfferReview> {
        let offer = DlcMessage::parse_offer(json)?;

        let event = match offer.event_id.as_deref().map(EventFullName::from_str) {
            Some(Ok(name)) => self.repo.get_event(&name)?,
            _ => None,
        };
        if let Some(event) = &event {
            if event.commitment != offer.oracle_info {
                return Err(DlcError::key_mismatch(format!(
                    "offer oracle info does not match the commitment of {}",
                    event.name
                )));
            }
        }
        offer.validate(event.as_ref().map(Event::outcomes))?;

        let signature_points = offer.signature_points(&self.secp)?;
        Ok(OfferReview {
            offer,
            event,
            signature_points,
        })
    }
}

fn parse_pubkey(input: &str, what: &str) -> DlcResult<XOnlyPublicKey> {
    XOnlyPublicKey::from_str(input.trim())
        .map_err(|e| DlcError::malformed_commitment(format!("invalid {}: {}", what, e)))
}
