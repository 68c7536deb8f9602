//! # Offer Messages
//!
//! An offer binds a payoff curve to an oracle commitment. Fields this crate
//! does not own (funding inputs, change address, ...) are carried through
//! untouched so a transaction builder can read and extend the same document.

use crate::contract::payoff::{ContractInfo, PayoffCurve};
use crate::error::{DlcError, DlcResult};
use crate::oracle::{Attestation, OracleCommitment, Outcome};
use bitcoin::secp256k1::{PublicKey, Secp256k1, Verification};
use serde::{Deserialize, Serialize};

/// Contract locktimes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
    /// Locktime of the contract execution transactions
    pub contract_maturity: u32,
    /// Locktime of the refund transaction
    pub contract_timeout: u32,
}

impl Timeouts {
    pub fn new(contract_maturity: u32, contract_timeout: u32) -> DlcResult<Self> {
        let timeouts = Self {
            contract_maturity,
            contract_timeout,
        };
        timeouts.validate()?;
        Ok(timeouts)
    }

    pub fn validate(&self) -> DlcResult<()> {
        if self.contract_timeout <= self.contract_maturity {
            return Err(DlcError::InvalidTimeouts {
                maturity: self.contract_maturity,
                timeout: self.contract_timeout,
            });
        }
        Ok(())
    }
}

/// Contract offer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub contract_info: Vec<ContractInfo>,
    pub oracle_info: OracleCommitment,
    /// Fee rate in sat/vB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_rate: Option<u64>,
    pub timeouts: Timeouts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Funding and transaction fields owned by other components
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Offer {
    /// Build an offer from a curve validated against `declared`.
    pub fn new(
        curve: &PayoffCurve,
        declared: &[Outcome],
        oracle_info: OracleCommitment,
        timeouts: Timeouts,
    ) -> DlcResult<Self> {
        timeouts.validate()?;
        let contract_info = curve.to_contract_info(declared)?;
        Ok(Self {
            contract_info,
            oracle_info,
            fee_rate: None,
            timeouts,
            event_id: None,
            extra: serde_json::Map::new(),
        })
    }

    pub fn with_fee_rate(mut self, fee_rate: Option<u64>) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    pub fn with_event_id(mut self, event_id: Option<String>) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn payoff_curve(&self) -> DlcResult<PayoffCurve> {
        if self.contract_info.is_empty() {
            return Err(DlcError::IncompleteCurve {
                missing: vec!["contractInfo is required".to_string()],
            });
        }
        PayoffCurve::from_contract_info(&self.contract_info)
    }

    /// Re-validate a received offer.
    ///
    /// Without a declared outcome set, the offer's own outcomes are taken as
    /// the declared set, which still catches duplicates and empty curves.
    pub fn validate(&self, declared: Option<&[Outcome]>) -> DlcResult<()> {
        self.timeouts.validate()?;
        let curve = self.payoff_curve()?;
        match declared {
            Some(declared) => curve.validate(declared),
            None => curve.validate(&Outcome::declare(curve.outcomes().iter().map(|o| o.label()))?),
        }
    }

    /// Signature point for every outcome, in contract order.
    pub fn signature_points<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
    ) -> DlcResult<Vec<(Outcome, PublicKey)>> {
        self.contract_info
            .iter()
            .map(|ci| {
                let point = self.oracle_info.signature_point(secp, &ci.outcome.digest())?;
                Ok((ci.outcome.clone(), point))
            })
            .collect()
    }
}

/// Tagged envelope for every message the tool reads or writes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "camelCase")]
pub enum DlcMessage {
    OracleCommitment(OracleCommitment),
    Attestation(AttestationMessage),
    Offer(Offer),
}

/// An attestation together with the event it belongs to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationMessage {
    pub event: String,
    pub outcome: Outcome,
    pub attestation: Attestation,
}

impl DlcMessage {
    pub fn from_json(json: &str) -> DlcResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> DlcResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Accept either a tagged offer or a bare offer document.
    pub fn parse_offer(json: &str) -> DlcResult<Offer> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.get("type").is_some() {
            return match serde_json::from_value(value)? {
                DlcMessage::Offer(offer) => Ok(offer),
                other => Err(DlcError::config(format!(
                    "expected an offer message, got {}",
                    other.kind()
                ))),
            };
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Accept a tagged attestation message.
    pub fn parse_attestation(json: &str) -> DlcResult<AttestationMessage> {
        match Self::from_json(json)? {
            DlcMessage::Attestation(message) => Ok(message),
            other => Err(DlcError::MalformedAttestation {
                reason: format!("expected an attestation message, got {}", other.kind()),
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DlcMessage::OracleCommitment(_) => "oracleCommitment",
            DlcMessage::Attestation(_) => "attestation",
            DlcMessage::Offer(_) => "offer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::Amount;

    const ORACLE_INFO: &str = "57caa081b0a0e9e9413cf4fb72ddc2630d609bdf6a912b98c4cfd358a4ce149692ba989222e76cf0cb263fedd67587812110bde1dc1468bef63c8f6974692ea1";

    fn sample_offer() -> Offer {
        let declared = Outcome::declare(["Republican_win", "Democrats_win", "other"]).unwrap();
        let curve = PayoffCurve::parse(["Republican_win:10000sats", "Democrats_win:0", "other:0.2"]).unwrap();
        Offer::new(
            &curve,
            &declared,
            OracleCommitment::parse(ORACLE_INFO).unwrap(),
            Timeouts::new(0, 1000).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_offer_json_shape() {
        let offer = sample_offer().with_fee_rate(Some(5));
        let json = serde_json::to_value(&offer).unwrap();
        assert_eq!(json["oracleInfo"], ORACLE_INFO);
        assert_eq!(json["contractInfo"][0]["payout"], 10000);
        assert_eq!(json["contractInfo"][2]["payout"], 20_000_000);
        assert_eq!(json["timeouts"]["contractTimeout"], 1000);
        assert_eq!(json["feeRate"], 5);
        assert!(json.get("eventId").is_none());
    }

    #[test]
    fn test_unknown_fields_are_carried() {
        let mut json = serde_json::to_value(sample_offer()).unwrap();
        json["changeAddress"] = serde_json::json!("tb1q8smyuku8zzmmrm2r5tfhy38vl3r4anezy6ftse");
        let offer: Offer = serde_json::from_value(json).unwrap();
        assert_eq!(
            offer.extra["changeAddress"],
            "tb1q8smyuku8zzmmrm2r5tfhy38vl3r4anezy6ftse"
        );
        let back = serde_json::to_value(&offer).unwrap();
        assert_eq!(back["changeAddress"], "tb1q8smyuku8zzmmrm2r5tfhy38vl3r4anezy6ftse");
    }

    #[test]
    fn test_received_offer_validation() {
        let offer = sample_offer();
        offer.validate(None).unwrap();

        let declared = Outcome::declare(["Republican_win", "Democrats_win", "other", "draw"]).unwrap();
        assert!(matches!(
            offer.validate(Some(&declared)).unwrap_err(),
            DlcError::IncompleteCurve { .. }
        ));

        let mut duplicated = offer.clone();
        duplicated.contract_info.push(ContractInfo {
            outcome: Outcome::new("OTHER").unwrap(),
            payout: Amount::ZERO,
        });
        assert!(matches!(
            duplicated.validate(None).unwrap_err(),
            DlcError::DuplicateOutcome { .. }
        ));

        let mut empty = offer;
        empty.contract_info.clear();
        assert!(empty.validate(None).is_err());
    }

    #[test]
    fn test_timeouts_must_be_ordered() {
        assert!(Timeouts::new(100, 100).is_err());
        assert!(Timeouts::new(100, 101).is_ok());
    }

    #[test]
    fn test_signature_points_follow_contract_order() {
        let secp = Secp256k1::verification_only();
        let offer = sample_offer();
        let points = offer.signature_points(&secp).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[1].0.label(), "Democrats_win");
        assert_eq!(
            points[1].1,
            offer.oracle_info.signature_point(&secp, &points[1].0.digest()).unwrap()
        );
    }

    #[test]
    fn test_tagged_envelope() {
        let message = DlcMessage::Offer(sample_offer());
        let json = message.to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "offer");
        assert_eq!(DlcMessage::from_json(&json).unwrap(), message);

        assert_eq!(DlcMessage::parse_offer(&json).unwrap(), sample_offer());
        let bare = serde_json::to_string(&sample_offer()).unwrap();
        assert_eq!(DlcMessage::parse_offer(&bare).unwrap(), sample_offer());

        let commitment = DlcMessage::OracleCommitment(OracleCommitment::parse(ORACLE_INFO).unwrap());
        let json = commitment.to_json_pretty().unwrap();
        assert!(DlcMessage::parse_offer(&json).is_err());
    }
}
