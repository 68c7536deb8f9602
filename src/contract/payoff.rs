//! # Payoff Curves
//!
//! Ordered mapping from declared outcomes to settlement amounts. Entry order
//! is kept for settlement transaction construction but has no bearing on
//! validation. Amounts are whole satoshis; BTC inputs with more than eight
//! decimals are rejected rather than rounded.

use crate::error::{DlcError, DlcResult};
use crate::oracle::Outcome;
use bitcoin::amount::Denomination;
use bitcoin::{Amount, SignedAmount};
use serde::{Deserialize, Serialize};

/// One outcome's settlement amount as entered, possibly negative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayoffEntry {
    pub outcome: Outcome,
    pub payout: SignedAmount,
}

impl PayoffEntry {
    /// Parse `label:payout` where payout is `<n>sats` or a BTC decimal.
    ///
    /// The last `:` separates the payout so labels may contain colons.
    pub fn parse(input: &str) -> DlcResult<Self> {
        let (label, payout) = input.rsplit_once(':').ok_or_else(|| DlcError::InvalidPayout {
            input: input.to_string(),
            reason: "expected 'outcome:payout'".to_string(),
        })?;
        Ok(Self {
            outcome: Outcome::new(label)?,
            payout: parse_payout(payout)?,
        })
    }
}

/// Parse `10000sats`, `-5sats` or `0.2` (BTC).
pub fn parse_payout(input: &str) -> DlcResult<SignedAmount> {
    let trimmed = input.trim();
    let invalid = |reason: String| DlcError::InvalidPayout {
        input: input.to_string(),
        reason,
    };

    let lower = trimmed.to_lowercase();
    if let Some(sats) = lower.strip_suffix("sats").or_else(|| lower.strip_suffix("sat")) {
        let sats: i64 = sats.trim().parse().map_err(|e| invalid(format!("{}", e)))?;
        return Ok(SignedAmount::from_sat(sats));
    }
    SignedAmount::from_str_in(trimmed, Denomination::Bitcoin).map_err(|e| invalid(e.to_string()))
}

/// Validated payoff for one outcome, as carried in offers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInfo {
    pub outcome: Outcome,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub payout: Amount,
}

/// Ordered payoff entries for a contract.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PayoffCurve {
    entries: Vec<PayoffEntry>,
}

impl PayoffCurve {
    /// Parse a list of `label:payout` strings.
    pub fn parse<I, S>(inputs: I) -> DlcResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = inputs
            .into_iter()
            .map(|s| PayoffEntry::parse(s.as_ref()))
            .collect::<DlcResult<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PayoffEntry] {
        &self.entries
    }

    /// Outcomes in entry order
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.entries.iter().map(|e| e.outcome.clone()).collect()
    }

    /// Check the curve against the declared outcome set.
    ///
    /// Per entry, in order: negative payout, duplicate outcome, undeclared
    /// outcome. Then every declared outcome must have been covered.
    pub fn validate(&self, declared: &[Outcome]) -> DlcResult<()> {
        let mut seen: Vec<&Outcome> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if entry.payout.is_negative() {
                return Err(DlcError::NegativePayout {
                    outcome: entry.outcome.label().to_string(),
                    payout: entry.payout.to_sat(),
                });
            }
            if seen.contains(&&entry.outcome) {
                return Err(DlcError::DuplicateOutcome {
                    outcome: entry.outcome.label().to_string(),
                });
            }
            Outcome::resolve(declared, entry.outcome.label())?;
            seen.push(&entry.outcome);
        }

        let missing: Vec<String> = declared
            .iter()
            .filter(|d| !seen.contains(d))
            .map(|d| d.label().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DlcError::IncompleteCurve { missing });
        }
        Ok(())
    }

    /// Payout for a caller-supplied outcome label.
    pub fn lookup(&self, outcome: &str) -> DlcResult<Amount> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.outcome.matches(outcome))
            .ok_or_else(|| DlcError::OutcomeNotFound {
                outcome: outcome.trim().to_string(),
            })?;
        entry.payout.to_unsigned().map_err(|_| DlcError::NegativePayout {
            outcome: entry.outcome.label().to_string(),
            payout: entry.payout.to_sat(),
        })
    }

    /// Validate, then emit contract info using the declared label casing.
    pub fn to_contract_info(&self, declared: &[Outcome]) -> DlcResult<Vec<ContractInfo>> {
        self.validate(declared)?;
        self.entries
            .iter()
            .map(|entry| {
                let outcome = Outcome::resolve(declared, entry.outcome.label())?.clone();
                let payout = entry.payout.to_unsigned().map_err(|_| DlcError::NegativePayout {
                    outcome: outcome.label().to_string(),
                    payout: entry.payout.to_sat(),
                })?;
                Ok(ContractInfo { outcome, payout })
            })
            .collect()
    }

    /// Rebuild a curve from contract info carried in an offer.
    pub fn from_contract_info(info: &[ContractInfo]) -> DlcResult<Self> {
        let entries = info
            .iter()
            .map(|ci| {
                let payout = ci.payout.to_signed().map_err(|e| DlcError::InvalidPayout {
                    input: ci.payout.to_sat().to_string(),
                    reason: e.to_string(),
                })?;
                Ok(PayoffEntry {
                    outcome: ci.outcome.clone(),
                    payout,
                })
            })
            .collect::<DlcResult<Vec<_>>>()?;
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared() -> Vec<Outcome> {
        Outcome::declare(["Republican_win", "Democrats_win", "other"]).unwrap()
    }

    #[test]
    fn test_parse_payouts() {
        assert_eq!(parse_payout("10000sats").unwrap(), SignedAmount::from_sat(10_000));
        assert_eq!(parse_payout("0").unwrap(), SignedAmount::ZERO);
        assert_eq!(parse_payout("0.2").unwrap(), SignedAmount::from_sat(20_000_000));
        assert_eq!(parse_payout("-5sats").unwrap(), SignedAmount::from_sat(-5));
        assert!(parse_payout("0.000000001").is_err());
        assert!(parse_payout("lots").is_err());
    }

    #[test]
    fn test_parse_entry_keeps_colons_in_label() {
        let entry = PayoffEntry::parse("score:2:1:500sats").unwrap();
        assert_eq!(entry.outcome.label(), "score:2:1");
        assert_eq!(entry.payout, SignedAmount::from_sat(500));
        assert!(PayoffEntry::parse("no-payout").is_err());
    }

    #[test]
    fn test_complete_curve_validates() {
        let curve = PayoffCurve::parse(["Republican_win:10000sats", "Democrats_win:0", "other:0.2"]).unwrap();
        curve.validate(&declared()).unwrap();
        assert_eq!(curve.lookup("OTHER").unwrap(), Amount::from_sat(20_000_000));
        assert_eq!(curve.lookup("Republican_win").unwrap(), Amount::from_sat(10_000));
    }

    #[test]
    fn test_missing_outcome_is_incomplete() {
        let curve = PayoffCurve::parse(["Republican_win:10000sats", "other:0"]).unwrap();
        let err = curve.validate(&declared()).unwrap_err();
        assert!(matches!(err, DlcError::IncompleteCurve { ref missing } if missing == &["Democrats_win"]));
    }

    #[test]
    fn test_negative_payout_rejected() {
        let curve = PayoffCurve::parse(["Republican_win:-1sats", "Democrats_win:0", "other:0"]).unwrap();
        let err = curve.validate(&declared()).unwrap_err();
        assert!(matches!(err, DlcError::NegativePayout { payout: -1, .. }));
    }

    #[test]
    fn test_duplicate_and_unknown_outcomes_rejected() {
        let curve = PayoffCurve::parse(["other:0", "OTHER:1sats", "Republican_win:0", "Democrats_win:0"]).unwrap();
        assert!(matches!(curve.validate(&declared()).unwrap_err(), DlcError::DuplicateOutcome { .. }));

        let curve = PayoffCurve::parse(["Republican_win:0", "Democrats_win:0", "other:0", "draw:0"]).unwrap();
        assert!(matches!(curve.validate(&declared()).unwrap_err(), DlcError::OutcomeNotFound { .. }));
    }

    #[test]
    fn test_lookup_missing_outcome() {
        let curve = PayoffCurve::parse(["win:1sats"]).unwrap();
        assert!(matches!(curve.lookup("lose").unwrap_err(), DlcError::OutcomeNotFound { .. }));
    }

    #[test]
    fn test_contract_info_uses_declared_casing_and_order() {
        let curve = PayoffCurve::parse(["other:0.2", "democrats_win:0", "REPUBLICAN_WIN:10000sats"]).unwrap();
        let info = curve.to_contract_info(&declared()).unwrap();
        let labels: Vec<&str> = info.iter().map(|ci| ci.outcome.label()).collect();
        assert_eq!(labels, vec!["other", "Democrats_win", "Republican_win"]);
        assert_eq!(info[0].payout, Amount::from_sat(20_000_000));

        let rebuilt = PayoffCurve::from_contract_info(&info).unwrap();
        rebuilt.validate(&declared()).unwrap();
    }

    #[test]
    fn test_contract_info_json_shape() {
        let info = ContractInfo {
            outcome: Outcome::new("win").unwrap(),
            payout: Amount::from_sat(10_000),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "win", "payout": 10000}));
    }
}
