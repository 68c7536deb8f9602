//! # Attestation Signing and Verification
//!
//! The oracle attests an outcome by revealing `s = k + e·x (mod n)`, where
//! `k` is the secret behind the committed nonce, `x` is its long-term key and
//! `e` the BIP-340 challenge over the outcome digest. Together with the
//! committed nonce, `R.x || s` is an ordinary BIP-340 signature.
//!
//! ## Nonce Reuse
//!
//! Two attestations `s1`, `s2` for different outcomes under the same nonce
//! give `x = (s1 - s2) / (e1 - e2)`. Signing is therefore a one-shot
//! operation per event; the repository enforces it across calls.

use crate::error::{DlcError, DlcResult};
use crate::oracle::commitment::OracleCommitment;
use crate::oracle::outcome::{Outcome, OutcomeDigest};
use crate::oracle::secret::KeyMaterial;
use crate::utils::hex_bytes;
use bitcoin::secp256k1::{schnorr, PublicKey, Scalar, Secp256k1, SecretKey, Signing, Verification};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of one recorded event's nonce
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttestationState {
    /// Commitment published, nothing attested
    NoncePublished,
    /// Terminal: at least one outcome attested
    Attested(Vec<Outcome>),
}

/// The 32-byte scalar an oracle reveals for one outcome.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attestation([u8; 32]);

impl Attestation {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Parse the 64-hex-character wire form.
    pub fn parse(input: &str) -> DlcResult<Self> {
        let bytes = hex_bytes::decode_array::<32>(input, "attestation")
            .map_err(|reason| DlcError::MalformedAttestation { reason })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Complete BIP-340 signature `R.x || s` for the committed nonce.
    pub fn to_schnorr_signature(&self, commitment: &OracleCommitment) -> DlcResult<schnorr::Signature> {
        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&commitment.nonce().serialize());
        sig[32..].copy_from_slice(&self.0);
        Ok(schnorr::Signature::from_slice(&sig)?)
    }
}

impl fmt::Debug for Attestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attestation({})", self.to_hex())
    }
}

impl fmt::Display for Attestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Attestation {
    type Err = DlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Attestation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Attestation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Attestation::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Sign `digest` with the private key and the already committed nonce secret.
///
/// The nonce secret is used as given. Both secrets are negated when needed so
/// that their public points have even y, as BIP-340 requires. Every secret
/// intermediate is erased before returning.
pub fn sign<C: Signing>(
    secp: &Secp256k1<C>,
    private_key: &SecretKey,
    nonce_secret: &SecretKey,
    digest: &OutcomeDigest,
) -> DlcResult<Attestation> {
    let (pubkey, pubkey_parity) = private_key.x_only_public_key(secp);
    let (nonce, nonce_parity) = nonce_secret.x_only_public_key(secp);
    let commitment = OracleCommitment::new(pubkey, nonce);

    let x = KeyMaterial::even_y(private_key, pubkey_parity);
    let k = KeyMaterial::even_y(nonce_secret, nonce_parity);
    let e = commitment.challenge(digest);

    log::debug!(
        "Signing digest {} against nonce {}",
        digest,
        hex::encode(nonce.serialize())
    );

    let e_x = KeyMaterial::new(
        x.mul_tweak(&e)
            .map_err(|e| DlcError::verification(format!("challenge tweak failed: {}", e)))?,
    );
    let s = e_x
        .add_tweak(&Scalar::from(*k))
        .map_err(|e| DlcError::verification(format!("attestation scalar is zero: {}", e)))?;

    Ok(Attestation(s.secret_bytes()))
}

/// Sign after checking the secrets are the ones behind `commitment`.
pub fn sign_committed<C: Signing>(
    secp: &Secp256k1<C>,
    commitment: &OracleCommitment,
    private_key: &SecretKey,
    nonce_secret: &SecretKey,
    digest: &OutcomeDigest,
) -> DlcResult<Attestation> {
    if private_key.x_only_public_key(secp).0 != commitment.pubkey() {
        return Err(DlcError::key_mismatch(
            "private key does not match the committed oracle public key",
        ));
    }
    if nonce_secret.x_only_public_key(secp).0 != commitment.nonce() {
        return Err(DlcError::key_mismatch(
            "nonce secret does not match the committed nonce",
        ));
    }
    sign(secp, private_key, nonce_secret, digest)
}

/// Check `s·G == R + e·P` for the committed key and nonce.
pub fn verify<C: Signing + Verification>(
    secp: &Secp256k1<C>,
    commitment: &OracleCommitment,
    digest: &OutcomeDigest,
    attestation: &Attestation,
) -> bool {
    let s = match SecretKey::from_slice(&attestation.0) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let expected = match commitment.signature_point(secp, digest) {
        Ok(point) => point,
        Err(_) => return false,
    };
    PublicKey::from_secret_key(secp, &s) == expected
}

/// Find which declared outcome an attestation is for.
pub fn identify<'a, C: Signing + Verification>(
    secp: &Secp256k1<C>,
    commitment: &OracleCommitment,
    outcomes: &'a [Outcome],
    attestation: &Attestation,
) -> DlcResult<&'a Outcome> {
    outcomes
        .iter()
        .find(|o| verify(secp, commitment, &o.digest(), attestation))
        .ok_or_else(|| {
            DlcError::verification("attestation does not match any declared outcome")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::outcome::digest;
    use bitcoin::secp256k1::Message;

    fn keys() -> (SecretKey, SecretKey) {
        (
            SecretKey::from_slice(&[0x42; 32]).unwrap(),
            SecretKey::from_slice(&[0x07; 32]).unwrap(),
        )
    }

    #[test]
    fn test_sign_then_verify() {
        let secp = Secp256k1::new();
        let (x, k) = keys();
        let commitment = OracleCommitment::new(x.x_only_public_key(&secp).0, k.x_only_public_key(&secp).0);

        for label in ["win", "lose", "draw", "Republican_win"] {
            let d = digest(label);
            let attestation = sign(&secp, &x, &k, &d).unwrap();
            assert!(verify(&secp, &commitment, &d, &attestation), "{}", label);
        }
    }

    #[test]
    fn test_attestation_is_bip340_signature() {
        let secp = Secp256k1::new();
        let (x, k) = keys();
        let commitment = OracleCommitment::new(x.x_only_public_key(&secp).0, k.x_only_public_key(&secp).0);
        let d = digest("win");
        let attestation = sign(&secp, &x, &k, &d).unwrap();

        let sig = attestation.to_schnorr_signature(&commitment).unwrap();
        let msg = Message::from_digest(d.to_byte_array());
        assert!(secp.verify_schnorr(&sig, &msg, &commitment.pubkey()).is_ok());
    }

    #[test]
    fn test_verify_rejects_other_outcome_and_garbage() {
        let secp = Secp256k1::new();
        let (x, k) = keys();
        let commitment = OracleCommitment::new(x.x_only_public_key(&secp).0, k.x_only_public_key(&secp).0);
        let attestation = sign(&secp, &x, &k, &digest("win")).unwrap();

        assert!(!verify(&secp, &commitment, &digest("lose"), &attestation));
        assert!(!verify(&secp, &commitment, &digest("win"), &Attestation::from_bytes([0u8; 32])));
        assert!(!verify(&secp, &commitment, &digest("win"), &Attestation::from_bytes([0xff; 32])));
    }

    #[test]
    fn test_signing_is_deterministic() {
        let secp = Secp256k1::new();
        let (x, k) = keys();
        let d = digest("win");
        assert_eq!(sign(&secp, &x, &k, &d).unwrap(), sign(&secp, &x, &k, &d).unwrap());
    }

    #[test]
    fn test_sign_committed_rejects_foreign_nonce() {
        let secp = Secp256k1::new();
        let (x, k) = keys();
        let commitment = OracleCommitment::new(x.x_only_public_key(&secp).0, k.x_only_public_key(&secp).0);
        let other = SecretKey::from_slice(&[0x09; 32]).unwrap();

        let err = sign_committed(&secp, &commitment, &x, &other, &digest("win")).unwrap_err();
        assert!(matches!(err, DlcError::KeyMismatch { .. }));
        let err = sign_committed(&secp, &commitment, &other, &k, &digest("win")).unwrap_err();
        assert!(matches!(err, DlcError::KeyMismatch { .. }));
        assert!(sign_committed(&secp, &commitment, &x, &k, &digest("win")).is_ok());
    }

    #[test]
    fn test_identify_outcome() {
        let secp = Secp256k1::new();
        let (x, k) = keys();
        let commitment = OracleCommitment::new(x.x_only_public_key(&secp).0, k.x_only_public_key(&secp).0);
        let outcomes = Outcome::declare(["win", "lose"]).unwrap();
        let attestation = sign(&secp, &x, &k, &outcomes[1].digest()).unwrap();

        let found = identify(&secp, &commitment, &outcomes, &attestation).unwrap();
        assert_eq!(found.label(), "lose");

        let bogus = Attestation::from_bytes([0x01; 32]);
        let err = identify(&secp, &commitment, &outcomes, &bogus).unwrap_err();
        assert!(matches!(err, DlcError::VerificationFailure { .. }));
    }

    #[test]
    fn test_wire_form() {
        let attestation = Attestation::from_bytes([0xab; 32]);
        let hex = attestation.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Attestation::parse(&hex).unwrap(), attestation);
        assert!(matches!(
            Attestation::parse("abcd").unwrap_err(),
            DlcError::MalformedAttestation { .. }
        ));
    }
}
