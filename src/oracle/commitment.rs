//! # Oracle Commitments
//!
//! An oracle commits to an event by publishing its x-only public key and a
//! one-time x-only nonce point. The 64-byte wire form is `pubkey || nonce`,
//! hex-encoded for textual transport, with no version byte or length prefix.
//!
//! From the commitment and an outcome digest anyone can compute the
//! *signature point* `S = R + e·P`, where `e` is the BIP-340 challenge
//! `H(R.x || P.x || digest)`. A valid attestation `s` for that outcome
//! satisfies `s·G = S`, which lets counterparties build adaptor signatures
//! before the oracle attests.

use crate::config::tags;
use crate::error::{DlcError, DlcResult};
use crate::oracle::outcome::{tagged_hash, OutcomeDigest};
use crate::utils::hex_bytes;
use bitcoin::secp256k1::{
    constants::CURVE_ORDER, Parity, PublicKey, Scalar, Secp256k1, Verification, XOnlyPublicKey,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of the commitment wire form in bytes
pub const COMMITMENT_LEN: usize = 64;

/// An oracle's one-time public promise for one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OracleCommitment {
    pubkey: XOnlyPublicKey,
    nonce: XOnlyPublicKey,
}

impl OracleCommitment {
    pub fn new(pubkey: XOnlyPublicKey, nonce: XOnlyPublicKey) -> Self {
        Self { pubkey, nonce }
    }

    /// Parse the hex wire form.
    ///
    /// Fails with `MalformedCommitment` unless the input is exactly 64 bytes
    /// whose halves are both valid x-only points.
    pub fn parse(input: &str) -> DlcResult<Self> {
        let bytes: [u8; COMMITMENT_LEN] =
            hex_bytes::decode_array(input, "oracle commitment").map_err(DlcError::malformed_commitment)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8; COMMITMENT_LEN]) -> DlcResult<Self> {
        let pubkey = XOnlyPublicKey::from_slice(&bytes[..32])
            .map_err(|e| DlcError::malformed_commitment(format!("invalid oracle public key: {}", e)))?;
        let nonce = XOnlyPublicKey::from_slice(&bytes[32..])
            .map_err(|e| DlcError::malformed_commitment(format!("invalid nonce: {}", e)))?;
        Ok(Self { pubkey, nonce })
    }

    /// Build a commitment from separately transported key and nonce.
    pub fn from_parts(pubkey_hex: &str, nonce_hex: &str) -> DlcResult<Self> {
        Self::parse(&format!("{}{}", pubkey_hex.trim(), nonce_hex.trim()))
    }

    pub fn to_bytes(&self) -> [u8; COMMITMENT_LEN] {
        let mut out = [0u8; COMMITMENT_LEN];
        out[..32].copy_from_slice(&self.pubkey.serialize());
        out[32..].copy_from_slice(&self.nonce.serialize());
        out
    }

    /// Lowercase hex wire form, inverse of [`OracleCommitment::parse`].
    pub fn serialize(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn pubkey(&self) -> XOnlyPublicKey {
        self.pubkey
    }

    pub fn nonce(&self) -> XOnlyPublicKey {
        self.nonce
    }

    /// BIP-340 challenge `e = H(R.x || P.x || digest) mod n`.
    pub fn challenge(&self, digest: &OutcomeDigest) -> Scalar {
        let mut data = [0u8; 96];
        data[..32].copy_from_slice(&self.nonce.serialize());
        data[32..64].copy_from_slice(&self.pubkey.serialize());
        data[64..].copy_from_slice(digest.as_bytes());
        reduce_mod_order(tagged_hash(tags::CHALLENGE, &data))
    }

    /// Compute `S = R + e·P` with the even-y lifts of `R` and `P`.
    pub fn signature_point<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        digest: &OutcomeDigest,
    ) -> DlcResult<PublicKey> {
        let e = self.challenge(digest);
        let r = PublicKey::from_x_only_public_key(self.nonce, Parity::Even);
        let p = PublicKey::from_x_only_public_key(self.pubkey, Parity::Even);

        let e_p = p
            .mul_tweak(secp, &e)
            .map_err(|e| DlcError::verification(format!("challenge tweak failed: {}", e)))?;
        r.combine(&e_p)
            .map_err(|e| DlcError::verification(format!("signature point at infinity: {}", e)))
    }
}

/// Reduce a 256-bit big-endian integer modulo the group order.
///
/// Inputs are below `2^256 < 2n`, so at most one subtraction is needed.
pub(crate) fn reduce_mod_order(bytes: [u8; 32]) -> Scalar {
    if let Ok(scalar) = Scalar::from_be_bytes(bytes) {
        return scalar;
    }
    let mut out = [0u8; 32];
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let mut diff = bytes[i] as i16 - CURVE_ORDER[i] as i16 - borrow;
        if diff < 0 {
            diff += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out[i] = diff as u8;
    }
    // out < n holds here, so the conversion cannot fail; fall back to zero regardless.
    Scalar::from_be_bytes(out).unwrap_or(Scalar::ZERO)
}

impl fmt::Display for OracleCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for OracleCommitment {
    type Err = DlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for OracleCommitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&OracleCommitment::serialize(self))
    }
}

impl<'de> Deserialize<'de> for OracleCommitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        OracleCommitment::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::outcome::digest;
    use bitcoin::secp256k1::SecretKey;

    const PUBKEY: &str = "57caa081b0a0e9e9413cf4fb72ddc2630d609bdf6a912b98c4cfd358a4ce1496";
    const NONCE: &str = "92ba989222e76cf0cb263fedd67587812110bde1dc1468bef63c8f6974692ea1";

    #[test]
    fn test_parse_serialize_roundtrip() {
        let hex = format!("{}{}", PUBKEY, NONCE);
        let commitment = OracleCommitment::parse(&hex).unwrap();
        assert_eq!(commitment.serialize(), hex);
        assert_eq!(OracleCommitment::parse(&commitment.serialize()).unwrap(), commitment);
        assert_eq!(commitment, OracleCommitment::from_parts(PUBKEY, NONCE).unwrap());
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let err = OracleCommitment::parse(PUBKEY).unwrap_err();
        assert!(matches!(err, DlcError::MalformedCommitment { .. }));

        let too_long = format!("{}{}00", PUBKEY, NONCE);
        assert!(OracleCommitment::parse(&too_long).is_err());
        assert!(OracleCommitment::parse("not hex").is_err());
    }

    #[test]
    fn test_parse_rejects_points_off_curve() {
        // x = 5 has no square root on secp256k1
        let off_curve = format!("{:064x}", 5);
        let err = OracleCommitment::parse(&format!("{}{}", off_curve, NONCE)).unwrap_err();
        assert!(err.to_string().contains("public key"));

        let err = OracleCommitment::parse(&format!("{}{}", PUBKEY, off_curve)).unwrap_err();
        assert!(err.to_string().contains("nonce"));

        // x >= field prime
        let ff = "ff".repeat(32);
        assert!(OracleCommitment::parse(&format!("{}{}", PUBKEY, ff)).is_err());
    }

    #[test]
    fn test_signature_point_is_deterministic_and_outcome_bound() {
        let secp = Secp256k1::verification_only();
        let commitment = OracleCommitment::from_parts(PUBKEY, NONCE).unwrap();
        let win = commitment.signature_point(&secp, &digest("win")).unwrap();
        assert_eq!(win, commitment.signature_point(&secp, &digest("win")).unwrap());
        assert_ne!(win, commitment.signature_point(&secp, &digest("lose")).unwrap());
    }

    #[test]
    fn test_signature_point_matches_discrete_log() {
        let secp = Secp256k1::new();
        let x = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let k = SecretKey::from_slice(&[0x22; 32]).unwrap();
        let (p, p_parity) = x.x_only_public_key(&secp);
        let (r, r_parity) = k.x_only_public_key(&secp);
        let commitment = OracleCommitment::new(p, r);

        let x = if p_parity == Parity::Odd { x.negate() } else { x };
        let k = if r_parity == Parity::Odd { k.negate() } else { k };
        let d = digest("win");
        let s = x
            .mul_tweak(&commitment.challenge(&d))
            .unwrap()
            .add_tweak(&Scalar::from(k))
            .unwrap();

        assert_eq!(
            PublicKey::from_secret_key(&secp, &s),
            commitment.signature_point(&secp, &d).unwrap()
        );
    }

    #[test]
    fn test_reduce_mod_order() {
        assert_eq!(reduce_mod_order([0u8; 32]), Scalar::ZERO);
        assert_eq!(reduce_mod_order(CURVE_ORDER), Scalar::ZERO);

        let mut n_plus_one = CURVE_ORDER;
        n_plus_one[31] += 1;
        assert_eq!(reduce_mod_order(n_plus_one), Scalar::ONE);

        let max = reduce_mod_order([0xff; 32]);
        assert!(Scalar::from_be_bytes(max.to_be_bytes()).is_ok());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let commitment = OracleCommitment::from_parts(PUBKEY, NONCE).unwrap();
        let json = serde_json::to_string(&commitment).unwrap();
        assert_eq!(json, format!("\"{}{}\"", PUBKEY, NONCE));
        let back: OracleCommitment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, commitment);
    }
}
