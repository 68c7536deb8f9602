//! # Secret Scalars
//!
//! Owned secp256k1 secrets that are overwritten when they go out of scope.
//! Private keys, nonce secrets and the intermediate `e·x` product of signing
//! all live in a [`KeyMaterial`].

use bitcoin::secp256k1::{Parity, SecretKey};
use std::fmt;
use std::ops::Deref;

/// Secret key erased when dropped.
pub struct KeyMaterial(SecretKey);

impl KeyMaterial {
    pub fn new(secret: SecretKey) -> Self {
        Self(secret)
    }

    /// The secret whose public point has even y.
    pub fn even_y(secret: &SecretKey, parity: Parity) -> Self {
        match parity {
            Parity::Odd => Self(secret.negate()),
            Parity::Even => Self(*secret),
        }
    }

    /// Overwrite the secret in place.
    pub fn erase(&mut self) {
        self.0.non_secure_erase();
    }
}

impl Deref for KeyMaterial {
    type Target = SecretKey;

    fn deref(&self) -> &SecretKey {
        &self.0
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.erase();
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::Secp256k1;

    #[test]
    fn test_erase_overwrites_secret() {
        let secret = SecretKey::from_slice(&[0x42; 32]).unwrap();
        let mut key = KeyMaterial::new(secret);
        assert_eq!(*key, secret);

        key.erase();
        assert_ne!(key.secret_bytes(), secret.secret_bytes());
    }

    #[test]
    fn test_even_y_negates_odd_points() {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x07; 32]).unwrap();
        let (_, parity) = secret.x_only_public_key(&secp);

        let even = KeyMaterial::even_y(&secret, parity);
        assert_eq!(even.public_key(&secp).x_only_public_key().1, Parity::Even);
        assert_eq!(even.x_only_public_key(&secp).0, secret.x_only_public_key(&secp).0);
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = KeyMaterial::new(SecretKey::from_slice(&[0x42; 32]).unwrap());
        assert_eq!(format!("{:?}", key), "KeyMaterial(<redacted>)");
    }
}
