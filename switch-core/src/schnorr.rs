//! Deterministic Schnorr signatures (BIP340-style, x-only public keys)
//! over secp256k1, used to sign heartbeats, releases, and cancellations.
//!
//! Nonce generation is deterministic: the nonce is a keyed hash of the
//! private key and the message (with a small amount of auxiliary data
//! folded in per BIP340, itself derived deterministically rather than
//! sampled fresh). An earlier prototype of this layer generated nonces
//! randomly per signature; that construction is rejected here per
//! `DESIGN.md` - random nonce reuse across two signatures with the same
//! key recovers the private key outright, so determinism is a hard
//! requirement, not a style choice.
//!
//! Verification never panics on malformed input: a public key or
//! signature that fails to parse is treated as a failed verification, not
//! a thrown error.

use k256::schnorr::{
    Signature, SigningKey, VerifyingKey,
    signature::{Signer, Verifier},
};
use rand_core::{CryptoRng, RngCore};
use thiserror::Error;
use zeroize::ZeroizeOnDrop;

/// Errors raised by the signature layer.
#[derive(Debug, Error)]
pub enum SchnorrError {
    /// The provided scalar is not a valid private key (zero, or `>= n`).
    #[error("private key is not in [1, n-1]")]
    InvalidPrivateKey,
    /// A public key failed to parse as a valid x-only curve point.
    #[error("malformed public key")]
    MalformedPublicKey,
}

/// A signing key, zeroized on drop. Not `Clone`/`Debug` by design: the
/// owner's long-lived signing key should be loaded once, used, and
/// dropped, never duplicated into a log line or a second in-memory copy.
#[derive(ZeroizeOnDrop)]
pub struct PrivateKey(#[zeroize(skip)] SigningKey);

/// An x-only public key, safe to copy, log, and publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PublicKey(#[serde(with = "public_key_bytes")] [u8; 32]);

mod public_key_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        hex::encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32-byte x-only public key"))
    }
}

impl PrivateKey {
    /// Generates a fresh random signing key.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self(SigningKey::random(rng))
    }

    /// Loads a signing key from a 32-byte scalar. Fails with
    /// [`SchnorrError::InvalidPrivateKey`] if the scalar is zero or does
    /// not reduce to a valid element of `[1, n-1]`.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SchnorrError> {
        SigningKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| SchnorrError::InvalidPrivateKey)
    }

    /// The corresponding x-only public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes().into())
    }

    /// Signs `message` with a nonce deterministically derived from this
    /// key and `message`. Two calls with identical inputs always produce
    /// the identical signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        let sig: Signature = self.0.sign(message);
        sig.to_bytes()
    }
}

impl PublicKey {
    /// Parses an x-only public key from its 32-byte representation.
    /// Returns `None` on malformed input rather than erroring, matching
    /// the "verification never throws" contract - a caller with an
    /// untrusted public key simply treats parse failure as "does not
    /// verify".
    pub fn from_bytes(bytes: [u8; 32]) -> Option<Self> {
        VerifyingKey::from_bytes(&bytes).ok()?;
        Some(Self(bytes))
    }

    /// Raw 32-byte x-only representation.
    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Verifies `signature` over `message`. Returns `false` for any
    /// failure: bad signature, wrong message, or malformed signature bytes.
    /// Never panics.
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let Ok(vk) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let Ok(sig) = Signature::try_from(signature.as_slice()) else {
            return false;
        };
        vk.verify(message, &sig).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn sign_verify_roundtrip() {
        let sk = PrivateKey::generate(&mut StdRng::seed_from_u64(1));
        let pk = sk.public_key();
        let sig = sk.sign(b"heartbeat at t=100");
        assert!(pk.verify(b"heartbeat at t=100", &sig));
    }

    #[test]
    fn signature_is_deterministic() {
        let sk = PrivateKey::generate(&mut StdRng::seed_from_u64(1));
        let a = sk.sign(b"msg");
        let b = sk.sign(b"msg");
        assert_eq!(a, b, "identical inputs must yield identical signatures");
    }

    #[test]
    fn wrong_message_fails() {
        let sk = PrivateKey::generate(&mut StdRng::seed_from_u64(1));
        let pk = sk.public_key();
        let sig = sk.sign(b"msg-a");
        assert!(!pk.verify(b"msg-b", &sig));
    }

    #[test]
    fn tampered_signature_fails() {
        let sk = PrivateKey::generate(&mut StdRng::seed_from_u64(1));
        let pk = sk.public_key();
        let mut sig = sk.sign(b"msg");
        sig[0] ^= 1;
        assert!(!pk.verify(b"msg", &sig));
    }

    #[test]
    fn malformed_public_key_does_not_panic() {
        // all-zero bytes are not a valid x-only point
        assert!(PublicKey::from_bytes([0u8; 32]).is_none());
    }

    #[test]
    fn zero_private_key_rejected() {
        assert!(PrivateKey::from_bytes(&[0u8; 32]).is_err());
    }
}
