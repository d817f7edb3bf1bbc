//! Anonymous sealed-box encryption to a recipient's long-term public key.
//!
//! Used wherever the protocol needs to hand a piece of secret material (a
//! share, a released share) to a specific party without a prior session:
//! enrollment seals each watcher's share to that watcher's public key, and
//! release seals each watcher's share to every recipient's public key.
//!
//! Construction: an ephemeral X25519 keypair is generated per call,
//! Diffie-Hellman'd against the recipient's static public key, and the
//! resulting shared secret is run through HKDF-SHA256 (bound to both
//! public keys as context) to produce a one-time ChaCha20-Poly1305 key.
//! Because that key is used for exactly one message, the nonce is fixed at
//! all-zero rather than randomly sampled - reusing a nonce only matters
//! when a key is reused, and this key never is. This is the same shape as
//! libsodium's `crypto_box_seal` and the same Diffie-Hellman-then-symmetric
//! pattern the wider secret-sharing code in this workspace already used
//! for per-node share distribution, swapped to production-grade primitives.
//!
//! The sender does not need (and this module does not expose) a way to
//! prove who sent a sealed box; that is intentional - only the recipient's
//! identity matters for this protocol's confidentiality goal.

use hkdf::Hkdf;
use rand_core::{CryptoRng, RngCore};
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::aead;

const SEALED_BOX_DOMAIN: &[u8] = b"echolock-SEALED-BOX-v1";
const ZERO_NONCE: [u8; 12] = [0u8; 12];

/// Errors raised when unsealing a box.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SealedBoxError {
    /// Input too short to contain an ephemeral public key and a tag.
    #[error("malformed sealed box")]
    Malformed,
    /// AEAD tag failed to verify; no plaintext is returned.
    #[error("sealed box authentication failed")]
    AuthenticationFailed,
}

/// A recipient's long-term X25519 keypair.
#[derive(ZeroizeOnDrop)]
pub struct RecipientKeyPair {
    #[zeroize(skip)]
    public: PublicKey,
    secret: StaticSecret,
}

impl RecipientKeyPair {
    /// Generates a fresh recipient keypair.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let secret = StaticSecret::random_from_rng(rng);
        let public = PublicKey::from(&secret);
        Self { public, secret }
    }

    /// Builds a keypair from an existing 32-byte scalar, e.g. one loaded
    /// from configuration rather than freshly generated. Every bit
    /// pattern is accepted: X25519 clamps the scalar internally, so
    /// there is no invalid input to reject.
    pub fn from_scalar(scalar: [u8; 32]) -> Self {
        let secret = StaticSecret::from(scalar);
        let public = PublicKey::from(&secret);
        Self { public, secret }
    }

    /// The public half, safe to publish and seal to.
    pub fn public_key(&self) -> [u8; 32] {
        self.public.to_bytes()
    }
}

/// Seals `plaintext` so only the holder of the private half of
/// `recipient_public` can recover it.
pub fn seal(
    recipient_public: &[u8; 32],
    plaintext: &[u8],
    rng: &mut (impl RngCore + CryptoRng),
) -> Vec<u8> {
    let recipient_public = PublicKey::from(*recipient_public);
    let ephemeral_secret = EphemeralSecret::random_from_rng(&mut *rng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(&recipient_public);

    let key = derive_box_key(shared.as_bytes(), ephemeral_public.as_bytes(), recipient_public.as_bytes());
    let sealed = seal_with_key(&key, plaintext);

    let mut out = Vec::with_capacity(32 + sealed.as_bytes().len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(sealed.as_bytes());
    out
}

/// Opens a box produced by [`seal`] using the recipient's keypair.
pub fn open(recipient: &RecipientKeyPair, sealed_box: &[u8]) -> Result<Vec<u8>, SealedBoxError> {
    if sealed_box.len() < 32 {
        return Err(SealedBoxError::Malformed);
    }
    let (ephemeral_public_bytes, rest) = sealed_box.split_at(32);
    let ephemeral_public = PublicKey::from(<[u8; 32]>::try_from(ephemeral_public_bytes).unwrap());
    let shared = recipient.secret.diffie_hellman(&ephemeral_public);

    let key = derive_box_key(
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        recipient.public.as_bytes(),
    );
    let sealed = aead::Sealed::from_bytes(rest.to_vec());
    aead::decrypt(&key, &[], &sealed).map_err(|_| SealedBoxError::AuthenticationFailed)
}

fn derive_box_key(shared_secret: &[u8], ephemeral_public: &[u8], recipient_public: &[u8]) -> [u8; 32] {
    let mut info = Vec::with_capacity(SEALED_BOX_DOMAIN.len() + 64);
    info.extend_from_slice(SEALED_BOX_DOMAIN);
    info.extend_from_slice(ephemeral_public);
    info.extend_from_slice(recipient_public);
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = [0u8; 32];
    hk.expand(&info, &mut key)
        .expect("32 bytes is within HKDF-SHA256's output limit");
    key
}

fn seal_with_key(key: &[u8; 32], plaintext: &[u8]) -> aead::Sealed {
    // The box key above is one-time by construction (fresh ephemeral
    // secret per call), so a fixed nonce does not violate the AEAD
    // layer's "never reuse a nonce under one key" contract.
    use chacha20poly1305::{AeadInPlace, ChaCha20Poly1305, KeyInit, aead::generic_array::GenericArray};
    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(key));
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&ZERO_NONCE), &[], &mut buffer)
        .expect("ChaCha20Poly1305 encryption with a valid nonce cannot fail");
    let mut out = Vec::with_capacity(12 + buffer.len() + 16);
    out.extend_from_slice(&ZERO_NONCE);
    out.extend_from_slice(&buffer);
    out.extend_from_slice(&tag);
    aead::Sealed::from_bytes(out)
}
