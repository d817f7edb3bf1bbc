//! ChaCha20-Poly1305 AEAD with strict single-use nonce discipline.
//!
//! A fresh 96-bit nonce is sampled for every encryption. We additionally
//! follow the key-hierarchy discipline described in `kdf`: every message
//! this layer encrypts uses a key derived specifically for that message
//! (the payload's own encryption key, a recipient-specific sealed-box key,
//! and so on), so nonce reuse under the same key is already astronomically
//! unlikely before the random sampling is even considered. Decryption
//! never returns plaintext on an authentication failure - callers that
//! pattern-match `Err(AeadError::AuthenticationFailed)` can rely on there
//! being no partially-trusted output to accidentally use.

use chacha20poly1305::{
    AeadCore, ChaCha20Poly1305, KeyInit,
    aead::{Aead, generic_array::GenericArray},
};
use rand::{CryptoRng, RngCore};
use thiserror::Error;

/// Length of the AEAD key in bytes (256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;
/// Length of the authentication tag in bytes (128 bits), included in the
/// ciphertext produced by this module's `encrypt`.
pub const TAG_LEN: usize = 16;

/// Errors raised by the AEAD layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AeadError {
    /// Decryption's tag check failed, or the sealed input was malformed
    /// (too short to contain a nonce and a tag). The plaintext is never
    /// returned in either case.
    #[error("AEAD authentication failed")]
    AuthenticationFailed,
}

/// A sealed message: `nonce || ciphertext || tag`, concatenated into one
/// field rather than stored as three separate columns.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct Sealed(Vec<u8>);

impl Sealed {
    /// Borrows the wire-format bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Wraps pre-existing wire-format bytes (e.g. read back from storage).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Encrypts `plaintext` under `key` with a freshly-sampled nonce and
/// `associated_data` bound into the tag. Returns the concatenated
/// `nonce || ciphertext || tag`.
pub fn encrypt(
    key: &[u8; KEY_LEN],
    associated_data: &[u8],
    plaintext: &[u8],
    rng: &mut (impl RngCore + CryptoRng),
) -> Sealed {
    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(key));
    let nonce = ChaCha20Poly1305::generate_nonce(rng);
    let ciphertext = cipher
        .encrypt(
            &nonce,
            chacha20poly1305::aead::Payload {
                msg: plaintext,
                aad: associated_data,
            },
        )
        .expect("ChaCha20Poly1305 encryption with a valid 12-byte nonce cannot fail");

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Sealed(out)
}

/// Decrypts a [`Sealed`] message produced by [`encrypt`] under the same
/// `key` and `associated_data`. Fails with
/// [`AeadError::AuthenticationFailed`] on any tag mismatch or malformed
/// input; never returns a plaintext in that case.
pub fn decrypt(
    key: &[u8; KEY_LEN],
    associated_data: &[u8],
    sealed: &Sealed,
) -> Result<Vec<u8>, AeadError> {
    if sealed.0.len() < NONCE_LEN + TAG_LEN {
        return Err(AeadError::AuthenticationFailed);
    }
    let (nonce, ciphertext) = sealed.0.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(key));
    cipher
        .decrypt(
            GenericArray::from_slice(nonce),
            chacha20poly1305::aead::Payload {
                msg: ciphertext,
                aad: associated_data,
            },
        )
        .map_err(|_| AeadError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn roundtrip() {
        let key = [9u8; KEY_LEN];
        let mut r = rng();
        let sealed = encrypt(&key, b"switch-id", b"hello", &mut r);
        let plaintext = decrypt(&key, b"switch-id", &sealed).unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let key = [9u8; KEY_LEN];
        let mut r = rng();
        let mut sealed = encrypt(&key, b"switch-id", b"hello", &mut r);
        let last = sealed.0.len() - 1;
        sealed.0[last] ^= 0x01;
        assert_eq!(decrypt(&key, b"switch-id", &sealed), Err(AeadError::AuthenticationFailed));
    }

    #[test]
    fn tampered_nonce_fails_auth() {
        let key = [9u8; KEY_LEN];
        let mut r = rng();
        let mut sealed = encrypt(&key, b"switch-id", b"hello", &mut r);
        sealed.0[0] ^= 0x01;
        assert_eq!(decrypt(&key, b"switch-id", &sealed), Err(AeadError::AuthenticationFailed));
    }

    #[test]
    fn wrong_associated_data_fails_auth() {
        let key = [9u8; KEY_LEN];
        let mut r = rng();
        let sealed = encrypt(&key, b"switch-id", b"hello", &mut r);
        assert_eq!(
            decrypt(&key, b"other-switch-id", &sealed),
            Err(AeadError::AuthenticationFailed)
        );
    }

    #[test]
    fn fresh_nonce_each_call() {
        let key = [9u8; KEY_LEN];
        let mut r = rng();
        let a = encrypt(&key, b"aad", b"hello", &mut r);
        let b = encrypt(&key, b"aad", b"hello", &mut r);
        assert_ne!(a.0[0..NONCE_LEN], b.0[0..NONCE_LEN]);
    }

    #[test]
    fn truncated_input_fails_cleanly() {
        let key = [9u8; KEY_LEN];
        assert_eq!(
            decrypt(&key, b"aad", &Sealed(vec![0u8; 4])),
            Err(AeadError::AuthenticationFailed)
        );
    }
}
