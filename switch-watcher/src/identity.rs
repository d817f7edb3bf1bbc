//! This watcher's own cryptographic identity: the signing key it uses
//! to authenticate release records and the sealed-box keypair it uses
//! to unseal the share addressed to it at enrollment.
//!
//! Both keys are configured out of band (§6: `SWITCH_WATCHER_SIGNING_KEY`,
//! `SWITCH_WATCHER_UNSEAL_KEY`) rather than generated on first start, so
//! that a watcher's identity survives a process restart without needing
//! its own persistence layer.

use secrecy::{ExposeSecret, SecretString};
use switch_core::{schnorr, sealed_box};
use switch_types::WatcherId;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Namespace used to derive a stable [`WatcherId`] from a watcher's
/// signing public key, so the id never needs its own persisted config.
const WATCHER_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6c, 0x6f, 0x63, 0x6b, 0x2d, 0x77, 0x61, 0x74, 0x63, 0x68, 0x65, 0x72, 0x2d, 0x69, 0x64, 0x00,
]);

/// Errors loading a watcher's identity from configuration.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The configured signing key was not valid hex, or not the right length.
    #[error("invalid signing key: {0}")]
    InvalidSigningKey(String),
    /// The signing scalar did not reduce to a valid secp256k1 private key.
    #[error("signing key is not a valid curve scalar")]
    InvalidSigningScalar,
    /// The configured unseal key was not valid hex, or not the right length.
    #[error("invalid unseal key: {0}")]
    InvalidUnsealKey(String),
}

/// This watcher's identity: a stable id derived from its public signing
/// key, the signing key itself, and the sealed-box keypair it unseals
/// enrollment shares with.
pub struct WatcherIdentity {
    id: WatcherId,
    signing_key: schnorr::PrivateKey,
    unseal_keys: sealed_box::RecipientKeyPair,
}

impl WatcherIdentity {
    /// Loads a watcher's identity from hex-encoded scalars. `signing_key_hex`
    /// must decode to 32 bytes and reduce to a nonzero secp256k1 scalar;
    /// `unseal_key_hex` must decode to 32 bytes (any value is a valid
    /// X25519 scalar after clamping).
    pub fn load(signing_key_hex: &SecretString, unseal_key_hex: &SecretString) -> Result<Self, IdentityError> {
        let signing_bytes = decode_32(signing_key_hex.expose_secret())
            .map_err(IdentityError::InvalidSigningKey)?;
        let signing_key = schnorr::PrivateKey::from_bytes(&signing_bytes)
            .map_err(|_| IdentityError::InvalidSigningScalar)?;

        let unseal_bytes = decode_32(unseal_key_hex.expose_secret()).map_err(IdentityError::InvalidUnsealKey)?;
        let unseal_keys = sealed_box::RecipientKeyPair::from_scalar(unseal_bytes);

        let id = WatcherId::from_uuid(Uuid::new_v5(
            &WATCHER_ID_NAMESPACE,
            &signing_key.public_key().to_bytes(),
        ));

        Ok(Self {
            id,
            signing_key,
            unseal_keys,
        })
    }

    /// This watcher's stable identifier.
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// This watcher's signing key, used to sign release records.
    pub fn signing_key(&self) -> &schnorr::PrivateKey {
        &self.signing_key
    }

    /// This watcher's sealed-box keypair, used to unseal the share
    /// addressed to it at enrollment.
    pub fn unseal_keys(&self) -> &sealed_box::RecipientKeyPair {
        &self.unseal_keys
    }
}

fn decode_32(hex_str: &str) -> Result<[u8; 32], String> {
    let bytes = Zeroizing::new(hex::decode(hex_str).map_err(|err| err.to_string())?);
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| format!("expected 32 bytes, got {}", bytes.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_valid_identity_deterministically() {
        let signing_hex = SecretString::from(hex::encode([7u8; 32]));
        let unseal_hex = SecretString::from(hex::encode([9u8; 32]));
        let a = WatcherIdentity::load(&signing_hex, &unseal_hex).unwrap();
        let b = WatcherIdentity::load(&signing_hex, &unseal_hex).unwrap();
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn rejects_non_hex_key() {
        let bad = SecretString::from("not-hex".to_string());
        let unseal_hex = SecretString::from(hex::encode([1u8; 32]));
        assert!(WatcherIdentity::load(&bad, &unseal_hex).is_err());
    }

    #[test]
    fn rejects_zero_signing_key() {
        let zero = SecretString::from(hex::encode([0u8; 32]));
        let unseal_hex = SecretString::from(hex::encode([1u8; 32]));
        assert!(WatcherIdentity::load(&zero, &unseal_hex).is_err());
    }
}
