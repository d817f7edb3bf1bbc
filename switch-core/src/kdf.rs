//! Three-level key derivation hierarchy with explicit domain separation.
//!
//! ```text
//! password --[slow, Level 0]--> master
//! master   --[fast, Level 1]--> switch-key          (per switch-id)
//! switch-key --[fast, Level 2]--> purpose-key        (per purpose: encryption/mac/notarization/signing)
//! encryption-key --[fast, Level 3]--> fragment-key_i  (per fragment index, optional)
//! ```
//!
//! Level 0 is deliberately slow (PBKDF2-HMAC-SHA256, configurable
//! iteration count, `>= 600_000` by policy) so that an attacker who steals
//! the persisted salt and iteration count still has to brute-force the
//! password at that cost per guess. Levels 1-3 are a cheap HKDF
//! extract-then-expand step: the expensive part of the hierarchy has
//! already happened once at Level 0, so no later derivation needs to repeat
//! it. Domain tags are frozen byte strings; changing one is a breaking
//! protocol change, since it changes every derived key downstream of it.
//!
//! Every derived key is returned wrapped in [`DerivedKey`], which zeroizes
//! on drop. Callers are expected to use a key for its one immediate
//! purpose and let it drop rather than holding it for the lifetime of a
//! long-running task.

use hkdf::Hkdf;
use hmac::Hmac;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Minimum PBKDF2 iteration count accepted for the Level 0 derivation.
/// Below this, [`derive_master`] refuses to run rather than silently
/// producing a weak key.
pub const MIN_KDF_ITERATIONS: u32 = 600_000;

const SWITCH_KEY_DOMAIN: &[u8] = b"echolock-SWITCH-v1-";
const ENCRYPTION_DOMAIN: &[u8] = b"echolock-ENCRYPTION-v1";
const MAC_DOMAIN: &[u8] = b"echolock-MAC-v1";
const NOTARIZATION_DOMAIN: &[u8] = b"echolock-NOTARIZATION-v1";
const SIGNING_DOMAIN: &[u8] = b"echolock-SIGNING-v1";
const FRAGMENT_DOMAIN: &[u8] = b"echolock-FRAGMENT-v1-";

/// A derived key of fixed length, zeroized on drop. Does not implement
/// `Debug`, `Display`, or `Clone` so it cannot be accidentally logged or
/// fanned out beyond its intended single use.
#[derive(ZeroizeOnDrop)]
pub struct DerivedKey([u8; 32]);

impl DerivedKey {
    /// Exposes the raw bytes for the one operation this key was derived for.
    pub fn expose(&self) -> &[u8; 32] {
        &self.0
    }
}

/// The four Level-2 purposes a switch-key fans out into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Derives the AEAD key that seals the payload.
    Encryption,
    /// Derives the share-authentication key (§4.2's `AuthKey`).
    Mac,
    /// Derives the key used to authenticate an optional notarization anchor.
    Notarization,
    /// Derives the owner's deterministic-nonce seed for signing (the
    /// long-lived Schnorr key itself is generated independently; this
    /// purpose key is folded into deterministic nonce generation for
    /// additional domain separation beyond BIP340's message-only tag).
    Signing,
}

impl Purpose {
    fn domain(self) -> &'static [u8] {
        match self {
            Purpose::Encryption => ENCRYPTION_DOMAIN,
            Purpose::Mac => MAC_DOMAIN,
            Purpose::Notarization => NOTARIZATION_DOMAIN,
            Purpose::Signing => SIGNING_DOMAIN,
        }
    }
}

/// Level 0: password -> master key.
///
/// `iterations` must be `>= MIN_KDF_ITERATIONS`; the salt and iteration
/// count must be persisted alongside the switch so the same master key can
/// be reconstructed later. The password is never logged and is dropped
/// (zeroized, for `String`-backed secrets the caller should use
/// `secrecy::SecretString` upstream) as soon as this function returns.
pub fn derive_master(password: &[u8], salt: &[u8], iterations: u32) -> Option<DerivedKey> {
    if iterations < MIN_KDF_ITERATIONS {
        return None;
    }
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password, salt, iterations, &mut out)
        .expect("32-byte output is always a valid PBKDF2-HMAC-SHA256 length");
    Some(DerivedKey(out))
}

/// Level 1: master key -> per-switch key.
pub fn derive_switch_key(master: &DerivedKey, switch_id: uuid::Uuid) -> DerivedKey {
    let mut info = Vec::with_capacity(SWITCH_KEY_DOMAIN.len() + 16);
    info.extend_from_slice(SWITCH_KEY_DOMAIN);
    info.extend_from_slice(switch_id.as_bytes());
    expand(master.expose(), &info)
}

/// Level 2: per-switch key -> per-purpose key.
pub fn derive_purpose_key(switch_key: &DerivedKey, purpose: Purpose) -> DerivedKey {
    expand(switch_key.expose(), purpose.domain())
}

/// Level 3: encryption key -> per-fragment key, for callers that split the
/// payload into fragments encrypted independently rather than as one AEAD
/// message.
pub fn derive_fragment_key(encryption_key: &DerivedKey, fragment_index: u32) -> DerivedKey {
    let mut info = Vec::with_capacity(FRAGMENT_DOMAIN.len() + 4);
    info.extend_from_slice(FRAGMENT_DOMAIN);
    info.extend_from_slice(&fragment_index.to_le_bytes());
    expand(encryption_key.expose(), &info)
}

fn expand(input_key_material: &[u8], info: &[u8]) -> DerivedKey {
    let hk = Hkdf::<Sha256>::new(None, input_key_material);
    let mut out = [0u8; 32];
    hk.expand(info, &mut out)
        .expect("32 bytes is within HKDF-SHA256's 255*32 byte limit");
    DerivedKey(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_derivation_is_deterministic() {
        let a = derive_master(b"hunter2", b"salt", MIN_KDF_ITERATIONS).unwrap();
        let b = derive_master(b"hunter2", b"salt", MIN_KDF_ITERATIONS).unwrap();
        assert_eq!(a.expose(), b.expose());
    }

    #[test]
    fn master_derivation_rejects_low_iteration_counts() {
        assert!(derive_master(b"hunter2", b"salt", 1_000).is_none());
    }

    #[test]
    fn different_salts_diverge() {
        let a = derive_master(b"hunter2", b"salt-a", MIN_KDF_ITERATIONS).unwrap();
        let b = derive_master(b"hunter2", b"salt-b", MIN_KDF_ITERATIONS).unwrap();
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn purposes_are_separated() {
        let master = derive_master(b"hunter2", b"salt", MIN_KDF_ITERATIONS).unwrap();
        let switch_id = uuid::Uuid::new_v4();
        let switch_key = derive_switch_key(&master, switch_id);
        let enc = derive_purpose_key(&switch_key, Purpose::Encryption);
        let mac = derive_purpose_key(&switch_key, Purpose::Mac);
        let notar = derive_purpose_key(&switch_key, Purpose::Notarization);
        let sign = derive_purpose_key(&switch_key, Purpose::Signing);
        let all = [enc.expose(), mac.expose(), notar.expose(), sign.expose()];
        for i in 0..all.len() {
            for j in (i + 1)..all.len() {
                assert_ne!(all[i], all[j], "purpose keys {i} and {j} collided");
            }
        }
    }

    #[test]
    fn different_switch_ids_diverge() {
        let master = derive_master(b"hunter2", b"salt", MIN_KDF_ITERATIONS).unwrap();
        let a = derive_switch_key(&master, uuid::Uuid::from_u128(1));
        let b = derive_switch_key(&master, uuid::Uuid::from_u128(2));
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn fragment_keys_are_indexed() {
        let master = derive_master(b"hunter2", b"salt", MIN_KDF_ITERATIONS).unwrap();
        let switch_key = derive_switch_key(&master, uuid::Uuid::new_v4());
        let enc = derive_purpose_key(&switch_key, Purpose::Encryption);
        let f0 = derive_fragment_key(&enc, 0);
        let f1 = derive_fragment_key(&enc, 1);
        assert_ne!(f0.expose(), f1.expose());
    }
}
