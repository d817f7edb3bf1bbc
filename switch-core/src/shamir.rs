//! Byte-wise Shamir secret sharing with per-share authentication and
//! optional public commitments.
//!
//! Splits an `L`-byte secret into `N` shares at threshold `M` by sampling,
//! independently for each byte position, a degree-`(M-1)` polynomial over
//! [`crate::field`] whose constant term is that secret byte. Each share is
//! `p(x)` for `x` in `1..=N`; `x = 0` is reserved for the secret itself and
//! is never a valid share index.
//!
//! Every share carries a MAC computed with a 256-bit authentication key
//! generated alongside the split, keyed BLAKE3 over `(index || share
//! bytes)`. The MAC key is distributed out of band from the shares
//! themselves (see `switch-client`'s enrollment flow) so that no party
//! holding only sealed shares can forge or silently corrupt one without
//! detection at combine time.
//!
//! Commitments are the optional, MAC-independent audit trail described in
//! the module-level contract: a collision-resistant hash of each
//! polynomial coefficient, allowing any third party to notice a share that
//! was not produced from the committed polynomial without needing the
//! authentication key. This implementation ships only the commitment
//! scheme below (chosen over a second, interactively-verified commitment
//! scheme some earlier prototypes explored) - see `DESIGN.md` for the
//! rationale. Commitments are tamper-evident, not independently
//! verifiable without an interactive or zero-knowledge protocol; integrity
//! is enforced by the MAC.

use rand::{CryptoRng, RngCore};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::field;

/// Domain tag for the per-share MAC.
const MAC_DOMAIN: &[u8] = b"echolock-SHARE-MAC-v1";
/// Domain tag for coefficient commitments.
const COMMITMENT_DOMAIN: &[u8] = b"echolock-SHARE-COMMITMENT-v1";

/// Errors raised by the share engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShareError {
    /// `N < M`, `M < 2`, `N > 255`, `2M < N`, or `N == 0`.
    #[error("invalid threshold parameters: N={n} M={m}")]
    InvalidParameters {
        /// total number of shares
        n: usize,
        /// reconstruction threshold
        m: usize,
    },
    /// The entropy source returned a degenerate (all-zero) polynomial
    /// coefficient; refuse rather than produce a weak share.
    #[error("entropy source produced a degenerate coefficient")]
    EntropyFailure,
    /// A share's MAC did not verify against the authentication key.
    #[error("share {0} failed MAC verification")]
    ShareCorrupted(u8),
    /// Fewer than `M` shares verified before combine was asked to produce a result.
    #[error("insufficient verified shares: need {needed}, have {have}")]
    InsufficientShares {
        /// shares required
        needed: usize,
        /// shares that verified
        have: usize,
    },
    /// Two shares presented to `combine` share an x-coordinate.
    #[error("duplicate share index {0}")]
    DuplicateX(u8),
    /// Field-layer error surfaced through interpolation.
    #[error(transparent)]
    Field(#[from] field::FieldError),
}

/// 256-bit key used to authenticate shares of one split, independent of
/// the secret itself.
#[derive(Clone, ZeroizeOnDrop)]
pub struct AuthKey([u8; 32]);

impl AuthKey {
    fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps an externally-derived 32-byte key (e.g. the KDF's `mac`
    /// purpose key) as an `AuthKey`.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Exposes the raw key bytes, e.g. to persist alongside the switch for
    /// later combine-time verification.
    pub fn expose(&self) -> &[u8; 32] {
        &self.0
    }
}

/// One Shamir share: an x-coordinate, the share bytes `y`, and a MAC over
/// both, independent of the payload encryption key.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Share {
    /// x-coordinate in `[1, 255]`, unique within a split.
    pub index: u8,
    /// `y` bytes: `p(index)` for each byte position of the secret.
    pub bytes: Vec<u8>,
    /// `keyed_blake3(auth_key, MAC_DOMAIN || index || bytes)`.
    pub mac: [u8; 32],
}

impl Share {
    fn compute_mac(auth_key: &AuthKey, index: u8, bytes: &[u8]) -> [u8; 32] {
        let mut input = Vec::with_capacity(MAC_DOMAIN.len() + 1 + bytes.len());
        input.extend_from_slice(MAC_DOMAIN);
        input.push(index);
        input.extend_from_slice(bytes);
        blake3::keyed_hash(auth_key.expose(), &input).into()
    }

    /// Verifies this share's MAC against `auth_key` in constant time.
    pub fn verify(&self, auth_key: &AuthKey) -> bool {
        let expected = Self::compute_mac(auth_key, self.index, &self.bytes);
        subtle::ConstantTimeEq::ct_eq(&expected[..], &self.mac[..]).into()
    }
}

/// Per-byte, per-coefficient hash commitments to the split polynomials,
/// published alongside share envelopes for tamper-evidence.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct CommitmentSet {
    /// `commitments[byte_index][coeff_index]`.
    commitments: Vec<Vec<[u8; 32]>>,
}

impl CommitmentSet {
    fn commit(coeff: u8, byte_index: usize, coeff_index: usize) -> [u8; 32] {
        let mut input = Vec::with_capacity(COMMITMENT_DOMAIN.len() + 1 + 16);
        input.extend_from_slice(COMMITMENT_DOMAIN);
        input.push(coeff);
        input.extend_from_slice(&(byte_index as u64).to_le_bytes());
        input.extend_from_slice(&(coeff_index as u64).to_le_bytes());
        blake3::hash(&input).into()
    }

    /// Checks that `coeff` is the committed coefficient at
    /// `(byte_index, coeff_index)`. This only detects deviation from the
    /// original polynomial when the verifier is given the raw coefficient,
    /// which is not available from shares alone - see module docs.
    pub fn verify_coefficient(&self, byte_index: usize, coeff_index: usize, coeff: u8) -> bool {
        match self.commitments.get(byte_index).and_then(|c| c.get(coeff_index)) {
            Some(expected) => Self::commit(coeff, byte_index, coeff_index) == *expected,
            None => false,
        }
    }
}

/// Result of [`split`]: the shares, the authentication key used to produce
/// their MACs, and public commitments to the underlying polynomials.
pub struct SplitOutput {
    /// One share per watcher, `shares[i].index == i + 1`.
    pub shares: Vec<Share>,
    /// MAC key for this split; retained by the owner, never shipped with a share.
    pub auth_key: AuthKey,
    /// Public, MAC-independent tamper-evidence commitments.
    pub commitments: CommitmentSet,
}

/// Splits `secret` into `n` shares at threshold `m`.
///
/// `2 <= m <= n <= 255` and `2*m >= n` (so that an adversary controlling a
/// strict minority of watchers, i.e. fewer than `m`, can never assemble a
/// quorum on their own). All produced shares have length `secret.len()`.
pub fn split(
    secret: &[u8],
    n: usize,
    m: usize,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<SplitOutput, ShareError> {
    split_with_auth_key(secret, n, m, AuthKey::generate(rng), rng)
}

/// Like [`split`], but uses a caller-supplied authentication key instead
/// of generating a fresh one. Used when the MAC key should itself come
/// from the KDF hierarchy (the `Purpose::Mac` purpose key) rather than
/// from a per-split random draw, so that the owner can reconstruct it
/// from the password instead of having to persist it separately.
pub fn split_with_auth_key(
    secret: &[u8],
    n: usize,
    m: usize,
    auth_key: AuthKey,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<SplitOutput, ShareError> {
    validate_params(n, m)?;

    let mut share_bytes: Vec<Vec<u8>> = (0..n).map(|_| Vec::with_capacity(secret.len())).collect();
    let mut commitments = Vec::with_capacity(secret.len());

    for (byte_index, &secret_byte) in secret.iter().enumerate() {
        let mut coeffs = vec![0u8; m];
        coeffs[0] = secret_byte;
        rng.fill_bytes(&mut coeffs[1..]);
        if coeffs[1..].iter().all(|&c| c == 0) && m > 1 {
            return Err(ShareError::EntropyFailure);
        }

        let mut byte_commitments = Vec::with_capacity(m);
        for (coeff_index, &c) in coeffs.iter().enumerate() {
            byte_commitments.push(CommitmentSet::commit(c, byte_index, coeff_index));
        }
        commitments.push(byte_commitments);

        for (i, bytes) in share_bytes.iter_mut().enumerate() {
            let x = (i + 1) as u8;
            bytes.push(field::eval(&coeffs, x));
        }
        coeffs.zeroize();
    }

    let shares = share_bytes
        .into_iter()
        .enumerate()
        .map(|(i, bytes)| {
            let index = (i + 1) as u8;
            let mac = Share::compute_mac(&auth_key, index, &bytes);
            Share { index, bytes, mac }
        })
        .collect();

    Ok(SplitOutput {
        shares,
        auth_key,
        commitments: CommitmentSet { commitments },
    })
}

/// Verifies and combines `shares` into the original secret.
///
/// Each share's MAC is checked against `auth_key` first; shares that fail
/// are dropped (not treated as fatal - see [`ShareError::ShareCorrupted`]
/// callers that want to keep soliciting more shares, e.g.
/// `switch-client`'s recovery assembler, should catch that case and retry
/// rather than aborting). Fails with [`ShareError::InsufficientShares`] if
/// fewer than `m` shares verify, or [`ShareError::DuplicateX`] if two
/// verified shares share an index.
pub fn combine(shares: &[Share], auth_key: &AuthKey, m: usize) -> Result<Vec<u8>, ShareError> {
    let mut verified = Vec::with_capacity(shares.len());
    for share in shares {
        if share.verify(auth_key) {
            verified.push(share);
        }
    }

    let mut seen_x = std::collections::HashSet::new();
    let mut deduped = Vec::with_capacity(verified.len());
    for share in verified {
        if !seen_x.insert(share.index) {
            return Err(ShareError::DuplicateX(share.index));
        }
        deduped.push(share);
    }

    if deduped.len() < m {
        return Err(ShareError::InsufficientShares {
            needed: m,
            have: deduped.len(),
        });
    }

    let len = deduped[0].bytes.len();
    let mut secret = Vec::with_capacity(len);
    for byte_index in 0..len {
        let points: Vec<(u8, u8)> = deduped[0..m]
            .iter()
            .map(|s| (s.index, s.bytes[byte_index]))
            .collect();
        secret.push(field::interpolate_at_zero(&points)?);
    }
    Ok(secret)
}

fn validate_params(n: usize, m: usize) -> Result<(), ShareError> {
    if m < 2 || n > 255 || n == 0 || m > n || 2 * m < n {
        return Err(ShareError::InvalidParameters { n, m });
    }
    Ok(())
}
