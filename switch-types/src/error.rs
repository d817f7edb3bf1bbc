//! The closed error taxonomy shared by every crate in this workspace.
//!
//! Every fallible operation in the release pipeline resolves, directly
//! or through a `#[from]` conversion, to one of these kinds. Semantic
//! errors (authentication, state, parameters) carry no retry advice
//! because the caller must not retry them as-is; transport errors
//! (`SubstrateUnavailable`, `Timeout`) are the only kinds a caller
//! should retry.

use thiserror::Error;

use crate::ids::WatcherId;

/// All error kinds surfaced by the switch crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwitchError {
    /// `N < M`, `x = 0`, `N > 255`, `M < 2`, `2M < N`, or a similar
    /// violation of the threshold parameter invariants.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    /// The RNG returned zero or otherwise degenerate output.
    #[error("entropy failure")]
    EntropyFailure,
    /// An AEAD tag or a signature failed to verify.
    #[error("authentication failed")]
    AuthenticationFailed,
    /// A share's MAC did not verify; the share at this index is discarded.
    #[error("share corrupted at index {0}")]
    ShareCorrupted(u8),
    /// Fewer than `M` verified shares were available.
    #[error("insufficient shares")]
    InsufficientShares,
    /// Two shares presented the same `x` coordinate.
    #[error("duplicate share index {0}")]
    DuplicateX(u8),
    /// Every configured substrate endpoint failed after retries.
    #[error("substrate unavailable for watcher {watcher:?}: {reason}")]
    SubstrateUnavailable {
        /// The watcher whose publish/subscribe call failed, if known.
        watcher: Option<WatcherId>,
        /// Human-readable detail for logs; not matched on by callers.
        reason: String,
    },
    /// A transition was requested from an incompatible state (e.g.
    /// `refresh` after `Released`).
    #[error("state conflict: {0}")]
    StateConflict(String),
    /// The operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,
}

impl From<switch_core::field::FieldError> for SwitchError {
    fn from(err: switch_core::field::FieldError) -> Self {
        match err {
            switch_core::field::FieldError::DivByZero => {
                Self::InvalidParameters("division by zero in field arithmetic".to_string())
            }
            switch_core::field::FieldError::DuplicateX(x) => Self::DuplicateX(x),
        }
    }
}

impl From<switch_core::shamir::ShareError> for SwitchError {
    fn from(err: switch_core::shamir::ShareError) -> Self {
        use switch_core::shamir::ShareError;
        match err {
            ShareError::InvalidParameters { n, m } => {
                Self::InvalidParameters(format!("n={n}, m={m}"))
            }
            ShareError::EntropyFailure => Self::EntropyFailure,
            ShareError::ShareCorrupted(index) => Self::ShareCorrupted(index),
            ShareError::InsufficientShares { needed, have } => {
                let _ = (needed, have);
                Self::InsufficientShares
            }
            ShareError::DuplicateX(x) => Self::DuplicateX(x),
            ShareError::Field(field_err) => field_err.into(),
        }
    }
}

impl From<switch_core::aead::AeadError> for SwitchError {
    fn from(_: switch_core::aead::AeadError) -> Self {
        Self::AuthenticationFailed
    }
}

impl From<switch_core::sealed_box::SealedBoxError> for SwitchError {
    fn from(err: switch_core::sealed_box::SealedBoxError) -> Self {
        use switch_core::sealed_box::SealedBoxError;
        match err {
            SealedBoxError::Malformed => {
                Self::InvalidParameters("malformed sealed box".to_string())
            }
            SealedBoxError::AuthenticationFailed => Self::AuthenticationFailed,
        }
    }
}
