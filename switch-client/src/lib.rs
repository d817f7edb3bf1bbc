#![deny(missing_docs)]
//! Owner- and recipient-side protocol logic for the dead man's switch.
//!
//! [`enroll`] packages a plaintext payload into a switch: it derives the
//! encryption and authentication keys for the switch, seals the payload,
//! splits the resulting key into authenticated shares, and publishes a
//! [`switch_types::ShareEnvelope`] per watcher. [`owner`] covers the two
//! operations the owner performs afterward - refreshing the heartbeat
//! and cancelling the switch outright. [`recovery`] is the recipient-side
//! assembler: it collects release records from the substrate, verifies
//! and interpolates the shares they carry, and decrypts the payload.
//!
//! None of this crate persists anything; callers own the switch-store
//! and the owner's/recipient's long-lived keys. See `switch-watcher` for
//! the daemon that persists switches and runs the release state machine.

use switch_types::error::SwitchError;

pub mod enroll;
pub mod owner;
pub mod recovery;

/// Errors surfaced by the owner- and recipient-side protocol flows in
/// this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error from the cryptographic or state-machine layers below
    /// this crate, surfaced unchanged.
    #[error(transparent)]
    Switch(#[from] SwitchError),
    /// Recovery did not produce a payload. Carries the last-observed
    /// error kind; recipients only ever see a decrypted payload or a
    /// single `RecoveryFailed`, never the intermediate verification noise.
    #[error("recovery failed: {0}")]
    RecoveryFailed(SwitchError),
}
