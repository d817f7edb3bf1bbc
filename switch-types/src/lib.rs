#![deny(missing_docs)]
//! Wire-visible types for the dead man's switch release pipeline.
//!
//! This crate groups together the strongly-typed records that cross a
//! process boundary: the [`Switch`] aggregate, the per-watcher
//! [`ShareEnvelope`], the [`HeartbeatRecord`]/[`ReleaseRecord`]/
//! [`CancellationRecord`] triad published to the substrate, and the
//! [`substrate::Substrate`] trait that abstracts over the publish/
//! subscribe transport, and the [`store::SwitchStore`] trait that
//! abstracts over switch-table persistence. It depends on `switch-core`
//! for the cryptographic primitives these records carry but performs no
//! cryptographic operations itself beyond what is needed to construct
//! and validate record shapes.
//!
//! Re-exports async-trait for convenience when implementing
//! [`substrate::Substrate`] or [`store::SwitchStore`] downstream.

/// Re-export async-trait for convenience.
pub use async_trait;

pub mod error;
pub mod ids;
pub mod records;
pub mod store;
pub mod substrate;
pub mod switch;

pub use error::SwitchError;
pub use ids::{RecipientId, SwitchId, WatcherId};
pub use records::{CancellationRecord, HeartbeatRecord, ReleaseRecord, ShareEnvelope};
pub use store::SwitchStore;
pub use substrate::{Substrate, Topic};
pub use switch::{Switch, SwitchState, ThresholdParams};
