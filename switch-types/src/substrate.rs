//! The abstract publish/subscribe substrate.
//!
//! The core release pipeline depends only on: eventual delivery of
//! accepted records to subscribers, durability of at least `K_min`
//! nodes, and rejection of malformed envelopes at publish time. It is
//! written to tolerate substrate nodes that silently drop messages,
//! return stale results, or deliver records out of order - nothing in
//! this workspace assumes in-order or exactly-once delivery.
//!
//! Peer discovery, storage, and the wire transport underneath a given
//! [`Substrate`] implementation are explicitly out of scope here; this
//! module defines only the interface a watcher daemon, an owner client,
//! or a recipient client programs against.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::SwitchError;
use crate::ids::SwitchId;
use crate::records::{CancellationRecord, HeartbeatRecord, ReleaseRecord, ShareEnvelope};

/// A topic on the substrate. Every record published or subscribed to is
/// scoped to exactly one switch and one record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Heartbeat records for a switch.
    Heartbeat(SwitchId),
    /// Share envelopes published at enrollment for a switch.
    ShareEnvelope(SwitchId),
    /// Release records for a switch.
    Release(SwitchId),
    /// Cancellation records for a switch.
    Cancellation(SwitchId),
}

impl Topic {
    /// The switch this topic is scoped to.
    pub fn switch_id(self) -> SwitchId {
        match self {
            Topic::Heartbeat(id)
            | Topic::ShareEnvelope(id)
            | Topic::Release(id)
            | Topic::Cancellation(id) => id,
        }
    }
}

/// A record published to or received from the substrate, tagged by kind
/// rather than carried as a dynamically-typed envelope.
#[derive(Debug, Clone)]
pub enum Record {
    /// A signed proof-of-life.
    Heartbeat(HeartbeatRecord),
    /// A watcher's enrollment-time share envelope.
    Share(ShareEnvelope),
    /// A watcher's publication of its share.
    Release(ReleaseRecord),
    /// An owner-signed suppression of a scheduled release.
    Cancellation(CancellationRecord),
}

/// The publish/subscribe transport the release pipeline is built
/// against. Implementations may be a single in-memory broker (for
/// tests), a gossip overlay, or a managed message bus; the pipeline
/// does not care, provided the contract above holds.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Publishes `record` to `topic`. Implementations should retry
    /// transient failures internally up to a bounded attempt count and
    /// surface [`SwitchError::SubstrateUnavailable`] only once every
    /// configured endpoint has been exhausted.
    async fn publish(&self, topic: Topic, record: Record) -> Result<(), SwitchError>;

    /// Returns a stream of records accepted for `topic`, including
    /// those published before this call. The stream never terminates
    /// on its own; callers that want a snapshot should collect it under
    /// their own timeout.
    async fn subscribe(&self, topic: Topic) -> Result<BoxStream<'static, Record>, SwitchError>;
}
