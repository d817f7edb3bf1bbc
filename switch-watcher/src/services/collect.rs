//! Bounded-time snapshot collection over a [`Substrate`] topic.
//!
//! [`Substrate::subscribe`] never terminates on its own: a subscriber
//! receives every record published before the call (replayed
//! synchronously) and then blocks for new ones. The monitor loop only
//! needs the replayed backlog on each tick, so it collects under a
//! short timeout rather than holding a live subscription open - any
//! record published after a tick's snapshot is picked up on the next
//! tick instead.

use std::time::Duration;

use futures::StreamExt as _;
use switch_types::error::SwitchError;
use switch_types::substrate::{Record, Substrate, Topic};

/// Collects every record currently retained for `topic`, waiting at
/// most `timeout` for the replay to drain. Returns an empty vector
/// (not an error) if nothing has ever been published to the topic.
pub(crate) async fn snapshot(
    substrate: &dyn Substrate,
    topic: Topic,
    timeout: Duration,
) -> Result<Vec<Record>, SwitchError> {
    let mut stream = substrate.subscribe(topic).await?;
    let mut records = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Some(record) = stream.next().await {
            records.push(record);
        }
    })
    .await;
    Ok(records)
}
