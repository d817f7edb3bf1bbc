//! The two operations the owner performs after enrollment: refreshing
//! the heartbeat (§4.6, §4.8's `refresh()` transition) and cancelling
//! the switch outright (§4.8's `cancel()` transition).
//!
//! Neither function touches the [`switch_types::Switch`] aggregate
//! itself - that's `switch-watcher`'s job, since it is the process that
//! persists the switch table. This crate only signs and publishes the
//! record; the watcher daemon observes it on the substrate and applies
//! the corresponding state transition.

use std::time::{Duration, SystemTime};

use backon::{BackoffBuilder, ExponentialBuilder, Retryable as _};
use switch_core::schnorr::PrivateKey;
use switch_types::{
    Substrate, SwitchError, SwitchId,
    records::{CancellationRecord, HeartbeatRecord},
    substrate::{Record, Topic},
};
use tracing::instrument;

/// Bounds retried publish attempts so a transient substrate outage does
/// not hang the owner's client indefinitely.
#[derive(Debug, Clone, Copy)]
pub struct PublishRetry {
    /// Total wall-clock time budget across all retry attempts.
    pub total_delay: Duration,
}

impl Default for PublishRetry {
    fn default() -> Self {
        Self {
            total_delay: Duration::from_secs(30),
        }
    }
}

async fn publish_with_retry(
    substrate: &dyn Substrate,
    topic: Topic,
    record: Record,
    retry: PublishRetry,
) -> Result<(), SwitchError> {
    let backoff = ExponentialBuilder::new()
        .with_total_delay(Some(retry.total_delay))
        .without_max_times()
        .build();
    (|| async {
        let record = record.clone();
        substrate.publish(topic, record).await
    })
    .retry(backoff)
    .sleep(tokio::time::sleep)
    .notify(|err, duration| {
        tracing::warn!(%err, ?duration, "retrying substrate publish");
    })
    .await
}

/// Signs and publishes a new heartbeat for `switch_id`, proving the
/// owner is alive at `now`. `counter` must be strictly greater than the
/// counter of every previous heartbeat signed by this key for this
/// switch - callers should persist and increment a local counter rather
/// than deriving one from the clock.
#[instrument(skip(signing_key, substrate), fields(%switch_id, counter))]
pub async fn refresh(
    signing_key: &PrivateKey,
    switch_id: SwitchId,
    counter: u64,
    now: SystemTime,
    substrate: &dyn Substrate,
    retry: PublishRetry,
) -> Result<HeartbeatRecord, SwitchError> {
    let record = HeartbeatRecord::sign(signing_key, switch_id, counter, now);
    publish_with_retry(
        substrate,
        Topic::Heartbeat(switch_id),
        Record::Heartbeat(record.clone()),
        retry,
    )
    .await?;
    Ok(record)
}

/// Signs and publishes a cancellation for `switch_id`. Watchers that
/// observe this record newer than their own release trigger must
/// suppress or retract any release record they already published
/// (§4.8's `cancel()` transition); this crate only produces the signed
/// record, it does not itself coordinate watchers.
#[instrument(skip(signing_key, substrate), fields(%switch_id))]
pub async fn cancel(
    signing_key: &PrivateKey,
    switch_id: SwitchId,
    now: SystemTime,
    substrate: &dyn Substrate,
    retry: PublishRetry,
) -> Result<CancellationRecord, SwitchError> {
    let record = CancellationRecord::sign(signing_key, switch_id, now);
    publish_with_retry(
        substrate,
        Topic::Cancellation(switch_id),
        Record::Cancellation(record.clone()),
        retry,
    )
    .await?;
    Ok(record)
}
