//! [`LocalSubstrate`]: a single-process implementation of
//! [`switch_types::Substrate`] for a standalone watcher deployment.
//!
//! The distributed substrate protocol - peer discovery, gossip, the
//! `K_min`-of-many durability guarantee a production broadcast layer
//! provides - is explicitly out of scope for this workspace. What every layer
//! above the trait boundary actually needs is eventual delivery and
//! replay of records published before a subscriber arrived; a single
//! shared log satisfies that contract for one process and is what this
//! binary ships so a watcher can run standalone without an external
//! broker. A deployment that needs real multi-node durability swaps
//! this implementation out for one that talks to an actual substrate
//! cluster - the rest of the watcher does not change.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use switch_types::error::SwitchError;
use switch_types::substrate::{Record, Substrate, Topic};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 4096;

struct Inner {
    log: HashMap<Topic, Vec<Record>>,
    sender: broadcast::Sender<(Topic, Record)>,
}

/// A single-process [`Substrate`] backed by one shared, append-only log.
#[derive(Clone)]
pub struct LocalSubstrate {
    inner: Arc<Mutex<Inner>>,
}

impl LocalSubstrate {
    /// Creates an empty substrate.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                log: HashMap::new(),
                sender,
            })),
        }
    }
}

impl Default for LocalSubstrate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Substrate for LocalSubstrate {
    async fn publish(&self, topic: Topic, record: Record) -> Result<(), SwitchError> {
        let mut inner = self.inner.lock();
        inner.log.entry(topic).or_default().push(record.clone());
        let _ = inner.sender.send((topic, record));
        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<BoxStream<'static, Record>, SwitchError> {
        let (replayed, receiver) = {
            let inner = self.inner.lock();
            let replayed: VecDeque<Record> = inner.log.get(&topic).cloned().unwrap_or_default().into();
            (replayed, inner.sender.subscribe())
        };

        let state = StreamState { topic, replayed, receiver };
        Ok(Box::pin(futures::stream::unfold(state, |mut state| async move {
            if let Some(record) = state.replayed.pop_front() {
                return Some((record, state));
            }
            loop {
                match state.receiver.recv().await {
                    Ok((topic, record)) if topic == state.topic => return Some((record, state)),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "local substrate subscriber lagged; records were dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })))
    }
}

struct StreamState {
    topic: Topic,
    replayed: VecDeque<Record>,
    receiver: broadcast::Receiver<(Topic, Record)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use rand::SeedableRng;
    use std::time::SystemTime;
    use switch_core::schnorr::PrivateKey;
    use switch_types::ids::SwitchId;
    use switch_types::records::HeartbeatRecord;

    #[tokio::test]
    async fn replays_records_published_before_subscription() {
        let substrate = LocalSubstrate::new();
        let switch_id = SwitchId::generate();
        let key = PrivateKey::generate(&mut rand::rngs::StdRng::from_seed([2u8; 32]));
        let hb = HeartbeatRecord::sign(&key, switch_id, 1, SystemTime::UNIX_EPOCH);
        substrate
            .publish(Topic::Heartbeat(switch_id), Record::Heartbeat(hb))
            .await
            .unwrap();

        let mut stream = substrate.subscribe(Topic::Heartbeat(switch_id)).await.unwrap();
        let received = stream.next().await.unwrap();
        assert!(matches!(received, Record::Heartbeat(_)));
    }
}
