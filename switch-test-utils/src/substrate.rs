//! [`InMemorySubstrate`]: a single-process publish/subscribe broker that
//! satisfies [`switch_types::Substrate`]'s contract for tests - eventual
//! delivery, replay of records published before a subscription started -
//! without durability, retries, or any notion of distinct nodes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use switch_types::error::SwitchError;
use switch_types::substrate::{Record, Substrate, Topic};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

struct Inner {
    log: HashMap<Topic, Vec<Record>>,
    sender: broadcast::Sender<(Topic, Record)>,
}

/// An in-memory [`Substrate`] backed by a single shared log, suitable for
/// unit and scenario tests. Every published record is retained forever
/// (tests are short-lived) and replayed to any new subscriber before live
/// records are delivered.
#[derive(Clone)]
pub struct InMemorySubstrate {
    inner: Arc<Mutex<Inner>>,
}

impl InMemorySubstrate {
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

    /// Returns every record ever published to `topic`, in publish order.
    /// Useful for assertions that don't want to deal with a stream.
    pub fn snapshot(&self, topic: Topic) -> Vec<Record> {
        self.inner
            .lock()
            .log
            .get(&topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Drops every retained record. Does not affect subscribers already
    /// mid-replay.
    pub fn clear(&self) {
        self.inner.lock().log.clear();
    }
}

impl Default for InMemorySubstrate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Substrate for InMemorySubstrate {
    async fn publish(&self, topic: Topic, record: Record) -> Result<(), SwitchError> {
        let mut inner = self.inner.lock();
        inner.log.entry(topic).or_default().push(record.clone());
        // No subscribers is not an error: the record is retained for replay.
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
                        tracing::warn!(skipped, "test substrate subscriber lagged; records were dropped");
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
