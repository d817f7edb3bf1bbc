//! A [`Substrate`] implementation that fans a handful of standalone
//! `switch-watcher` processes' HTTP APIs (`switch-watcher/src/api.rs`)
//! out into a single shared bus, the way a real deployment's watchers
//! would be connected by a gossip substrate none of them individually
//! owns. Grounded the same way `oprf-dev-client` takes a comma-separated
//! `services: Vec<String>` of node URLs rather than talking to one node.
//!
//! [`Substrate::subscribe`] must never terminate on its own (see that
//! trait's doc comment), but each watcher's `/substrate/.../snapshot`
//! endpoint is a one-shot GET. [`HttpSubstrate`] bridges the two by
//! polling every configured watcher on an interval and yielding each
//! distinct record exactly once, deduplicated across watchers by its
//! serialized bytes (heartbeats and cancellations are broadcast to every
//! watcher, so the same record legitimately shows up in more than one
//! watcher's snapshot).

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use switch_types::error::SwitchError;
use switch_types::ids::SwitchId;
use switch_types::substrate::{Record, Substrate, Topic};

/// Talks to a set of watchers' HTTP APIs, each reachable at one of
/// `watcher_urls` (e.g. `http://127.0.0.1:8080`).
pub struct HttpSubstrate {
    client: reqwest::Client,
    watcher_urls: Vec<String>,
    poll_interval: Duration,
}

impl HttpSubstrate {
    /// Builds a client against the given watcher endpoints.
    pub fn new(watcher_urls: Vec<String>, poll_interval: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            watcher_urls,
            poll_interval,
        }
    }

    fn topic_path(topic: Topic) -> (&'static str, SwitchId) {
        let switch_id = topic.switch_id();
        let kind = match topic {
            Topic::Heartbeat(_) => "heartbeat",
            Topic::ShareEnvelope(_) => "share",
            Topic::Release(_) => "release",
            Topic::Cancellation(_) => "cancellation",
        };
        (kind, switch_id)
    }
}

#[async_trait]
impl Substrate for HttpSubstrate {
    async fn publish(&self, topic: Topic, record: Record) -> Result<(), SwitchError> {
        let (kind, switch_id) = Self::topic_path(topic);
        let mut last_error = None;
        let mut any_succeeded = false;
        for base_url in &self.watcher_urls {
            let url = format!("{base_url}/substrate/{kind}/{switch_id}/publish");
            match self.client.post(&url).json(&record).send().await {
                Ok(response) if response.status().is_success() => any_succeeded = true,
                Ok(response) => {
                    last_error = Some(format!("{url} returned {}", response.status()));
                }
                Err(err) => {
                    last_error = Some(format!("POST {url} failed: {err}"));
                }
            }
        }
        if any_succeeded {
            if let Some(reason) = last_error {
                tracing::warn!(reason, "publish succeeded on some watchers but not all");
            }
            Ok(())
        } else {
            Err(SwitchError::SubstrateUnavailable {
                watcher: None,
                reason: last_error.unwrap_or_else(|| "no watcher endpoints configured".to_string()),
            })
        }
    }

    async fn subscribe(&self, topic: Topic) -> Result<BoxStream<'static, Record>, SwitchError> {
        let (kind, switch_id) = Self::topic_path(topic);
        let urls: Vec<String> = self
            .watcher_urls
            .iter()
            .map(|base_url| format!("{base_url}/substrate/{kind}/{switch_id}/snapshot"))
            .collect();
        let client = self.client.clone();
        let poll_interval = self.poll_interval;

        struct State {
            client: reqwest::Client,
            urls: Vec<String>,
            poll_interval: Duration,
            seen_serialized: HashSet<String>,
            pending: std::collections::VecDeque<Record>,
        }

        let state = State {
            client,
            urls,
            poll_interval,
            seen_serialized: HashSet::new(),
            pending: std::collections::VecDeque::new(),
        };

        Ok(Box::pin(futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(record) = state.pending.pop_front() {
                    return Some((record, state));
                }
                for url in state.urls.clone() {
                    let response = match state.client.get(&url).send().await {
                        Ok(response) => response,
                        Err(err) => {
                            tracing::warn!(%err, %url, "substrate snapshot poll failed, retrying");
                            continue;
                        }
                    };
                    let records: Vec<Record> = match response.json().await {
                        Ok(records) => records,
                        Err(err) => {
                            tracing::warn!(%err, %url, "malformed substrate snapshot, retrying");
                            continue;
                        }
                    };
                    for record in records {
                        let serialized = match serde_json::to_string(&record) {
                            Ok(serialized) => serialized,
                            Err(_) => continue,
                        };
                        if state.seen_serialized.insert(serialized) {
                            state.pending.push_back(record);
                        }
                    }
                }
                if let Some(record) = state.pending.pop_front() {
                    return Some((record, state));
                }
                tokio::time::sleep(state.poll_interval).await;
            }
        })))
    }
}
