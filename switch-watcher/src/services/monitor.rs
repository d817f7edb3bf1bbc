//! The timer & monitor loop (§4.10): on a fixed interval, re-evaluates
//! every switch in the table against the heartbeat and cancellation
//! topics, drives the `Armed -> Warning -> Expired` transitions, hands
//! expired switches to [`super::release_fsm`], and dispatches owner
//! reminders as configured lead times are crossed.
//!
//! Ingestion is poll-based rather than a held-open subscription: each
//! tick takes a bounded [`super::collect::snapshot`] of the heartbeat
//! and cancellation topics, picks the authoritative (latest, signature
//! verified) record, and applies it. A switch that received no new
//! heartbeat since the last tick is simply a no-op pass for that topic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{CryptoRng, RngCore};
use switch_types::error::SwitchError;
use switch_types::ids::SwitchId;
use switch_types::records::{CancellationRecord, HeartbeatRecord};
use switch_types::store::SwitchStore;
use switch_types::substrate::{Record, Substrate, Topic};
use switch_types::switch::SwitchState;
use tracing::instrument;
use uuid::Uuid;

use crate::identity::WatcherIdentity;

use super::{collect, release_fsm};

/// Dispatches an owner reminder. Email/push delivery is out of scope
/// for this workspace (§1's non-goals); [`TracingReminderSink`] is the
/// shipped implementation, logging the event at the point a real
/// notification channel would be invoked.
#[async_trait]
pub trait ReminderSink: Send + Sync {
    /// Called once per `(switch, threshold)` pair, the first tick that
    /// observes fewer than `lead_time` remaining before the deadline.
    async fn send_reminder(&self, switch_id: SwitchId, owner_id: Uuid, lead_time: Duration);
}

/// Logs reminders via `tracing` instead of sending them anywhere.
pub struct TracingReminderSink;

#[async_trait]
impl ReminderSink for TracingReminderSink {
    async fn send_reminder(&self, switch_id: SwitchId, owner_id: Uuid, lead_time: Duration) {
        tracing::info!(%switch_id, %owner_id, ?lead_time, "owner reminder due");
    }
}

/// Configuration the monitor loop needs beyond the switch table itself.
#[derive(Clone)]
pub struct MonitorConfig {
    /// How often the loop re-evaluates every switch.
    pub tick_interval: Duration,
    /// Added to a switch's deadline before it is considered `Expired`.
    pub grace: Duration,
    /// Fraction of the interval elapsed before `Armed` moves to `Warning`.
    pub warning_fraction: f64,
    /// Lead times, relative to deadline, at which a reminder fires.
    pub reminder_thresholds: Vec<Duration>,
    /// Tolerance for heartbeat clock skew.
    pub clock_skew_tolerance: Duration,
    /// Per-topic snapshot timeout.
    pub snapshot_timeout: Duration,
}

/// Tracks which `(switch, threshold)` reminders have already fired, so
/// the loop does not repeat them every tick. Transient: lost on
/// restart, which only means a reminder might repeat once after a
/// restart, not that any state transition is affected.
#[derive(Default)]
struct ReminderState {
    fired: HashMap<SwitchId, HashSet<Duration>>,
}

/// Runs the monitor loop until `cancellation_token` fires.
pub struct Monitor<Store, Sub, Sink, Rng> {
    store: Arc<Store>,
    substrate: Arc<Sub>,
    identity: Arc<WatcherIdentity>,
    reminders: Arc<Sink>,
    rng: Arc<Mutex<Rng>>,
    config: MonitorConfig,
    reminder_state: Mutex<ReminderState>,
}

impl<Store, Sub, Sink, Rng> Monitor<Store, Sub, Sink, Rng>
where
    Store: SwitchStore,
    Sub: Substrate,
    Sink: ReminderSink,
    Rng: RngCore + CryptoRng,
{
    /// Builds a monitor over the given switch table and substrate.
    pub fn new(
        store: Arc<Store>,
        substrate: Arc<Sub>,
        identity: Arc<WatcherIdentity>,
        reminders: Arc<Sink>,
        rng: Rng,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            substrate,
            identity,
            reminders,
            rng: Arc::new(Mutex::new(rng)),
            config,
            reminder_state: Mutex::new(ReminderState::default()),
        }
    }

    /// Runs one evaluation pass over every switch currently in the table.
    #[instrument(skip_all)]
    pub async fn tick(&self, now: SystemTime) -> Result<(), SwitchError> {
        for id in self.store.list_ids().await? {
            if let Err(err) = self.evaluate_switch(id, now).await {
                tracing::warn!(switch_id = %id, %err, "monitor tick failed for switch");
            }
        }
        Ok(())
    }

    /// Runs [`Monitor::tick`] on `config.tick_interval` until cancelled.
    pub async fn run(&self, cancellation_token: tokio_util::sync::CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    tracing::info!("monitor loop shutting down");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(err) = self.tick(SystemTime::now()).await {
                        tracing::error!(%err, "monitor tick encountered a store error");
                    }
                }
            }
        }
    }

    async fn evaluate_switch(&self, id: SwitchId, now: SystemTime) -> Result<(), SwitchError> {
        let Some(switch) = self.store.get(id).await? else {
            return Ok(());
        };
        if switch.state().is_terminal() {
            return Ok(());
        }

        self.ingest_cancellation(id, switch.owner_signing_public_key(), now).await?;
        self.ingest_heartbeat(id, switch.owner_signing_public_key(), now).await?;

        let Some(switch) = self.store.get(id).await? else {
            return Ok(());
        };
        if switch.state().is_terminal() {
            return Ok(());
        }

        self.dispatch_reminders(&switch, now).await;

        let warning_fraction = self.config.warning_fraction;
        let grace = self.config.grace;
        self.store
            .update(
                id,
                Box::new(move |s| {
                    s.evaluate_warning(now, warning_fraction);
                    s.evaluate_expiry(now, grace);
                    Ok(())
                }),
            )
            .await?;

        let Some(switch) = self.store.get(id).await? else {
            return Ok(());
        };
        if switch.state() == SwitchState::Expired {
            let published = {
                let mut rng = self.rng.lock();
                release_fsm::publish_release_if_expired(
                    &switch,
                    &self.identity,
                    self.substrate.as_ref(),
                    self.config.snapshot_timeout,
                    now,
                    &mut *rng,
                )
                .await?
            };
            if published {
                let _ = self.store.update(id, Box::new(|s| s.begin_releasing())).await;
            }
        }

        if matches!(switch.state(), SwitchState::Expired | SwitchState::Releasing) {
            let reached = release_fsm::quorum_reached(&switch, self.substrate.as_ref(), self.config.snapshot_timeout).await?;
            if reached {
                self.store.update(id, Box::new(|s| { s.mark_released(); Ok(()) })).await?;
                tracing::info!(switch_id = %id, "switch reached quorum and is released");
            }
        }

        Ok(())
    }

    async fn ingest_heartbeat(
        &self,
        id: SwitchId,
        owner_key: switch_core::schnorr::PublicKey,
        now: SystemTime,
    ) -> Result<(), SwitchError> {
        let records = collect::snapshot(self.substrate.as_ref(), Topic::Heartbeat(id), self.config.snapshot_timeout).await?;
        let verified: Vec<HeartbeatRecord> = records
            .into_iter()
            .filter_map(|record| match record {
                Record::Heartbeat(hb) if hb.switch_id() == id => Some(hb),
                _ => None,
            })
            .filter(|hb| hb.verify(owner_key, now, self.config.clock_skew_tolerance))
            .collect();
        let Some(latest) = HeartbeatRecord::authoritative(&verified) else {
            return Ok(());
        };
        let timestamp = latest.timestamp();
        let result = self.store.update(id, Box::new(move |s| s.refresh(timestamp))).await;
        match result {
            Ok(()) | Err(SwitchError::StateConflict(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn ingest_cancellation(
        &self,
        id: SwitchId,
        owner_key: switch_core::schnorr::PublicKey,
        _now: SystemTime,
    ) -> Result<(), SwitchError> {
        let records = collect::snapshot(
            self.substrate.as_ref(),
            Topic::Cancellation(id),
            self.config.snapshot_timeout,
        )
        .await?;
        let verified = records.into_iter().any(|record| match record {
            Record::Cancellation(c) => c.switch_id() == id && c.verify(owner_key),
            _ => false,
        });
        if !verified {
            return Ok(());
        }
        let result = self.store.update(id, Box::new(|s| s.cancel())).await;
        match result {
            Ok(()) | Err(SwitchError::StateConflict(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn dispatch_reminders(&self, switch: &switch_types::switch::Switch, now: SystemTime) {
        if switch.state() != SwitchState::Armed && switch.state() != SwitchState::Warning {
            return;
        }
        let Ok(remaining) = switch.deadline().duration_since(now) else {
            return;
        };
        for &lead_time in &self.config.reminder_thresholds {
            if remaining > lead_time {
                continue;
            }
            let already_fired = {
                let mut state = self.reminder_state.lock();
                let fired = state.fired.entry(switch.id()).or_default();
                !fired.insert(lead_time)
            };
            if already_fired {
                continue;
            }
            self.reminders.send_reminder(switch.id(), switch.owner_id(), lead_time).await;
        }
    }
}
