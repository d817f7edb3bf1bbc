#![deny(missing_docs)]
//! The watcher daemon for the dead man's switch release pipeline.
//!
//! A watcher holds one Shamir share per enrolled switch, persists the
//! switch table ([`services::switch_store`]), runs the timer & monitor
//! loop ([`services::monitor`]) that drives the `Armed -> Warning ->
//! Expired` transitions and dispatches owner reminders, and publishes
//! its own release record once a switch it watches expires
//! ([`services::release_fsm`]).
//!
//! [`start`] wires these services together and returns an `axum::Router`
//! plus the background tasks it spawned, mirroring the shape of
//! `taceo-oprf-key-gen::start` - the hosting binary (`src/bin/switch-watcher.rs`)
//! owns the TCP listener and the graceful-shutdown orchestration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::Context as _;
use rand::rngs::StdRng;
use rand::SeedableRng;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use switch_types::error::SwitchError;
use switch_types::ids::SwitchId;
use switch_types::store::SwitchStore;
use switch_types::switch::Switch;

pub(crate) mod api;
pub mod config;
pub mod identity;
pub mod observability;
pub mod services;

use config::WatcherConfig;
use identity::WatcherIdentity;
use services::monitor::{Monitor, MonitorConfig, TracingReminderSink};
use services::substrate::LocalSubstrate;
use services::switch_store::DashMapSwitchStore;
#[cfg(feature = "postgres")]
use services::switch_store::postgres::PostgresSwitchStore;

/// The switch table backing a running watcher: an in-memory map, or,
/// with the `postgres` feature enabled and `db_connection_string`
/// configured, a durable Postgres-backed table. Dispatches manually
/// rather than going through a `Box<dyn SwitchStore>` so [`Monitor`]
/// keeps a concrete, non-dynamic type parameter.
#[derive(Clone)]
pub enum Store {
    /// The in-process table. Does not survive a process restart.
    Memory(Arc<DashMapSwitchStore>),
    /// The Postgres-backed table, available with the `postgres` feature.
    #[cfg(feature = "postgres")]
    Postgres(Arc<PostgresSwitchStore>),
}

#[async_trait]
impl SwitchStore for Store {
    async fn insert(&self, switch: Switch) -> Result<(), SwitchError> {
        match self {
            Store::Memory(store) => store.insert(switch).await,
            #[cfg(feature = "postgres")]
            Store::Postgres(store) => store.insert(switch).await,
        }
    }

    async fn get(&self, id: SwitchId) -> Result<Option<Switch>, SwitchError> {
        match self {
            Store::Memory(store) => store.get(id).await,
            #[cfg(feature = "postgres")]
            Store::Postgres(store) => store.get(id).await,
        }
    }

    async fn update(
        &self,
        id: SwitchId,
        f: Box<dyn FnOnce(&mut Switch) -> Result<(), SwitchError> + Send + '_>,
    ) -> Result<(), SwitchError> {
        match self {
            Store::Memory(store) => store.update(id, f).await,
            #[cfg(feature = "postgres")]
            Store::Postgres(store) => store.update(id, f).await,
        }
    }

    async fn list_ids(&self) -> Result<Vec<SwitchId>, SwitchError> {
        match self {
            Store::Memory(store) => store.list_ids().await,
            #[cfg(feature = "postgres")]
            Store::Postgres(store) => store.list_ids().await,
        }
    }
}

/// Background tasks spawned by [`start`]. The hosting binary should
/// join this (alongside the axum server) after cancelling the
/// [`CancellationToken`] passed to `start`, to shut down gracefully.
pub struct WatcherTasks {
    monitor: tokio::task::JoinHandle<()>,
}

impl WatcherTasks {
    /// Waits for the monitor loop to finish. Only returns once the
    /// cancellation token passed to [`start`] has fired and the loop has
    /// observed it.
    pub async fn join(self) -> eyre::Result<()> {
        self.monitor.await.context("monitor task panicked")
    }
}

fn reminder_thresholds(hours: &[u64]) -> Vec<Duration> {
    hours.iter().map(|h| Duration::from_secs(h * 3600)).collect()
}

/// Whether `hex_str` decodes to a non-empty all-zero byte string - the
/// shape of a placeholder key left at its default rather than replaced
/// with real key material. Malformed hex is not this function's concern;
/// `WatcherIdentity::load` rejects that on its own.
fn is_all_zero_hex(hex_str: &str) -> bool {
    match hex::decode(hex_str) {
        Ok(bytes) => !bytes.is_empty() && bytes.iter().all(|&b| b == 0),
        Err(_) => false,
    }
}

/// Initializes a watcher instance: loads this watcher's identity,
/// constructs its switch table (in-memory, or Postgres if the
/// `postgres` feature is enabled and a connection string is
/// configured), spawns the monitor loop, and builds the axum `Router`
/// that serves the health check and the owner/recipient-facing HTTP
/// API (`src/api.rs`).
///
/// In `Environment::Prod`, refuses to start if the *configured* signing
/// or unsealing key is the all-zero placeholder - checked against the raw
/// hex before the identity is ever constructed, since a zero-scalar
/// signing key already fails to load in any environment but a zero X25519
/// unseal scalar loads successfully (it clamps to a valid, merely
/// predictable, scalar). See `DESIGN.md` for why an unconfigured key is
/// rejected only in production rather than at the type level.
pub async fn start(
    config: WatcherConfig,
    cancellation_token: CancellationToken,
) -> eyre::Result<(axum::Router, WatcherTasks)> {
    if matches!(config.environment, config::Environment::Prod) {
        if is_all_zero_hex(config.signing_key_hex.expose_secret()) {
            eyre::bail!("refusing to start in production with an unconfigured (all-zero) signing key");
        }
        if is_all_zero_hex(config.unseal_key_hex.expose_secret()) {
            eyre::bail!("refusing to start in production with an unconfigured (all-zero) unseal key");
        }
    }
    let identity = WatcherIdentity::load(&config.signing_key_hex, &config.unseal_key_hex)
        .context("while loading watcher identity")?;
    let identity = Arc::new(identity);

    let store = build_store(&config).await?;
    let substrate = Arc::new(LocalSubstrate::new());

    let monitor = Monitor::new(
        Arc::new(store.clone()),
        substrate.clone(),
        identity,
        Arc::new(TracingReminderSink),
        StdRng::from_entropy(),
        MonitorConfig {
            tick_interval: config.monitor_interval,
            grace: config.grace,
            warning_fraction: config.warning_fraction,
            reminder_thresholds: reminder_thresholds(&config.reminder_thresholds_hours),
            clock_skew_tolerance: config.clock_skew_tolerance,
            snapshot_timeout: config.substrate_timeout,
        },
    );

    let monitor_token = cancellation_token.clone();
    let monitor_task = tokio::spawn(async move { monitor.run(monitor_token).await });

    let state = api::ApiState {
        store: Arc::new(store),
        substrate,
        snapshot_timeout: config.substrate_timeout,
    };
    let router = api::routes(state).layer(TraceLayer::new_for_http());

    Ok((router, WatcherTasks { monitor: monitor_task }))
}

async fn build_store(config: &WatcherConfig) -> eyre::Result<Store> {
    #[cfg(feature = "postgres")]
    if let Some(connection_string) = &config.db_connection_string {
        let store = PostgresSwitchStore::init(connection_string, &config.db_schema, config.db_max_connections)
            .await
            .context("while connecting to the watcher's Postgres store")?;
        return Ok(Store::Postgres(Arc::new(store)));
    }
    let _ = config;
    Ok(Store::Memory(Arc::new(DashMapSwitchStore::new())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::net::SocketAddr;
    use std::num::NonZeroU32;

    fn base_config(environment: config::Environment, signing_key_hex: String, unseal_key_hex: String) -> WatcherConfig {
        WatcherConfig {
            environment,
            bind_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
            signing_key_hex: SecretString::from(signing_key_hex),
            unseal_key_hex: SecretString::from(unseal_key_hex),
            heartbeat_interval: Duration::from_secs(3600),
            grace: Duration::ZERO,
            substrate_endpoints: Vec::new(),
            min_substrate_fanout: NonZeroU32::new(7).unwrap(),
            kdf_iterations: 600_000,
            reminder_thresholds_hours: vec![24, 6, 1],
            warning_fraction: 0.75,
            monitor_interval: Duration::from_secs(300),
            clock_skew_tolerance: Duration::from_secs(300),
            substrate_timeout: Duration::from_secs(10),
            max_wait_time_shutdown: Duration::from_secs(10),
            db_connection_string: None,
            db_schema: "switch_watcher".to_string(),
            db_max_connections: NonZeroU32::new(4).unwrap(),
        }
    }

    #[test]
    fn all_zero_hex_detects_placeholder_bytes() {
        assert!(is_all_zero_hex(&hex::encode([0u8; 32])));
        assert!(!is_all_zero_hex(&hex::encode([1u8; 32])));
        assert!(!is_all_zero_hex("not-hex"));
        assert!(!is_all_zero_hex(""));
    }

    #[tokio::test]
    async fn prod_refuses_an_all_zero_signing_key() {
        let config = base_config(
            config::Environment::Prod,
            hex::encode([0u8; 32]),
            hex::encode([9u8; 32]),
        );
        let result = start(config, CancellationToken::new()).await;
        assert!(result.is_err(), "must refuse a placeholder signing key in production");
    }

    #[tokio::test]
    async fn prod_refuses_an_all_zero_unseal_key() {
        let config = base_config(
            config::Environment::Prod,
            hex::encode([7u8; 32]),
            hex::encode([0u8; 32]),
        );
        let result = start(config, CancellationToken::new()).await;
        assert!(result.is_err(), "must refuse a placeholder unseal key in production");
    }

    #[tokio::test]
    async fn dev_tolerates_an_all_zero_unseal_key() {
        let config = base_config(
            config::Environment::Dev,
            hex::encode([7u8; 32]),
            hex::encode([0u8; 32]),
        );
        let token = CancellationToken::new();
        let result = start(config, token.clone()).await;
        assert!(result.is_ok(), "dev environment tolerates placeholder keys");
        token.cancel();
    }
}
