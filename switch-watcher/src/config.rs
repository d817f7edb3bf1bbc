//! Configuration types and CLI/environment parsing for a switch-watcher
//! instance.
//!
//! Mirrors the shape of a TACEO:OPRF node config: a single `clap::Parser`
//! struct with `#[clap(long, env = "...")]` fields and
//! `humantime::parse_duration` value parsers for durations.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use secrecy::SecretString;

/// The environment a watcher is running in.
///
/// Production mode enforces the watcher-key configuration check
/// described in `DESIGN.md`: a watcher refuses to start in `Prod` with
/// an unconfigured (all-zero or default) signing key.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Environment {
    /// Production environment: refuses to start with placeholder keys.
    Prod,
    /// Development environment: placeholder keys are tolerated.
    Dev,
}

impl Environment {
    /// Asserts that `Environment` is `dev`. Panics if not the case.
    pub fn assert_is_dev(&self) {
        assert!(matches!(self, Environment::Dev), "is not dev environment")
    }
}

/// The configuration for a switch-watcher instance.
///
/// It can be configured via environment variables or command line
/// arguments using `clap`. Field names follow the configuration options
/// enumerated for the release pipeline.
#[derive(Parser, Debug)]
pub struct WatcherConfig {
    /// The environment of this watcher (either `prod` or `dev`).
    #[clap(long, env = "SWITCH_WATCHER_ENVIRONMENT", default_value = "prod")]
    pub environment: Environment,

    /// The bind address of the axum health server.
    #[clap(long, env = "SWITCH_WATCHER_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// This watcher's hex-encoded secp256k1 signing scalar, used to sign
    /// release records. Must not be the zero key in production.
    #[clap(long, env = "SWITCH_WATCHER_SIGNING_KEY")]
    pub signing_key_hex: SecretString,

    /// This watcher's hex-encoded X25519 sealed-box secret scalar, used
    /// to unseal the share addressed to it at enrollment.
    #[clap(long, env = "SWITCH_WATCHER_UNSEAL_KEY")]
    pub unseal_key_hex: SecretString,

    /// The refresh period owners must heartbeat within. Individual
    /// switches may carry their own interval; this is the default used
    /// when enrolling through `switch-cli` against this watcher.
    #[clap(
        long,
        env = "SWITCH_WATCHER_HEARTBEAT_INTERVAL",
        default_value = "24h",
        value_parser = humantime::parse_duration
    )]
    pub heartbeat_interval: Duration,

    /// Tolerance added to a switch's deadline before it is considered
    /// `Expired`.
    #[clap(
        long,
        env = "SWITCH_WATCHER_GRACE",
        default_value = "0s",
        value_parser = humantime::parse_duration
    )]
    pub grace: Duration,

    /// Ordered list of substrate node addresses this watcher publishes
    /// to and subscribes from.
    #[clap(long, env = "SWITCH_WATCHER_SUBSTRATE_ENDPOINTS", value_delimiter = ',')]
    pub substrate_endpoints: Vec<String>,

    /// Minimum number of substrate nodes a publish must reach
    /// (`K_min`) before a heartbeat or release is considered durable.
    #[clap(long, env = "SWITCH_WATCHER_MIN_SUBSTRATE_FANOUT", default_value = "7")]
    pub min_substrate_fanout: NonZeroU32,

    /// Minimum PBKDF2 iteration count this watcher will accept when
    /// validating enrollment parameters it observes.
    #[clap(long, env = "SWITCH_WATCHER_KDF_ITERATIONS", default_value = "600000")]
    pub kdf_iterations: u32,

    /// Ordered lead times, relative to a switch's deadline, at which the
    /// monitor dispatches an owner reminder.
    #[clap(
        long,
        env = "SWITCH_WATCHER_REMINDER_THRESHOLDS_HOURS",
        value_delimiter = ',',
        default_value = "24,6,1"
    )]
    pub reminder_thresholds_hours: Vec<u64>,

    /// Fraction of a switch's interval that must elapse without a
    /// refresh before it moves from `Armed` to `Warning`.
    #[clap(long, env = "SWITCH_WATCHER_WARNING_FRACTION", default_value = "0.75")]
    pub warning_fraction: f64,

    /// How often the timer & monitor task re-evaluates every switch.
    #[clap(
        long,
        env = "SWITCH_WATCHER_MONITOR_INTERVAL",
        default_value = "5min",
        value_parser = humantime::parse_duration
    )]
    pub monitor_interval: Duration,

    /// Tolerance for how far in the future a heartbeat's timestamp may be
    /// relative to this watcher's clock before it is rejected as invalid.
    #[clap(
        long,
        env = "SWITCH_WATCHER_CLOCK_SKEW_TOLERANCE",
        default_value = "5min",
        value_parser = humantime::parse_duration
    )]
    pub clock_skew_tolerance: Duration,

    /// Per-request substrate timeout.
    #[clap(
        long,
        env = "SWITCH_WATCHER_SUBSTRATE_TIMEOUT",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub substrate_timeout: Duration,

    /// Max time the service waits for its background tasks during
    /// shutdown.
    #[clap(
        long,
        env = "SWITCH_WATCHER_MAX_WAIT_TIME_SHUTDOWN",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub max_wait_time_shutdown: Duration,

    /// The connection string for the Postgres DB, when built with the
    /// `postgres` feature. Ignored by the in-memory store.
    #[clap(long, env = "SWITCH_WATCHER_DB_CONNECTION_STRING")]
    pub db_connection_string: Option<SecretString>,

    /// The schema used for the DB, when built with the `postgres`
    /// feature.
    #[clap(long, env = "SWITCH_WATCHER_DB_SCHEMA", default_value = "switch_watcher")]
    pub db_schema: String,

    /// Max connections for the Postgres pool, when built with the
    /// `postgres` feature.
    #[clap(long, env = "SWITCH_WATCHER_DB_MAX_CONNECTIONS", default_value = "4")]
    pub db_max_connections: NonZeroU32,
}
