//! Minimal local replacement for the Taceo-internal `nodes-observability`
//! crate, which this workspace does not depend on (see `DESIGN.md`).
//!
//! Initializes a `tracing-subscriber` `fmt` layer driven by `RUST_LOG`
//! (default `info`), the same shape `oprf-key-gen`'s binary wires up
//! through `nodes_observability::initialize_tracing`, minus the
//! Taceo-specific exporters.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs a global `tracing` subscriber. Call once, at process start.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
