//! Watcher daemon binary.
//!
//! Parses [`switch_watcher::config::WatcherConfig`], starts the service
//! via [`switch_watcher::start`], and runs the axum server and the
//! monitor loop until a shutdown signal arrives, waiting up to
//! `max_wait_time_shutdown` for both to finish before exiting.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::Context as _;
use switch_watcher::config::WatcherConfig;

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    switch_watcher::observability::init_tracing();

    let config = WatcherConfig::parse();
    tracing::info!(bind_addr = %config.bind_addr, environment = ?config.environment, "starting switch-watcher");

    let cancellation_token = tokio_util::sync::CancellationToken::new();
    let is_graceful_shutdown = Arc::new(AtomicBool::new(true));
    tokio::spawn({
        let cancellation_token = cancellation_token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received shutdown signal");
            }
            cancellation_token.cancel();
        }
    });

    let bind_addr = config.bind_addr;
    let max_wait_time_shutdown = config.max_wait_time_shutdown;
    let (router, watcher_tasks) = switch_watcher::start(config, cancellation_token.clone())
        .await
        .context("while starting watcher service")?;

    let tcp_listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .context("while binding tcp listener")?;

    let server_cancel = cancellation_token.clone();
    let server = tokio::spawn(async move {
        tracing::info!(%bind_addr, "serving switch-watcher http api");
        let shutdown = server_cancel.clone();
        let result = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(err) = result {
            tracing::error!(%err, "axum server exited with an error");
        }
        server_cancel.cancel();
    });

    cancellation_token.cancelled().await;
    tracing::info!(?max_wait_time_shutdown, "waiting for services to shut down");

    match tokio::time::timeout(max_wait_time_shutdown, async {
        tokio::join!(server, watcher_tasks.join())
    })
    .await
    {
        Ok(_) => tracing::info!("shutdown completed within the configured budget"),
        Err(_) => {
            is_graceful_shutdown.store(false, Ordering::Relaxed);
            tracing::warn!("shutdown did not complete within the configured budget");
        }
    }

    if is_graceful_shutdown.load(Ordering::Relaxed) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
