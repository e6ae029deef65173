//! presenced - real-time presence daemon.
//!
//! Tracks which authenticated WebSocket clients are live through heartbeats
//! and broadcasts the membership view to every subscribed client.

mod auth;
mod config;
mod error;
mod http;
mod metrics;
mod network;
mod profiles;
mod services;
mod state;
mod telemetry;

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::auth::JwtAuthenticator;
use crate::config::{Config, LogFormat};
use crate::network::{Dispatcher, Gateway, Outboxes};
use crate::profiles::ProfileDirectory;
use crate::services::{join_all, spawn_broadcaster, spawn_heartbeat_monitor};
use crate::state::{ConnectionRegistry, Fanout, LifecycleManager, SystemClock};

/// Pending disconnect requests before new ones are dropped.
const DISCONNECT_QUEUE: usize = 1024;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "presenced.toml".to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    init_tracing(config.server.log_format);

    if let Err(errors) = crate::config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    info!(
        server = %config.server.name,
        listen = %config.listen.address,
        profiles = config.profiles.len(),
        "Starting presenced"
    );

    // Presence core
    let outboxes = Arc::new(Outboxes::new(config.listen.outbox_capacity));
    let profiles = Arc::new(ProfileDirectory::from_blocks(&config.profiles));
    let fanout = Arc::new(Fanout::new(outboxes.clone(), profiles));
    let authenticator = Arc::new(JwtAuthenticator::new(
        &config.auth.jwt_secret,
        config.auth.leeway_secs,
    ));
    let registry = Arc::new(ConnectionRegistry::new(
        authenticator,
        fanout,
        Arc::new(SystemClock),
        config.presence.registry_limits(),
    ));

    // Lifecycle
    let (disconnect_tx, mut disconnect_rx) = mpsc::channel(DISCONNECT_QUEUE);
    let lifecycle = Arc::new(LifecycleManager::new(disconnect_tx));

    // Disconnect worker: closes transports the background tasks gave up on.
    {
        let outboxes = Arc::clone(&outboxes);
        tokio::spawn(async move {
            while let Some((conn, reason)) = disconnect_rx.recv().await {
                if !outboxes.request_close(conn, &reason) {
                    tracing::debug!(%conn, "Disconnect requested for unknown connection");
                }
            }
        });
    }

    // Exactly one monitor and one broadcaster per process.
    let monitor = spawn_heartbeat_monitor(
        Arc::clone(&registry),
        Arc::clone(&lifecycle),
        config.presence.sweep_interval(),
    );
    let broadcaster = spawn_broadcaster(
        Arc::clone(&registry),
        Arc::clone(&lifecycle),
        config.presence.broadcast_interval(),
    );

    // Metrics
    if config.server.metrics_port != 0 {
        metrics::init();
        let port = config.server.metrics_port;
        let shutdown_rx = lifecycle.subscribe_shutdown();
        tokio::spawn(async move {
            http::run_http_server(port, shutdown_rx).await;
        });
    }

    // Ctrl-C triggers shutdown
    {
        let lifecycle = Arc::clone(&lifecycle);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl-C - shutting down");
                    lifecycle.shutdown();
                }
                Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });
    }

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry)));
    let gateway = Gateway::bind(
        config.listen.clone(),
        dispatcher,
        outboxes,
        Arc::clone(&lifecycle),
    )
    .await
    .with_context(|| format!("failed to bind {}", config.listen.address))?;
    info!(address = %gateway.local_addr()?, "Listening for WebSocket clients");

    gateway.run().await?;

    join_all(vec![("heartbeat monitor", monitor), ("broadcaster", broadcaster)]).await;
    info!("presenced stopped");
    Ok(())
}
