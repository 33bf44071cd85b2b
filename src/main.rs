//! Channel relay.
//!
//! A WebSocket relay: clients connect, upgrade, join named channels and
//! exchange events that are fanned out to every member of a channel.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                  CHANNEL RELAY                   │
//!                 │                                                  │
//!   Client ───────┼─▶ net::listener ─▶ net::connection (reader task) │
//!                 │                         │ SocketEvent            │
//!                 │                         ▼                        │
//!                 │                  relay::engine (single writer)   │
//!                 │                  ├─ protocol (handshake, frames) │
//!                 │                  ├─ registry + directory         │
//!                 │                  ├─ router (FIFO outbox)         │
//!                 │                  └─ heartbeat                    │
//!                 │                         │ FrameSink              │
//!   Client ◀──────┼──────────── net::connection (writer task)        │
//!                 │                                                  │
//!   Operator ─────┼─▶ admin (axum) ─▶ RelayHandle ─▶ engine          │
//!                 │                                                  │
//!                 │  config (TOML + watcher) · store · observability │
//!                 └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use channel_relay::admin;
use channel_relay::config::{load_config, RelayConfig};
use channel_relay::config::watcher::ConfigWatcher;
use channel_relay::lifecycle::Shutdown;
use channel_relay::net::Listener;
use channel_relay::observability::{logging, metrics};
use channel_relay::relay::{Engine, SystemClock};
use channel_relay::store::MemoryStore;

const STORE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "channel-relay", version, about = "WebSocket channel relay")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on; overrides the configured listener port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(port) = args.port {
        config.listener.bind_address = with_port(&config.listener.bind_address, port);
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "channel-relay starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        default_channel = %config.channels.default_channel,
        heartbeat_timeout_secs = config.heartbeat.timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // A listener that cannot bind is fatal.
    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let store = MemoryStore::new();
    {
        let store = store.clone();
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STORE_PURGE_INTERVAL);
            loop {
                tokio::select! {
                    _ = stop.recv() => break,
                    _ = interval.tick() => {
                        let purged = store.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, "Expired store entries purged");
                        }
                    }
                }
            }
        });
    }

    let admin_config = config.admin.clone();
    let running = config.clone();
    let (mut engine, handle) = Engine::new(
        config,
        listener,
        Arc::new(store),
        Arc::new(SystemClock),
    );

    // Keep the watcher alive for the life of the process.
    let _watcher = match &args.config {
        Some(path) => {
            let (mut watcher, updates) = ConfigWatcher::new(path, running);
            if let Some(port) = args.port {
                watcher = watcher.with_override(move |config| {
                    config.listener.bind_address = with_port(&config.listener.bind_address, port);
                });
            }
            engine = engine.with_config_updates(updates);
            match watcher.run() {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload unavailable");
                    None
                }
            }
        }
        None => None,
    };

    if admin_config.enabled {
        let admin_listener = tokio::net::TcpListener::bind(&admin_config.bind_address).await?;
        let stop = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(admin_listener, &admin_config, handle, stop).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    engine.run(shutdown.subscribe()).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Replace the port of a `host:port` bind address.
fn with_port(bind_address: &str, port: u16) -> String {
    match bind_address.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("0.0.0.0:{port}"),
    }
}
