//! Warden: headless VPN client daemon
//!
//! Runs the session controller against the simulated backend and reads
//! trigger events, one per line, from stdin:
//!
//! ```text
//! quick-connect-request
//! connect-request:de-fra-1
//! disconnect-request
//! navigate:/settings
//! ```
//!
//! Usage: `warden [config.toml|config.json]`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warden_session::{trigger_channel, ClientConfig, SimulatedBackend, TriggerEvent, VpnClient};

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => ClientConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    };

    // Initialize logging; RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log_level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Warden starting...");

    let backend = Arc::new(SimulatedBackend::new());
    let client = VpnClient::new(backend, config).context("creating VPN client")?;
    info!("Backend version {}", client.app_version().await);

    if let Err(e) = client.start().await {
        warn!("Auto-connect failed: {}", e);
    }

    let (trigger_tx, trigger_rx) = trigger_channel(client.config().trigger_queue_capacity);
    let (nav_tx, mut nav_rx) = mpsc::unbounded_channel();
    let bridge = client.activate_bridge(trigger_rx, nav_tx);

    tokio::spawn(async move {
        while let Some(path) = nav_rx.recv().await {
            info!("Navigate to {}", path);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "status" {
            info!("{}", client.status().await);
            continue;
        }

        match TriggerEvent::parse(line) {
            Some(event) => {
                if trigger_tx.send(event).await.is_err() {
                    warn!("Trigger bridge is gone");
                    break;
                }
            }
            None => warn!("Unknown trigger: {}", line),
        }
    }

    bridge.deactivate().await;

    let state = client.controller().state().await;
    if state.is_connected() || state.is_transitioning() {
        if let Err(e) = client.controller().disconnect().await {
            warn!("Disconnect on shutdown failed: {}", e);
        }
    }

    info!("{}", client.status().await);
    info!("Warden shutting down");
    Ok(())
}
