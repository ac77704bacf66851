//! PeerScan demo entry point.
//!
//! Runs one discovery session against the simulated radio and prints the
//! devices found.  A native radio shim replaces the two simulated shims
//! below without changing anything else.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config_or_default()       -- config.toml or defaults
//!  └─ SimulatedRadio / SimulatedPermissions
//!  └─ DiscoverySessionCoordinator::new(...)
//!       └─ attach callbacks to the shims
//!  └─ start_discovery → wait for Idle / Error / Ctrl-C → print devices
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use peerscan::application::discovery_session::{DiscoverySessionCoordinator, StartOutcome};
use peerscan::infrastructure::platform::simulated::{SimulatedPermissions, SimulatedRadio};
use peerscan::infrastructure::storage::config::{load_config_from, load_config_or_default};
use peerscan::infrastructure::ui_bridge::AppState;
use peerscan_core::SessionState;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Nearby peer discovery demo.
#[derive(Debug, Parser)]
#[command(
    name = "peerscan",
    about = "Discover nearby peers using the PeerScan session coordinator",
    version
)]
struct Cli {
    /// Path to a config.toml.  Defaults to the platform config directory.
    #[arg(long, env = "PEERSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set.  Overrides the config file.
    #[arg(long, env = "PEERSCAN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Number of peers the simulated radio reports.
    #[arg(long, default_value_t = 5)]
    simulated_peers: usize,

    /// Milliseconds between simulated device reports.
    #[arg(long, default_value_t = 250)]
    emit_interval_ms: u64,

    /// Start with the simulated radio switched off.
    #[arg(long)]
    radio_disabled: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => load_config_or_default().context("failed to load config")?,
    };

    // `RUST_LOG` wins; otherwise --log-level, then the config file.
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.general.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
        )
        .init();

    info!("PeerScan starting");

    // ── Platform shims ────────────────────────────────────────────────────────
    let radio = if cli.radio_disabled {
        SimulatedRadio::disabled()
    } else {
        SimulatedRadio::new()
    };
    let radio = Arc::new(
        radio
            .with_peers(SimulatedRadio::demo_peers(cli.simulated_peers))
            .with_emit_interval(Duration::from_millis(cli.emit_interval_ms)),
    );
    let permissions = Arc::new(SimulatedPermissions::all_granted());

    // ── Coordinator ───────────────────────────────────────────────────────────
    let coordinator = DiscoverySessionCoordinator::new(
        radio.clone(),
        permissions.clone(),
        config.permissions.required_groups.clone(),
        config.discovery.coordinator_settings(),
    );
    radio.attach(coordinator.callbacks());
    permissions.attach(coordinator.callbacks());
    let state = match cli.config.clone() {
        Some(path) => AppState::with_config_path(coordinator, config, path),
        None => AppState::new(coordinator, config),
    };

    // ── Discovery session ─────────────────────────────────────────────────────
    let coordinator = &state.coordinator;
    let mut session = coordinator.session_state();

    match coordinator.start_discovery().await {
        StartOutcome::Started => info!("scanning; press Ctrl-C to stop early"),
        StartOutcome::Failed(kind) => {
            error!("discovery could not start: {kind}");
            return Ok(());
        }
        other => {
            warn!("discovery did not start: {other:?}");
            return Ok(());
        }
    }

    tokio::select! {
        result = session.wait_for(|s| !s.is_loading()) => {
            if result.is_err() {
                warn!("session state channel closed");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    info!("shutdown signal received");
                    coordinator.cancel_discovery().await;
                }
                Err(e) => error!("failed to listen for Ctrl-C signal: {e}"),
            }
        }
    }

    if let SessionState::Error(kind) = coordinator.current_session_state() {
        error!("discovery ended with an error: {kind}");
    }

    let devices = coordinator.current_devices();
    info!("{} device(s) discovered", devices.len());
    for device in &devices {
        println!("{:<20} {}", device.name, device.address);
    }

    info!("PeerScan stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
