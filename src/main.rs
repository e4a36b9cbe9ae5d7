//! Pathwatch - network path health monitor
//!
//! Probes the local gateway, a public reference host, and an operator-chosen
//! target on a fixed cadence, classifies where a problem lies, and pushes
//! alerts on diagnosis changes.

mod alert;
mod config;
mod control;
mod monitor;
mod notify;
mod probe;
mod trace;

use alert::{AlertEngine, AlertState};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pathwatch")]
#[command(version)]
#[command(about = "Network path health monitor", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "pathwatch.conf")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!("Starting pathwatch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; missing or incomplete config refuses to start.
    let config = config::Config::load(&args.config).context("Failed to load configuration")?;
    info!("Loaded configuration from {:?}", args.config);
    info!(
        "Probe points: gateway={} reference={} target={}",
        config.targets.gateway, config.targets.reference, config.targets.target
    );
    info!(
        "Cycle interval: {}s, {} samples per probe, {:.1}s probe timeout",
        config.monitor.interval_secs, config.monitor.sample_count, config.monitor.probe_timeout_secs
    );

    let shared = Arc::new(monitor::SharedState::new(config.targets.target.clone()));
    let alert_state = Arc::new(Mutex::new(AlertState::default()));

    let prober = probe::IcmpProber::new()?;
    let notifier = notify::WebhookNotifier::new(config.notify.webhook_url.clone())
        .context("Failed to build webhook client")?;

    let engine = Arc::new(AlertEngine::new(
        notifier,
        trace::SystemTraceroute,
        alert_state.clone(),
        config.alerts.cooldown_secs,
        config.alerts.traceroute_max_hops,
    ));

    let builder = monitor::SnapshotBuilder::new(
        prober,
        config.targets.gateway.clone(),
        config.targets.reference.clone(),
        config.monitor.sample_count,
        Duration::from_secs_f64(config.monitor.probe_timeout_secs),
        shared.clone(),
    );

    // Command surface runs alongside the scheduler and never blocks on a cycle.
    let surface = Arc::new(control::ControlSurface::new(
        shared.clone(),
        alert_state,
        config.alerts.mute_secs,
    ));
    let bind_address = config.control.bind_address.clone();
    tokio::spawn(async move {
        if let Err(e) = control::run_control(bind_address, surface).await {
            error!("Control surface failed: {}", e);
        }
    });

    info!("Starting monitoring loop (Press Ctrl+C to stop)");

    tokio::select! {
        _ = monitor::run_monitor(config.monitor.interval_secs, builder, engine, shared) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping");
        }
    }

    Ok(())
}
