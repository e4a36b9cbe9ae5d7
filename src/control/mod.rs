//! Operator command surface - line-oriented TCP listener
//!
//! Commands mirror the chat-bot surface: `start` registers where alerts go,
//! `status` reports the latest cycle, `set_target` repoints the probe target,
//! `mute` suppresses alerts for the configured window.

use crate::alert::AlertState;
use crate::monitor::{SharedState, format_snapshot};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start(String),
    Status,
    SetTarget(String),
    Mute,
    Usage(&'static str),
    Unknown,
}

pub fn parse_command(line: &str) -> Command {
    let mut parts = line.split_whitespace();

    match parts.next() {
        Some("start") => match parts.next() {
            Some(handle) => Command::Start(handle.to_string()),
            None => Command::Usage("Usage: start <handle>"),
        },
        Some("status") => Command::Status,
        Some("set_target") => match parts.next() {
            Some(address) => Command::SetTarget(address.to_string()),
            None => Command::Usage("Usage: set_target <ip_or_host>"),
        },
        Some("mute") => Command::Mute,
        _ => Command::Unknown,
    }
}

pub struct ControlSurface {
    shared: Arc<SharedState>,
    alert_state: Arc<Mutex<AlertState>>,
    mute_window: Duration,
}

impl ControlSurface {
    pub fn new(
        shared: Arc<SharedState>,
        alert_state: Arc<Mutex<AlertState>>,
        mute_secs: i64,
    ) -> Self {
        Self {
            shared,
            alert_state,
            mute_window: Duration::seconds(mute_secs),
        }
    }

    /// Execute one command and produce the reply text. Never touches a probe
    /// cycle; only the shared state locks are taken.
    pub async fn execute(&self, line: &str) -> String {
        match parse_command(line) {
            Command::Start(handle) => {
                self.alert_state.lock().await.notification_target = Some(handle.clone());
                info!("Notification target registered: {}", handle);
                "Monitoring started. I'll alert you on changes.".to_string()
            }
            Command::Status => match self.shared.latest().await {
                Some((snapshot, diagnosis)) => format!(
                    "**Network Status**\n{}\nDiagnosis: {}",
                    format_snapshot(&snapshot),
                    diagnosis.label()
                ),
                None => "No measurements yet. Please wait a few seconds.".to_string(),
            },
            Command::SetTarget(address) => {
                self.shared.set_target(address.clone()).await;
                info!("Probe target updated: {}", address);
                format!(
                    "Target updated to {}.\nNext cycle will use the new address.",
                    address
                )
            }
            Command::Mute => {
                let until = Utc::now() + self.mute_window;
                self.alert_state.lock().await.muted_until = Some(until);
                info!("Alerts muted until {}", until);
                format!("Alerts muted for {} minutes.", self.mute_window.num_minutes())
            }
            Command::Usage(usage) => usage.to_string(),
            Command::Unknown => {
                "Commands: start <handle> | status | set_target <ip_or_host> | mute".to_string()
            }
        }
    }
}

/// Accept loop for the control socket. One task per connection, like the
/// monitoring loop it runs until process shutdown.
pub async fn run_control(bind_address: String, surface: Arc<ControlSurface>) -> Result<()> {
    let listener = TcpListener::bind(&bind_address)
        .await
        .context(format!("Failed to bind control socket to {}", bind_address))?;

    info!("Control surface listening on {}", bind_address);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("Control connection from {}", peer);
                let surface = surface.clone();

                tokio::spawn(async move {
                    let (read_half, mut write_half) = stream.into_split();
                    let mut lines = BufReader::new(read_half).lines();

                    loop {
                        match lines.next_line().await {
                            Ok(Some(line)) => {
                                if line.trim().is_empty() {
                                    continue;
                                }
                                let reply = surface.execute(&line).await;
                                if let Err(e) =
                                    write_half.write_all(format!("{}\n", reply).as_bytes()).await
                                {
                                    debug!("Control write to {} failed: {}", peer, e);
                                    break;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                debug!("Control read from {} failed: {}", peer, e);
                                break;
                            }
                        }
                    }

                    debug!("Control connection from {} closed", peer);
                });
            }
            Err(e) => {
                error!("Failed to accept control connection: {}", e);
            }
        }
    }
}
