//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub targets: TargetsConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    pub notify: NotifyConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

/// The three probe points: local gateway, public reference host, and the
/// operator-chosen target. The target can be changed at runtime via the
/// control surface; gateway and reference are fixed for the process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetsConfig {
    pub gateway: String,
    pub reference: String,
    pub target: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertsConfig {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: i64,
    #[serde(default = "default_mute_secs")]
    pub mute_secs: i64,
    #[serde(default = "default_traceroute_max_hops")]
    pub traceroute_max_hops: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifyConfig {
    pub webhook_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            sample_count: default_sample_count(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            mute_secs: default_mute_secs(),
            traceroute_max_hops: default_traceroute_max_hops(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_sample_count() -> u32 {
    5
}

fn default_probe_timeout_secs() -> f64 {
    2.0
}

fn default_cooldown_secs() -> i64 {
    300
}

fn default_mute_secs() -> i64 {
    3600
}

fn default_traceroute_max_hops() -> u32 {
    20
}

fn default_bind_address() -> String {
    "127.0.0.1:4850".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Refuse to start half-configured: every probe point and the webhook
    /// endpoint must be present.
    pub fn validate(&self) -> Result<()> {
        if self.targets.gateway.trim().is_empty() {
            anyhow::bail!("targets.gateway must not be empty");
        }
        if self.targets.reference.trim().is_empty() {
            anyhow::bail!("targets.reference must not be empty");
        }
        if self.targets.target.trim().is_empty() {
            anyhow::bail!("targets.target must not be empty");
        }
        if self.notify.webhook_url.trim().is_empty() {
            anyhow::bail!("notify.webhook_url must not be empty");
        }
        if self.monitor.sample_count == 0 {
            anyhow::bail!("monitor.sample_count must be at least 1");
        }
        Ok(())
    }
}
