//! ICMP probing - per-host reachability, latency, jitter, and loss

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config as PingConfig, PingIdentifier, PingSequence};
use tracing::debug;

/// Gap between echo requests within one probe.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// Summary of one multi-sample probe against a single host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Target address (IP or hostname) as configured
    pub address: String,

    /// Whether any echo reply was received
    pub reachable: bool,

    /// Mean round-trip time in milliseconds over received samples (0 if none)
    pub avg_latency_ms: f64,

    /// Lost samples as a percentage of sent samples
    pub packet_loss_pct: f64,

    /// Max minus min round-trip time among received samples (0 if none)
    pub jitter_ms: f64,
}

impl ProbeResult {
    /// A probe that failed entirely (unresolvable host, no replies).
    pub fn unreachable(address: &str) -> Self {
        Self {
            address: address.to_string(),
            reachable: false,
            avg_latency_ms: 0.0,
            packet_loss_pct: 100.0,
            jitter_ms: 0.0,
        }
    }
}

/// Probing capability. Implementations must report failures as
/// non-reachable results, never as errors.
pub trait Prober: Send + Sync {
    fn probe(
        &self,
        address: &str,
        count: u32,
        timeout: Duration,
    ) -> impl std::future::Future<Output = ProbeResult> + Send;
}

pub struct IcmpProber {
    client: Client,
}

impl IcmpProber {
    pub fn new() -> Result<Self> {
        let ping_config = PingConfig::default();
        let client = Client::new(&ping_config)
            .context("Failed to create ICMP client (CAP_NET_RAW required)")?;

        Ok(Self { client })
    }
}

impl Prober for IcmpProber {
    async fn probe(&self, address: &str, count: u32, timeout: Duration) -> ProbeResult {
        let ip = match resolve_address(address) {
            Ok(ip) => ip,
            Err(e) => {
                debug!("Failed to resolve {}: {}", address, e);
                return ProbeResult::unreachable(address);
            }
        };

        let payload = [0u8; 56]; // Standard ping payload size
        let mut pinger = self.client.pinger(ip, PingIdentifier(rand::random())).await;

        let mut rtts = Vec::with_capacity(count as usize);
        for seq in 0..count {
            match tokio::time::timeout(timeout, pinger.ping(PingSequence(seq as u16), &payload))
                .await
            {
                Ok(Ok((_packet, duration))) => {
                    rtts.push(duration.as_secs_f64() * 1000.0);
                }
                Ok(Err(e)) => {
                    debug!("ICMP {} seq {} -> error: {}", address, seq, e);
                }
                Err(_) => {
                    debug!("ICMP {} seq {} -> timeout after {:?}", address, seq, timeout);
                }
            }

            if seq + 1 < count {
                tokio::time::sleep(SAMPLE_INTERVAL).await;
            }
        }

        let result = summarize(address, count, &rtts);
        debug!(
            "ICMP {} -> reachable={} avg={:.2}ms loss={:.0}% jitter={:.2}ms",
            address, result.reachable, result.avg_latency_ms, result.packet_loss_pct,
            result.jitter_ms
        );
        result
    }
}

/// Collapse the received round-trip times of one probe into a `ProbeResult`.
fn summarize(address: &str, sent: u32, rtts: &[f64]) -> ProbeResult {
    if rtts.is_empty() {
        return ProbeResult::unreachable(address);
    }

    let avg = rtts.iter().sum::<f64>() / rtts.len() as f64;
    let max = rtts.iter().cloned().fold(f64::MIN, f64::max);
    let min = rtts.iter().cloned().fold(f64::MAX, f64::min);
    let lost = sent.saturating_sub(rtts.len() as u32);

    ProbeResult {
        address: address.to_string(),
        reachable: true,
        avg_latency_ms: avg,
        packet_loss_pct: lost as f64 / sent as f64 * 100.0,
        jitter_ms: max - min,
    }
}

fn resolve_address(address: &str) -> Result<IpAddr> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip);
    }

    use std::net::ToSocketAddrs;

    let addr = format!("{}:0", address)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("No addresses found for {}", address))?;

    Ok(addr.ip())
}
