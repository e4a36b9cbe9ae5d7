//! Snapshot model, diagnosis classifier, and the fixed-rate cycle scheduler

use crate::alert::AlertEngine;
use crate::notify::Notifier;
use crate::probe::{ProbeResult, Prober};
use crate::trace::Tracer;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// Latency above which both reference and target count as congested.
const CONGESTED_LATENCY_MS: f64 = 150.0;

/// Latency below which the reference path counts as nominal.
const NOMINAL_LATENCY_MS: f64 = 80.0;

/// One measurement cycle: the three probe results plus completion time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub gateway: ProbeResult,
    pub reference: ProbeResult,
    pub target: ProbeResult,
}

/// Qualitative verdict for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnosis {
    Local,
    Isp,
    TargetDown,
    Routing,
    Congestion,
    Healthy,
}

impl Diagnosis {
    pub fn label(&self) -> &'static str {
        match self {
            Diagnosis::Local => "Local router issue",
            Diagnosis::Isp => "ISP issue",
            Diagnosis::TargetDown => "Target unreachable",
            Diagnosis::Routing => "Routing issue",
            Diagnosis::Congestion => "High latency / congestion",
            Diagnosis::Healthy => "Healthy",
        }
    }
}

/// Map a snapshot to a diagnosis. Pure; first matching rule wins.
pub fn classify(snapshot: &Snapshot) -> Diagnosis {
    let g = &snapshot.gateway;
    let r = &snapshot.reference;
    let t = &snapshot.target;

    if !g.reachable {
        return Diagnosis::Local;
    }
    if !r.reachable && !t.reachable {
        return Diagnosis::Isp;
    }
    if r.reachable && !t.reachable {
        return Diagnosis::TargetDown;
    }
    if r.reachable && t.reachable {
        if r.avg_latency_ms > CONGESTED_LATENCY_MS && t.avg_latency_ms > CONGESTED_LATENCY_MS {
            return Diagnosis::Congestion;
        }
        if r.avg_latency_ms < NOMINAL_LATENCY_MS && t.avg_latency_ms > CONGESTED_LATENCY_MS {
            return Diagnosis::Routing;
        }
        return Diagnosis::Healthy;
    }

    // Documented fallback for combinations with no real-world reading
    // (e.g. reference down but target up). Conflates unknown with healthy.
    Diagnosis::Healthy
}

fn format_probe(result: &ProbeResult) -> String {
    let status = if result.reachable { "OK" } else { "FAIL" };
    format!(
        "{} [{}] {:.1}ms avg / {:.1}ms jitter / {:.0}% loss",
        result.address, status, result.avg_latency_ms, result.jitter_ms, result.packet_loss_pct
    )
}

pub fn format_snapshot(snapshot: &Snapshot) -> String {
    format!(
        "Gateway:   {}\nReference: {}\nTarget:    {}\n",
        format_probe(&snapshot.gateway),
        format_probe(&snapshot.reference),
        format_probe(&snapshot.target)
    )
}

/// State shared between the scheduler loop and the control surface:
/// the current probe target and the single latest published cycle.
pub struct SharedState {
    target: RwLock<String>,
    latest: RwLock<Option<(Snapshot, Diagnosis)>>,
}

impl SharedState {
    pub fn new(initial_target: String) -> Self {
        Self {
            target: RwLock::new(initial_target),
            latest: RwLock::new(None),
        }
    }

    pub async fn target(&self) -> String {
        self.target.read().await.clone()
    }

    pub async fn set_target(&self, address: String) {
        *self.target.write().await = address;
    }

    /// Replace the latest cycle result. Superseded snapshots are dropped.
    pub async fn publish(&self, snapshot: Snapshot, diagnosis: Diagnosis) {
        *self.latest.write().await = Some((snapshot, diagnosis));
    }

    pub async fn latest(&self) -> Option<(Snapshot, Diagnosis)> {
        self.latest.read().await.clone()
    }
}

/// Builds one snapshot per cycle by probing gateway, reference, and target.
pub struct SnapshotBuilder<P: Prober> {
    prober: P,
    gateway: String,
    reference: String,
    sample_count: u32,
    probe_timeout: Duration,
    state: Arc<SharedState>,
}

impl<P: Prober> SnapshotBuilder<P> {
    pub fn new(
        prober: P,
        gateway: String,
        reference: String,
        sample_count: u32,
        probe_timeout: Duration,
        state: Arc<SharedState>,
    ) -> Self {
        Self {
            prober,
            gateway,
            reference,
            sample_count,
            probe_timeout,
            state,
        }
    }

    /// Probe all three points and stamp the result. The target address is
    /// re-read from shared state on every call so a `set_target` issued
    /// between cycles takes effect on the next one, never mid-cycle.
    pub async fn build(&self) -> Snapshot {
        let target_address = self.state.target().await;

        let gateway = self
            .prober
            .probe(&self.gateway, self.sample_count, self.probe_timeout)
            .await;
        let reference = self
            .prober
            .probe(&self.reference, self.sample_count, self.probe_timeout)
            .await;
        let target = self
            .prober
            .probe(&target_address, self.sample_count, self.probe_timeout)
            .await;

        Snapshot {
            timestamp: Utc::now(),
            gateway,
            reference,
            target,
        }
    }
}

/// Fixed-rate monitoring loop. Runs one cycle immediately, then one per
/// interval. A degraded cycle is still published and classified; nothing in
/// here terminates the loop.
pub async fn run_monitor<P, N, T>(
    interval_secs: u64,
    builder: SnapshotBuilder<P>,
    engine: Arc<AlertEngine<N, T>>,
    state: Arc<SharedState>,
) where
    P: Prober,
    N: Notifier,
    T: Tracer,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let snapshot = builder.build().await;
        let diagnosis = classify(&snapshot);
        state.publish(snapshot.clone(), diagnosis).await;

        info!("Cycle complete: {}", diagnosis.label());

        engine.observe(&snapshot, diagnosis).await;
    }
}
