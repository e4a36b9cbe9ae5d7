//! Alert engine - diagnosis change detection, suppression guards, delivery

use crate::monitor::{Diagnosis, Snapshot, format_snapshot};
use crate::notify::Notifier;
use crate::trace::Tracer;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Maximum characters of traceroute output embedded in an alert.
const TRACE_LIMIT: usize = 1500;

/// Session-wide alert bookkeeping. Written by the engine once per cycle and
/// by the control surface (`start`, `mute`).
#[derive(Debug, Default)]
pub struct AlertState {
    pub last_diagnosis: Option<Diagnosis>,
    pub muted_until: Option<DateTime<Utc>>,
    pub last_alert_sent_at: Option<DateTime<Utc>>,
    pub notification_target: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Unchanged,
    NoTarget,
    Muted,
    Cooldown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Deliver(String),
    Skip(SkipReason),
}

/// Apply the suppression guards in order. Pure; the caller holds the state
/// lock and commits side effects afterwards.
pub fn evaluate(
    state: &AlertState,
    diagnosis: Diagnosis,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Verdict {
    // An unset previous diagnosis counts as a change (first cycle).
    if state.last_diagnosis == Some(diagnosis) {
        return Verdict::Skip(SkipReason::Unchanged);
    }

    let Some(target) = &state.notification_target else {
        return Verdict::Skip(SkipReason::NoTarget);
    };

    if let Some(muted_until) = state.muted_until {
        if now < muted_until {
            return Verdict::Skip(SkipReason::Muted);
        }
    }

    if let Some(last_sent) = state.last_alert_sent_at {
        if now - last_sent < cooldown {
            return Verdict::Skip(SkipReason::Cooldown);
        }
    }

    Verdict::Deliver(target.clone())
}

pub struct AlertEngine<N: Notifier, T: Tracer> {
    notifier: N,
    tracer: T,
    state: Arc<Mutex<AlertState>>,
    cooldown: Duration,
    traceroute_max_hops: u32,
}

impl<N: Notifier, T: Tracer> AlertEngine<N, T> {
    pub fn new(
        notifier: N,
        tracer: T,
        state: Arc<Mutex<AlertState>>,
        cooldown_secs: i64,
        traceroute_max_hops: u32,
    ) -> Self {
        Self {
            notifier,
            tracer,
            state,
            cooldown: Duration::seconds(cooldown_secs),
            traceroute_max_hops,
        }
    }

    /// Transition check for one cycle. Called strictly in cycle order by the
    /// scheduler. `last_diagnosis` is updated no matter which guard fires.
    pub async fn observe(&self, snapshot: &Snapshot, diagnosis: Diagnosis) {
        let verdict = {
            let state = self.state.lock().await;
            evaluate(&state, diagnosis, Utc::now(), self.cooldown)
        };

        match verdict {
            Verdict::Deliver(target) => {
                let trace = if needs_traceroute(diagnosis) {
                    let raw = self
                        .tracer
                        .trace(&snapshot.target.address, self.traceroute_max_hops)
                        .await;
                    Some(truncate_trace(&raw))
                } else {
                    None
                };

                let body = render_alert(snapshot, diagnosis, trace.as_deref());

                match self.notifier.send(&target, &body).await {
                    Ok(()) => {
                        info!("Alert delivered: {}", diagnosis.label());
                        self.state.lock().await.last_alert_sent_at = Some(Utc::now());
                    }
                    Err(e) => {
                        // Not retried this cycle; an unchanged diagnosis will
                        // not re-trigger next cycle either.
                        error!("Failed to deliver alert: {}", e);
                    }
                }
            }
            Verdict::Skip(reason) => {
                debug!("Alert skipped ({:?}): {}", reason, diagnosis.label());
            }
        }

        self.state.lock().await.last_diagnosis = Some(diagnosis);
    }
}

fn needs_traceroute(diagnosis: Diagnosis) -> bool {
    matches!(diagnosis, Diagnosis::TargetDown | Diagnosis::Routing)
}

fn truncate_trace(trace: &str) -> String {
    trace.chars().take(TRACE_LIMIT).collect()
}

fn render_alert(snapshot: &Snapshot, diagnosis: Diagnosis, trace: Option<&str>) -> String {
    let mut message = format!(
        "**⚠️ Network Alert: {}**\n\n{}",
        diagnosis.label(),
        format_snapshot(snapshot)
    );

    if let Some(trace) = trace {
        message.push_str(&format!("\n**Traceroute:**\n```\n{}\n```", trace));
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use crate::probe::ProbeResult;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct MockNotifier {
        sent: Arc<StdMutex<Vec<(String, String)>>>,
        fail: bool,
    }

    impl Notifier for MockNotifier {
        async fn send(&self, target: &str, text: &str) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Status(reqwest::StatusCode::BAD_GATEWAY));
            }
            self.sent
                .lock()
                .unwrap()
                .push((target.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MockTracer {
        calls: Arc<AtomicUsize>,
    }

    impl Tracer for MockTracer {
        async fn trace(&self, address: &str, _max_hops: u32) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            format!("1  gateway  0.5ms\n2  {}  10.1ms", address)
        }
    }

    fn probe(address: &str, reachable: bool, avg_ms: f64) -> ProbeResult {
        ProbeResult {
            address: address.to_string(),
            reachable,
            avg_latency_ms: avg_ms,
            packet_loss_pct: if reachable { 0.0 } else { 100.0 },
            jitter_ms: 0.0,
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            timestamp: Utc::now(),
            gateway: probe("192.168.1.1", true, 1.0),
            reference: probe("8.8.8.8", true, 40.0),
            target: probe("1.1.1.1", false, 0.0),
        }
    }

    fn make_engine(
        notifier: MockNotifier,
        tracer: MockTracer,
        state: AlertState,
    ) -> (
        AlertEngine<MockNotifier, MockTracer>,
        Arc<Mutex<AlertState>>,
    ) {
        let state = Arc::new(Mutex::new(state));
        let engine = AlertEngine::new(notifier, tracer, state.clone(), 300, 20);
        (engine, state)
    }

    fn registered_state() -> AlertState {
        AlertState {
            notification_target: Some("ops-channel".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unchanged_diagnosis_fires_once_on_change() {
        let notifier = MockNotifier::default();
        let mut state = registered_state();
        state.last_diagnosis = Some(Diagnosis::Healthy);
        let (engine, state) = make_engine(notifier.clone(), MockTracer::default(), state);

        let snap = snapshot();
        engine.observe(&snap, Diagnosis::Healthy).await;
        engine.observe(&snap, Diagnosis::Healthy).await;
        engine.observe(&snap, Diagnosis::TargetDown).await;

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Target unreachable"));
        assert_eq!(
            state.lock().await.last_diagnosis,
            Some(Diagnosis::TargetDown)
        );
    }

    #[tokio::test]
    async fn test_first_cycle_counts_as_change() {
        let notifier = MockNotifier::default();
        let (engine, _) = make_engine(notifier.clone(), MockTracer::default(), registered_state());

        engine.observe(&snapshot(), Diagnosis::Healthy).await;

        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_target_skips_but_records() {
        let notifier = MockNotifier::default();
        let (engine, state) = make_engine(
            notifier.clone(),
            MockTracer::default(),
            AlertState::default(),
        );

        engine.observe(&snapshot(), Diagnosis::TargetDown).await;

        assert!(notifier.sent.lock().unwrap().is_empty());
        assert_eq!(
            state.lock().await.last_diagnosis,
            Some(Diagnosis::TargetDown)
        );
    }

    #[tokio::test]
    async fn test_mute_suppresses_delivery() {
        let notifier = MockNotifier::default();
        let mut initial = registered_state();
        initial.muted_until = Some(Utc::now() + Duration::hours(1));
        let (engine, state) = make_engine(notifier.clone(), MockTracer::default(), initial);

        engine.observe(&snapshot(), Diagnosis::TargetDown).await;

        assert!(notifier.sent.lock().unwrap().is_empty());
        assert_eq!(
            state.lock().await.last_diagnosis,
            Some(Diagnosis::TargetDown)
        );
    }

    #[tokio::test]
    async fn test_cooldown_caps_consecutive_changes_at_one() {
        let notifier = MockNotifier::default();
        let (engine, _) = make_engine(notifier.clone(), MockTracer::default(), registered_state());

        let snap = snapshot();
        engine.observe(&snap, Diagnosis::TargetDown).await;
        // Second change lands well inside the 5 minute cooldown.
        engine.observe(&snap, Diagnosis::Healthy).await;

        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enrichment_only_for_traceroute_diagnoses() {
        let notifier = MockNotifier::default();
        let tracer = MockTracer::default();
        let (engine, _) = make_engine(notifier.clone(), tracer.clone(), registered_state());

        engine.observe(&snapshot(), Diagnosis::Local).await;

        assert_eq!(tracer.calls.load(Ordering::SeqCst), 0);
        {
            let sent = notifier.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert!(!sent[0].1.contains("Traceroute"));
        }

        // Fresh engine so neither cooldown nor change detection interferes.
        let notifier = MockNotifier::default();
        let tracer = MockTracer::default();
        let (engine, _) = make_engine(notifier.clone(), tracer.clone(), registered_state());

        engine.observe(&snapshot(), Diagnosis::TargetDown).await;

        assert_eq!(tracer.calls.load(Ordering::SeqCst), 1);
        let sent = notifier.sent.lock().unwrap();
        assert!(sent[0].1.contains("**Traceroute:**"));
        assert!(sent[0].1.contains("1.1.1.1"));
    }

    #[tokio::test]
    async fn test_delivery_failure_leaves_sent_timestamp_unset() {
        let notifier = MockNotifier {
            fail: true,
            ..Default::default()
        };
        let (engine, state) = make_engine(notifier.clone(), MockTracer::default(), registered_state());

        engine.observe(&snapshot(), Diagnosis::TargetDown).await;

        let state = state.lock().await;
        assert!(state.last_alert_sent_at.is_none());
        assert_eq!(state.last_diagnosis, Some(Diagnosis::TargetDown));
    }

    #[test]
    fn test_evaluate_guard_order() {
        let now = Utc::now();
        let cooldown = Duration::seconds(300);

        // Unchanged wins over missing target.
        let state = AlertState {
            last_diagnosis: Some(Diagnosis::Healthy),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&state, Diagnosis::Healthy, now, cooldown),
            Verdict::Skip(SkipReason::Unchanged)
        );

        // Changed but nowhere to deliver.
        assert_eq!(
            evaluate(&state, Diagnosis::TargetDown, now, cooldown),
            Verdict::Skip(SkipReason::NoTarget)
        );

        // Expired mute no longer suppresses.
        let state = AlertState {
            notification_target: Some("ops".to_string()),
            muted_until: Some(now - Duration::minutes(1)),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&state, Diagnosis::TargetDown, now, cooldown),
            Verdict::Deliver("ops".to_string())
        );

        // Recent alert still inside the cooldown window.
        let state = AlertState {
            notification_target: Some("ops".to_string()),
            last_alert_sent_at: Some(now - Duration::seconds(60)),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&state, Diagnosis::TargetDown, now, cooldown),
            Verdict::Skip(SkipReason::Cooldown)
        );

        // Cooldown elapsed.
        let state = AlertState {
            notification_target: Some("ops".to_string()),
            last_alert_sent_at: Some(now - Duration::seconds(301)),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&state, Diagnosis::TargetDown, now, cooldown),
            Verdict::Deliver("ops".to_string())
        );
    }

    #[test]
    fn test_truncate_trace_limit() {
        let long = "x".repeat(4000);
        assert_eq!(truncate_trace(&long).len(), 1500);

        let short = "1  gw  0.5ms";
        assert_eq!(truncate_trace(short), short);
    }

    #[test]
    fn test_render_alert_layout() {
        let body = render_alert(&snapshot(), Diagnosis::TargetDown, Some("1  gw  0.5ms"));
        assert!(body.starts_with("**⚠️ Network Alert: Target unreachable**"));
        assert!(body.contains("Gateway:   192.168.1.1 [OK]"));
        assert!(body.contains("```\n1  gw  0.5ms\n```"));
    }
}
