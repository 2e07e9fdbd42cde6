//! DecisionCycle - Consumer Loop
//!
//! ## Responsibilities
//!
//! - Periodically score the merged snapshot
//! - Derive the global alert and actuation intents
//! - Isolate failures: a failed cycle keeps the previous global alert,
//!   emits no intents and reports a system error; the loop keeps running
//! - Publish each report (latest-wins) and hand intents off without blocking

use crate::alert_log_service::{AlertEvent, AlertEventKind, AlertLogService};
use crate::camera_status_tracker::CameraStatusTracker;
use crate::config_store::ConfigStore;
use crate::identity_store::{IdentityStore, TrackedPerson};
use crate::models::CameraRole;
use crate::risk_engine::{ActuationIntent, AlertLevel, RiskAssessment, RiskEngine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Result of one decision cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub completed_at: DateTime<Utc>,
    pub global_alert: AlertLevel,
    /// Set when the cycle fell back to the previous state
    pub system_error: Option<String>,
    /// Camera feeds currently offline
    pub degraded: Vec<CameraRole>,
    pub identities: usize,
    pub assessments: Vec<RiskAssessment>,
    #[serde(skip)]
    pub intents: Vec<ActuationIntent>,
    /// Intents dropped so far because the actuation queue was full
    pub intents_dropped: u64,
}

impl CycleReport {
    pub fn initial() -> Self {
        Self {
            cycle: 0,
            completed_at: Utc::now(),
            global_alert: AlertLevel::Normal,
            system_error: None,
            degraded: Vec::new(),
            identities: 0,
            assessments: Vec::new(),
            intents: Vec::new(),
            intents_dropped: 0,
        }
    }

    /// Visible system-error state: failed cycle or a feed down
    pub fn is_system_error(&self) -> bool {
        self.system_error.is_some() || !self.degraded.is_empty()
    }
}

/// Scoring pass over one snapshot
fn evaluate(
    engine: &RiskEngine,
    snapshot: &[TrackedPerson],
) -> crate::error::Result<(Vec<RiskAssessment>, AlertLevel, Vec<ActuationIntent>)> {
    let assessments = snapshot
        .iter()
        .map(|person| engine.score(person))
        .collect::<crate::error::Result<Vec<_>>>()?;
    let global = RiskEngine::aggregate(&assessments);
    let intents = engine.plan_actuation(&assessments, global);
    Ok((assessments, global, intents))
}

/// DecisionCycle instance
pub struct DecisionCycle {
    store: Arc<IdentityStore>,
    config: Arc<ConfigStore>,
    status: Arc<CameraStatusTracker>,
    alert_log: Arc<AlertLogService>,
    reports: watch::Sender<CycleReport>,
    intents: mpsc::Sender<ActuationIntent>,
    cycle: u64,
    last_global: AlertLevel,
    was_degraded: bool,
    intents_dropped: u64,
}

impl DecisionCycle {
    /// Create new DecisionCycle
    pub fn new(
        store: Arc<IdentityStore>,
        config: Arc<ConfigStore>,
        status: Arc<CameraStatusTracker>,
        alert_log: Arc<AlertLogService>,
        intents: mpsc::Sender<ActuationIntent>,
    ) -> Self {
        let (reports, _) = watch::channel(CycleReport::initial());
        Self {
            store,
            config,
            status,
            alert_log,
            reports,
            intents,
            cycle: 0,
            last_global: AlertLevel::Normal,
            was_degraded: false,
            intents_dropped: 0,
        }
    }

    /// Latest-report subscription
    pub fn subscribe(&self) -> watch::Receiver<CycleReport> {
        self.reports.subscribe()
    }

    /// Run one cycle and publish its report
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        let cycle = self.cycle;
        let policy = self.config.policy().await;
        let engine = RiskEngine::new(policy.scoring);
        let snapshot = self.store.merged_snapshot().await;
        let degraded = self.status.get_offline_cameras().await;

        let outcome = catch_unwind(AssertUnwindSafe(|| evaluate(&engine, &snapshot)));
        let failure = match outcome {
            Ok(Ok((assessments, global, intents))) => {
                return self
                    .complete(cycle, snapshot.len(), assessments, global, intents, degraded)
                    .await;
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "scoring panicked".to_string()),
        };

        tracing::error!(
            cycle = cycle,
            error = %failure,
            global_alert = %self.last_global,
            "Decision cycle failed, keeping previous alert state"
        );
        self.alert_log
            .record(
                AlertEvent::new(
                    cycle,
                    AlertEventKind::SystemError,
                    self.last_global,
                    self.last_global,
                )
                .with_message(failure.clone()),
            )
            .await;

        let report = CycleReport {
            cycle,
            completed_at: Utc::now(),
            global_alert: self.last_global,
            system_error: Some(failure),
            degraded,
            identities: snapshot.len(),
            assessments: Vec::new(),
            intents: Vec::new(),
            intents_dropped: self.intents_dropped,
        };
        self.reports.send_replace(report.clone());
        report
    }

    async fn complete(
        &mut self,
        cycle: u64,
        identities: usize,
        assessments: Vec<RiskAssessment>,
        global: AlertLevel,
        intents: Vec<ActuationIntent>,
        degraded: Vec<CameraRole>,
    ) -> CycleReport {
        for assessment in &assessments {
            if let Err(e) = self
                .store
                .set_assessment(&assessment.identity_id, assessment.score, &assessment.emotion_label)
                .await
            {
                tracing::debug!(error = %e, "Assessment for evicted identity dropped");
            }
        }

        if global != self.last_global {
            tracing::info!(
                cycle = cycle,
                from = %self.last_global,
                to = %global,
                "Global alert changed"
            );
            let mut event =
                AlertEvent::new(cycle, AlertEventKind::LevelChanged, self.last_global, global);
            event.critical_identities = assessments
                .iter()
                .filter(|a| a.level == AlertLevel::Critical)
                .map(|a| a.identity_id.to_string())
                .collect();
            self.alert_log.record(event).await;
            self.last_global = global;
        }

        let is_degraded = !degraded.is_empty();
        if is_degraded && !self.was_degraded {
            let cameras: Vec<&str> = degraded.iter().map(|c| c.as_str()).collect();
            self.alert_log
                .record(
                    AlertEvent::new(cycle, AlertEventKind::Degraded, global, global)
                        .with_message(format!("offline feeds: {}", cameras.join(", "))),
                )
                .await;
        }
        self.was_degraded = is_degraded;

        for intent in &intents {
            match self.intents.try_send(intent.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.intents_dropped += 1;
                    tracing::warn!(
                        dropped = self.intents_dropped,
                        "Actuation queue full, intent dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Actuation queue closed");
                    break;
                }
            }
        }

        let report = CycleReport {
            cycle,
            completed_at: Utc::now(),
            global_alert: global,
            system_error: None,
            degraded,
            identities,
            assessments,
            intents,
            intents_dropped: self.intents_dropped,
        };
        self.reports.send_replace(report.clone());
        report
    }

    /// Run cycles until shutdown
    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(period_ms = period.as_millis() as u64, "Decision cycle started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    tracing::trace!(
                        cycle = report.cycle,
                        identities = report.identities,
                        global_alert = %report.global_alert,
                        "Cycle complete"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(cycles = self.cycle, "Decision cycle stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appearance::Descriptor;
    use crate::models::{BBox, Detection, DetectionBatch, FrameSize, RiskClass};

    struct Fixture {
        store: Arc<IdentityStore>,
        status: Arc<CameraStatusTracker>,
        alert_log: Arc<AlertLogService>,
        cycle: DecisionCycle,
        intents: mpsc::Receiver<ActuationIntent>,
    }

    fn fixture(capacity: usize) -> Fixture {
        let config = Arc::new(ConfigStore::with_defaults());
        let store = Arc::new(IdentityStore::new(config.clone()));
        let status = Arc::new(CameraStatusTracker::new());
        let alert_log = Arc::new(AlertLogService::default());
        let (tx, rx) = mpsc::channel(capacity);
        let cycle = DecisionCycle::new(store.clone(), config, status.clone(), alert_log.clone(), tx);
        Fixture {
            store,
            status,
            alert_log,
            cycle,
            intents: rx,
        }
    }

    fn covered_person(local_id: i64, descriptor: f32) -> Detection {
        Detection::new(local_id)
            .with_bbox(BBox::new(0.0, 0.0, 400.0, 400.0))
            .with_descriptor(Descriptor::new(vec![descriptor]))
            .with_risk(RiskClass::FaceCovering, BBox::new(10.0, 10.0, 50.0, 50.0))
    }

    fn batch(detections: Vec<Detection>) -> DetectionBatch {
        DetectionBatch::new(CameraRole::Close, FrameSize::new(1280, 720), detections)
    }

    #[tokio::test]
    async fn test_empty_scene_is_normal() {
        let mut f = fixture(8);
        let report = f.cycle.run_cycle().await;
        assert_eq!(report.global_alert, AlertLevel::Normal);
        assert!(report.assessments.is_empty());
        assert!(report.intents.is_empty());
        assert!(!report.is_system_error());
    }

    #[tokio::test]
    async fn test_critical_cycle_emits_intents_and_logs_transition() {
        let mut f = fixture(8);
        f.store.update(batch(vec![covered_person(1, 0.0)])).await;

        let report = f.cycle.run_cycle().await;
        assert_eq!(report.global_alert, AlertLevel::Critical);
        assert_eq!(report.intents.len(), 3);

        let mut received = Vec::new();
        while let Ok(intent) = f.intents.try_recv() {
            received.push(intent);
        }
        assert_eq!(received.len(), 3);

        let id = &report.assessments[0].identity_id;
        let snapshot = f.store.identity(id).await.unwrap();
        assert_eq!(snapshot.score, 50);
        assert_eq!(snapshot.emotion_label.as_deref(), Some("face_covered"));

        let log = f.alert_log.get_latest(10).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, AlertEventKind::LevelChanged);
        assert_eq!(log[0].critical_identities, vec![id.to_string()]);
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_previous_alert_and_continues() {
        let mut f = fixture(8);
        f.store.update(batch(vec![covered_person(1, 0.0)])).await;
        let first = f.cycle.run_cycle().await;
        assert_eq!(first.global_alert, AlertLevel::Critical);
        while f.intents.try_recv().is_ok() {}

        // malformed geometry on a second identity
        let broken = Detection::new(2).with_bbox(BBox::new(f32::NAN, 0.0, 10.0, 10.0));
        f.store
            .update(DetectionBatch::new(CameraRole::Wide, FrameSize::new(1280, 720), vec![broken]))
            .await;

        let failed = f.cycle.run_cycle().await;
        assert_eq!(failed.global_alert, AlertLevel::Critical);
        assert!(failed.system_error.is_some());
        assert!(failed.assessments.is_empty());
        assert!(failed.intents.is_empty());
        assert!(f.intents.try_recv().is_err());

        // the wide camera drops the broken track, next cycle recovers
        f.store
            .update(DetectionBatch::new(CameraRole::Wide, FrameSize::new(1280, 720), Vec::new()))
            .await;
        let recovered = f.cycle.run_cycle().await;
        assert!(recovered.system_error.is_none());
        assert_eq!(recovered.cycle, 3);

        let log = f.alert_log.get_latest(10).await;
        assert!(log.iter().any(|e| e.kind == AlertEventKind::SystemError));
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let mut f = fixture(1);
        f.store
            .update(batch(vec![covered_person(1, 0.0), covered_person(2, 1.0e6)]))
            .await;

        let report = f.cycle.run_cycle().await;
        assert!(report.intents.len() > 1);
        assert_eq!(report.intents_dropped, report.intents.len() as u64 - 1);
    }

    #[tokio::test]
    async fn test_offline_feed_marks_report_degraded() {
        let mut f = fixture(8);
        f.status.mark_offline(CameraRole::Wide, "unplugged").await;

        let report = f.cycle.run_cycle().await;
        assert_eq!(report.degraded, vec![CameraRole::Wide]);
        assert!(report.is_system_error());
        assert_eq!(report.global_alert, AlertLevel::Normal);

        let log = f.alert_log.get_latest(10).await;
        assert_eq!(log[0].kind, AlertEventKind::Degraded);
    }

    #[tokio::test]
    async fn test_reports_are_published() {
        let mut f = fixture(8);
        let rx = f.cycle.subscribe();
        f.cycle.run_cycle().await;
        assert_eq!(rx.borrow().cycle, 1);
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        let f = fixture(8);
        let rx = f.cycle.subscribe();
        let (tx, shutdown) = watch::channel(false);
        let task = tokio::spawn(f.cycle.run(Duration::from_millis(5), shutdown));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(rx.borrow().cycle >= 1);
    }
}
