//! CaptureOrchestrator - Per-Camera Producers
//!
//! ## Responsibilities
//!
//! - One independent producer task per camera feed
//! - Poll, never block: idle sleep on empty reads, backoff on failures
//! - Feed every batch into the IdentityStore
//! - Report feed health to the CameraStatusTracker
//! - Cooperative stop; release the feed and clear its live table on exit

mod replay;

pub use replay::{ReplayFrame, ReplaySource};

use crate::camera_status_tracker::CameraStatusTracker;
use crate::error::Result;
use crate::identity_store::IdentityStore;
use crate::models::{CameraRole, DetectionBatch};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

/// A camera feed delivering detection batches
#[async_trait]
pub trait DetectionSource: Send {
    fn role(&self) -> CameraRole;

    /// Next batch; `Ok(None)` when nothing is ready yet
    async fn poll(&mut self) -> Result<Option<DetectionBatch>>;

    /// Release the underlying device or file
    async fn release(&mut self);
}

/// Producer loop pacing
#[derive(Debug, Clone, Copy)]
pub struct ProducerSettings {
    /// Sleep after an empty read
    pub idle: Duration,
    /// Sleep after a delivered frame
    pub frame_interval: Duration,
    /// Sleep after a failed read
    pub retry_backoff: Duration,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            idle: Duration::from_millis(100),
            frame_interval: Duration::from_millis(33),
            retry_backoff: Duration::from_millis(1000),
        }
    }
}

/// Counters reported when a producer stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub frames: u64,
    pub empty_reads: u64,
    pub failures: u64,
}

/// Run one producer until the shutdown signal flips to `true`
pub async fn run_producer(
    mut source: Box<dyn DetectionSource>,
    store: Arc<IdentityStore>,
    status: Arc<CameraStatusTracker>,
    settings: ProducerSettings,
    mut shutdown: watch::Receiver<bool>,
) -> ProducerStats {
    let camera = source.role();
    let mut stats = ProducerStats::default();
    tracing::info!(camera = %camera, "Producer started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let delay = match source.poll().await {
            Ok(Some(batch)) => {
                status.mark_online(camera).await;
                stats.frames += 1;
                tracing::trace!(
                    camera = %camera,
                    frame_id = batch.frame_id,
                    detections = batch.detections.len(),
                    "Batch received"
                );
                store.update(batch).await;
                settings.frame_interval
            }
            Ok(None) => {
                status.mark_online(camera).await;
                stats.empty_reads += 1;
                settings.idle
            }
            Err(e) => {
                status.mark_offline(camera, &e.to_string()).await;
                stats.failures += 1;
                tracing::debug!(
                    camera = %camera,
                    error = %e,
                    backoff_ms = settings.retry_backoff.as_millis() as u64,
                    "Read failed, retrying after backoff"
                );
                settings.retry_backoff
            }
        };

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }

    source.release().await;
    store.clear_camera(camera).await;
    tracing::info!(
        camera = %camera,
        frames = stats.frames,
        empty_reads = stats.empty_reads,
        failures = stats.failures,
        "Producer stopped"
    );
    stats
}

/// CaptureOrchestrator instance
pub struct CaptureOrchestrator {
    store: Arc<IdentityStore>,
    status: Arc<CameraStatusTracker>,
    settings: ProducerSettings,
    shutdown: watch::Receiver<bool>,
    handles: Mutex<Vec<(CameraRole, JoinHandle<ProducerStats>)>>,
    running: Arc<RwLock<bool>>,
}

impl CaptureOrchestrator {
    /// Create new CaptureOrchestrator
    pub fn new(
        store: Arc<IdentityStore>,
        status: Arc<CameraStatusTracker>,
        settings: ProducerSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            status,
            settings,
            shutdown,
            handles: Mutex::new(Vec::new()),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Spawn one producer per source
    pub async fn start(&self, sources: Vec<Box<dyn DetectionSource>>) {
        {
            let mut running = self.running.write().await;
            if *running {
                tracing::warn!("Capture already running");
                return;
            }
            *running = true;
        }

        tracing::info!(feeds = sources.len(), "Starting capture orchestrator");

        let mut handles = self.handles.lock().await;
        for source in sources {
            let camera = source.role();
            let handle = tokio::spawn(run_producer(
                source,
                self.store.clone(),
                self.status.clone(),
                self.settings,
                self.shutdown.clone(),
            ));
            handles.push((camera, handle));
        }
    }

    /// Wait for every producer to stop
    pub async fn join(&self) -> Vec<(CameraRole, ProducerStats)> {
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        let mut stats = Vec::with_capacity(handles.len());
        for (camera, handle) in handles {
            match handle.await {
                Ok(s) => stats.push((camera, s)),
                Err(e) => tracing::error!(camera = %camera, error = %e, "Producer task failed"),
            }
        }
        *self.running.write().await = false;
        tracing::info!("Capture orchestrator stopped");
        stats
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_status_tracker::CameraConnectionStatus;
    use crate::config_store::ConfigStore;
    use crate::error::Error;
    use crate::models::{BBox, Detection, FrameSize};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Scripted feed: `Some(Ok)` frame, `Some(Err)` failure, `None` empty read
    struct ScriptedSource {
        camera: CameraRole,
        script: VecDeque<Option<std::result::Result<DetectionBatch, String>>>,
        released: Arc<AtomicBool>,
    }

    #[async_trait]
    impl DetectionSource for ScriptedSource {
        fn role(&self) -> CameraRole {
            self.camera
        }

        async fn poll(&mut self) -> Result<Option<DetectionBatch>> {
            match self.script.pop_front() {
                Some(Some(Ok(batch))) => Ok(Some(batch)),
                Some(Some(Err(message))) => Err(Error::Source {
                    camera: self.camera.to_string(),
                    message,
                }),
                _ => Ok(None),
            }
        }

        async fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn fast() -> ProducerSettings {
        ProducerSettings {
            idle: Duration::from_millis(1),
            frame_interval: Duration::from_millis(1),
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn frame(camera: CameraRole) -> DetectionBatch {
        DetectionBatch::new(
            camera,
            FrameSize::new(640, 480),
            vec![Detection::new(1).with_bbox(BBox::new(0.0, 0.0, 10.0, 10.0))],
        )
    }

    #[tokio::test]
    async fn test_producer_feeds_store_and_stops_on_signal() {
        let store = Arc::new(IdentityStore::new(Arc::new(ConfigStore::with_defaults())));
        let status = Arc::new(CameraStatusTracker::new());
        let released = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource {
            camera: CameraRole::Wide,
            script: VecDeque::from(vec![
                Some(Ok(frame(CameraRole::Wide))),
                Some(Err("device busy".to_string())),
                None,
                Some(Ok(frame(CameraRole::Wide))),
            ]),
            released: released.clone(),
        };

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_producer(
            Box::new(source),
            store.clone(),
            status.clone(),
            fast(),
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        let stats = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stats.frames, 2);
        assert_eq!(stats.failures, 1);
        assert!(stats.empty_reads >= 1);
        assert_eq!(store.identity_count().await, 2);
        assert!(released.load(Ordering::SeqCst));
        // live table cleared on exit
        assert!(store.live_identities(CameraRole::Wide).await.is_empty());
        assert_eq!(
            status.get_status(CameraRole::Wide).await,
            CameraConnectionStatus::Online
        );
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff() {
        let store = Arc::new(IdentityStore::new(Arc::new(ConfigStore::with_defaults())));
        let status = Arc::new(CameraStatusTracker::new());
        let source = ScriptedSource {
            camera: CameraRole::Close,
            script: VecDeque::from(vec![Some(Err("unplugged".to_string()))]),
            released: Arc::new(AtomicBool::new(false)),
        };
        let settings = ProducerSettings {
            retry_backoff: Duration::from_secs(60),
            ..fast()
        };

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_producer(Box::new(source), store, status.clone(), settings, rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            status.get_status(CameraRole::Close).await,
            CameraConnectionStatus::Offline
        );

        tx.send(true).unwrap();
        let stats = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.failures, 1);
    }

    #[tokio::test]
    async fn test_orchestrator_start_and_join() {
        let store = Arc::new(IdentityStore::new(Arc::new(ConfigStore::with_defaults())));
        let status = Arc::new(CameraStatusTracker::new());
        let (tx, rx) = watch::channel(false);
        let orchestrator = CaptureOrchestrator::new(store, status, fast(), rx);

        let sources: Vec<Box<dyn DetectionSource>> = CameraRole::ALL
            .into_iter()
            .map(|camera| {
                Box::new(ScriptedSource {
                    camera,
                    script: VecDeque::from(vec![Some(Ok(frame(camera)))]),
                    released: Arc::new(AtomicBool::new(false)),
                }) as Box<dyn DetectionSource>
            })
            .collect();
        orchestrator.start(sources).await;
        assert!(orchestrator.is_running().await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let stats = orchestrator.join().await;

        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|(_, s)| s.frames == 1));
        assert!(!orchestrator.is_running().await);
    }
}
