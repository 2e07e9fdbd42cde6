//! IdentityStore - Multi-Stream State
//!
//! ## Responsibilities
//!
//! - Global identity table (first-seen order, one lock per identity)
//! - Motion state per identity and camera (views never share a history)
//! - Per-camera live tables, rebuilt from each batch
//! - Merged snapshot with close-camera precedence
//! - Staleness GC
//!
//! ## Locking
//!
//! The table lock guards membership only. Identity fields are mutated under
//! the identity's own `Mutex`; no path holds an identity lock while waiting
//! for the table or live locks.

mod types;

pub use types::*;

use crate::behavior_analyzer::{
    presence_loitering, record_presence, BehaviorAnalyzer, BehaviorVerdict,
};
use crate::config_store::{ConfigStore, FusionPolicy};
use crate::identity_resolver::{IdentityId, IdentityResolver, Resolution};
use crate::appearance::Descriptor;
use crate::error::{Error, Result};
use crate::models::{CameraRole, Detection, DetectionBatch, FrameSize, Position};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
struct IdentityTable {
    order: Vec<IdentityId>,
    by_id: HashMap<IdentityId, Arc<Mutex<IdentityRecord>>>,
}

type LiveTable = HashMap<IdentityId, LiveEntry>;

/// IdentityStore instance
pub struct IdentityStore {
    config: Arc<ConfigStore>,
    resolver: IdentityResolver,
    identities: RwLock<IdentityTable>,
    live: RwLock<HashMap<CameraRole, LiveTable>>,
}

impl IdentityStore {
    /// Create new IdentityStore
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            resolver: IdentityResolver::new(),
            identities: RwLock::new(IdentityTable::default()),
            live: RwLock::new(HashMap::new()),
        }
    }

    /// Ingest one camera batch
    ///
    /// Resolves every detection, stamps and analyzes its identity, then
    /// replaces the camera's live table with exactly the confirmed set.
    /// Returns the resolved ids in detection order.
    pub async fn update(&self, batch: DetectionBatch) -> Vec<IdentityId> {
        let policy = self.config.policy().await;
        let analyzer = BehaviorAnalyzer::new(policy.behavior.clone());
        let camera = batch.camera;
        let at = batch.captured_at;
        let frame = batch.frame.as_deref();

        let mut confirmed: LiveTable = HashMap::new();
        let mut resolved = Vec::with_capacity(batch.detections.len());

        for mut detection in batch.detections {
            let resolution = self.resolve(camera, &detection, frame, at, &policy).await;
            let record = self
                .get_or_insert(&resolution.identity_id, camera, at)
                .await;

            {
                let mut record = record.lock().await;
                self.observe(
                    &mut record,
                    &resolution,
                    &detection,
                    batch.frame_size,
                    camera,
                    at,
                    &analyzer,
                    &policy,
                );
            }

            detection.descriptor = resolution.descriptor.as_deref().cloned();
            confirmed.insert(
                resolution.identity_id.clone(),
                LiveEntry {
                    detection,
                    frame_size: batch.frame_size,
                    captured_at: at,
                },
            );
            resolved.push(resolution.identity_id);
        }

        let mut live = self.live.write().await;
        let previous = live.insert(camera, confirmed);
        let evicted = previous
            .map(|prev| {
                prev.keys()
                    .filter(|id| !resolved.contains(id))
                    .count()
            })
            .unwrap_or(0);
        if evicted > 0 {
            tracing::debug!(
                camera = %camera,
                evicted = evicted,
                "Identities left camera view"
            );
        }

        resolved
    }

    /// Resolve one detection against the current table
    pub async fn resolve(
        &self,
        camera: CameraRole,
        detection: &Detection,
        frame: Option<&image::RgbImage>,
        at: DateTime<Utc>,
        policy: &FusionPolicy,
    ) -> Resolution {
        let candidates = self.candidates().await;
        let resolution = self.resolver.resolve(
            camera,
            detection,
            frame,
            at,
            candidates.iter().map(|(id, d)| (id, d.as_deref())),
            &policy.reid,
        );
        if resolution.is_new() {
            tracing::info!(
                camera = %camera,
                local_track_id = detection.local_track_id,
                identity_id = %resolution.identity_id,
                "New identity"
            );
        }
        resolution
    }

    /// Run the analyzer for one identity's view on one camera, outside of a batch
    pub async fn analyze(
        &self,
        identity_id: &IdentityId,
        camera: CameraRole,
        position: Position,
        at: DateTime<Utc>,
    ) -> Result<BehaviorVerdict> {
        let record = self
            .handle(identity_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("Identity {}", identity_id)))?;
        let policy = self.config.policy().await;
        let analyzer = BehaviorAnalyzer::new(policy.behavior);

        let mut record = record.lock().await;
        let verdict = analyzer.analyze(record.motion.entry(camera).or_default(), position, at);
        record.behavior.insert(camera, verdict.clone());
        Ok(verdict)
    }

    /// One canonical detection per visible identity, in first-seen order
    pub async fn merged_snapshot(&self) -> Vec<TrackedPerson> {
        let mut chosen: HashMap<IdentityId, (CameraRole, LiveEntry, Vec<CameraRole>)> =
            HashMap::new();
        {
            let live = self.live.read().await;
            for (camera, table) in live.iter() {
                for (id, entry) in table {
                    match chosen.get_mut(id) {
                        Some((current, current_entry, seen_by)) => {
                            seen_by.push(*camera);
                            if camera.precedence() > current.precedence() {
                                *current = *camera;
                                *current_entry = entry.clone();
                            }
                        }
                        None => {
                            chosen.insert(id.clone(), (*camera, entry.clone(), vec![*camera]));
                        }
                    }
                }
            }
        }

        let handles: Vec<(IdentityId, Arc<Mutex<IdentityRecord>>)> = {
            let table = self.identities.read().await;
            table
                .order
                .iter()
                .filter(|id| chosen.contains_key(*id))
                .filter_map(|id| table.by_id.get(id).map(|r| (id.clone(), r.clone())))
                .collect()
        };

        let mut merged = Vec::with_capacity(handles.len());
        for (identity_id, record) in handles {
            let Some((camera, entry, mut seen_by)) = chosen.remove(&identity_id) else {
                continue;
            };
            seen_by.sort();
            let (behavior, loitering_active) = {
                let record = record.lock().await;
                (record.behavior_on(camera), record.loitering_active)
            };
            merged.push(TrackedPerson {
                identity_id,
                camera,
                seen_by,
                frame_size: entry.frame_size,
                captured_at: entry.captured_at,
                detection: entry.detection,
                behavior,
                loitering_active,
            });
        }
        merged
    }

    /// Evict identities unseen by every camera for longer than the retention TTL
    ///
    /// Ages are checked without the table lock; the write lock is taken only
    /// to remove ids that are still stale at that point.
    pub async fn collect_stale(&self, now: DateTime<Utc>) -> Vec<IdentityId> {
        let policy = self.config.policy().await;
        let Some(ttl) = policy.retention.identity_ttl() else {
            return Vec::new();
        };

        let handles: Vec<(IdentityId, Arc<Mutex<IdentityRecord>>)> = {
            let table = self.identities.read().await;
            table
                .by_id
                .iter()
                .map(|(id, record)| (id.clone(), record.clone()))
                .collect()
        };

        let mut candidates = Vec::new();
        for (id, record) in handles {
            if now - record.lock().await.last_seen_at >= ttl {
                candidates.push((id, record));
            }
        }
        if candidates.is_empty() {
            return Vec::new();
        }

        let stale: HashSet<IdentityId> = {
            let mut table = self.identities.write().await;
            let mut stale = HashSet::new();
            for (id, record) in candidates {
                // a batch may have refreshed it since the scan
                let still_stale = match record.try_lock() {
                    Ok(record) => now - record.last_seen_at >= ttl,
                    Err(_) => false,
                };
                if still_stale {
                    stale.insert(id);
                }
            }
            table.order.retain(|id| !stale.contains(id));
            table.by_id.retain(|id, _| !stale.contains(id));
            stale
        };
        if stale.is_empty() {
            return Vec::new();
        }

        {
            let mut live = self.live.write().await;
            for table in live.values_mut() {
                table.retain(|id, _| !stale.contains(id));
            }
        }

        tracing::info!(
            evicted = stale.len(),
            ttl_sec = ttl.num_seconds(),
            "Stale identities collected"
        );
        stale.into_iter().collect()
    }

    /// Store the latest score and emotion label for an identity
    pub async fn set_assessment(
        &self,
        identity_id: &IdentityId,
        score: i32,
        emotion_label: &str,
    ) -> Result<()> {
        let record = self
            .handle(identity_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("Identity {}", identity_id)))?;
        let mut record = record.lock().await;
        record.score = score;
        record.emotion_label = Some(emotion_label.to_string());
        Ok(())
    }

    /// Drop a camera's live table (producer stopped)
    pub async fn clear_camera(&self, camera: CameraRole) {
        if self.live.write().await.remove(&camera).is_some() {
            tracing::info!(camera = %camera, "Camera live table cleared");
        }
    }

    pub async fn identity(&self, identity_id: &IdentityId) -> Option<IdentitySnapshot> {
        let record = self.handle(identity_id).await?;
        let seen_by: Vec<CameraRole> = {
            let live = self.live.read().await;
            let mut cameras: Vec<CameraRole> = live
                .iter()
                .filter(|(_, table)| table.contains_key(identity_id))
                .map(|(camera, _)| *camera)
                .collect();
            cameras.sort();
            cameras
        };
        let record = record.lock().await;
        Some(record.snapshot(seen_by))
    }

    pub async fn identity_count(&self) -> usize {
        self.identities.read().await.order.len()
    }

    /// Identity ids currently in a camera's live table
    pub async fn live_identities(&self, camera: CameraRole) -> Vec<IdentityId> {
        let live = self.live.read().await;
        let mut ids: Vec<IdentityId> = live
            .get(&camera)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    async fn handle(&self, identity_id: &IdentityId) -> Option<Arc<Mutex<IdentityRecord>>> {
        self.identities.read().await.by_id.get(identity_id).cloned()
    }

    /// Stored descriptors in first-seen order
    async fn candidates(&self) -> Vec<(IdentityId, Option<Arc<Descriptor>>)> {
        let handles: Vec<(IdentityId, Arc<Mutex<IdentityRecord>>)> = {
            let table = self.identities.read().await;
            table
                .order
                .iter()
                .filter_map(|id| table.by_id.get(id).map(|r| (id.clone(), r.clone())))
                .collect()
        };

        let mut candidates = Vec::with_capacity(handles.len());
        for (id, record) in handles {
            let descriptor = record.lock().await.descriptor.clone();
            candidates.push((id, descriptor));
        }
        candidates
    }

    async fn get_or_insert(
        &self,
        identity_id: &IdentityId,
        origin: CameraRole,
        at: DateTime<Utc>,
    ) -> Arc<Mutex<IdentityRecord>> {
        if let Some(record) = self.handle(identity_id).await {
            return record;
        }

        let mut table = self.identities.write().await;
        if let Some(record) = table.by_id.get(identity_id) {
            return record.clone();
        }
        let record = Arc::new(Mutex::new(IdentityRecord::new(
            identity_id.clone(),
            origin,
            at,
        )));
        table.order.push(identity_id.clone());
        table.by_id.insert(identity_id.clone(), record.clone());
        record
    }

    #[allow(clippy::too_many_arguments)]
    fn observe(
        &self,
        record: &mut IdentityRecord,
        resolution: &Resolution,
        detection: &Detection,
        frame_size: FrameSize,
        camera: CameraRole,
        at: DateTime<Utc>,
        analyzer: &BehaviorAnalyzer,
        policy: &FusionPolicy,
    ) {
        if let Some(descriptor) = &resolution.descriptor {
            record.descriptor = Some(descriptor.clone());
        }
        if at > record.last_seen_at {
            record.last_seen_at = at;
        }
        record.last_seen_by.insert(camera, at);

        record_presence(&mut record.presence, &policy.presence, at);
        record.loitering_active = presence_loitering(&record.presence, &policy.presence);

        let position = detection
            .bbox
            .and_then(|bbox| bbox.normalized_center(frame_size));
        if let Some(position) = position {
            let verdict = analyzer.analyze(record.motion.entry(camera).or_default(), position, at);
            record.behavior.insert(
                camera,
                verdict.with_gaze(detection.looking_at_camera.unwrap_or(false)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior_analyzer::BehaviorKind;
    use crate::models::BBox;
    use chrono::Duration;

    fn store() -> IdentityStore {
        IdentityStore::new(Arc::new(ConfigStore::with_defaults()))
    }

    fn person(local_id: i64, descriptor: &[f32]) -> Detection {
        Detection::new(local_id)
            .with_bbox(BBox::new(100.0, 100.0, 200.0, 400.0))
            .with_descriptor(Descriptor::new(descriptor.to_vec()))
    }

    fn batch(camera: CameraRole, detections: Vec<Detection>) -> DetectionBatch {
        DetectionBatch::new(camera, FrameSize::new(1280, 720), detections)
    }

    #[tokio::test]
    async fn test_matching_descriptors_share_identity() {
        let store = store();
        let first = store
            .update(batch(CameraRole::Wide, vec![person(1, &[0.0, 0.0])]))
            .await;
        let second = store
            .update(batch(CameraRole::Close, vec![person(8, &[300.0, 400.0])]))
            .await;

        assert_eq!(first, second);
        assert_eq!(store.identity_count().await, 1);
    }

    #[tokio::test]
    async fn test_absent_descriptor_always_allocates() {
        let store = store();
        let bare = || Detection::new(1).with_bbox(BBox::new(0.0, 0.0, 10.0, 10.0));
        let a = store.update(batch(CameraRole::Wide, vec![bare()])).await;
        let b = store.update(batch(CameraRole::Wide, vec![bare()])).await;

        assert_ne!(a, b);
        assert_eq!(store.identity_count().await, 2);
    }

    #[tokio::test]
    async fn test_live_table_rebuilt_per_batch() {
        let mut config = FusionPolicy::default();
        config.reid.match_threshold = 1.0;
        let store = IdentityStore::new(Arc::new(ConfigStore::new(config).unwrap()));

        let ids = store
            .update(batch(
                CameraRole::Wide,
                vec![person(1, &[0.0]), person(2, &[100.0])],
            ))
            .await;
        assert_eq!(store.live_identities(CameraRole::Wide).await.len(), 2);

        store
            .update(batch(CameraRole::Wide, vec![person(1, &[0.0])]))
            .await;
        let live = store.live_identities(CameraRole::Wide).await;
        assert_eq!(live, vec![ids[0].clone()]);
        // evicted from the camera, not from the global table
        assert_eq!(store.identity_count().await, 2);
    }

    #[tokio::test]
    async fn test_merged_snapshot_prefers_close_camera() {
        let store = store();
        let mut wide = person(1, &[0.0, 0.0]);
        wide.bbox = Some(BBox::new(0.0, 0.0, 50.0, 50.0));
        store.update(batch(CameraRole::Wide, vec![wide])).await;
        store
            .update(batch(CameraRole::Close, vec![person(5, &[3.0, 4.0])]))
            .await;

        let merged = store.merged_snapshot().await;
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].camera, CameraRole::Close);
        assert_eq!(merged[0].detection.local_track_id, 5);
        assert_eq!(merged[0].seen_by, vec![CameraRole::Wide, CameraRole::Close]);
    }

    #[tokio::test]
    async fn test_descriptor_replaced_on_resolution() {
        let store = store();
        let ids = store
            .update(batch(CameraRole::Wide, vec![person(1, &[0.0, 0.0])]))
            .await;
        store
            .update(batch(CameraRole::Wide, vec![person(1, &[10.0, 0.0])]))
            .await;

        let merged = store.merged_snapshot().await;
        assert_eq!(merged[0].identity_id, ids[0]);
        assert_eq!(
            merged[0].detection.descriptor,
            Some(Descriptor::new(vec![10.0, 0.0]))
        );
    }

    #[tokio::test]
    async fn test_update_feeds_analyzer_and_presence() {
        let store = store();
        let ids = store
            .update(batch(CameraRole::Wide, vec![person(1, &[0.0])]))
            .await;
        store
            .update(batch(CameraRole::Wide, vec![person(1, &[0.0])]))
            .await;

        let snapshot = store.identity(&ids[0]).await.unwrap();
        assert_eq!(snapshot.history_len, 2);
        assert_eq!(snapshot.static_frames, 1);
        assert_eq!(snapshot.presence_samples, 1);
        assert!(!snapshot.loitering_active);
    }

    #[tokio::test]
    async fn test_gaze_escalates_behavior_label() {
        let store = store();
        let mut detection = person(1, &[0.0]);
        detection.looking_at_camera = Some(true);
        store.update(batch(CameraRole::Close, vec![detection])).await;

        let merged = store.merged_snapshot().await;
        assert_eq!(merged[0].behavior.label, "looking at camera");
        assert!(merged[0].behavior.anomalous);
    }

    #[tokio::test]
    async fn test_collect_stale_evicts_everywhere() {
        let store = store();
        let old = Utc::now() - Duration::seconds(600);
        let stale_ids = store
            .update(batch(CameraRole::Wide, vec![Detection::new(1).with_bbox(BBox::new(0.0, 0.0, 5.0, 5.0))]).at(old))
            .await;
        let fresh_ids = store
            .update(batch(CameraRole::Close, vec![person(2, &[1.0])]))
            .await;

        let evicted = store.collect_stale(Utc::now()).await;
        assert_eq!(evicted, stale_ids);
        assert_eq!(store.identity_count().await, 1);
        assert!(store.live_identities(CameraRole::Wide).await.is_empty());
        assert_eq!(store.live_identities(CameraRole::Close).await, fresh_ids);
    }

    #[tokio::test]
    async fn test_collect_stale_disabled_without_ttl() {
        let mut policy = FusionPolicy::default();
        policy.retention.identity_ttl_sec = None;
        let store = IdentityStore::new(Arc::new(ConfigStore::new(policy).unwrap()));
        let old = Utc::now() - Duration::seconds(10_000);
        store
            .update(batch(CameraRole::Wide, vec![person(1, &[0.0])]).at(old))
            .await;

        assert!(store.collect_stale(Utc::now()).await.is_empty());
        assert_eq!(store.identity_count().await, 1);
    }

    #[tokio::test]
    async fn test_analyze_unknown_identity_is_not_found() {
        let store = store();
        let result = store
            .analyze(
                &IdentityId::new("missing"),
                CameraRole::Wide,
                Position::new(0.5, 0.5),
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_producers_do_not_lose_updates() {
        let store = Arc::new(store());
        let seed = store
            .update(batch(CameraRole::Wide, vec![person(1, &[0.0])]))
            .await;

        let mut tasks = Vec::new();
        for camera in CameraRole::ALL {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..20 {
                    store
                        .update(batch(camera, vec![person(i, &[0.0])]))
                        .await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let snapshot = store.identity(&seed[0]).await.unwrap();
        assert_eq!(store.identity_count().await, 1);
        // seed + 20 on the wide camera, 20 on the close camera
        let wide = &snapshot.motion[0];
        let close = &snapshot.motion[1];
        assert_eq!((wide.camera, wide.history_len, wide.static_frames), (CameraRole::Wide, 21, 20));
        assert_eq!((close.camera, close.history_len, close.static_frames), (CameraRole::Close, 20, 19));
        assert_eq!(snapshot.static_frames, 19);
    }

    #[tokio::test]
    async fn test_still_subject_on_both_cameras_is_not_sudden() {
        let store = store();
        // centered on the wide view, lower-left on the close view
        let wide = || person(1, &[0.0]);
        let close = || {
            let mut d = person(2, &[0.0]);
            d.bbox = Some(BBox::new(0.0, 500.0, 200.0, 720.0));
            d
        };

        let mut sudden = 0;
        for _ in 0..100 {
            store.update(batch(CameraRole::Wide, vec![wide()])).await;
            store.update(batch(CameraRole::Close, vec![close()])).await;
            let merged = store.merged_snapshot().await;
            assert_eq!(merged.len(), 1);
            if merged[0].behavior.kind == BehaviorKind::SuddenMotion {
                sudden += 1;
            }
        }
        assert_eq!(sudden, 0);

        let merged = store.merged_snapshot().await;
        assert_eq!(merged[0].camera, CameraRole::Close);
        assert_eq!(merged[0].behavior.kind, BehaviorKind::StaticAnomaly);

        let snapshot = store.identity(&merged[0].identity_id).await.unwrap();
        assert!(snapshot
            .motion
            .iter()
            .all(|m| m.static_frames == 99 && m.history_len == 30));
    }

    #[tokio::test]
    async fn test_analyze_keeps_cameras_apart() {
        let store = store();
        let ids = store
            .update(batch(CameraRole::Wide, vec![person(1, &[0.0])]))
            .await;

        // far from the wide-view center, a jump if the histories were shared
        let verdict = store
            .analyze(&ids[0], CameraRole::Close, Position::new(0.9, 0.1), Utc::now())
            .await
            .unwrap();
        assert_eq!(verdict.kind, BehaviorKind::Normal);

        let snapshot = store.identity(&ids[0]).await.unwrap();
        assert_eq!(snapshot.motion.len(), 2);
        assert!(snapshot.motion.iter().all(|m| m.history_len == 1));
    }

    #[tokio::test]
    async fn test_seen_by_tracks_current_visibility() {
        let store = store();
        let ids = store
            .update(batch(CameraRole::Wide, vec![person(1, &[0.0])]))
            .await;
        store
            .update(batch(CameraRole::Close, vec![person(2, &[0.0])]))
            .await;
        assert_eq!(
            store.identity(&ids[0]).await.unwrap().seen_by,
            vec![CameraRole::Wide, CameraRole::Close]
        );

        // the wide camera loses the person
        store.update(batch(CameraRole::Wide, Vec::new())).await;
        assert_eq!(
            store.identity(&ids[0]).await.unwrap().seen_by,
            vec![CameraRole::Close]
        );

        store.clear_camera(CameraRole::Close).await;
        assert!(store.identity(&ids[0]).await.unwrap().seen_by.is_empty());
    }

    #[tokio::test]
    async fn test_collect_stale_keeps_recently_seen() {
        let store = store();
        let old = Utc::now() - Duration::seconds(200);
        store
            .update(batch(CameraRole::Wide, vec![person(1, &[0.0])]).at(old))
            .await;

        assert!(store.collect_stale(Utc::now()).await.is_empty());
        assert_eq!(store.identity_count().await, 1);
    }
}
