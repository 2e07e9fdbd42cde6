//! IdentityResolver - Cross-Camera Re-identification
//!
//! ## Responsibilities
//!
//! - Compute (or accept) a detection's appearance descriptor
//! - Greedy nearest-match against known identities
//! - Synthesize process-unique identity ids
//!
//! Matching is a linear scan in first-seen order; the minimum distance wins
//! if it is strictly below the match threshold, and ties keep the earlier
//! identity. Two detections of the same cycle may land on the same identity.

use crate::appearance::{descriptor_distance, extract_descriptor, Descriptor};
use crate::config_store::ReidPolicy;
use crate::models::{CameraRole, Detection};
use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-unique identity id
///
/// Rendered as `{origin}-{local_track_id}-{centiseconds}-{sequence}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of resolving one detection
#[derive(Debug, Clone)]
pub struct Resolution {
    pub identity_id: IdentityId,
    /// Descriptor the identity should carry from now on
    pub descriptor: Option<Arc<Descriptor>>,
    /// Distance to the matched identity; `None` for a new identity
    pub distance: Option<f32>,
}

impl Resolution {
    pub fn is_new(&self) -> bool {
        self.distance.is_none()
    }
}

/// IdentityResolver instance
#[derive(Debug, Default)]
pub struct IdentityResolver {
    sequence: AtomicU64,
}

impl IdentityResolver {
    /// Create new IdentityResolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor for a detection: precomputed wins, else extracted from the frame
    pub fn descriptor_for(
        &self,
        detection: &Detection,
        frame: Option<&RgbImage>,
        policy: &ReidPolicy,
    ) -> Option<Descriptor> {
        if let Some(descriptor) = &detection.descriptor {
            if !descriptor.is_empty() {
                return Some(descriptor.clone());
            }
        }
        let frame = frame?;
        extract_descriptor(frame, &detection.appearance_regions, policy.histogram_bins)
    }

    /// Nearest candidate strictly below the threshold
    ///
    /// Candidates must be given in first-seen order.
    pub fn best_match<'a, I>(
        &self,
        probe: Option<&Descriptor>,
        candidates: I,
        policy: &ReidPolicy,
    ) -> Option<(IdentityId, f32)>
    where
        I: IntoIterator<Item = (&'a IdentityId, Option<&'a Descriptor>)>,
    {
        let probe = probe?;
        let mut best: Option<(&IdentityId, f32)> = None;
        for (id, stored) in candidates {
            let distance = descriptor_distance(Some(probe), stored);
            if distance >= policy.match_threshold {
                continue;
            }
            match best {
                Some((_, current)) if current <= distance => {}
                _ => best = Some((id, distance)),
            }
        }
        best.map(|(id, distance)| (id.clone(), distance))
    }

    /// Allocate a fresh identity id
    pub fn new_identity_id(
        &self,
        camera: CameraRole,
        local_track_id: i64,
        at: DateTime<Utc>,
    ) -> IdentityId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        IdentityId(format!(
            "{}-{}-{}-{}",
            camera.origin_tag(),
            local_track_id,
            at.timestamp_millis() / 10,
            seq
        ))
    }

    /// Resolve a detection against the known identities
    pub fn resolve<'a, I>(
        &self,
        camera: CameraRole,
        detection: &Detection,
        frame: Option<&RgbImage>,
        at: DateTime<Utc>,
        candidates: I,
        policy: &ReidPolicy,
    ) -> Resolution
    where
        I: IntoIterator<Item = (&'a IdentityId, Option<&'a Descriptor>)>,
    {
        let descriptor = self.descriptor_for(detection, frame, policy);

        if let Some((identity_id, distance)) =
            self.best_match(descriptor.as_ref(), candidates, policy)
        {
            tracing::trace!(
                camera = %camera,
                local_track_id = detection.local_track_id,
                identity_id = %identity_id,
                distance = distance,
                "Detection matched existing identity"
            );
            return Resolution {
                identity_id,
                descriptor: descriptor.map(Arc::new),
                distance: Some(distance),
            };
        }

        let identity_id = self.new_identity_id(camera, detection.local_track_id, at);
        if descriptor.is_none() {
            tracing::debug!(
                camera = %camera,
                local_track_id = detection.local_track_id,
                identity_id = %identity_id,
                "No appearance descriptor, allocating new identity"
            );
        }
        Resolution {
            identity_id,
            descriptor: descriptor.map(Arc::new),
            distance: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BBox;

    fn desc(values: &[f32]) -> Descriptor {
        Descriptor::new(values.to_vec())
    }

    #[test]
    fn test_best_match_picks_minimum_below_threshold() {
        let resolver = IdentityResolver::new();
        let policy = ReidPolicy {
            match_threshold: 10.0,
            ..Default::default()
        };
        let a = IdentityId::new("a");
        let b = IdentityId::new("b");
        let c = IdentityId::new("c");
        let da = desc(&[8.0, 0.0]);
        let db = desc(&[3.0, 0.0]);
        let dc = desc(&[50.0, 0.0]);

        let probe = desc(&[0.0, 0.0]);
        let found = resolver.best_match(
            Some(&probe),
            vec![(&a, Some(&da)), (&b, Some(&db)), (&c, Some(&dc))],
            &policy,
        );
        assert_eq!(found, Some((b.clone(), 3.0)));
    }

    #[test]
    fn test_ties_keep_first_seen() {
        let resolver = IdentityResolver::new();
        let first = IdentityId::new("first");
        let second = IdentityId::new("second");
        let d1 = desc(&[0.0, 4.0]);
        let d2 = desc(&[4.0, 0.0]);
        let probe = desc(&[0.0, 0.0]);

        let found = resolver.best_match(
            Some(&probe),
            vec![(&first, Some(&d1)), (&second, Some(&d2))],
            &ReidPolicy::default(),
        );
        assert_eq!(found.map(|(id, _)| id), Some(first));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let resolver = IdentityResolver::new();
        let policy = ReidPolicy {
            match_threshold: 5.0,
            ..Default::default()
        };
        let id = IdentityId::new("x");
        let stored = desc(&[3.0, 4.0]);
        let probe = desc(&[0.0, 0.0]);
        assert!(resolver
            .best_match(Some(&probe), vec![(&id, Some(&stored))], &policy)
            .is_none());
    }

    #[test]
    fn test_missing_descriptor_never_matches() {
        let resolver = IdentityResolver::new();
        let id = IdentityId::new("x");
        let stored = desc(&[0.0, 0.0]);
        let probe = desc(&[0.0, 0.0]);

        assert!(resolver
            .best_match(None, vec![(&id, Some(&stored))], &ReidPolicy::default())
            .is_none());
        assert!(resolver
            .best_match(Some(&probe), vec![(&id, None)], &ReidPolicy::default())
            .is_none());
    }

    #[test]
    fn test_new_ids_are_unique_for_same_track_and_instant() {
        let resolver = IdentityResolver::new();
        let at = Utc::now();
        let a = resolver.new_identity_id(CameraRole::Close, 3, at);
        let b = resolver.new_identity_id(CameraRole::Close, 3, at);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("C-3-"));
    }

    #[test]
    fn test_resolve_extracts_descriptor_from_frame() {
        let resolver = IdentityResolver::new();
        let frame = RgbImage::from_pixel(64, 64, image::Rgb([200, 30, 30]));
        let mut detection = Detection::new(1).with_bbox(BBox::new(0.0, 0.0, 32.0, 64.0));
        detection.appearance_regions.push(BBox::new(0.0, 0.0, 32.0, 32.0));

        let resolution = resolver.resolve(
            CameraRole::Wide,
            &detection,
            Some(&frame),
            Utc::now(),
            std::iter::empty(),
            &ReidPolicy::default(),
        );
        assert!(resolution.is_new());
        assert_eq!(resolution.descriptor.map(|d| d.len()), Some(64));
    }

    #[test]
    fn test_precomputed_descriptor_wins() {
        let resolver = IdentityResolver::new();
        let detection = Detection::new(1).with_descriptor(desc(&[1.0, 2.0]));
        let descriptor = resolver.descriptor_for(&detection, None, &ReidPolicy::default());
        assert_eq!(descriptor, Some(desc(&[1.0, 2.0])));
    }
}
