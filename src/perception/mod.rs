//! Perception adapter
//!
//! Turns raw per-class tracker output into person detections. The object
//! detector emits separate boxes for body parts and accessories that share
//! a tracker id; grouping folds them back into one `Detection` per track.

use crate::config_store::{ClassMap, ClassRole};
use crate::models::{BBox, Detection, RiskObject};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One tracked box from the object detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub local_track_id: i64,
    pub class_id: u32,
    pub bbox: BBox,
}

/// Group records by tracker id into person detections
///
/// Body-part boxes are unioned into the person box and kept as appearance
/// regions; risk classes become risk objects. Tracks without any body part
/// are dropped. Output follows first appearance of each tracker id.
pub fn group_records(records: &[DetectionRecord], classes: &ClassMap) -> Vec<Detection> {
    let mut order: Vec<i64> = Vec::new();
    let mut groups: HashMap<i64, Detection> = HashMap::new();

    for record in records {
        if !record.bbox.is_finite() {
            tracing::warn!(
                local_track_id = record.local_track_id,
                class_id = record.class_id,
                "Dropping detection record with non-finite box"
            );
            continue;
        }

        let role = classes.role(record.class_id);
        if role == ClassRole::Ignored {
            continue;
        }

        let detection = groups.entry(record.local_track_id).or_insert_with(|| {
            order.push(record.local_track_id);
            Detection::new(record.local_track_id)
        });

        match role {
            ClassRole::BodyPart => {
                detection.bbox = Some(match detection.bbox {
                    Some(current) => current.envelope(&record.bbox),
                    None => record.bbox,
                });
                detection.appearance_regions.push(record.bbox);
            }
            ClassRole::Risk(class) => detection.risk_objects.push(RiskObject {
                class,
                bbox: record.bbox,
            }),
            ClassRole::Ignored => {}
        }
    }

    order
        .into_iter()
        .filter_map(|id| groups.remove(&id))
        .filter(|d| d.bbox.is_some())
        .collect()
}
