//! Shared domain types
//!
//! Detections as produced by the per-camera perception adapters, and the
//! closed enumerations (camera role, risk class, emotion) used across the
//! fusion pipeline.

use crate::appearance::Descriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Camera role in the deployment
///
/// The close-range camera carries the detail view (faces, accessories);
/// its detection wins when both cameras see the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraRole {
    /// Wide/overview camera
    Wide,
    /// Close-range/detail camera
    Close,
}

impl CameraRole {
    /// All roles, lowest precedence first
    pub const ALL: [CameraRole; 2] = [CameraRole::Wide, CameraRole::Close];

    /// Merge precedence (higher wins)
    pub fn precedence(self) -> u8 {
        match self {
            CameraRole::Wide => 0,
            CameraRole::Close => 1,
        }
    }

    /// Single-letter origin tag used in identity ids
    pub fn origin_tag(self) -> char {
        match self {
            CameraRole::Wide => 'W',
            CameraRole::Close => 'C',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CameraRole::Wide => "wide",
            CameraRole::Close => "close",
        }
    }
}

impl fmt::Display for CameraRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned bounding box in pixel coordinates (x1, y1) - (x2, y2)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// All four coordinates are finite numbers
    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// Area in square pixels; inverted or degenerate boxes have zero area
    pub fn area(&self) -> f32 {
        let w = (self.x2 - self.x1).max(0.0);
        let h = (self.y2 - self.y1).max(0.0);
        w * h
    }

    /// Smallest box enclosing both
    pub fn envelope(&self, other: &BBox) -> BBox {
        BBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Box center normalized by frame size, each axis in 0.0..=1.0 for boxes inside the frame
    pub fn normalized_center(&self, frame: FrameSize) -> Option<Position> {
        if frame.width == 0 || frame.height == 0 || !self.is_finite() {
            return None;
        }
        Some(Position {
            x: (self.x1 + self.x2) / 2.0 / frame.width as f32,
            y: (self.y1 + self.y2) / 2.0 / frame.height as f32,
        })
    }
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> f32 {
        self.width as f32 * self.height as f32
    }
}

/// Normalized position (0.0 = top/left, 1.0 = bottom/right)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Concealment / risk object classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    FaceCovering,
    Headwear,
    Eyewear,
}

impl RiskClass {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskClass::FaceCovering => "face_covering",
            RiskClass::Headwear => "headwear",
            RiskClass::Eyewear => "eyewear",
        }
    }
}

/// Auxiliary risk object attached to a person detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskObject {
    pub class: RiskClass,
    pub bbox: BBox,
}

/// Facial emotion label from the external classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl Emotion {
    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
        }
    }
}

/// One person as seen by one camera in one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Camera-local tracker id
    pub local_track_id: i64,
    /// Primary person box (envelope of body parts), if resolved
    pub bbox: Option<BBox>,
    /// Appearance sub-regions (clothing boxes) used for the descriptor
    #[serde(default)]
    pub appearance_regions: Vec<BBox>,
    /// Auxiliary risk objects
    #[serde(default)]
    pub risk_objects: Vec<RiskObject>,
    /// Appearance descriptor; replaced wholesale on resolution, never mutated
    #[serde(default, skip_serializing)]
    pub descriptor: Option<Descriptor>,
    /// Pose-derived gaze flag from the external pose estimator
    #[serde(default)]
    pub looking_at_camera: Option<bool>,
    /// Emotion label from the external classifier
    #[serde(default)]
    pub emotion: Option<Emotion>,
}

impl Detection {
    pub fn new(local_track_id: i64) -> Self {
        Self {
            local_track_id,
            bbox: None,
            appearance_regions: Vec::new(),
            risk_objects: Vec::new(),
            descriptor: None,
            looking_at_camera: None,
            emotion: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn with_risk(mut self, class: RiskClass, bbox: BBox) -> Self {
        self.risk_objects.push(RiskObject { class, bbox });
        self
    }

    pub fn has_risk(&self, class: RiskClass) -> bool {
        self.risk_objects.iter().any(|o| o.class == class)
    }
}

/// Everything one camera producer reports for one frame
#[derive(Debug, Clone)]
pub struct DetectionBatch {
    pub camera: CameraRole,
    pub frame_id: u64,
    pub captured_at: DateTime<Utc>,
    pub frame_size: FrameSize,
    pub detections: Vec<Detection>,
    /// Source frame for descriptor extraction, when the producer supplies it
    pub frame: Option<std::sync::Arc<image::RgbImage>>,
}

impl DetectionBatch {
    pub fn new(camera: CameraRole, frame_size: FrameSize, detections: Vec<Detection>) -> Self {
        Self {
            camera,
            frame_id: 0,
            captured_at: Utc::now(),
            frame_size,
            detections,
            frame: None,
        }
    }

    pub fn at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }
}

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub cycle: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_extends_both_corners() {
        let upper = BBox::new(100.0, 50.0, 200.0, 150.0);
        let lower = BBox::new(90.0, 140.0, 210.0, 300.0);
        assert_eq!(upper.envelope(&lower), BBox::new(90.0, 50.0, 210.0, 300.0));
    }

    #[test]
    fn test_inverted_box_has_zero_area() {
        assert_eq!(BBox::new(10.0, 10.0, 5.0, 20.0).area(), 0.0);
        assert_eq!(BBox::new(0.0, 0.0, 10.0, 20.0).area(), 200.0);
    }

    #[test]
    fn test_normalized_center() {
        let center = BBox::new(0.0, 0.0, 320.0, 240.0)
            .normalized_center(FrameSize::new(640, 480))
            .unwrap();
        assert_eq!(center, Position::new(0.25, 0.25));
        assert!(BBox::new(0.0, 0.0, 1.0, 1.0)
            .normalized_center(FrameSize::new(0, 480))
            .is_none());
    }

    #[test]
    fn test_close_camera_wins_precedence() {
        assert!(CameraRole::Close.precedence() > CameraRole::Wide.precedence());
    }
}
