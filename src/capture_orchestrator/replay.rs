//! ReplaySource - detector output from a JSON Lines file
//!
//! Each line is one frame:
//!
//! ```json
//! {"frame_id": 1, "width": 1280, "height": 720,
//!  "records": [{"local_track_id": 7, "class_id": 4, "bbox": {"x1": 0, "y1": 0, "x2": 10, "y2": 10}}],
//!  "descriptors": {"7": [0.0, 12.5]}, "gaze": {"7": true}, "emotions": {"7": "angry"}}
//! ```

use super::DetectionSource;
use crate::appearance::Descriptor;
use crate::config_store::ConfigStore;
use crate::error::{Error, Result};
use crate::models::{CameraRole, DetectionBatch, Emotion, FrameSize};
use crate::perception::{group_records, DetectionRecord};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

/// One line of the replay file
#[derive(Debug, Deserialize)]
pub struct ReplayFrame {
    #[serde(default)]
    pub frame_id: u64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub records: Vec<DetectionRecord>,
    #[serde(default)]
    pub descriptors: HashMap<i64, Vec<f32>>,
    #[serde(default)]
    pub gaze: HashMap<i64, bool>,
    #[serde(default)]
    pub emotions: HashMap<i64, Emotion>,
}

impl ReplayFrame {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| Error::MalformedInput(format!("replay frame: {}", e)))
    }
}

/// Replays recorded detector output as a camera feed
pub struct ReplaySource {
    camera: CameraRole,
    path: PathBuf,
    config: Arc<ConfigStore>,
    lines: Option<Lines<BufReader<File>>>,
    finished: bool,
    skipped: u64,
}

impl ReplaySource {
    pub fn new(camera: CameraRole, path: impl Into<PathBuf>, config: Arc<ConfigStore>) -> Self {
        Self {
            camera,
            path: path.into(),
            config,
            lines: None,
            finished: false,
            skipped: 0,
        }
    }

    /// Malformed lines skipped so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    async fn open(&mut self) -> Result<&mut Lines<BufReader<File>>> {
        if self.lines.is_none() {
            let file = File::open(&self.path).await.map_err(|e| Error::Source {
                camera: self.camera.to_string(),
                message: format!("cannot open {}: {}", self.path.display(), e),
            })?;
            tracing::info!(
                camera = %self.camera,
                path = %self.path.display(),
                "Replay feed opened"
            );
            self.lines = Some(BufReader::new(file).lines());
        }
        self.lines
            .as_mut()
            .ok_or_else(|| Error::Internal("replay reader missing".to_string()))
    }

    async fn to_batch(&self, frame: ReplayFrame) -> DetectionBatch {
        let classes = self.config.policy().await.classes;
        let mut detections = group_records(&frame.records, &classes);
        for detection in detections.iter_mut() {
            let id = detection.local_track_id;
            if let Some(values) = frame.descriptors.get(&id) {
                detection.descriptor = Some(Descriptor::new(values.clone()));
            }
            detection.looking_at_camera = frame.gaze.get(&id).copied();
            detection.emotion = frame.emotions.get(&id).copied();
        }

        let mut batch = DetectionBatch::new(
            self.camera,
            FrameSize::new(frame.width, frame.height),
            detections,
        );
        batch.frame_id = frame.frame_id;
        batch
    }
}

#[async_trait]
impl DetectionSource for ReplaySource {
    fn role(&self) -> CameraRole {
        self.camera
    }

    async fn poll(&mut self) -> Result<Option<DetectionBatch>> {
        if self.finished {
            return Ok(None);
        }
        let camera = self.camera;
        let lines = self.open().await?;

        let line = lines.next_line().await.map_err(|e| Error::Source {
            camera: camera.to_string(),
            message: format!("read failed: {}", e),
        })?;

        let Some(line) = line else {
            self.finished = true;
            tracing::info!(camera = %camera, "Replay feed exhausted");
            return Ok(None);
        };
        if line.trim().is_empty() {
            return Ok(None);
        }

        match ReplayFrame::parse(&line) {
            Ok(frame) => Ok(Some(self.to_batch(frame).await)),
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(
                    camera = %camera,
                    error = %e,
                    skipped = self.skipped,
                    "Skipping malformed replay line"
                );
                Ok(None)
            }
        }
    }

    async fn release(&mut self) {
        if self.lines.take().is_some() {
            tracing::info!(camera = %self.camera, "Replay feed released");
        }
    }
}
