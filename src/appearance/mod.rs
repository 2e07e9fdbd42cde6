//! Appearance descriptors
//!
//! Clothing-region color histograms used for cross-camera re-identification.
//! A descriptor is the flattened, min-max normalized joint hue/saturation
//! histogram of the pixels covered by the union of a detection's appearance
//! regions.

use crate::models::BBox;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Fixed-length appearance summary
///
/// Immutable once built: an identity's descriptor is replaced wholesale,
/// never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor(Vec<f32>);

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean distance; mismatched lengths never match
    pub fn distance(&self, other: &Descriptor) -> f32 {
        if self.0.len() != other.0.len() {
            return f32::INFINITY;
        }
        let sum: f32 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        if sum.is_finite() {
            sum.sqrt()
        } else {
            f32::INFINITY
        }
    }
}

/// Distance between two optional descriptors (`+inf` if either is missing)
pub fn descriptor_distance(a: Option<&Descriptor>, b: Option<&Descriptor>) -> f32 {
    match (a, b) {
        (Some(a), Some(b)) => a.distance(b),
        _ => f32::INFINITY,
    }
}

/// Build a descriptor from the union of `regions` on `frame`
///
/// Returns `None` when there are no regions or when every region falls
/// outside the frame.
pub fn extract_descriptor(frame: &RgbImage, regions: &[BBox], bins: [usize; 2]) -> Option<Descriptor> {
    if regions.is_empty() || bins[0] == 0 || bins[1] == 0 {
        return None;
    }

    let (width, height) = frame.dimensions();
    let mask = build_mask(width, height, regions);
    let [hue_bins, sat_bins] = bins;
    let mut hist = vec![0f32; hue_bins * sat_bins];
    let mut covered = 0usize;

    for (x, y, pixel) in frame.enumerate_pixels() {
        if !mask[(y * width + x) as usize] {
            continue;
        }
        let (h, s) = hue_saturation(pixel[0], pixel[1], pixel[2]);
        let h_bin = ((h as usize) * hue_bins / 180).min(hue_bins - 1);
        let s_bin = ((s as usize) * sat_bins / 256).min(sat_bins - 1);
        hist[h_bin * sat_bins + s_bin] += 1.0;
        covered += 1;
    }

    if covered == 0 {
        return None;
    }

    normalize_min_max(&mut hist, 255.0);
    Some(Descriptor::new(hist))
}

/// Union mask of all regions, clamped to the frame
fn build_mask(width: u32, height: u32, regions: &[BBox]) -> Vec<bool> {
    let mut mask = vec![false; (width as usize) * (height as usize)];
    for region in regions.iter().filter(|r| r.is_finite()) {
        let x1 = clamp_coord(region.x1, width);
        let x2 = clamp_coord(region.x2, width);
        let y1 = clamp_coord(region.y1, height);
        let y2 = clamp_coord(region.y2, height);
        for y in y1..y2 {
            let row = (y * width) as usize;
            for x in x1..x2 {
                mask[row + x as usize] = true;
            }
        }
    }
    mask
}

fn clamp_coord(value: f32, limit: u32) -> u32 {
    if value <= 0.0 {
        0
    } else {
        (value as u32).min(limit)
    }
}

/// 8-bit HSV conversion: hue on 0..180, saturation on 0..=255
fn hue_saturation(r: u8, g: u8, b: u8) -> (u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };

    let mut h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    (((h / 2.0).round() as u32).min(179) as u8, s.round().min(255.0) as u8)
}

/// Rescale so the smallest bin is 0 and the largest is `upper`; flat histograms become all zero
fn normalize_min_max(values: &mut [f32], upper: f32) {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    for v in values.iter_mut() {
        *v = if range > f32::EPSILON {
            (*v - min) * upper / range
        } else {
            0.0
        };
    }
}
