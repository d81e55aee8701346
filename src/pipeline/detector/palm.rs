use std::{cmp::Ordering, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    common::{LetterboxInfo, PALM_INPUT_SIZE, prepare_frame},
    tracker::PalmStage,
};
use crate::types::Frame;

/// Wrist, index knuckle, middle knuckle, ring knuckle, pinky knuckle and two
/// thumb joints, in that order.
const PALM_KEYPOINTS: usize = 7;
const WRIST: usize = 0;
const MIDDLE_KNUCKLE: usize = 2;
const MIN_FEATURES: usize = 4 + PALM_KEYPOINTS * 2;
const NUM_ANCHORS: usize = 2016;

/// How far the landmark crop reaches past the palm box, and how far its
/// center moves toward the fingers, both in palm box sizes.
const CROP_SCALE: f32 = 2.6;
const CROP_SHIFT: f32 = 0.5;

/// A palm found in frame pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct PalmRegion {
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
    pub keypoints: Vec<(f32, f32)>,
    pub score: f32,
}

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub max_palms: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            max_palms: 4,
        }
    }
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
    cfg: PalmDetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: ssd_anchors(),
            cfg,
        })
    }
}

impl PalmStage for PalmDetector {
    fn find_palms(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = prepare_frame(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let features = boxes
            .shape()
            .last()
            .copied()
            .ok_or_else(|| anyhow!("palm boxes have no shape"))?;

        decode_palms(
            boxes
                .as_slice()
                .ok_or_else(|| anyhow!("palm boxes not contiguous"))?,
            features,
            scores
                .as_slice()
                .ok_or_else(|| anyhow!("palm scores not contiguous"))?,
            &self.anchors,
            &letterbox,
            &self.cfg,
        )
    }
}

/// Anchor centers for the 192 px model: a 24x24 grid at stride 8 with two
/// anchors per cell, then a 12x12 grid at stride 16 with six.
fn ssd_anchors() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (stride, per_cell) in [(8, 2), (16, 6)] {
        let grid = PALM_INPUT_SIZE / stride;
        for y in 0..grid {
            for x in 0..grid {
                let center = [
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                ];
                anchors.extend(std::iter::repeat_n(center, per_cell));
            }
        }
    }
    anchors
}

/// Turns raw regressor rows into palms in frame pixels, strongest first.
/// Offsets are in model input pixels, relative to each anchor.
fn decode_palms(
    boxes: &[f32],
    features: usize,
    scores: &[f32],
    anchors: &[[f32; 2]],
    letterbox: &LetterboxInfo,
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    if features < MIN_FEATURES {
        return Err(anyhow!("palm box rows too short: {features}"));
    }
    let count = anchors.len().min(scores.len());
    if boxes.len() < count * features {
        return Err(anyhow!(
            "palm boxes truncated: got {}, need {}",
            boxes.len(),
            count * features
        ));
    }

    let input = PALM_INPUT_SIZE as f32;
    let max_x = letterbox.orig_w.saturating_sub(1) as f32;
    let max_y = letterbox.orig_h.saturating_sub(1) as f32;
    let to_frame = |anchor: [f32; 2], dx: f32, dy: f32| {
        (
            ((anchor[0] * input + dx) - letterbox.pad_x) / letterbox.scale,
            ((anchor[1] * input + dy) - letterbox.pad_y) / letterbox.scale,
        )
    };

    let mut candidates = Vec::new();
    for (idx, anchor) in anchors.iter().take(count).enumerate() {
        let score = sigmoid(scores[idx]);
        if score < cfg.score_threshold {
            continue;
        }

        let row = &boxes[idx * features..(idx + 1) * features];
        let (cx, cy) = to_frame(*anchor, row[0], row[1]);
        let half_w = row[2] / 2.0 / letterbox.scale;
        let half_h = row[3] / 2.0 / letterbox.scale;
        if half_w <= 0.0 || half_h <= 0.0 {
            continue;
        }

        let keypoints = row[4..MIN_FEATURES]
            .chunks_exact(2)
            .map(|pair| to_frame(*anchor, pair[0], pair[1]))
            .collect();

        candidates.push(PalmRegion {
            bbox: [
                (cx - half_w).clamp(0.0, max_x),
                (cy - half_h).clamp(0.0, max_y),
                (cx + half_w).clamp(0.0, max_x),
                (cy + half_h).clamp(0.0, max_y),
            ],
            keypoints,
            score,
        });
    }

    Ok(suppress_overlaps(candidates, cfg))
}

fn suppress_overlaps(mut candidates: Vec<PalmRegion>, cfg: &PalmDetectorConfig) -> Vec<PalmRegion> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<PalmRegion> = Vec::new();
    for candidate in candidates {
        if kept.len() >= cfg.max_palms {
            break;
        }
        if kept
            .iter()
            .all(|palm| iou(&palm.bbox, &candidate.bbox) < cfg.nms_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

pub fn pick_primary_region(regions: &[PalmRegion]) -> Option<&PalmRegion> {
    regions
        .iter()
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))
}

/// Square crop around the whole hand: `(center, side, angle)` in frame
/// pixels and radians. The angle turns the crop so the fingers point up.
pub fn crop_from_palm(region: &PalmRegion) -> ((f32, f32), f32, f32) {
    let [x1, y1, x2, y2] = region.bbox;
    let size = (x2 - x1).max(y2 - y1);
    let mut center = ((x1 + x2) * 0.5, (y1 + y2) * 0.5);

    let angle = match (
        region.keypoints.get(WRIST),
        region.keypoints.get(MIDDLE_KNUCKLE),
    ) {
        (Some(wrist), Some(knuckle)) => {
            let (vx, vy) = (knuckle.0 - wrist.0, knuckle.1 - wrist.1);
            let len = vx.hypot(vy);
            if len > f32::EPSILON {
                center.0 += vx / len * size * CROP_SHIFT;
                center.1 += vy / len * size * CROP_SHIFT;
            }
            vx.atan2(-vy)
        }
        _ => 0.0,
    };

    (center, size * CROP_SCALE, angle)
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    // 384x192 frame: letterboxed at half scale with 48 px bars top and bottom.
    fn letterbox() -> LetterboxInfo {
        LetterboxInfo {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 48.0,
            orig_w: 384,
            orig_h: 192,
        }
    }

    fn row(dx: f32, dy: f32, size: f32) -> Vec<f32> {
        let mut row = vec![dx, dy, size, size];
        row.extend([0.0; PALM_KEYPOINTS * 2]);
        row
    }

    fn region(bbox: [f32; 4], wrist: (f32, f32), knuckle: (f32, f32)) -> PalmRegion {
        PalmRegion {
            bbox,
            keypoints: vec![wrist, (0.0, 0.0), knuckle],
            score: 0.9,
        }
    }

    #[test]
    fn anchors_cover_both_grids() {
        let anchors = ssd_anchors();
        assert_eq!(anchors.len(), NUM_ANCHORS);
        assert_eq!(anchors[0], [0.5 / 24.0, 0.5 / 24.0]);
        assert_eq!(anchors[0], anchors[1]);
        assert_eq!(anchors[24 * 24 * 2], [0.5 / 12.0, 0.5 / 12.0]);
    }

    #[test]
    fn decodes_into_frame_pixels() {
        let anchors = [[0.5, 0.5], [0.25, 0.25]];
        let boxes = [row(0.0, 0.0, 48.0), row(0.0, 0.0, 48.0)].concat();
        let scores = [5.0, -5.0];

        let palms = decode_palms(
            &boxes,
            MIN_FEATURES,
            &scores,
            &anchors,
            &letterbox(),
            &PalmDetectorConfig::default(),
        )
        .unwrap();

        assert_eq!(palms.len(), 1);
        assert_eq!(palms[0].bbox, [144.0, 48.0, 240.0, 144.0]);
        assert_eq!(palms[0].keypoints[0], (192.0, 96.0));
        assert!(palms[0].score > 0.99);
    }

    #[test]
    fn overlapping_palms_keep_the_strongest() {
        let anchors = [[0.5, 0.5], [0.5, 0.5]];
        let boxes = [row(0.0, 0.0, 48.0), row(2.0, 0.0, 48.0)].concat();
        let scores = [1.0, 3.0];

        let palms = decode_palms(
            &boxes,
            MIN_FEATURES,
            &scores,
            &anchors,
            &letterbox(),
            &PalmDetectorConfig::default(),
        )
        .unwrap();

        assert_eq!(palms.len(), 1);
        assert_eq!(palms[0].bbox[0], 148.0);
    }

    #[test]
    fn short_rows_are_rejected() {
        let result = decode_palms(
            &[0.0; 8],
            4,
            &[5.0, 5.0],
            &[[0.5, 0.5]; 2],
            &letterbox(),
            &PalmDetectorConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn upright_palm_crops_without_rotation() {
        let palm = region([100.0, 100.0, 140.0, 140.0], (120.0, 140.0), (120.0, 100.0));
        let (center, side, angle) = crop_from_palm(&palm);

        assert!(angle.abs() < 1e-5);
        assert_eq!(side, 40.0 * CROP_SCALE);
        // Shifted toward the fingers, which point up.
        assert_eq!(center, (120.0, 100.0));
    }

    #[test]
    fn sideways_palm_turns_a_quarter() {
        let palm = region([100.0, 100.0, 140.0, 140.0], (100.0, 120.0), (140.0, 120.0));
        let (center, _, angle) = crop_from_palm(&palm);

        assert!((angle - FRAC_PI_2).abs() < 1e-5);
        assert_eq!(center, (140.0, 120.0));
    }

    #[test]
    fn primary_region_is_the_most_confident() {
        let mut weak = region([0.0; 4], (0.0, 0.0), (0.0, 0.0));
        weak.score = 0.6;
        let strong = region([1.0; 4], (0.0, 0.0), (0.0, 0.0));

        let regions = [weak, strong.clone()];
        assert_eq!(pick_primary_region(&regions), Some(&strong));
        assert_eq!(pick_primary_region(&[]), None);
    }
}
