use serde::{Deserialize, Serialize};

use crate::types::{DetectionResult, DisplayPoint, Landmark};

/// How the source frame is laid out on the canvas. Must match the preview,
/// otherwise the overlay drifts from the visible hand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitPolicy {
    /// Cover the whole canvas, cropping overflow.
    #[default]
    Fill,
    /// Keep the whole source visible, letterboxing the rest.
    Fit,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl CanvasTransform {
    pub const IDENTITY: CanvasTransform = CanvasTransform {
        scale: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
    };

    /// Scale and centering offsets for a `source` sized image shown on a
    /// `canvas`. Degenerate sizes fall back to the identity transform.
    pub fn new(source: (u32, u32), canvas: (f32, f32), policy: FitPolicy) -> Self {
        let (sw, sh) = (source.0 as f32, source.1 as f32);
        let (cw, ch) = canvas;
        if source.0 == 0 || source.1 == 0 {
            return Self::IDENTITY;
        }

        let (rx, ry) = (cw / sw, ch / sh);
        let scale = match policy {
            FitPolicy::Fill => rx.max(ry),
            FitPolicy::Fit => rx.min(ry),
        };

        Self {
            scale,
            offset_x: (cw - sw * scale) / 2.0,
            offset_y: (ch - sh * scale) / 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateMapper {
    pub canvas_width: f32,
    pub canvas_height: f32,
    pub policy: FitPolicy,
    pub mirror: bool,
}

impl CoordinateMapper {
    pub fn new(canvas_width: f32, canvas_height: f32, policy: FitPolicy, mirror: bool) -> Self {
        Self {
            canvas_width,
            canvas_height,
            policy,
            mirror,
        }
    }

    pub fn map(&self, landmark: Landmark, source_width: u32, source_height: u32) -> Option<DisplayPoint> {
        map_point(
            landmark.x,
            landmark.y,
            source_width,
            source_height,
            self.canvas_width,
            self.canvas_height,
            self.policy,
            self.mirror,
        )
    }

    /// Maps the first hand's index fingertip, or `None` when there is nothing to draw.
    pub fn map_result(&self, result: Option<&DetectionResult>) -> Option<DisplayPoint> {
        let result = result?;
        let tip = result.primary_fingertip()?;
        self.map(tip, result.source_width, result.source_height)
    }
}

#[allow(clippy::too_many_arguments)]
pub fn map_point(
    normalized_x: f32,
    normalized_y: f32,
    source_width: u32,
    source_height: u32,
    canvas_width: f32,
    canvas_height: f32,
    policy: FitPolicy,
    mirror: bool,
) -> Option<DisplayPoint> {
    if source_width == 0 || source_height == 0 {
        return None;
    }

    let transform = CanvasTransform::new(
        (source_width, source_height),
        (canvas_width, canvas_height),
        policy,
    );
    let x = normalized_x * source_width as f32 * transform.scale + transform.offset_x;
    let y = normalized_y * source_height as f32 * transform.scale + transform.offset_y;

    let x = if mirror { mirror_x(x, canvas_width) } else { x };
    Some(DisplayPoint::new(x, y))
}

/// Moves a point drawn on a `from` sized canvas to where the same source
/// pixel lands on a `to` sized canvas.
pub fn remap_point(
    point: DisplayPoint,
    source: (u32, u32),
    from: (f32, f32),
    to: (f32, f32),
    policy: FitPolicy,
    mirror: bool,
) -> DisplayPoint {
    let old = CanvasTransform::new(source, from, policy);
    if old.scale <= 0.0 || !old.scale.is_finite() {
        return point;
    }
    let new = CanvasTransform::new(source, to, policy);

    let x = if mirror { mirror_x(point.x, from.0) } else { point.x };
    let x = (x - old.offset_x) / old.scale * new.scale + new.offset_x;
    let y = (point.y - old.offset_y) / old.scale * new.scale + new.offset_y;

    let x = if mirror { mirror_x(x, to.0) } else { x };
    DisplayPoint::new(x, y)
}

pub fn mirror_x(x: f32, canvas_width: f32) -> f32 {
    canvas_width - x
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::types::{Hand, INDEX_FINGER_TIP, NUM_HAND_LANDMARKS};

    const EPS: f32 = 1e-3;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn fill_portrait_source_on_portrait_canvas() {
        let transform = CanvasTransform::new((480, 640), (1080.0, 1920.0), FitPolicy::Fill);
        assert!(approx(transform.scale, 3.0));

        // 640 * 2.25 = 1440 < 1920, so the fill scale must come from the height ratio.
        let point = map_point(0.5, 0.5, 480, 640, 1080.0, 1920.0, FitPolicy::Fill, false).unwrap();
        assert!(approx(point.x, 540.0));
        assert!(approx(point.y, 960.0));
    }

    #[test]
    fn reference_scenario_with_width_bound_fill() {
        // 480x640 onto 1080x1440: both ratios equal 2.25, no offsets.
        let transform = CanvasTransform::new((480, 640), (1080.0, 1440.0), FitPolicy::Fill);
        assert!(approx(transform.scale, 2.25));
        assert!(approx(transform.offset_x, 0.0));
        assert!(approx(transform.offset_y, 0.0));

        let point = map_point(0.5, 0.5, 480, 640, 1080.0, 1440.0, FitPolicy::Fill, false).unwrap();
        assert!(approx(point.x, 540.0));
        assert!(approx(point.y, 720.0));
    }

    #[test]
    fn fit_letterboxes_symmetrically() {
        let transform = CanvasTransform::new((640, 480), (1080.0, 1920.0), FitPolicy::Fit);
        assert!(approx(transform.scale, 1080.0 / 640.0));
        assert!(approx(transform.offset_x, 0.0));
        assert!(approx(transform.offset_y, (1920.0 - 480.0 * 1080.0 / 640.0) / 2.0));

        let top_left = map_point(0.0, 0.0, 640, 480, 1080.0, 1920.0, FitPolicy::Fit, false).unwrap();
        assert!(approx(top_left.y, transform.offset_y));
    }

    #[test]
    fn fill_centers_both_axes() {
        let transform = CanvasTransform::new((640, 480), (1000.0, 1000.0), FitPolicy::Fill);
        assert!(approx(transform.scale, 1000.0 / 480.0));
        assert!(transform.offset_x < 0.0);
        assert!(approx(transform.offset_y, 0.0));
    }

    #[test]
    fn mirror_flips_horizontally_and_is_an_involution() {
        let plain = map_point(0.25, 0.5, 640, 480, 640.0, 480.0, FitPolicy::Fill, false).unwrap();
        let mirrored = map_point(0.25, 0.5, 640, 480, 640.0, 480.0, FitPolicy::Fill, true).unwrap();
        assert!(approx(mirrored.x, 640.0 - plain.x));
        assert!(approx(mirrored.y, plain.y));
        assert!(approx(mirror_x(mirror_x(plain.x, 640.0), 640.0), plain.x));
    }

    #[test]
    fn remap_matches_mapping_on_the_new_canvas() {
        let before = map_point(0.2, 0.9, 640, 480, 1080.0, 1920.0, FitPolicy::Fit, true).unwrap();
        let moved = remap_point(
            before,
            (640, 480),
            (1080.0, 1920.0),
            (800.0, 600.0),
            FitPolicy::Fit,
            true,
        );
        let direct = map_point(0.2, 0.9, 640, 480, 800.0, 600.0, FitPolicy::Fit, true).unwrap();
        assert!(approx(moved.x, direct.x));
        assert!(approx(moved.y, direct.y));
    }

    #[test]
    fn remap_from_an_unsized_canvas_is_a_no_op() {
        let point = DisplayPoint::new(3.0, 4.0);
        let moved = remap_point(point, (640, 480), (0.0, 0.0), (640.0, 480.0), FitPolicy::Fill, false);
        assert_eq!(moved, point);
    }

    #[test]
    fn mapping_is_deterministic() {
        let a = map_point(0.3, 0.7, 720, 1280, 390.0, 844.0, FitPolicy::Fill, true);
        let b = map_point(0.3, 0.7, 720, 1280, 390.0, 844.0, FitPolicy::Fill, true);
        assert_eq!(a, b);
    }

    #[test]
    fn degenerate_source_yields_nothing() {
        assert!(map_point(0.5, 0.5, 0, 480, 100.0, 100.0, FitPolicy::Fill, false).is_none());
        assert!(map_point(0.5, 0.5, 640, 0, 100.0, 100.0, FitPolicy::Fit, false).is_none());
        assert_eq!(
            CanvasTransform::new((0, 0), (100.0, 100.0), FitPolicy::Fill),
            CanvasTransform::IDENTITY
        );
    }

    #[test]
    fn map_result_needs_a_hand_with_fingertip() {
        let mapper = CoordinateMapper::new(640.0, 480.0, FitPolicy::Fill, false);
        assert!(mapper.map_result(None).is_none());

        let empty = DetectionResult::empty(640, 480, Instant::now());
        assert!(mapper.map_result(Some(&empty)).is_none());

        let mut landmarks = vec![Landmark::default(); NUM_HAND_LANDMARKS];
        landmarks[INDEX_FINGER_TIP] = Landmark::new(0.5, 0.25);
        let result = DetectionResult {
            hands: vec![Hand {
                landmarks,
                confidence: 0.8,
            }],
            source_width: 640,
            source_height: 480,
            timestamp: Instant::now(),
        };
        let point = mapper.map_result(Some(&result)).unwrap();
        assert!(approx(point.x, 320.0));
        assert!(approx(point.y, 120.0));
    }
}
