use rayon::prelude::*;

use super::mapper::{CanvasTransform, FitPolicy, mirror_x};
use crate::types::{DisplayPoint, DrawColor, Frame, StrokeWidth};

const BACKGROUND: [u8; 4] = [0, 0, 0, 255];
const CURSOR_COLOR: [u8; 4] = [248, 113, 113, 255];

/// Draws a round-capped polyline through `points` into an RGBA buffer.
pub fn draw_stroke(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    points: &[DisplayPoint],
    color: DrawColor,
    stroke_width: StrokeWidth,
) {
    if points.len() < 2 {
        return;
    }

    let radius = stroke_width.get() / 2.0;
    let rgba = color.rgba();
    for pair in points.windows(2) {
        draw_segment(buffer, width, height, pair[0], pair[1], radius, rgba);
    }
}

/// Marks the live fingertip position.
pub fn draw_cursor(buffer: &mut [u8], width: u32, height: u32, point: DisplayPoint, radius: f32) {
    draw_segment(buffer, width, height, point, point, radius, CURSOR_COLOR);
}

/// Lays `frame` out on a `canvas_w x canvas_h` buffer with the same transform
/// the coordinate mapper uses, so overlay points line up with the image.
pub fn compose_preview(
    frame: &Frame,
    canvas_w: u32,
    canvas_h: u32,
    policy: FitPolicy,
    mirror: bool,
) -> Vec<u8> {
    let mut canvas = vec![0u8; canvas_w as usize * canvas_h as usize * 4];
    let transform = CanvasTransform::new(
        (frame.width, frame.height),
        (canvas_w as f32, canvas_h as f32),
        policy,
    );
    let row_len = canvas_w as usize * 4;
    if row_len == 0 {
        return canvas;
    }

    canvas
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(cy, row)| {
            let sy = ((cy as f32 + 0.5 - transform.offset_y) / transform.scale).floor();
            for (cx, px) in row.chunks_exact_mut(4).enumerate() {
                let x = cx as f32 + 0.5;
                let x = if mirror { mirror_x(x, canvas_w as f32) } else { x };
                let sx = ((x - transform.offset_x) / transform.scale).floor();
                px.copy_from_slice(&sample(frame, sx, sy));
            }
        });

    canvas
}

/// Full drawing as it appears on screen: the preview (or black when there is
/// no frame yet) with the stroke on top.
#[allow(clippy::too_many_arguments)]
pub fn render_drawing(
    frame: Option<&Frame>,
    canvas_w: u32,
    canvas_h: u32,
    policy: FitPolicy,
    mirror: bool,
    points: &[DisplayPoint],
    color: DrawColor,
    stroke_width: StrokeWidth,
) -> Vec<u8> {
    let mut canvas = match frame {
        Some(frame) => compose_preview(frame, canvas_w, canvas_h, policy, mirror),
        None => BACKGROUND.repeat(canvas_w as usize * canvas_h as usize),
    };
    draw_stroke(&mut canvas, canvas_w, canvas_h, points, color, stroke_width);
    canvas
}

fn sample(frame: &Frame, sx: f32, sy: f32) -> [u8; 4] {
    if sx < 0.0 || sy < 0.0 || sx >= frame.width as f32 || sy >= frame.height as f32 {
        return BACKGROUND;
    }
    let idx = (sy as usize * frame.width as usize + sx as usize) * 4;
    match frame.rgba.get(idx..idx + 4) {
        Some(px) => [px[0], px[1], px[2], px[3]],
        None => BACKGROUND,
    }
}

/// Fills every pixel within `radius` of the segment `a..b` (a capsule), which
/// gives round caps and joins between consecutive segments.
fn draw_segment(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    a: DisplayPoint,
    b: DisplayPoint,
    radius: f32,
    color: [u8; 4],
) {
    let radius = radius.max(0.5);
    let min_x = (a.x.min(b.x) - radius).floor().max(0.0) as i64;
    let min_y = (a.y.min(b.y) - radius).floor().max(0.0) as i64;
    let max_x = (a.x.max(b.x) + radius).ceil().min(width as f32 - 1.0) as i64;
    let max_y = (a.y.max(b.y) + radius).ceil().min(height as f32 - 1.0) as i64;

    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    let r_sq = radius * radius;

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
            let t = if len_sq > f32::EPSILON {
                (((px - a.x) * dx + (py - a.y) * dy) / len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let (qx, qy) = (a.x + t * dx - px, a.y + t * dy - py);
            if qx * qx + qy * qy <= r_sq {
                put_pixel_safe(buffer, width, height, x, y, color);
            }
        }
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i64, y: i64, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u64, y as u64);
    if ux >= width as u64 || uy >= height as u64 {
        return;
    }
    let idx = ((uy * width as u64 + ux) as usize) * 4;
    if idx + 3 < buffer.len() {
        buffer[idx..idx + 4].copy_from_slice(&color);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn blank(width: u32, height: u32) -> Vec<u8> {
        vec![0u8; (width * height * 4) as usize]
    }

    fn pixel(buffer: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * width + x) * 4) as usize;
        [buffer[idx], buffer[idx + 1], buffer[idx + 2], buffer[idx + 3]]
    }

    #[test]
    fn fewer_than_two_points_draw_nothing() {
        let mut buffer = blank(16, 16);
        draw_stroke(&mut buffer, 16, 16, &[], DrawColor::Red, StrokeWidth::default());
        draw_stroke(
            &mut buffer,
            16,
            16,
            &[DisplayPoint::new(8.0, 8.0)],
            DrawColor::Red,
            StrokeWidth::default(),
        );
        assert!(buffer.iter().all(|b| *b == 0));
    }

    #[test]
    fn segment_paints_along_its_length_only() {
        let mut buffer = blank(32, 32);
        let points = [DisplayPoint::new(2.0, 16.0), DisplayPoint::new(30.0, 16.0)];
        draw_stroke(&mut buffer, 32, 32, &points, DrawColor::Green, StrokeWidth::new(4.0));

        assert_eq!(pixel(&buffer, 32, 16, 16), DrawColor::Green.rgba());
        assert_eq!(pixel(&buffer, 32, 10, 15), DrawColor::Green.rgba());
        assert_eq!(pixel(&buffer, 32, 16, 2), [0, 0, 0, 0]);
        assert_eq!(pixel(&buffer, 32, 16, 28), [0, 0, 0, 0]);
    }

    #[test]
    fn out_of_bounds_points_are_clipped() {
        let mut buffer = blank(8, 8);
        let points = [DisplayPoint::new(-50.0, -50.0), DisplayPoint::new(100.0, 100.0)];
        draw_stroke(&mut buffer, 8, 8, &points, DrawColor::White, StrokeWidth::new(2.0));
        assert_eq!(pixel(&buffer, 8, 4, 4), DrawColor::White.rgba());
    }

    #[test]
    fn preview_mirror_swaps_columns() {
        // 2x1 frame: left red, right blue.
        let frame = Frame {
            rgba: vec![255, 0, 0, 255, 0, 0, 255, 255],
            width: 2,
            height: 1,
            rotation_degrees: 0,
            timestamp: Instant::now(),
        };

        let plain = compose_preview(&frame, 2, 1, FitPolicy::Fill, false);
        assert_eq!(pixel(&plain, 2, 0, 0), [255, 0, 0, 255]);

        let mirrored = compose_preview(&frame, 2, 1, FitPolicy::Fill, true);
        assert_eq!(pixel(&mirrored, 2, 0, 0), [0, 0, 255, 255]);
        assert_eq!(pixel(&mirrored, 2, 1, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn fit_preview_letterboxes_with_background() {
        let frame = Frame {
            rgba: vec![200; 4 * 4 * 2],
            width: 4,
            height: 2,
            rotation_degrees: 0,
            timestamp: Instant::now(),
        };
        let canvas = compose_preview(&frame, 4, 4, FitPolicy::Fit, false);
        assert_eq!(pixel(&canvas, 4, 0, 0), BACKGROUND);
        assert_eq!(pixel(&canvas, 4, 1, 2), [200, 200, 200, 200]);
    }

    #[test]
    fn drawing_without_frame_starts_black() {
        let points = [DisplayPoint::new(0.0, 0.0), DisplayPoint::new(3.0, 0.0)];
        let image = render_drawing(
            None,
            4,
            4,
            FitPolicy::Fill,
            false,
            &points,
            DrawColor::Cyan,
            StrokeWidth::new(1.0),
        );
        assert_eq!(image.len(), 64);
        assert_eq!(pixel(&image, 4, 1, 0), DrawColor::Cyan.rgba());
        assert_eq!(pixel(&image, 4, 1, 3), BACKGROUND);
    }
}
