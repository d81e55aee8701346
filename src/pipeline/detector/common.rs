use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, Hand, Landmark, NUM_HAND_LANDMARKS};

pub const INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;

/// How a frame was shrunk and padded into the square model input.
#[derive(Clone, Debug, PartialEq)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

pub fn prepare_frame(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = (frame.width as f32 * scale).round().max(1.0) as u32;
    let new_h = (frame.height as f32 * scale).round().max(1.0) as u32;

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size as i64 - new_w as i64) / 2).max(0) as usize;
    let pad_y = ((target_size as i64 - new_h as i64) / 2).max(0) as usize;
    let side = target_size as usize;
    let mut canvas = vec![0u8; side * side * 4];
    let dst_stride = side * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), normalized)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

pub fn decode_landmarks(flat: &[f32]) -> Result<Vec<[f32; 3]>> {
    if flat.len() < NUM_HAND_LANDMARKS * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_HAND_LANDMARKS * 3
        ));
    }

    Ok(flat
        .chunks_exact(3)
        .take(NUM_HAND_LANDMARKS)
        .map(|chunk| [chunk[0], chunk[1], chunk[2]])
        .collect())
}

/// Where a square, rotated crop sits in the frame it was cut from.
#[derive(Clone, Debug, PartialEq)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    /// Radians; positive turns the crop clockwise on screen.
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl CropTransform {
    /// Crop pixel to frame pixel.
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.side / self.output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }
}

/// Samples a `side`-pixel square around `center`, rotated by `angle`, into
/// an `output_size` model input. Pixels outside the frame read as black.
pub fn prepare_rotated_crop(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    let data: Vec<f32> = (0..output_size)
        .into_par_iter()
        .flat_map_iter(|y| {
            let transform = &transform;
            (0..output_size).flat_map(move |x| {
                let (src_x, src_y) = transform.to_frame(x as f32 + 0.5, y as f32 + 0.5);
                sample_rgb(frame, src_x, src_y)
            })
        })
        .collect();

    let side_px = output_size as usize;
    let input = Array4::<f32>::from_shape_vec((1, side_px, side_px, 3), data)
        .map_err(|err| anyhow!("failed to build crop tensor: {err}"))?;

    Ok((input, transform))
}

/// Maps crop-space landmarks back onto the frame, normalized to [0, 1].
pub fn hand_from_crop(landmarks: &[[f32; 3]], transform: &CropTransform, confidence: f32) -> Hand {
    let w = transform.orig_w.max(1) as f32;
    let h = transform.orig_h.max(1) as f32;
    let landmarks = landmarks
        .iter()
        .map(|[x, y, z]| {
            let (px, py) = transform.to_frame(*x, *y);
            Landmark {
                x: (px / w).clamp(0.0, 1.0),
                y: (py / h).clamp(0.0, 1.0),
                z: Some(*z),
            }
        })
        .collect();

    Hand {
        landmarks,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

/// Bilinear RGB lookup, normalized to [0, 1].
fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if !x.is_finite() || !y.is_finite() {
        return [0.0; 3];
    }
    // Pixel centers sit at +0.5.
    let x = x - 0.5;
    let y = y - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let fetch = |px: f32, py: f32| -> [f32; 3] {
        if px < 0.0 || py < 0.0 || px >= frame.width as f32 || py >= frame.height as f32 {
            return [0.0; 3];
        }
        let idx = (py as usize * frame.width as usize + px as usize) * 4;
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn decode_rejects_short_output() {
        assert!(decode_landmarks(&[0.0; 10]).is_err());
        let decoded = decode_landmarks(&[1.0; 70]).unwrap();
        assert_eq!(decoded.len(), NUM_HAND_LANDMARKS);
    }

    fn solid_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame {
            rgba: vec![value; (width * height * 4) as usize],
            width,
            height,
            rotation_degrees: 0,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn crop_landmarks_map_back_to_frame() {
        // 200x100 frame, 224 px crop centered at (100, 50) with no scaling.
        let mut transform = CropTransform {
            center: (100.0, 50.0),
            side: 224.0,
            angle: 0.0,
            output_size: 224,
            orig_w: 200,
            orig_h: 100,
        };
        let hand = hand_from_crop(&[[112.0, 112.0, 0.3], [0.0, 0.0, 0.0]], &transform, 1.4);

        assert!((hand.landmarks[0].x - 0.5).abs() < 1e-4);
        assert!((hand.landmarks[0].y - 0.5).abs() < 1e-4);
        assert_eq!(hand.landmarks[0].z, Some(0.3));
        // Points past the frame edge clamp onto it.
        assert_eq!(hand.landmarks[1].x, 0.0);
        assert_eq!(hand.confidence, 1.0);

        // A quarter turn sends crop-right to frame-down.
        transform.angle = std::f32::consts::FRAC_PI_2;
        let (x, y) = transform.to_frame(122.0, 112.0);
        assert!((x - 100.0).abs() < 1e-3);
        assert!((y - 60.0).abs() < 1e-3);
    }

    #[test]
    fn rotated_crop_reads_inside_and_pads_outside() {
        let frame = solid_frame(64, 64, 255);
        let (input, transform) =
            prepare_rotated_crop(&frame, (32.0, 32.0), 128.0, 0.3, INPUT_SIZE).unwrap();

        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        assert_eq!(transform.output_size, INPUT_SIZE);
        assert!(input[[0, 112, 112, 0]] > 0.99);
        assert_eq!(input[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn prepare_frame_pads_to_square() {
        let frame = solid_frame(64, 32, 255);
        let (input, letterbox) = prepare_frame(&frame, INPUT_SIZE).unwrap();

        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        assert_eq!(letterbox.scale, 3.5);
        assert_eq!(letterbox.pad_y, 56.0);
        assert_eq!(input[[0, 0, 0, 0]], 0.0);
        assert!(input[[0, 112, 112, 0]] > 0.99);
    }

    #[test]
    fn prepare_frame_rejects_bad_buffer() {
        let frame = Frame {
            rgba: vec![0; 3],
            width: 2,
            height: 2,
            rotation_degrees: 0,
            timestamp: Instant::now(),
        };
        assert!(prepare_frame(&frame, INPUT_SIZE).is_err());
    }
}
