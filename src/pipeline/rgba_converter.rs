use std::{borrow::Cow, convert::TryFrom};

use anyhow::{Result, anyhow};
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

#[derive(Debug)]
pub struct RgbaFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy)]
enum Packed {
    Rgb,
    Bgr,
    Gray,
}

impl Packed {
    fn bytes_per_pixel(self) -> usize {
        match self {
            Packed::Rgb | Packed::Bgr => 3,
            Packed::Gray => 1,
        }
    }
}

pub fn convert_camera_frame(frame: &Buffer) -> Result<RgbaFrame> {
    let resolution = frame.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let data = frame.buffer();

    let rgba = match frame.source_frame_format() {
        FrameFormat::NV12 => nv12_to_rgba(data, width, height)?,
        FrameFormat::YUYV => yuyv_to_rgba(data, width, height)?,
        FrameFormat::MJPEG => mjpeg_to_rgba(data)?,
        FrameFormat::RAWRGB => packed_to_rgba(data, width, height, Packed::Rgb)?,
        FrameFormat::RAWBGR => packed_to_rgba(data, width, height, Packed::Bgr)?,
        FrameFormat::GRAY => packed_to_rgba(data, width, height, Packed::Gray)?,
    };

    Ok(RgbaFrame {
        rgba,
        width,
        height,
    })
}

/// Returns the frame rotated clockwise by its `rotation_degrees`, borrowing it
/// untouched when no rotation is needed.
pub fn upright(frame: &Frame) -> Cow<'_, Frame> {
    match frame.rotation_degrees % 360 {
        0 => Cow::Borrowed(frame),
        degrees => {
            let (rgba, width, height) = rotate_rgba(&frame.rgba, frame.width, frame.height, degrees);
            Cow::Owned(Frame {
                rgba,
                width,
                height,
                rotation_degrees: 0,
                timestamp: frame.timestamp,
            })
        }
    }
}

/// Rotates an RGBA buffer clockwise by 90, 180 or 270 degrees. Other angles
/// are snapped down to the nearest quarter turn.
pub fn rotate_rgba(data: &[u8], width: u32, height: u32, degrees: u32) -> (Vec<u8>, u32, u32) {
    let quarter_turns = (degrees / 90) % 4;
    let (w, h) = (width as usize, height as usize);
    let (out_w, out_h) = if quarter_turns % 2 == 1 { (h, w) } else { (w, h) };
    let mut out = vec![0u8; out_w * out_h * 4];
    if out_w == 0 || data.len() < w * h * 4 {
        return (out, out_w as u32, out_h as u32);
    }

    out.par_chunks_mut(out_w * 4)
        .enumerate()
        .for_each(|(oy, row)| {
            for (ox, px) in row.chunks_exact_mut(4).enumerate() {
                let (sx, sy) = match quarter_turns {
                    1 => (oy, h - 1 - ox),
                    2 => (w - 1 - ox, h - 1 - oy),
                    3 => (w - 1 - oy, ox),
                    _ => (ox, oy),
                };
                let idx = (sy * w + sx) * 4;
                px.copy_from_slice(&data[idx..idx + 4]);
            }
        });

    (out, out_w as u32, out_h as u32)
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = y_plane_len / 2;
    ensure_len("NV12", data, y_plane_len + uv_plane_len)?;

    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };

    let mut rgba = vec![0u8; y_plane_len * 4];
    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    ensure_len("YUYV", data, pixels * 2)?;

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    let mut rgba = vec![0u8; pixels * 4];
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn mjpeg_to_rgba(data: &[u8]) -> Result<Vec<u8>> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    if let Some(info) = decoder.info() {
        let expected_len = usize::try_from(info.width)
            .and_then(|w| usize::try_from(info.height).map(|h| w * h * 4))
            .map_err(|_| anyhow!("MJPEG dimensions do not fit usize"))?;
        ensure_len("MJPEG output", &rgba, expected_len)?;
    }

    Ok(rgba)
}

fn packed_to_rgba(data: &[u8], width: u32, height: u32, layout: Packed) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    let bpp = layout.bytes_per_pixel();
    ensure_len("packed", data, pixels * bpp)?;

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(bpp))
        .for_each(|(dst, src)| {
            let rgb = match layout {
                Packed::Rgb => [src[0], src[1], src[2]],
                Packed::Bgr => [src[2], src[1], src[0]],
                Packed::Gray => [src[0]; 3],
            };
            dst[..3].copy_from_slice(&rgb);
            dst[3] = 255;
        });

    Ok(rgba)
}

fn ensure_len(kind: &str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(anyhow!(
            "{kind} buffer too small: got {}, expected {expected}",
            data.len()
        ));
    }
    Ok(())
}
