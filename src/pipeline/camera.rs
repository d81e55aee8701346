use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat, RequestedFormatType,
    },
};

use super::rgba_converter;
use crate::types::Frame;

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

// The detector cannot keep up with full camera rate anyway.
const DETECTOR_TARGET_FPS: u64 = 15;
const DETECTOR_FRAME_INTERVAL: Duration = Duration::from_millis(1_000 / DETECTOR_TARGET_FPS);

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

/// Options fixed for the lifetime of one capture stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptureOptions {
    /// Clockwise rotation tagged on every frame (0, 90, 180 or 270).
    pub rotation_degrees: u32,
}

/// Owns the capture thread; dropping it releases the camera.
#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    failure_rx: Receiver<String>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    /// Runs `worker` on the capture thread until it returns. An error is
    /// kept for [`CameraStream::take_failure`].
    fn spawn<F>(worker: F) -> Self
    where
        F: FnOnce(&AtomicBool) -> Result<()> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let (failure_tx, failure_rx) = bounded(1);

        let handle = thread::spawn(move || {
            if let Err(err) = worker(&stop_flag) {
                log::error!("camera capture failed: {err:?}");
                let _ = failure_tx.try_send(format!("{err:#}"));
            }
        });

        Self {
            stop,
            failure_rx,
            handle: Some(handle),
        }
    }

    /// Why the capture thread gave up, once. `None` while it is running.
    pub fn take_failure(&self) -> Option<String> {
        self.failure_rx.try_recv().ok()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: format_camera_label(&info),
        })
        .collect())
}

fn format_camera_label(info: &CameraInfo) -> String {
    info.human_name()
}

fn build_camera(index: CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

/// Starts capturing from `index`. Every frame goes to the preview channel;
/// the detector channel is throttled and both drop frames when full.
pub fn start_camera_stream(
    index: CameraIndex,
    options: CaptureOptions,
    preview_tx: Sender<Frame>,
    detector_tx: Sender<Frame>,
) -> Result<CameraStream> {
    // Fail fast before spawning the capture thread. The trial camera is
    // released before the worker reopens the device, which can still fail.
    drop(build_camera(index.clone())?);

    Ok(CameraStream::spawn(move |stop| {
        let mut camera = build_camera(index)?;
        log::info!("camera stream started");

        let mut last_detector_frame = Instant::now() - DETECTOR_FRAME_INTERVAL;
        while !stop.load(Ordering::Relaxed) {
            let frame_start = Instant::now();
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::warn!(
                        "camera frame read failed (after {:?}): {err:?}",
                        frame_start.elapsed()
                    );
                    continue;
                }
            };

            let converted = match rgba_converter::convert_camera_frame(&buffer) {
                Ok(rgba) => rgba,
                Err(err) => {
                    log::warn!("failed to decode camera frame {err:?}");
                    continue;
                }
            };

            let frame = Frame {
                rgba: converted.rgba,
                width: converted.width,
                height: converted.height,
                rotation_degrees: options.rotation_degrees,
                timestamp: Instant::now(),
            };

            if last_detector_frame.elapsed() >= DETECTOR_FRAME_INTERVAL {
                last_detector_frame = frame.timestamp;
                let _ = detector_tx.try_send(frame.clone());
            }
            let _ = preview_tx.try_send(frame);
        }

        if let Err(err) = camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err:?}");
        }
        log::info!("camera stream stopped");
        Ok(())
    }))
}
