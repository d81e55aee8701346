pub mod camera;
pub mod detector;
pub mod rgba_converter;

pub use camera::{CameraDevice, CameraStream, CaptureOptions};
pub use detector::{DetectorBackend, DetectorMessage, start_detector};
