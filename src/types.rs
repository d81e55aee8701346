use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Landmark index of the index-finger tip in the 21-point hand model.
pub const INDEX_FINGER_TIP: usize = 8;
pub const NUM_HAND_LANDMARKS: usize = 21;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation needed to show the frame upright (0, 90, 180 or 270).
    pub rotation_degrees: u32,
    pub timestamp: Instant,
}

/// A keypoint normalized to the processed frame, `x`/`y` in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: None }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Hand {
    pub landmarks: Vec<Landmark>,
    pub confidence: f32,
}

impl Hand {
    pub fn fingertip(&self) -> Option<Landmark> {
        self.landmarks.get(INDEX_FINGER_TIP).copied()
    }
}

#[derive(Clone, Debug)]
pub struct DetectionResult {
    pub hands: Vec<Hand>,
    /// Size of the frame the detector actually processed, after rotation.
    pub source_width: u32,
    pub source_height: u32,
    pub timestamp: Instant,
}

impl DetectionResult {
    pub fn empty(source_width: u32, source_height: u32, timestamp: Instant) -> Self {
        Self {
            hands: Vec::new(),
            source_width,
            source_height,
            timestamp,
        }
    }

    /// Fingertip of the first detected hand, if any.
    pub fn primary_fingertip(&self) -> Option<Landmark> {
        self.hands.first().and_then(Hand::fingertip)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DisplayPoint {
    pub x: f32,
    pub y: f32,
}

impl DisplayPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawColor {
    Red,
    Green,
    Blue,
    Yellow,
    Magenta,
    Cyan,
    Black,
    White,
}

impl DrawColor {
    pub const PALETTE: [DrawColor; 8] = [
        DrawColor::Red,
        DrawColor::Green,
        DrawColor::Blue,
        DrawColor::Yellow,
        DrawColor::Magenta,
        DrawColor::Cyan,
        DrawColor::Black,
        DrawColor::White,
    ];

    pub fn rgba(&self) -> [u8; 4] {
        match self {
            DrawColor::Red => [255, 0, 0, 255],
            DrawColor::Green => [0, 255, 0, 255],
            DrawColor::Blue => [0, 0, 255, 255],
            DrawColor::Yellow => [255, 255, 0, 255],
            DrawColor::Magenta => [255, 0, 255, 255],
            DrawColor::Cyan => [0, 255, 255, 255],
            DrawColor::Black => [0, 0, 0, 255],
            DrawColor::White => [255, 255, 255, 255],
        }
    }

    /// Packed `0xRRGGBB`, handy for `gpui::rgb`.
    pub fn hex(&self) -> u32 {
        let [r, g, b, _] = self.rgba();
        (r as u32) << 16 | (g as u32) << 8 | b as u32
    }

    pub fn name(&self) -> &'static str {
        match self {
            DrawColor::Red => "red",
            DrawColor::Green => "green",
            DrawColor::Blue => "blue",
            DrawColor::Yellow => "yellow",
            DrawColor::Magenta => "magenta",
            DrawColor::Cyan => "cyan",
            DrawColor::Black => "black",
            DrawColor::White => "white",
        }
    }
}

impl Default for DrawColor {
    fn default() -> Self {
        DrawColor::Yellow
    }
}

/// Stroke width in canvas pixels, always within `[MIN, MAX]`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct StrokeWidth(f32);

impl StrokeWidth {
    pub const MIN: f32 = 1.0;
    pub const MAX: f32 = 30.0;
    pub const DEFAULT: f32 = 8.0;

    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self(Self::DEFAULT);
        }
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(&self) -> f32 {
        self.0
    }

    pub fn step(&self, delta: f32) -> Self {
        Self::new(self.0 + delta)
    }
}

impl Default for StrokeWidth {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl From<f32> for StrokeWidth {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

impl From<StrokeWidth> for f32 {
    fn from(value: StrokeWidth) -> Self {
        value.0
    }
}
