//! One drawing session: which state it is in, what has been drawn, and the
//! save round-trip to the gateway.
//!
//! ```text
//! Idle -> Capturing -> Saving -> Saved
//!             ^           |
//!             +-- SaveFailed
//! ```
//!
//! Only `Capturing` accepts fingertip points, and only while the session is
//! not paused (the canvas is hidden). `Saving` freezes the snapshot
//! being written. Each reset bumps a generation number, and save outcomes
//! from an older generation are dropped.

use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender, unbounded};
use thiserror::Error;

use crate::{
    canvas::{CoordinateMapper, FitPolicy, StrokeAccumulator, remap_point, render_drawing},
    gateway::{DrawingGateway, DrawingImage, GatewayError},
    types::{DetectionResult, DisplayPoint, DrawColor, Frame, StrokeWidth},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Saving,
    Saved { id: String },
    SaveFailed { message: String },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Capturing => "capturing",
            SessionState::Saving => "saving",
            SessionState::Saved { .. } => "saved",
            SessionState::SaveFailed { .. } => "save failed",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },
}

/// What a finished save means for the UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Saved { id: String },
    SaveFailed { message: String },
}

struct SaveOutcome {
    generation: u64,
    result: Result<String, GatewayError>,
}

pub struct DrawingSession {
    state: SessionState,
    stroke: StrokeAccumulator,
    frozen: Option<Arc<Vec<DisplayPoint>>>,
    mapper: CoordinateMapper,
    color: DrawColor,
    stroke_width: StrokeWidth,
    generation: u64,
    paused: bool,
    /// Size of the frames the stroke was mapped from.
    source_size: Option<(u32, u32)>,
    last_fingertip: Option<DisplayPoint>,
    last_error: Option<String>,
    gateway: Arc<dyn DrawingGateway>,
    save_tx: Sender<SaveOutcome>,
    save_rx: Receiver<SaveOutcome>,
}

impl DrawingSession {
    pub fn new(
        gateway: Arc<dyn DrawingGateway>,
        policy: FitPolicy,
        mirror: bool,
        color: DrawColor,
        stroke_width: StrokeWidth,
    ) -> Self {
        let (save_tx, save_rx) = unbounded();
        Self {
            state: SessionState::Idle,
            stroke: StrokeAccumulator::new(),
            frozen: None,
            mapper: CoordinateMapper::new(0.0, 0.0, policy, mirror),
            color,
            stroke_width,
            generation: 0,
            paused: false,
            source_size: None,
            last_fingertip: None,
            last_error: None,
            gateway,
            save_tx,
            save_rx,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn color(&self) -> DrawColor {
        self.color
    }

    pub fn stroke_width(&self) -> StrokeWidth {
        self.stroke_width
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn last_fingertip(&self) -> Option<DisplayPoint> {
        self.last_fingertip
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn gateway(&self) -> &Arc<dyn DrawingGateway> {
        &self.gateway
    }

    /// Points captured so far in this session.
    pub fn stroke_len(&self) -> usize {
        self.stroke.len()
    }

    pub fn has_stroke(&self) -> bool {
        !self.stroke.is_empty()
    }

    /// Points to draw right now; frozen while a save is in flight.
    pub fn points(&self) -> Arc<Vec<DisplayPoint>> {
        match &self.frozen {
            Some(frozen) => frozen.clone(),
            None => self.stroke.snapshot(),
        }
    }

    /// Starts (or restarts after a completed save) capturing into an empty stroke.
    pub fn start(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle | SessionState::Saved { .. } => {
                self.begin_generation();
                self.state = SessionState::Capturing;
                log::info!("drawing session {} capturing", self.generation);
                Ok(())
            }
            _ => Err(self.invalid("start")),
        }
    }

    /// Abandons the session. A save still in flight will be ignored.
    pub fn reset(&mut self) {
        self.begin_generation();
        self.paused = false;
        self.state = SessionState::Idle;
        log::info!("drawing session reset");
    }

    pub fn clear(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Capturing => {
                self.stroke.clear();
                Ok(())
            }
            _ => Err(self.invalid("clear")),
        }
    }

    /// Stops taking points while the canvas is off screen. The state is
    /// untouched, so a save in flight still completes.
    pub fn pause(&mut self) {
        if !self.paused {
            log::debug!("drawing session paused while {}", self.state.name());
        }
        self.paused = true;
        self.last_fingertip = None;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn set_color(&mut self, color: DrawColor) {
        self.color = color;
    }

    pub fn set_stroke_width(&mut self, width: StrokeWidth) {
        self.stroke_width = width;
    }

    /// Flips mirroring for the next points, e.g. after switching camera facing.
    pub fn toggle_mirror(&mut self) -> bool {
        self.mapper.mirror = !self.mapper.mirror;
        self.mapper.mirror
    }

    /// Resizes the canvas and moves what is already drawn so it stays over
    /// the same spot of the camera image.
    pub fn set_canvas_size(&mut self, width: f32, height: f32) {
        let from = (self.mapper.canvas_width, self.mapper.canvas_height);
        let to = (width, height);
        self.mapper.canvas_width = width;
        self.mapper.canvas_height = height;

        let Some(source) = self.source_size else {
            return;
        };
        if from == to {
            return;
        }
        let (policy, mirror) = (self.mapper.policy, self.mapper.mirror);
        let remap = |point| remap_point(point, source, from, to, policy, mirror);

        self.stroke.remap(remap);
        self.frozen = self
            .frozen
            .take()
            .map(|frozen| Arc::new(frozen.iter().copied().map(remap).collect()));
        self.last_fingertip = self.last_fingertip.map(remap);
    }

    /// Applies one detector result. Returns the appended point, if any.
    pub fn apply_detection(&mut self, result: &DetectionResult) -> Option<DisplayPoint> {
        if self.paused {
            return None;
        }
        let point = self.mapper.map_result(Some(result));
        self.last_fingertip = point;

        if self.state != SessionState::Capturing {
            return None;
        }
        let point = point?;
        self.source_size = Some((result.source_width, result.source_height));
        self.stroke.append(point);
        Some(point)
    }

    /// Freezes the current stroke, renders it over `background` and hands it
    /// to the gateway on a worker thread.
    pub fn begin_save(&mut self, background: Option<&Frame>) -> Result<(), SessionError> {
        if self.state != SessionState::Capturing {
            return Err(self.invalid("save"));
        }

        let points = self.stroke.snapshot();
        let (width, height) = self.canvas_pixels();
        let rgba = render_drawing(
            background,
            width,
            height,
            self.mapper.policy,
            self.mapper.mirror,
            &points,
            self.color,
            self.stroke_width,
        );
        let image = DrawingImage {
            rgba,
            width,
            height,
        };

        self.frozen = Some(points);
        self.state = SessionState::Saving;
        self.last_error = None;

        let gateway = self.gateway.clone();
        let tx = self.save_tx.clone();
        let generation = self.generation;
        let (color, stroke_width) = (self.color, self.stroke_width);
        thread::spawn(move || {
            let result = gateway.save(&image, color, stroke_width);
            let _ = tx.send(SaveOutcome { generation, result });
        });

        log::info!("saving drawing ({width}x{height})");
        Ok(())
    }

    /// Drains finished saves; call once per UI refresh.
    pub fn poll_save(&mut self) -> Option<SessionEvent> {
        let mut event = None;
        while let Ok(outcome) = self.save_rx.try_recv() {
            if let Some(e) = self.finish_save(outcome) {
                event = Some(e);
            }
        }
        event
    }

    fn finish_save(&mut self, outcome: SaveOutcome) -> Option<SessionEvent> {
        if outcome.generation != self.generation || self.state != SessionState::Saving {
            log::debug!("dropping save result from abandoned session {}", outcome.generation);
            return None;
        }
        self.frozen = None;

        match outcome.result {
            Ok(id) => {
                log::info!("drawing {id} saved");
                self.state = SessionState::Saved { id: id.clone() };
                Some(SessionEvent::Saved { id })
            }
            Err(err) => {
                let message = format!("Failed to save drawing: {err}");
                log::error!("{message}");
                self.state = SessionState::SaveFailed {
                    message: message.clone(),
                };
                self.resume_after_failure();
                Some(SessionEvent::SaveFailed { message })
            }
        }
    }

    /// SaveFailed -> Capturing with the stroke intact, so the user can retry.
    fn resume_after_failure(&mut self) {
        if let SessionState::SaveFailed { message } = &self.state {
            self.last_error = Some(message.clone());
            self.state = SessionState::Capturing;
        }
    }

    fn begin_generation(&mut self) {
        self.generation += 1;
        self.stroke.clear();
        self.frozen = None;
        self.last_fingertip = None;
        self.last_error = None;
    }

    fn canvas_pixels(&self) -> (u32, u32) {
        (
            self.mapper.canvas_width.round().max(1.0) as u32,
            self.mapper.canvas_height.round().max(1.0) as u32,
        )
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state.name(),
            action,
        }
    }
}
