mod common;
mod ort;
mod palm;
mod tracker;

use std::{path::PathBuf, thread};

use crossbeam_channel::{Receiver, Sender};

use super::rgba_converter;
use crate::{
    model_download::ModelKind,
    types::{DetectionResult, Frame, Hand},
};

/// Anything that turns an upright frame into zero or more hands.
pub(crate) trait LandmarkEngine: Send + 'static {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<Hand>>;
}

#[derive(Clone, Debug)]
pub enum DetectorMessage {
    Ready,
    Result(DetectionResult),
    /// Setup failed; the worker has exited and will not retry.
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct DetectorBackend {
    palm_model_path: PathBuf,
    handpose_model_path: PathBuf,
    min_confidence: f32,
}

impl DetectorBackend {
    pub fn new(palm_model_path: PathBuf, handpose_model_path: PathBuf, min_confidence: f32) -> Self {
        Self {
            palm_model_path,
            handpose_model_path,
            min_confidence,
        }
    }

    pub fn model_path(&self, model: ModelKind) -> PathBuf {
        match model {
            ModelKind::PalmDetector => self.palm_model_path.clone(),
            ModelKind::Handpose => self.handpose_model_path.clone(),
        }
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    pub fn label(&self) -> &'static str {
        "ort"
    }
}

/// Spawns the detector worker. It exits once `frame_rx` disconnects.
pub fn start_detector(
    backend: DetectorBackend,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<DetectorMessage>,
) -> thread::JoinHandle<()> {
    log::info!("starting landmark detector backend: {}", backend.label());

    ort::start_worker(backend, frame_rx, result_tx)
}

pub(crate) fn run_worker_loop<E: LandmarkEngine>(
    mut engine: E,
    min_confidence: f32,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<DetectorMessage>,
) {
    if result_tx.send(DetectorMessage::Ready).is_err() {
        return;
    }

    while let Some(frame) = recv_latest_frame(&frame_rx) {
        // Results must describe the frame the engine actually saw.
        let frame = rgba_converter::upright(&frame);
        let hands = match engine.detect(&frame) {
            Ok(hands) => hands,
            Err(err) => {
                log::warn!("landmark detection failed: {err:?}");
                continue;
            }
        };

        let result = DetectionResult {
            hands: hands
                .into_iter()
                .filter(|hand| hand.confidence >= min_confidence)
                .collect(),
            source_width: frame.width,
            source_height: frame.height,
            timestamp: frame.timestamp,
        };

        if result_tx.send(DetectorMessage::Result(result)).is_err() {
            break;
        }
    }

    log::info!("landmark detector worker stopped");
}

fn recv_latest_frame(frame_rx: &Receiver<Frame>) -> Option<Frame> {
    let mut frame = frame_rx.recv().ok()?;
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Some(frame)
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use anyhow::anyhow;
    use crossbeam_channel::{bounded, unbounded};

    use super::*;
    use crate::types::{Landmark, NUM_HAND_LANDMARKS};

    /// Replays canned outputs in order.
    struct ScriptedEngine {
        outputs: Vec<anyhow::Result<Vec<Hand>>>,
    }

    impl LandmarkEngine for ScriptedEngine {
        fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Vec<Hand>> {
            if self.outputs.is_empty() {
                return Ok(Vec::new());
            }
            self.outputs.remove(0)
        }
    }

    fn frame(width: u32, height: u32, rotation_degrees: u32) -> Frame {
        Frame {
            rgba: vec![0; (width * height * 4) as usize],
            width,
            height,
            rotation_degrees,
            timestamp: Instant::now(),
        }
    }

    fn hand(confidence: f32) -> Hand {
        Hand {
            landmarks: vec![Landmark::new(0.5, 0.5); NUM_HAND_LANDMARKS],
            confidence,
        }
    }

    fn run(engine: ScriptedEngine, frames: Vec<Frame>) -> Vec<DetectorMessage> {
        let (frame_tx, frame_rx) = bounded(1);
        let (result_tx, result_rx) = unbounded();
        let worker = thread::spawn(move || run_worker_loop(engine, 0.5, frame_rx, result_tx));

        for frame in frames {
            frame_tx.send(frame).unwrap();
        }
        drop(frame_tx);
        worker.join().unwrap();

        result_rx.try_iter().collect()
    }

    #[test]
    fn reports_processed_size_after_rotation() {
        let engine = ScriptedEngine {
            outputs: vec![Ok(vec![hand(0.9)])],
        };
        let messages = run(engine, vec![frame(4, 2, 90)]);

        assert!(matches!(messages[0], DetectorMessage::Ready));
        match &messages[1] {
            DetectorMessage::Result(result) => {
                assert_eq!((result.source_width, result.source_height), (2, 4));
                assert_eq!(result.hands.len(), 1);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn low_confidence_hands_are_dropped() {
        let engine = ScriptedEngine {
            outputs: vec![Ok(vec![hand(0.1), hand(0.9)])],
        };
        let messages = run(engine, vec![frame(2, 2, 0)]);

        match messages.last() {
            Some(DetectorMessage::Result(result)) => {
                assert_eq!(result.hands.len(), 1);
                assert_eq!(result.hands[0].confidence, 0.9);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn failed_frame_yields_no_result() {
        let engine = ScriptedEngine {
            outputs: vec![Err(anyhow!("inference blew up"))],
        };
        let messages = run(engine, vec![frame(2, 2, 0)]);

        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], DetectorMessage::Ready));
    }
}
