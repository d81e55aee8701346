use std::{path::Path, thread};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender};
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    DetectorBackend, DetectorMessage, common,
    palm::{PalmDetector, PalmDetectorConfig},
    run_worker_loop,
    tracker::{HandTracker, HandposeStage},
};
use crate::{
    model_download::{ModelKind, ensure_model_ready},
    types::Frame,
};

pub fn start_worker(
    backend: DetectorBackend,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<DetectorMessage>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for model in ModelKind::ALL {
            let path = backend.model_path(model);
            if let Err(err) = ensure_model_ready(model, &path, |_evt| {}) {
                log::error!(
                    "failed to prepare {} model at {}: {err:?}",
                    model.label(),
                    path.display()
                );
                let _ = result_tx.send(DetectorMessage::Failed(format!("{err:#}")));
                return;
            }
        }

        let palm_path = backend.model_path(ModelKind::PalmDetector);
        let handpose_path = backend.model_path(ModelKind::Handpose);
        let tracker = PalmDetector::new(&palm_path, PalmDetectorConfig::default())
            .and_then(|palms| Ok(HandTracker::new(palms, OrtHandpose::new(&handpose_path)?)));
        let tracker = match tracker {
            Ok(tracker) => {
                log::info!(
                    "hand tracking ORT backend ready using {} and palm detector {}",
                    handpose_path.display(),
                    palm_path.display()
                );
                tracker
            }
            Err(err) => {
                log::error!("failed to load ORT hand tracking models: {err:?}");
                let _ = result_tx.send(DetectorMessage::Failed(format!("{err:#}")));
                return;
            }
        };

        run_worker_loop(tracker, backend.min_confidence(), frame_rx, result_tx);
    })
}

struct OrtHandpose {
    session: Session,
}

impl OrtHandpose {
    fn new(model_path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;

        Ok(Self { session })
    }
}

impl HandposeStage for OrtHandpose {
    fn estimate(&mut self, crop: Array4<f32>) -> Result<(Vec<[f32; 3]>, f32)> {
        let tensor = Tensor::from_array(crop)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let landmarks = common::decode_landmarks(&flattened)?;

        // Second output is the hand presence score.
        let presence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };

        Ok((landmarks, presence))
    }
}
