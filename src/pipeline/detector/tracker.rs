use anyhow::Result;
use ndarray::Array4;

use super::{
    LandmarkEngine,
    common::{self, INPUT_SIZE},
    palm::{PalmRegion, crop_from_palm, pick_primary_region},
};
use crate::types::{Frame, Hand};

/// Finds palms in a full upright frame.
pub(crate) trait PalmStage: Send + 'static {
    fn find_palms(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>>;
}

/// Runs the landmark model on one crop. Returns landmarks in crop pixels and
/// the hand presence score.
pub(crate) trait HandposeStage: Send + 'static {
    fn estimate(&mut self, crop: Array4<f32>) -> Result<(Vec<[f32; 3]>, f32)>;
}

/// Palm detection followed by landmarks on a rotated crop of the strongest
/// palm. A frame without a palm yields no hands.
pub(crate) struct HandTracker<P, H> {
    palms: P,
    handpose: H,
}

impl<P: PalmStage, H: HandposeStage> HandTracker<P, H> {
    pub(crate) fn new(palms: P, handpose: H) -> Self {
        Self { palms, handpose }
    }
}

impl<P: PalmStage, H: HandposeStage> LandmarkEngine for HandTracker<P, H> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Hand>> {
        let regions = self.palms.find_palms(frame).unwrap_or_else(|err| {
            log::warn!("palm detection failed: {err:?}");
            Vec::new()
        });
        let Some(region) = pick_primary_region(&regions) else {
            return Ok(Vec::new());
        };

        let (center, side, angle) = crop_from_palm(region);
        let (input, transform) =
            common::prepare_rotated_crop(frame, center, side, angle, INPUT_SIZE)?;
        let (landmarks, presence) = self.handpose.estimate(input)?;

        Ok(vec![common::hand_from_crop(
            &landmarks,
            &transform,
            presence * region.score,
        )])
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
        time::Instant,
    };

    use anyhow::anyhow;
    use crossbeam_channel::{bounded, unbounded};

    use super::*;
    use crate::{
        pipeline::detector::{DetectorMessage, run_worker_loop},
        types::NUM_HAND_LANDMARKS,
    };

    struct FixedPalms(anyhow::Result<Vec<PalmRegion>>);

    impl PalmStage for FixedPalms {
        fn find_palms(&mut self, _frame: &Frame) -> Result<Vec<PalmRegion>> {
            match &self.0 {
                Ok(regions) => Ok(regions.clone()),
                Err(err) => Err(anyhow!("{err}")),
            }
        }
    }

    /// Puts every landmark at the crop center and counts calls.
    #[derive(Clone, Default)]
    struct CenteredHandpose {
        calls: Arc<AtomicUsize>,
    }

    impl HandposeStage for CenteredHandpose {
        fn estimate(&mut self, crop: Array4<f32>) -> Result<(Vec<[f32; 3]>, f32)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let center = crop.shape()[1] as f32 / 2.0;
            Ok((vec![[center, center, 0.0]; NUM_HAND_LANDMARKS], 0.8))
        }
    }

    fn frame() -> Frame {
        Frame {
            rgba: vec![128; 200 * 100 * 4],
            width: 200,
            height: 100,
            rotation_degrees: 0,
            timestamp: Instant::now(),
        }
    }

    fn palm_at(x: f32, y: f32, score: f32) -> PalmRegion {
        PalmRegion {
            bbox: [x - 10.0, y - 10.0, x + 10.0, y + 10.0],
            keypoints: Vec::new(),
            score,
        }
    }

    #[test]
    fn no_palm_means_no_hand_and_no_landmark_pass() {
        let handpose = CenteredHandpose::default();
        let mut tracker = HandTracker::new(FixedPalms(Ok(Vec::new())), handpose.clone());

        assert!(tracker.detect(&frame()).unwrap().is_empty());
        assert_eq!(handpose.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn palm_failure_counts_as_no_palm() {
        let mut tracker = HandTracker::new(
            FixedPalms(Err(anyhow!("session crashed"))),
            CenteredHandpose::default(),
        );
        assert!(tracker.detect(&frame()).unwrap().is_empty());
    }

    #[test]
    fn strongest_palm_drives_the_crop() {
        let palms = FixedPalms(Ok(vec![palm_at(40.0, 50.0, 0.6), palm_at(150.0, 30.0, 0.9)]));
        let mut tracker = HandTracker::new(palms, CenteredHandpose::default());

        let hands = tracker.detect(&frame()).unwrap();

        assert_eq!(hands.len(), 1);
        let tip = hands[0].landmarks[0];
        assert!((tip.x - 0.75).abs() < 1e-4);
        assert!((tip.y - 0.3).abs() < 1e-4);
        assert!((hands[0].confidence - 0.72).abs() < 1e-5);
    }

    #[test]
    fn empty_frame_reports_zero_hands() {
        let tracker = HandTracker::new(FixedPalms(Ok(Vec::new())), CenteredHandpose::default());
        let (frame_tx, frame_rx) = bounded(1);
        let (result_tx, result_rx) = unbounded();
        let worker = thread::spawn(move || run_worker_loop(tracker, 0.5, frame_rx, result_tx));

        frame_tx.send(frame()).unwrap();
        drop(frame_tx);
        worker.join().unwrap();

        let messages: Vec<_> = result_rx.try_iter().collect();
        match messages.as_slice() {
            [DetectorMessage::Ready, DetectorMessage::Result(result)] => {
                assert!(result.hands.is_empty());
                assert!(result.primary_fingertip().is_none());
            }
            other => panic!("unexpected messages {other:?}"),
        }
    }
}
