use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::DisplayPoint;

/// Shared, ordered list of fingertip points.
///
/// Appends copy-on-write into an `Arc<Vec<_>>`, so a snapshot handed to the
/// renderer is immutable and never shows a half-written point. Cloning the
/// accumulator shares the same stroke.
#[derive(Clone, Debug, Default)]
pub struct StrokeAccumulator {
    points: Arc<Mutex<Arc<Vec<DisplayPoint>>>>,
}

impl StrokeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, point: DisplayPoint) {
        let mut guard = self.lock();
        // Only copies when a reader still holds the previous snapshot.
        Arc::make_mut(&mut guard).push(point);
    }

    pub fn clear(&self) {
        *self.lock() = Arc::new(Vec::new());
    }

    /// Moves every point, e.g. after the canvas was resized.
    pub fn remap(&self, f: impl Fn(DisplayPoint) -> DisplayPoint) {
        let mut guard = self.lock();
        let moved: Vec<DisplayPoint> = guard.iter().copied().map(f).collect();
        *guard = Arc::new(moved);
    }

    pub fn snapshot(&self) -> Arc<Vec<DisplayPoint>> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Vec<DisplayPoint>>> {
        // A panicked writer cannot leave a partial point behind, so keep going.
        self.points
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
