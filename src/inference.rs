//! Seam to the external landmark inference engine
//!
//! The engine is a black box: the capture pipeline submits decoded rasters
//! and results come back asynchronously on a broadcast channel. Ordering is
//! only guaranteed per skeleton stream, not across pose/face/hand streams.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::landmarks::{NormalizedLandmark, SkeletonKind};
use crate::video::raster::RgbaRaster;

/// One detection result: every subject found in a submitted raster for one
/// skeleton stream
#[derive(Debug, Clone)]
pub struct LandmarkResult {
    pub kind: SkeletonKind,
    /// One landmark list per detected subject
    pub subjects: Vec<Vec<NormalizedLandmark>>,
    /// Dimensions of the raster the landmarks are normalized against
    pub image_width: u32,
    pub image_height: u32,
    /// Submission timestamp echoed back by the engine
    pub timestamp_ms: i64,
}

/// Asynchronous landmark engine.
///
/// `submit` must not block the capture thread; results are delivered on the
/// channel handed out by `subscribe`. Engines own their backpressure: a
/// submission may be dropped when the engine is busy.
pub trait LandmarkEngine: Send + Sync {
    fn submit(&self, image: Arc<RgbaRaster>, timestamp_ms: i64);

    fn subscribe(&self) -> broadcast::Receiver<LandmarkResult>;
}

/// Engine stub that never produces results. Placeholder wiring for builds
/// without a real inference backend.
pub struct NullEngine {
    results: broadcast::Sender<LandmarkResult>,
}

impl NullEngine {
    pub fn new() -> Self {
        let (results, _) = broadcast::channel(8);
        Self { results }
    }
}

impl Default for NullEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LandmarkEngine for NullEngine {
    fn submit(&self, _image: Arc<RgbaRaster>, _timestamp_ms: i64) {}

    fn subscribe(&self) -> broadcast::Receiver<LandmarkResult> {
        self.results.subscribe()
    }
}
