//! Capture-side frame pipeline
//!
//! A single worker task owns the whole capture path: conversion, inference
//! dispatch, overlay burn-in and submission toward the shared video source.
//! It never blocks on network I/O; handing a frame onward is a channel send.
//!
//! Backpressure is keep-only-latest: the producer overwrites a one-deep
//! slot, so a frame that was never picked up is discarded wholesale before
//! conversion begins. That is policy, not failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::Result;
use crate::inference::{LandmarkEngine, LandmarkResult};
use crate::landmarks::{NormalizedLandmark, RenderMode, SkeletonKind};
use crate::video::annotate::{FrameAnnotator, OverlayStyle, SkeletonOverlay};
use crate::video::convert::{rgba_to_i420, PreviewConverter};
use crate::video::format::Rotation;
use crate::video::frame::PlanarFrame;
use crate::video::raster::RgbaRaster;
use crate::video::raw::RawFrame;

/// Where finished planar frames go. The streamer implements this; after
/// `stop` it swallows frames silently.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, frame: PlanarFrame);
}

/// Capture pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub render_mode: RenderMode,
    pub mirror: bool,
    pub style: OverlayStyle,
}

/// Optional continuations invoked from the pipeline tasks
#[derive(Default)]
pub struct PipelineHooks {
    /// Called with each annotated raster (local preview and the like)
    pub on_annotated_frame: Option<Box<dyn Fn(&RgbaRaster) + Send + Sync>>,
    /// Called with the primary subject's pose landmarks per inference result
    pub on_pose_landmarks: Option<Box<dyn Fn(&[NormalizedLandmark]) + Send + Sync>>,
}

#[derive(Default)]
struct OverlayState {
    results: HashMap<SkeletonKind, LandmarkResult>,
    label: Option<String>,
}

/// Single-owner capture worker
pub struct CapturePipeline {
    config: PipelineConfig,
    slot: watch::Sender<Option<Arc<RawFrame>>>,
    overlay: Arc<Mutex<OverlayState>>,
    running: watch::Sender<bool>,
}

impl CapturePipeline {
    /// Spawn the worker and result-routing tasks
    pub fn start(
        config: PipelineConfig,
        engine: Arc<dyn LandmarkEngine>,
        sink: Arc<dyn FrameSink>,
        hooks: PipelineHooks,
    ) -> Result<Arc<Self>> {
        let (slot, _) = watch::channel(None);
        let (running, _) = watch::channel(true);
        let pipeline = Arc::new(Self {
            config,
            slot,
            overlay: Arc::new(Mutex::new(OverlayState::default())),
            running,
        });
        let hooks = Arc::new(hooks);
        pipeline.spawn_result_task(engine.clone(), hooks.clone());
        pipeline.spawn_worker(engine, sink, hooks)?;
        Ok(pipeline)
    }

    /// Hand a captured frame to the worker. Overwrites any frame the worker
    /// has not picked up yet.
    pub fn submit_frame(&self, frame: RawFrame) {
        self.slot.send_replace(Some(Arc::new(frame)));
    }

    /// Set the label burned into outgoing frames
    pub fn set_label(&self, label: &str) {
        let mut overlay = self.overlay.lock();
        if label.is_empty() {
            overlay.label = None;
        } else {
            overlay.label = Some(label.to_string());
        }
    }

    /// Stop both tasks. In-flight work finishes its current frame.
    pub fn stop(&self) {
        let _ = self.running.send(false);
    }

    fn spawn_worker(
        self: &Arc<Self>,
        engine: Arc<dyn LandmarkEngine>,
        sink: Arc<dyn FrameSink>,
        hooks: Arc<PipelineHooks>,
    ) -> Result<()> {
        let mut converter = PreviewConverter::new()?;
        let annotator = FrameAnnotator::new(self.config.style.clone(), self.config.mirror);
        let render_mode = self.config.render_mode;
        let overlay = self.overlay.clone();
        let mut slot_rx = self.slot.subscribe();
        let mut running_rx = self.running.subscribe();

        tokio::spawn(async move {
            let mut sequence = 0u64;
            loop {
                tokio::select! {
                    changed = slot_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let frame = slot_rx.borrow_and_update().clone();
                        let Some(frame) = frame else { continue };
                        sequence += 1;
                        if let Err(e) = process_frame(
                            &mut converter,
                            &annotator,
                            render_mode,
                            &overlay,
                            &engine,
                            &sink,
                            &hooks,
                            &frame,
                            sequence,
                        ) {
                            warn!("frame {} dropped: {}", sequence, e);
                        }
                    }
                    _ = running_rx.changed() => {
                        if !*running_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("capture pipeline worker stopped");
        });
        Ok(())
    }

    fn spawn_result_task(&self, engine: Arc<dyn LandmarkEngine>, hooks: Arc<PipelineHooks>) {
        let mut results_rx = engine.subscribe();
        let overlay = self.overlay.clone();
        let mut running_rx = self.running.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = results_rx.recv() => match result {
                        Ok(result) => {
                            if result.kind == SkeletonKind::Pose {
                                if let Some(cb) = &hooks.on_pose_landmarks {
                                    if let Some(primary) = result.subjects.first() {
                                        if !primary.is_empty() {
                                            cb(primary);
                                        }
                                    }
                                }
                            }
                            overlay.lock().results.insert(result.kind, result);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            debug!("landmark results lagged by {}", n);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                    _ = running_rx.changed() => {
                        if !*running_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("landmark result task stopped");
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn process_frame(
    converter: &mut PreviewConverter,
    annotator: &FrameAnnotator,
    render_mode: RenderMode,
    overlay: &Mutex<OverlayState>,
    engine: &Arc<dyn LandmarkEngine>,
    sink: &Arc<dyn FrameSink>,
    hooks: &PipelineHooks,
    frame: &RawFrame,
    sequence: u64,
) -> Result<()> {
    let clean = Arc::new(converter.to_preview(frame)?);
    engine.submit(clean.clone(), now_millis());

    // The inference engine keeps the clean raster; the overlay is burned
    // into a copy used only for the outbound stream.
    let mut annotated = (*clean).clone();
    let (snapshots, label) = {
        let state = overlay.lock();
        let snapshots: Vec<(SkeletonKind, Vec<Vec<NormalizedLandmark>>)> = render_mode
            .kinds()
            .iter()
            .filter_map(|kind| {
                state
                    .results
                    .get(kind)
                    .map(|r| (*kind, r.subjects.clone()))
            })
            .collect();
        (snapshots, state.label.clone())
    };

    let mut overlays = Vec::new();
    for (kind, subjects) in &snapshots {
        for subject in subjects {
            overlays.push(SkeletonOverlay {
                kind: *kind,
                landmarks: subject.as_slice(),
            });
        }
    }
    let annotated_width = annotated.width();
    let annotated_height = annotated.height();
    annotator.annotate(
        &mut annotated,
        annotated_width,
        annotated_height,
        &overlays,
        label.as_deref(),
    );

    if let Some(cb) = &hooks.on_annotated_frame {
        cb(&annotated);
    }

    let i420 = rgba_to_i420(&annotated)?;
    sink.send_frame(PlanarFrame::new(&i420, Rotation::Deg0, sequence));
    Ok(())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::testing::ScriptedEngine;
    use crate::video::format::{Resolution, Rotation};
    use crate::video::raw::Plane;
    use bytes::Bytes;
    use std::time::Duration;

    struct RecordingSink {
        frames: Mutex<Vec<PlanarFrame>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
            })
        }
    }

    impl FrameSink for RecordingSink {
        fn send_frame(&self, frame: PlanarFrame) {
            self.frames.lock().push(frame);
        }
    }

    fn gray_frame(width: u32, height: u32) -> RawFrame {
        let resolution = Resolution::new(width, height);
        let cw = resolution.chroma_width();
        let ch = resolution.chroma_height();
        RawFrame::semi_planar(
            resolution,
            Rotation::Deg0,
            Plane::packed(Bytes::from(vec![128u8; (width * height) as usize]), height, width)
                .unwrap(),
            Plane::packed(Bytes::from(vec![128u8; (cw * ch) as usize]), ch, cw).unwrap(),
            Plane::packed(Bytes::from(vec![128u8; (cw * ch) as usize]), ch, cw).unwrap(),
        )
        .unwrap()
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_frame_flows_to_engine_and_sink() {
        let engine = Arc::new(ScriptedEngine::new(vec![]));
        let sink = RecordingSink::new();
        let pipeline = CapturePipeline::start(
            PipelineConfig::default(),
            engine.clone(),
            sink.clone(),
            PipelineHooks::default(),
        )
        .unwrap();

        pipeline.submit_frame(gray_frame(16, 16));
        settle().await;

        let submissions = engine.submissions.lock();
        assert_eq!(submissions.len(), 1);
        assert_eq!((submissions[0].0, submissions[0].1), (16, 16));
        let frames = sink.frames.lock();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 16 * 16 + 2 * 8 * 8);
    }

    #[tokio::test]
    async fn test_backpressure_keeps_only_latest() {
        let engine = Arc::new(ScriptedEngine::new(vec![]));
        let sink = RecordingSink::new();
        let pipeline = CapturePipeline::start(
            PipelineConfig::default(),
            engine.clone(),
            sink.clone(),
            PipelineHooks::default(),
        )
        .unwrap();

        // The current-thread test runtime cannot run the worker between
        // these submits; the slot is overwritten each time.
        pipeline.submit_frame(gray_frame(8, 8));
        pipeline.submit_frame(gray_frame(12, 12));
        pipeline.submit_frame(gray_frame(16, 16));
        settle().await;

        let submissions = engine.submissions.lock();
        assert_eq!(submissions.len(), 1, "older frames discarded before conversion");
        assert_eq!((submissions[0].0, submissions[0].1), (16, 16));
    }

    #[tokio::test]
    async fn test_stop_halts_processing() {
        let engine = Arc::new(ScriptedEngine::new(vec![]));
        let sink = RecordingSink::new();
        let pipeline = CapturePipeline::start(
            PipelineConfig::default(),
            engine.clone(),
            sink.clone(),
            PipelineHooks::default(),
        )
        .unwrap();

        pipeline.stop();
        settle().await;
        pipeline.submit_frame(gray_frame(8, 8));
        settle().await;
        assert!(engine.submissions.lock().is_empty());
        assert!(sink.frames.lock().is_empty());
    }

    #[tokio::test]
    async fn test_pose_results_reach_hook() {
        use crate::inference::LandmarkResult;

        let landmark = NormalizedLandmark::with_confidence(0.5, 0.5, 0.0, 0.9, 0.9);
        let engine = Arc::new(ScriptedEngine::new(vec![LandmarkResult {
            kind: SkeletonKind::Pose,
            subjects: vec![vec![landmark]],
            image_width: 0,
            image_height: 0,
            timestamp_ms: 0,
        }]));
        let sink = RecordingSink::new();

        let received: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let hooks = PipelineHooks {
            on_annotated_frame: None,
            on_pose_landmarks: Some(Box::new(move |landmarks| {
                received_clone.lock().push(landmarks.len());
            })),
        };

        let pipeline = CapturePipeline::start(
            PipelineConfig::default(),
            engine.clone(),
            sink.clone(),
            hooks,
        )
        .unwrap();

        pipeline.submit_frame(gray_frame(16, 16));
        settle().await;
        assert_eq!(received.lock().as_slice(), &[1]);
    }
}
