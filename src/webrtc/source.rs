//! Shared video source: the single capture sink every session's outbound
//! track reads from
//!
//! Exactly one source and one local track exist regardless of viewer count.
//! Sessions attach the track as a send-only transceiver; the underlying
//! transport binds it per connection, so frames are produced once here and
//! never duplicated per viewer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::config::WebRtcConfig;
use crate::video::frame::PlanarFrame;

/// RTP codec capability for the outbound video track
fn video_codec_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: "video/H264".to_string(),
        clock_rate: 90000,
        channels: 0,
        sdp_fmtp_line: "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
            .to_string(),
        rtcp_feedback: vec![],
    }
}

/// Process-wide capture sink feeding the shared outbound track.
///
/// Created at channel start, torn down at channel stop. `submit` is safe to
/// call from the capture thread at any time: after `stop` it is a silent
/// no-op. Frame payloads are treated as opaque access units from the
/// encoder stage; this core never re-encodes.
pub struct SharedVideoSource {
    track: Arc<TrackLocalStaticSample>,
    frame_tx: broadcast::Sender<PlanarFrame>,
    running: watch::Sender<bool>,
    frames_submitted: AtomicU64,
}

impl SharedVideoSource {
    pub fn new(config: &WebRtcConfig) -> Arc<Self> {
        let track = Arc::new(TrackLocalStaticSample::new(
            video_codec_capability(),
            "video".to_string(),
            format!("posecast-{}", uuid::Uuid::new_v4()),
        ));
        let (frame_tx, _) = broadcast::channel(8);
        let (running, _) = watch::channel(true);

        let source = Arc::new(Self {
            track,
            frame_tx,
            running,
            frames_submitted: AtomicU64::new(0),
        });
        source.spawn_writer(config.max_framerate);
        info!(
            "shared video source up, send policy {} kbps @ {} fps",
            config.max_bitrate_bps / 1000,
            config.max_framerate
        );
        source
    }

    fn spawn_writer(self: &Arc<Self>, max_framerate: u32) {
        let track = self.track.clone();
        let mut frame_rx = self.frame_tx.subscribe();
        let mut running_rx = self.running.subscribe();
        let frame_duration = Duration::from_secs(1) / max_framerate.max(1);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = frame_rx.recv() => match result {
                        Ok(frame) => {
                            let sample = Sample {
                                data: frame.data(),
                                duration: frame_duration,
                                ..Default::default()
                            };
                            if let Err(e) = track.write_sample(&sample).await {
                                debug!("video track write failed: {}", e);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!("video source writer lagged, {} frames dropped", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = running_rx.changed() => {
                        if !*running_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("shared video source writer stopped");
        });
    }

    /// Submit one produced frame. No-op after `stop`.
    pub fn submit(&self, frame: PlanarFrame) {
        if !*self.running.borrow() {
            return;
        }
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
        let _ = self.frame_tx.send(frame);
    }

    /// The single local track sessions attach to
    pub fn track(&self) -> Arc<TrackLocalStaticSample> {
        self.track.clone()
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted.load(Ordering::Relaxed)
    }

    /// Stop accepting frames and shut the writer down
    pub fn stop(&self) {
        let _ = self.running.send(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::convert::I420Buffer;
    use crate::video::format::{Resolution, Rotation};

    fn frame() -> PlanarFrame {
        let buffer = I420Buffer::new(Resolution::new(4, 4)).unwrap();
        PlanarFrame::new(&buffer, Rotation::Deg0, 0)
    }

    #[tokio::test]
    async fn test_submit_after_stop_is_noop() {
        let source = SharedVideoSource::new(&WebRtcConfig::default());
        source.submit(frame());
        assert_eq!(source.frames_submitted(), 1);

        source.stop();
        assert!(!source.is_running());
        source.submit(frame());
        assert_eq!(source.frames_submitted(), 1);
    }
}
