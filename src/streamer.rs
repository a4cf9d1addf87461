//! Top-level broadcast manager
//!
//! Owns the signaling channel, the per-viewer session registry and the
//! shared video source. The source and registry live from `start` to
//! `stop`; a frame submitted after `stop` silently no-ops against the
//! now-absent source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::Result;
use crate::landmarks::NormalizedLandmark;
use crate::pipeline::FrameSink;
use crate::signaling::{ChannelEvent, SignalingChannel, SignalingMessage};
use crate::video::frame::PlanarFrame;
use crate::webrtc::{PeerSessionRegistry, SharedVideoSource, WebRtcConfig};

/// Streamer configuration
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    /// Signaling server WebSocket URL
    pub signaling_url: String,
    /// Device identity appended to the signaling URL query
    pub device_id: Option<String>,
    /// Create the implicit single-viewer session as soon as the channel
    /// opens instead of waiting for an explicit `ready`
    pub offer_on_open: bool,
    pub webrtc: WebRtcConfig,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://127.0.0.1:8080/ws".to_string(),
            device_id: None,
            offer_on_open: false,
            webrtc: WebRtcConfig::default(),
        }
    }
}

type LabelCallback = Box<dyn Fn(&str) + Send + Sync>;
type CommandCallback = Box<dyn Fn(&str) + Send + Sync>;
type HistoryCallback = Box<dyn Fn(&[String]) + Send + Sync>;

struct ActiveBroadcast {
    registry: Arc<PeerSessionRegistry>,
    source: Arc<SharedVideoSource>,
}

/// Streams the shared video source to every signaled viewer
pub struct PoseStreamer {
    config: StreamerConfig,
    channel: SignalingChannel,
    started: AtomicBool,
    active: RwLock<Option<ActiveBroadcast>>,
    pose_label_cb: RwLock<Option<LabelCallback>>,
    command_cb: RwLock<Option<CommandCallback>>,
    command_entry_cb: RwLock<Option<CommandCallback>>,
    command_history_cb: RwLock<Option<HistoryCallback>>,
}

impl PoseStreamer {
    pub fn new(config: StreamerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            channel: SignalingChannel::new(),
            started: AtomicBool::new(false),
            active: RwLock::new(None),
            pose_label_cb: RwLock::new(None),
            command_cb: RwLock::new(None),
            command_entry_cb: RwLock::new(None),
            command_history_cb: RwLock::new(None),
        })
    }

    /// Connect to the signaling server and stand up the shared source.
    /// Idempotent while started.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("streamer already started");
            return Ok(());
        }

        let source = SharedVideoSource::new(&self.config.webrtc);
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(PeerSessionRegistry::new(
            self.config.webrtc.clone(),
            source.clone(),
            outbox_tx,
        ));
        *self.active.write() = Some(ActiveBroadcast {
            registry: registry.clone(),
            source: source.clone(),
        });

        let url = build_signaling_url(&self.config.signaling_url, self.config.device_id.as_deref());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        if let Err(e) = self.channel.start(&url, events_tx).await {
            self.started.store(false, Ordering::SeqCst);
            *self.active.write() = None;
            source.stop();
            return Err(e);
        }

        self.spawn_dispatch(registry, events_rx, outbox_rx);
        info!("streamer started against {}", url);
        Ok(())
    }

    /// Disconnect signaling, close every session and dispose the source.
    /// Safe to call concurrently with in-flight frame submissions.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.channel.stop();
        let active = self.active.write().take();
        if let Some(active) = active {
            active.source.stop();
            active.registry.shutdown().await;
        }
        info!("streamer stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Publish the primary subject's pose landmarks to the server
    pub fn send_pose_landmarks(&self, landmarks: &[NormalizedLandmark]) {
        if !self.is_started() || landmarks.is_empty() {
            return;
        }
        let wire = landmarks.iter().map(|lm| lm.to_wire()).collect();
        self.channel.send(&SignalingMessage::Pose { landmarks: wire });
    }

    pub fn set_pose_label_listener(&self, cb: impl Fn(&str) + Send + Sync + 'static) {
        *self.pose_label_cb.write() = Some(Box::new(cb));
    }

    pub fn set_command_listener(&self, cb: impl Fn(&str) + Send + Sync + 'static) {
        *self.command_cb.write() = Some(Box::new(cb));
    }

    pub fn set_command_entry_listener(&self, cb: impl Fn(&str) + Send + Sync + 'static) {
        *self.command_entry_cb.write() = Some(Box::new(cb));
    }

    pub fn set_command_history_listener(&self, cb: impl Fn(&[String]) + Send + Sync + 'static) {
        *self.command_history_cb.write() = Some(Box::new(cb));
    }

    fn spawn_dispatch(
        self: &Arc<Self>,
        registry: Arc<PeerSessionRegistry>,
        mut events_rx: mpsc::UnboundedReceiver<ChannelEvent>,
        mut outbox_rx: mpsc::UnboundedReceiver<SignalingMessage>,
    ) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events_rx.recv() => match event {
                        Some(ChannelEvent::Open) => {
                            if this.config.offer_on_open {
                                registry.handle_ready(None).await;
                            }
                        }
                        Some(ChannelEvent::Message(message)) => {
                            this.dispatch(&registry, message).await;
                        }
                        Some(ChannelEvent::Closed) | None => break,
                    },
                    outbound = outbox_rx.recv() => match outbound {
                        Some(message) => this.channel.send(&message),
                        None => break,
                    },
                }
            }
            debug!("signaling dispatch stopped");
        });
    }

    async fn dispatch(&self, registry: &PeerSessionRegistry, message: SignalingMessage) {
        match message {
            SignalingMessage::Ready { viewer_id } => registry.handle_ready(viewer_id).await,
            SignalingMessage::Answer { sdp, viewer_id } => {
                registry.handle_answer(viewer_id, sdp).await
            }
            SignalingMessage::Candidate {
                sdp_mid,
                sdp_mline_index,
                candidate,
                viewer_id,
            } => {
                registry
                    .handle_candidate(viewer_id, candidate, sdp_mid, sdp_mline_index)
                    .await
            }
            SignalingMessage::ViewerDisconnected { viewer_id } => {
                registry.handle_viewer_disconnected(viewer_id).await
            }
            SignalingMessage::PoseLabel { label, .. } => {
                if let Some(cb) = &*self.pose_label_cb.read() {
                    cb(&label);
                }
            }
            SignalingMessage::Command { text } => {
                let text = text.trim();
                if !text.is_empty() {
                    if let Some(cb) = &*self.command_cb.read() {
                        cb(text);
                    }
                }
            }
            SignalingMessage::CommandEntry { entry } => {
                if let Some(formatted) = entry.formatted() {
                    if let Some(cb) = &*self.command_entry_cb.read() {
                        cb(&formatted);
                    }
                }
            }
            SignalingMessage::CommandHistory { entries } => {
                let formatted: Vec<String> =
                    entries.iter().filter_map(|e| e.formatted()).collect();
                if let Some(cb) = &*self.command_history_cb.read() {
                    cb(&formatted);
                }
            }
            other => debug!("ignoring unexpected inbound {}", other.kind()),
        }
    }
}

impl FrameSink for PoseStreamer {
    /// Hand an annotated planar frame to the shared source. Silently
    /// no-ops when the streamer is stopped.
    fn send_frame(&self, frame: PlanarFrame) {
        if !self.is_started() {
            return;
        }
        if let Some(active) = &*self.active.read() {
            active.source.submit(frame);
        }
    }
}

/// Append the device identity as a `deviceId` query parameter unless the
/// URL already carries one. The id is restricted to URL-safe characters.
fn build_signaling_url(url: &str, device_id: Option<&str>) -> String {
    let Some(device_id) = device_id else {
        return url.to_string();
    };
    let sanitized: String = device_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if sanitized.is_empty() {
        return url.to_string();
    }
    let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
    if query.contains("deviceId=") || query.contains("device_id=") {
        return url.to_string();
    }
    let separator = if query.is_empty() && !url.contains('?') {
        '?'
    } else {
        '&'
    };
    format!("{}{}deviceId={}", url, separator, sanitized)
}
