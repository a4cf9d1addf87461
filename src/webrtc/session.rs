//! Per-viewer broadcast session
//!
//! One negotiation state machine per remote viewer:
//! `Created -> OfferSent -> Answered -> Closed`, with ICE exchange
//! overlapping any state from `OfferSent` on. The session owns its peer
//! connection; lifecycle is owned exclusively by the registry.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::config::WebRtcConfig;
use crate::error::{AppError, Result};
use crate::signaling::SignalingMessage;

/// Negotiation state of one viewer's session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    OfferSent,
    Answered,
    Closed,
}

/// One viewer's negotiation: offer creation, answer consumption, ICE
/// exchange, teardown
pub struct BroadcastSession {
    viewer_id: Option<String>,
    pc: Arc<RTCPeerConnection>,
    state: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    outbox: mpsc::UnboundedSender<SignalingMessage>,
}

impl BroadcastSession {
    /// Create the transport connection bound to the shared video track.
    ///
    /// The track is attached as a send-only transceiver; local ICE
    /// candidates flow out through the signaling outbox as they gather.
    pub async fn connect(
        config: &WebRtcConfig,
        viewer_id: Option<String>,
        track: Arc<TrackLocalStaticSample>,
        outbox: mpsc::UnboundedSender<SignalingMessage>,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::WebRtcError(format!("failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| AppError::WebRtcError(format!("failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let mut ice_servers = vec![];
        for stun_url in &config.stun_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![stun_url.clone()],
                ..Default::default()
            });
        }
        for turn in &config.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: turn.urls.clone(),
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = api.new_peer_connection(rtc_config).await.map_err(|e| {
            AppError::WebRtcError(format!("failed to create peer connection: {}", e))
        })?;
        let pc = Arc::new(pc);

        pc.add_transceiver_from_track(
            Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Sendonly,
                send_encodings: vec![],
            }),
        )
        .await
        .map_err(|e| AppError::WebRtcError(format!("failed to attach video track: {}", e)))?;

        let (state, state_rx) = watch::channel(SessionState::Created);

        let session = Self {
            viewer_id,
            pc,
            state,
            state_rx,
            outbox,
        };
        session.setup_event_handlers();
        info!(
            "session {} created, send policy {} kbps @ {} fps",
            session.label(),
            config.max_bitrate_bps / 1000,
            config.max_framerate
        );
        Ok(session)
    }

    fn setup_event_handlers(&self) {
        let outbox = self.outbox.clone();
        let viewer_id = self.viewer_id.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let outbox = outbox.clone();
                let viewer_id = viewer_id.clone();
                Box::pin(async move {
                    let Some(candidate) = candidate else { return };
                    match candidate.to_json() {
                        Ok(json) => {
                            let _ = outbox.send(SignalingMessage::Candidate {
                                sdp_mid: json.sdp_mid,
                                sdp_mline_index: json.sdp_mline_index,
                                candidate: json.candidate,
                                viewer_id,
                            });
                        }
                        Err(e) => debug!("failed to serialize ICE candidate: {}", e),
                    }
                })
            }));

        let label = self.label();
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let label = label.clone();
                Box::pin(async move {
                    info!("session {} transport state: {}", label, s);
                })
            }));
    }

    /// Create and apply the local offer, then emit it on the outbox
    pub async fn send_offer(&self) -> Result<()> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| AppError::WebRtcError(format!("failed to create offer: {}", e)))?;
        let sdp = offer.sdp.clone();
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| AppError::WebRtcError(format!("failed to set local description: {}", e)))?;

        let _ = self.outbox.send(SignalingMessage::Offer {
            sdp,
            viewer_id: self.viewer_id.clone(),
        });
        let _ = self.state.send(SessionState::OfferSent);
        debug!("session {} offer sent", self.label());
        Ok(())
    }

    /// Apply the viewer's answer. Out-of-order answers are dropped with a
    /// log line, never fatal.
    pub async fn apply_answer(&self, sdp: String) -> Result<()> {
        if self.state() != SessionState::OfferSent {
            warn!(
                "session {} ignoring answer in state {:?}",
                self.label(),
                self.state()
            );
            return Ok(());
        }
        let answer = RTCSessionDescription::answer(sdp)
            .map_err(|e| AppError::WebRtcError(format!("invalid answer SDP: {}", e)))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| AppError::WebRtcError(format!("failed to set remote description: {}", e)))?;
        let _ = self.state.send(SessionState::Answered);
        debug!("session {} answered", self.label());
        Ok(())
    }

    /// Apply a remote ICE candidate. Valid from `OfferSent` on.
    pub async fn add_remote_candidate(
        &self,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
    ) -> Result<()> {
        match self.state() {
            SessionState::Created | SessionState::Closed => {
                debug!(
                    "session {} dropping candidate in state {:?}",
                    self.label(),
                    self.state()
                );
                return Ok(());
            }
            SessionState::OfferSent | SessionState::Answered => {}
        }
        let init = RTCIceCandidateInit {
            candidate,
            sdp_mid,
            sdp_mline_index,
            username_fragment: None,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| AppError::WebRtcError(format!("failed to add ICE candidate: {}", e)))
    }

    /// Close the transport connection
    pub async fn close(&self) -> Result<()> {
        let _ = self.state.send(SessionState::Closed);
        self.pc
            .close()
            .await
            .map_err(|e| AppError::WebRtcError(format!("failed to close peer connection: {}", e)))
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn viewer_id(&self) -> Option<&str> {
        self.viewer_id.as_deref()
    }

    fn label(&self) -> String {
        self.viewer_id
            .clone()
            .unwrap_or_else(|| "(implicit)".to_string())
    }
}
