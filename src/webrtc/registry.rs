//! Registry mapping viewer identity to an independent broadcast session
//!
//! The registry is the single owner of the viewer-to-session map and
//! serializes all access: inbound signaling (signaling task) and implicit
//! session creation (capture side, single-viewer mode) both go through
//! these methods. Single-viewer mode is the degenerate entry keyed by a
//! missing viewer id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use super::config::WebRtcConfig;
use super::session::{BroadcastSession, SessionState};
use super::source::SharedVideoSource;
use crate::signaling::SignalingMessage;

/// Owns every active viewer negotiation and routes inbound signaling by
/// viewer identity
pub struct PeerSessionRegistry {
    config: WebRtcConfig,
    source: Arc<SharedVideoSource>,
    outbox: mpsc::UnboundedSender<SignalingMessage>,
    sessions: RwLock<HashMap<Option<String>, Arc<BroadcastSession>>>,
}

impl PeerSessionRegistry {
    pub fn new(
        config: WebRtcConfig,
        source: Arc<SharedVideoSource>,
        outbox: mpsc::UnboundedSender<SignalingMessage>,
    ) -> Self {
        Self {
            config,
            source,
            outbox,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn label(viewer_id: &Option<String>) -> &str {
        viewer_id.as_deref().unwrap_or("(implicit)")
    }

    /// A viewer is ready: create its session, bind the shared track and
    /// send the offer. A `ready` for an id that already has a live session
    /// is dropped; re-negotiation requires an explicit disconnect first.
    pub async fn handle_ready(&self, viewer_id: Option<String>) {
        if self.sessions.read().await.contains_key(&viewer_id) {
            warn!(
                "duplicate ready for viewer {}, dropped",
                Self::label(&viewer_id)
            );
            return;
        }

        let session = match BroadcastSession::connect(
            &self.config,
            viewer_id.clone(),
            self.source.track(),
            self.outbox.clone(),
        )
        .await
        {
            Ok(session) => Arc::new(session),
            Err(e) => {
                warn!(
                    "failed to create session for viewer {}: {}",
                    Self::label(&viewer_id),
                    e
                );
                return;
            }
        };

        if let Err(e) = session.send_offer().await {
            warn!(
                "offer failed for viewer {}: {}",
                Self::label(&viewer_id),
                e
            );
            let _ = session.close().await;
            return;
        }

        let mut sessions = self.sessions.write().await;
        match sessions.entry(viewer_id.clone()) {
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(session);
                info!("viewer {} negotiating", Self::label(&viewer_id));
            }
            std::collections::hash_map::Entry::Occupied(_) => {
                warn!(
                    "viewer {} raced a concurrent ready, dropping the newcomer",
                    Self::label(&viewer_id)
                );
                drop(sessions);
                let _ = session.close().await;
            }
        }
    }

    /// Route an answer. An answer for an unknown viewer is dropped; a
    /// session is never created reactively from an answer.
    pub async fn handle_answer(&self, viewer_id: Option<String>, sdp: String) {
        let session = self.sessions.read().await.get(&viewer_id).cloned();
        match session {
            Some(session) => {
                if let Err(e) = session.apply_answer(sdp).await {
                    warn!(
                        "answer failed for viewer {}: {}",
                        Self::label(&viewer_id),
                        e
                    );
                }
            }
            None => warn!(
                "answer for unknown viewer {}, dropped",
                Self::label(&viewer_id)
            ),
        }
    }

    /// Route a remote ICE candidate; unknown viewers are dropped
    pub async fn handle_candidate(
        &self,
        viewer_id: Option<String>,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
    ) {
        let session = self.sessions.read().await.get(&viewer_id).cloned();
        match session {
            Some(session) => {
                if let Err(e) = session
                    .add_remote_candidate(candidate, sdp_mid, sdp_mline_index)
                    .await
                {
                    warn!(
                        "candidate failed for viewer {}: {}",
                        Self::label(&viewer_id),
                        e
                    );
                }
            }
            None => warn!(
                "candidate for unknown viewer {}, dropped",
                Self::label(&viewer_id)
            ),
        }
    }

    /// Tear one viewer down. Its id becomes available for a fresh session
    /// if a later `ready` references it again.
    pub async fn handle_viewer_disconnected(&self, viewer_id: String) {
        let removed = self.sessions.write().await.remove(&Some(viewer_id.clone()));
        match removed {
            Some(session) => {
                let _ = session.close().await;
                info!("viewer {} disconnected", viewer_id);
            }
            None => warn!("disconnect for unknown viewer {}, dropped", viewer_id),
        }
    }

    /// Close every session (channel shutdown path)
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        for (viewer_id, session) in drained {
            let _ = session.close().await;
            info!("viewer {} closed on shutdown", Self::label(&viewer_id));
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn session_state(&self, viewer_id: Option<&str>) -> Option<SessionState> {
        let key = viewer_id.map(str::to_string);
        self.sessions.read().await.get(&key).map(|s| s.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::api::media_engine::MediaEngine;
    use webrtc::api::APIBuilder;
    use webrtc::peer_connection::configuration::RTCConfiguration;
    use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

    /// Registry wired to an offline config with a captured outbox
    fn test_registry() -> (
        PeerSessionRegistry,
        mpsc::UnboundedReceiver<SignalingMessage>,
    ) {
        let config = WebRtcConfig {
            stun_servers: vec![],
            ..Default::default()
        };
        let source = SharedVideoSource::new(&config);
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        (
            PeerSessionRegistry::new(config, source, outbox_tx),
            outbox_rx,
        )
    }

    /// Viewer-side loopback peer answering our offer
    async fn answer_offer(offer_sdp: String) -> String {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().unwrap();
        let api = APIBuilder::new().with_media_engine(media_engine).build();
        let pc = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap();
        pc.set_remote_description(RTCSessionDescription::offer(offer_sdp).unwrap())
            .await
            .unwrap();
        let answer = pc.create_answer(None).await.unwrap();
        let sdp = answer.sdp.clone();
        pc.set_local_description(answer).await.unwrap();
        sdp
    }

    async fn next_offer(outbox: &mut mpsc::UnboundedReceiver<SignalingMessage>) -> (String, Option<String>) {
        loop {
            match outbox.recv().await.expect("outbox closed") {
                SignalingMessage::Offer { sdp, viewer_id } => return (sdp, viewer_id),
                // ICE candidates may interleave with the offer
                SignalingMessage::Candidate { .. } => continue,
                other => panic!("unexpected outbound message {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_ready_then_answer_reaches_answered() {
        let (registry, mut outbox) = test_registry();

        registry.handle_ready(Some("v1".into())).await;
        assert_eq!(registry.session_count().await, 1);
        assert_eq!(
            registry.session_state(Some("v1")).await,
            Some(SessionState::OfferSent)
        );

        let (offer_sdp, viewer_id) = next_offer(&mut outbox).await;
        assert_eq!(viewer_id.as_deref(), Some("v1"));

        let answer_sdp = answer_offer(offer_sdp).await;
        registry.handle_answer(Some("v1".into()), answer_sdp).await;
        assert_eq!(
            registry.session_state(Some("v1")).await,
            Some(SessionState::Answered)
        );

        // A candidate for a never-seen viewer is dropped without creating
        // a session
        registry
            .handle_candidate(Some("v2".into()), "candidate:0".into(), None, None)
            .await;
        assert_eq!(registry.session_count().await, 1);
        assert_eq!(registry.session_state(Some("v2")).await, None);
    }

    #[tokio::test]
    async fn test_answer_for_unknown_viewer_never_creates_session() {
        let (registry, _outbox) = test_registry();
        registry
            .handle_answer(Some("ghost".into()), "v=0".into())
            .await;
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_frees_id_for_fresh_session() {
        let (registry, mut outbox) = test_registry();

        registry.handle_ready(Some("v1".into())).await;
        let (offer_sdp, _) = next_offer(&mut outbox).await;
        let answer_sdp = answer_offer(offer_sdp).await;
        registry.handle_answer(Some("v1".into()), answer_sdp).await;
        assert_eq!(
            registry.session_state(Some("v1")).await,
            Some(SessionState::Answered)
        );

        registry.handle_viewer_disconnected("v1".into()).await;
        assert_eq!(registry.session_count().await, 0);

        // Same id, brand-new session in a fresh negotiation state
        registry.handle_ready(Some("v1".into())).await;
        assert_eq!(
            registry.session_state(Some("v1")).await,
            Some(SessionState::OfferSent)
        );
    }

    #[tokio::test]
    async fn test_duplicate_ready_is_dropped() {
        let (registry, _outbox) = test_registry();
        registry.handle_ready(Some("v1".into())).await;
        registry.handle_ready(Some("v1".into())).await;
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_single_viewer_mode_uses_implicit_key() {
        let (registry, mut outbox) = test_registry();
        registry.handle_ready(None).await;
        let (_, viewer_id) = next_offer(&mut outbox).await;
        assert_eq!(viewer_id, None);
        assert_eq!(
            registry.session_state(None).await,
            Some(SessionState::OfferSent)
        );
    }

    #[tokio::test]
    async fn test_shutdown_closes_all_sessions() {
        let (registry, _outbox) = test_registry();
        registry.handle_ready(Some("v1".into())).await;
        registry.handle_ready(Some("v2".into())).await;
        assert_eq!(registry.session_count().await, 2);
        registry.shutdown().await;
        assert_eq!(registry.session_count().await, 0);
    }
}
