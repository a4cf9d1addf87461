//! Persistent duplex signaling connection
//!
//! One WebSocket to the signaling server. `start` is idempotent, `stop`
//! closes with a normal-closure code, and a `send` while the channel is not
//! open is dropped with a log line instead of failing the caller. Transport
//! errors end the connection; recovery is an explicit `start` by the owner,
//! never an internal reconnect loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::message::SignalingMessage;
use crate::error::{AppError, Result};

/// Events surfaced to the channel owner
#[derive(Debug)]
pub enum ChannelEvent {
    /// Connection established
    Open,
    /// Parsed inbound signaling message
    Message(SignalingMessage),
    /// Connection ended (remote close or transport error)
    Closed,
}

enum OutboundCommand {
    Send(String),
    Close,
}

struct Active {
    outbound: mpsc::UnboundedSender<OutboundCommand>,
    open: Arc<AtomicBool>,
}

/// WebSocket signaling channel
pub struct SignalingChannel {
    started: AtomicBool,
    active: Mutex<Option<Active>>,
}

impl SignalingChannel {
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            active: Mutex::new(None),
        }
    }

    /// Open the connection. A second call while already started is a no-op.
    pub async fn start(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("signaling channel already started");
            return Ok(());
        }

        let (ws, _) = match connect_async(url).await {
            Ok(ok) => ok,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(AppError::SignalingError(format!(
                    "failed to connect to {}: {}",
                    url, e
                )));
            }
        };
        debug!("signaling channel connected to {}", url);

        let (mut sink, mut stream) = ws.split();
        let open = Arc::new(AtomicBool::new(true));
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

        {
            let open = open.clone();
            tokio::spawn(async move {
                while let Some(command) = outbound_rx.recv().await {
                    match command {
                        OutboundCommand::Send(text) => {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                warn!("signaling send failed: {}", e);
                                open.store(false, Ordering::SeqCst);
                                break;
                            }
                        }
                        OutboundCommand::Close => {
                            let _ = sink
                                .send(Message::Close(Some(CloseFrame {
                                    code: CloseCode::Normal,
                                    reason: "bye".into(),
                                })))
                                .await;
                            break;
                        }
                    }
                }
            });
        }

        {
            let open = open.clone();
            let events = events.clone();
            tokio::spawn(async move {
                while let Some(incoming) = stream.next().await {
                    match incoming {
                        Ok(Message::Text(text)) => match SignalingMessage::parse_inbound(&text) {
                            Ok(Some(message)) => {
                                if events.send(ChannelEvent::Message(message)).is_err() {
                                    break;
                                }
                            }
                            Ok(None) => debug!("ignoring unknown signaling message"),
                            Err(e) => warn!("discarding malformed signaling payload: {}", e),
                        },
                        Ok(Message::Close(_)) => {
                            debug!("signaling server closed the connection");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("signaling transport error: {}", e);
                            break;
                        }
                    }
                }
                open.store(false, Ordering::SeqCst);
                let _ = events.send(ChannelEvent::Closed);
            });
        }

        *self.active.lock() = Some(Active {
            outbound: outbound_tx,
            open,
        });
        let _ = events.send(ChannelEvent::Open);
        Ok(())
    }

    /// Whether the underlying connection is currently open
    pub fn is_open(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|a| a.open.load(Ordering::SeqCst))
    }

    /// Serialize and transmit. Dropped with a log line when the channel is
    /// not open; callers never treat that as an error.
    pub fn send(&self, message: &SignalingMessage) {
        let guard = self.active.lock();
        let Some(active) = guard.as_ref() else {
            debug!("signaling channel not started, dropping {}", message.kind());
            return;
        };
        if !active.open.load(Ordering::SeqCst) {
            debug!("signaling channel closed, dropping {}", message.kind());
            return;
        }
        match message.to_json() {
            Ok(text) => {
                if active.outbound.send(OutboundCommand::Send(text)).is_err() {
                    debug!("signaling writer gone, dropped {}", message.kind());
                }
            }
            Err(e) => warn!("failed to serialize {}: {}", message.kind(), e),
        }
    }

    /// Close gracefully. `start` may be called again afterwards.
    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        if let Some(active) = self.active.lock().take() {
            active.open.store(false, Ordering::SeqCst);
            let _ = active.outbound.send(OutboundCommand::Close);
        }
    }
}

impl Default for SignalingChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::accept_async;

    async fn local_server() -> (tokio::net::TcpListener, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (listener, url) = local_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let channel = SignalingChannel::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        channel.start(&url, events_tx.clone()).await.unwrap();
        assert!(matches!(events_rx.recv().await, Some(ChannelEvent::Open)));

        // Second start is a no-op: the bogus URL is never dialed
        channel
            .start("ws://127.0.0.1:1", events_tx)
            .await
            .unwrap();
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_send_reaches_server() {
        let (listener, url) = local_server().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    return text;
                }
            }
            panic!("server saw no text frame");
        });

        let channel = SignalingChannel::new();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        channel.start(&url, events_tx).await.unwrap();
        channel.send(&SignalingMessage::Ready { viewer_id: None });

        let text = server.await.unwrap();
        let parsed = SignalingMessage::parse_inbound(&text).unwrap().unwrap();
        assert_eq!(parsed, SignalingMessage::Ready { viewer_id: None });
    }

    #[tokio::test]
    async fn test_send_without_start_is_silent() {
        let channel = SignalingChannel::new();
        channel.send(&SignalingMessage::Pose { landmarks: vec![] });
        channel.stop();
        channel.send(&SignalingMessage::Pose { landmarks: vec![] });
    }

    #[tokio::test]
    async fn test_inbound_dispatch_survives_garbage() {
        let (listener, url) = local_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text("this is not json".into()))
                .await
                .unwrap();
            ws.send(Message::Text(
                r#"{"type":"pose-label","label":"standing"}"#.into(),
            ))
            .await
            .unwrap();
            while ws.next().await.is_some() {}
        });

        let channel = SignalingChannel::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        channel.start(&url, events_tx).await.unwrap();

        assert!(matches!(events_rx.recv().await, Some(ChannelEvent::Open)));
        match events_rx.recv().await {
            Some(ChannelEvent::Message(SignalingMessage::PoseLabel { label, .. })) => {
                assert_eq!(label, "standing");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_allows_restart() {
        let (listener, url) = local_server().await;
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut ws = accept_async(stream).await.unwrap();
                    while ws.next().await.is_some() {}
                });
            }
        });

        let channel = SignalingChannel::new();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        channel.start(&url, events_tx.clone()).await.unwrap();
        channel.stop();
        channel.start(&url, events_tx).await.unwrap();
        assert!(channel.is_open());
    }
}
