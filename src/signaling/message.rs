//! Signaling wire protocol
//!
//! One JSON object per message, dispatched on the `type` field. Viewer
//! identity travels as `viewerId`; messages without it address the single
//! implicit session.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Signaling messages exchanged with the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingMessage {
    /// A viewer is ready to negotiate
    Ready {
        #[serde(rename = "viewerId", default, skip_serializing_if = "Option::is_none")]
        viewer_id: Option<String>,
    },
    /// Local SDP offer for one viewer
    Offer {
        sdp: String,
        #[serde(rename = "viewerId", default, skip_serializing_if = "Option::is_none")]
        viewer_id: Option<String>,
    },
    /// Remote SDP answer
    Answer {
        sdp: String,
        #[serde(rename = "viewerId", default, skip_serializing_if = "Option::is_none")]
        viewer_id: Option<String>,
    },
    /// Trickle ICE candidate, either direction
    Candidate {
        #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,
        #[serde(
            rename = "sdpMLineIndex",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        sdp_mline_index: Option<u16>,
        candidate: String,
        #[serde(rename = "viewerId", default, skip_serializing_if = "Option::is_none")]
        viewer_id: Option<String>,
    },
    /// A viewer's connection went away
    ViewerDisconnected {
        #[serde(rename = "viewerId")]
        viewer_id: String,
    },
    /// Outbound pose landmarks, one `[x, y, z, visibility, presence]`
    /// entry per landmark
    Pose { landmarks: Vec<[f32; 5]> },
    /// Server-side classification result echoed back
    PoseLabel {
        label: String,
        #[serde(rename = "senderId", default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<String>,
    },
    /// Viewer-issued command relayed by the server
    Command { text: String },
    /// One command history entry broadcast by the server
    CommandEntry { entry: CommandEntry },
    /// Full command history replay
    CommandHistory { entries: Vec<CommandEntry> },
}

/// Command history entry as the server stores it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandEntry {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
}

impl CommandEntry {
    /// Display form: `user: text`, or bare text without a user. Empty text
    /// formats to nothing.
    pub fn formatted(&self) -> Option<String> {
        let text = self.text.trim();
        if text.is_empty() {
            return None;
        }
        let user = self.user.trim();
        if user.is_empty() {
            Some(text.to_string())
        } else {
            Some(format!("{}: {}", user, text))
        }
    }
}

/// Message types this implementation understands
const KNOWN_TYPES: &[&str] = &[
    "ready",
    "offer",
    "answer",
    "candidate",
    "viewer-disconnected",
    "pose",
    "pose-label",
    "command",
    "command-entry",
    "command-history",
];

impl SignalingMessage {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Ready { .. } => "ready",
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::Candidate { .. } => "candidate",
            SignalingMessage::ViewerDisconnected { .. } => "viewer-disconnected",
            SignalingMessage::Pose { .. } => "pose",
            SignalingMessage::PoseLabel { .. } => "pose-label",
            SignalingMessage::Command { .. } => "command",
            SignalingMessage::CommandEntry { .. } => "command-entry",
            SignalingMessage::CommandHistory { .. } => "command-history",
        }
    }

    /// Parse an inbound payload.
    ///
    /// Returns `Ok(None)` for well-formed JSON carrying a message type this
    /// implementation does not know (ignored per protocol), `Err` for
    /// anything unparseable.
    pub fn parse_inbound(text: &str) -> Result<Option<SignalingMessage>> {
        match serde_json::from_str::<SignalingMessage>(text) {
            Ok(message) => Ok(Some(message)),
            Err(err) => {
                let value: serde_json::Value = serde_json::from_str(text)?;
                match value.get("type").and_then(|t| t.as_str()) {
                    Some(kind) if !KNOWN_TYPES.contains(&kind) => Ok(None),
                    _ => Err(AppError::Serialization(err)),
                }
            }
        }
    }

    /// Serialize for the wire
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_wire_field_names() {
        let msg = SignalingMessage::Offer {
            sdp: "v=0".into(),
            viewer_id: Some("v1".into()),
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"offer\""));
        assert!(json.contains("\"viewerId\":\"v1\""));
        assert!(!json.contains("viewer_id"));
    }

    #[test]
    fn test_candidate_round_trip() {
        let json = r#"{"type":"candidate","sdpMid":"0","sdpMLineIndex":0,"candidate":"candidate:1 1 udp 1 127.0.0.1 40000 typ host","viewerId":"v2"}"#;
        let msg = SignalingMessage::parse_inbound(json).unwrap().unwrap();
        match &msg {
            SignalingMessage::Candidate {
                sdp_mid,
                sdp_mline_index,
                viewer_id,
                ..
            } => {
                assert_eq!(sdp_mid.as_deref(), Some("0"));
                assert_eq!(*sdp_mline_index, Some(0));
                assert_eq!(viewer_id.as_deref(), Some("v2"));
            }
            other => panic!("unexpected message {:?}", other),
        }
        let round = SignalingMessage::parse_inbound(&msg.to_json().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(round, msg);
    }

    #[test]
    fn test_ready_without_viewer_id() {
        let msg = SignalingMessage::parse_inbound(r#"{"type":"ready"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(msg, SignalingMessage::Ready { viewer_id: None });
        assert_eq!(msg.to_json().unwrap(), r#"{"type":"ready"}"#);
    }

    #[test]
    fn test_viewer_disconnected_requires_viewer_id() {
        assert!(SignalingMessage::parse_inbound(r#"{"type":"viewer-disconnected"}"#).is_err());
        let msg =
            SignalingMessage::parse_inbound(r#"{"type":"viewer-disconnected","viewerId":"v1"}"#)
                .unwrap()
                .unwrap();
        assert_eq!(
            msg,
            SignalingMessage::ViewerDisconnected {
                viewer_id: "v1".into()
            }
        );
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let parsed = SignalingMessage::parse_inbound(r#"{"type":"viewer-count","count":3}"#).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(SignalingMessage::parse_inbound("{nope").is_err());
        assert!(SignalingMessage::parse_inbound(r#"{"no_type":1}"#).is_err());
    }

    #[test]
    fn test_command_entry_formatting() {
        let entry = CommandEntry {
            user: "ops".into(),
            text: "sit".into(),
        };
        assert_eq!(entry.formatted().as_deref(), Some("ops: sit"));
        let anonymous = CommandEntry {
            user: "".into(),
            text: "stand".into(),
        };
        assert_eq!(anonymous.formatted().as_deref(), Some("stand"));
        let empty = CommandEntry::default();
        assert_eq!(empty.formatted(), None);
    }

    #[test]
    fn test_pose_landmark_payload() {
        let msg = SignalingMessage::Pose {
            landmarks: vec![[0.1, 0.2, 0.3, 0.9, 0.8]],
        };
        let json = msg.to_json().unwrap();
        assert!(json.starts_with(r#"{"type":"pose","landmarks":[["#));
    }
}
