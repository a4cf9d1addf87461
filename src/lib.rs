//! posecast - pose-annotated live video broadcast
//!
//! This crate provides the device-side core for streaming camera video,
//! annotated with pose-estimation overlays, to remote viewers over WebRTC
//! with a WebSocket signaling server handling session setup.

pub mod error;
pub mod inference;
pub mod landmarks;
pub mod pipeline;
pub mod signaling;
pub mod streamer;
pub mod video;
pub mod webrtc;

pub use error::{AppError, Result};
