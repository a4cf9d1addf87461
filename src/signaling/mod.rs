//! JSON signaling over a persistent WebSocket connection

pub mod channel;
pub mod message;

pub use channel::{ChannelEvent, SignalingChannel};
pub use message::{CommandEntry, SignalingMessage};
