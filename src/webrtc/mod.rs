//! WebRTC peer sessions and the shared outbound video source
//!
//! Architecture:
//! ```text
//! CapturePipeline (convert -> annotate -> planar)
//!        |
//!        v
//! SharedVideoSource (one track, frames produced once)
//!        |
//!        +--> BroadcastSession (viewer v1)
//!        +--> BroadcastSession (viewer v2)
//!        ...
//!
//! SignalingChannel <---> PeerSessionRegistry (routes by viewer id)
//! ```

pub mod config;
pub mod registry;
pub mod session;
pub mod source;

pub use config::{TurnServer, WebRtcConfig};
pub use registry::PeerSessionRegistry;
pub use session::{BroadcastSession, SessionState};
pub use source::SharedVideoSource;
