//! Outbound video frame data

use std::time::Instant;

use bytes::Bytes;

use super::convert::I420Buffer;
use super::format::{Resolution, Rotation};

/// A planar frame ready for the shared video source.
///
/// The payload is packed once at construction; clones share the same
/// underlying buffer so fan-out never copies pixel data.
#[derive(Debug, Clone)]
pub struct PlanarFrame {
    data: Bytes,
    pub resolution: Resolution,
    pub rotation: Rotation,
    pub capture_ts: Instant,
    pub sequence: u64,
}

impl PlanarFrame {
    pub fn new(buffer: &I420Buffer, rotation: Rotation, sequence: u64) -> Self {
        Self {
            data: buffer.to_contiguous(),
            resolution: buffer.resolution(),
            rotation,
            capture_ts: Instant::now(),
            sequence,
        }
    }

    /// Packed Y,U,V payload
    pub fn data(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Time since capture
    pub fn age(&self) -> std::time::Duration {
        self.capture_ts.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planar_frame_packs_buffer() {
        let buffer = I420Buffer::new(Resolution::new(4, 4)).unwrap();
        let frame = PlanarFrame::new(&buffer, Rotation::Deg0, 7);
        assert_eq!(frame.len(), 16 + 2 * 4);
        assert_eq!(frame.sequence, 7);
    }
}
