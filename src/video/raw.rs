//! Raw camera frame buffers with explicit stride arithmetic
//!
//! Capture sources hand over row-strided, possibly interleaved byte planes.
//! `Plane` checks the stride invariants once at construction so every later
//! sample access can be a plain `base + row * row_stride + col * pixel_stride`
//! lookup without re-validation.

use bytes::Bytes;

use super::format::{PixelFormat, Resolution, Rotation};
use crate::error::{AppError, Result};

/// One byte plane of a captured frame
#[derive(Debug, Clone)]
pub struct Plane {
    data: Bytes,
    row_stride: usize,
    pixel_stride: usize,
}

impl Plane {
    /// Create a plane view over `data` holding `rows` x `cols` samples.
    ///
    /// The buffer must cover the last addressable sample,
    /// `(rows-1) * row_stride + (cols-1) * pixel_stride`. A short buffer is
    /// rejected here rather than read out of bounds later.
    pub fn new(data: Bytes, rows: u32, cols: u32, row_stride: usize, pixel_stride: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(AppError::VideoError("plane has zero extent".into()));
        }
        if pixel_stride == 0 {
            return Err(AppError::VideoError("pixel stride must be >= 1".into()));
        }
        if row_stride < cols as usize * pixel_stride - (pixel_stride - 1) {
            return Err(AppError::VideoError(format!(
                "row stride {} too small for {} samples at pixel stride {}",
                row_stride, cols, pixel_stride
            )));
        }
        let last = (rows as usize - 1) * row_stride + (cols as usize - 1) * pixel_stride;
        if data.len() <= last {
            return Err(AppError::VideoError(format!(
                "plane buffer truncated: {} bytes, last sample at offset {}",
                data.len(),
                last
            )));
        }
        Ok(Self {
            data,
            row_stride,
            pixel_stride,
        })
    }

    /// Tightly packed plane (pixel stride 1, row stride = cols)
    pub fn packed(data: Bytes, rows: u32, cols: u32) -> Result<Self> {
        Self::new(data, rows, cols, cols as usize, 1)
    }

    /// Sample at (row, col). Bounds were established at construction.
    #[inline]
    pub fn sample(&self, row: usize, col: usize) -> u8 {
        self.data[row * self.row_stride + col * self.pixel_stride]
    }

    /// Raw row slice starting at (row, 0), `len` bytes long
    #[inline]
    pub fn row(&self, row: usize, len: usize) -> &[u8] {
        let start = row * self.row_stride;
        &self.data[start..start + len]
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A frame as delivered by the capture source.
///
/// Immutable once constructed; converters read it and must not retain the
/// underlying buffers past their call.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub format: PixelFormat,
    pub resolution: Resolution,
    pub rotation: Rotation,
    planes: Vec<Plane>,
}

impl RawFrame {
    /// Semi-planar YUV 4:2:0 frame: full-resolution luma plane plus one
    /// chroma plane each for U and V at half resolution per axis. The chroma
    /// planes may be interleaved views with pixel stride 2.
    pub fn semi_planar(
        resolution: Resolution,
        rotation: Rotation,
        y: Plane,
        u: Plane,
        v: Plane,
    ) -> Result<Self> {
        if !resolution.is_valid() {
            return Err(AppError::VideoError(format!("invalid resolution {}", resolution)));
        }
        Ok(Self {
            format: PixelFormat::Yuv420SemiPlanar,
            resolution,
            rotation,
            planes: vec![y, u, v],
        })
    }

    /// Packed RGBA frame with a single plane. The pixel stride of an RGBA
    /// plane must be exactly 4; anything else is a malformed frame and is
    /// rejected by the converter, not silently reinterpreted.
    pub fn rgba(resolution: Resolution, rotation: Rotation, plane: Plane) -> Result<Self> {
        if !resolution.is_valid() {
            return Err(AppError::VideoError(format!("invalid resolution {}", resolution)));
        }
        Ok(Self {
            format: PixelFormat::Rgba8888,
            resolution,
            rotation,
            planes: vec![plane],
        })
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn plane(&self, index: usize) -> &Plane {
        &self.planes[index]
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }
}
