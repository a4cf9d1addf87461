//! Decoded RGBA raster

use super::format::{Resolution, Rotation};
use crate::error::{AppError, Result};

/// Owned, tightly packed 8-bit RGBA image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaRaster {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl RgbaRaster {
    /// Allocate a zeroed raster. Fails instead of aborting when the
    /// allocation cannot be satisfied.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let len = width as usize * height as usize * 4;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| AppError::VideoError(format!("raster allocation failed ({} bytes)", len)))?;
        data.resize(len, 0);
        Ok(Self { data, width, height })
    }

    /// Wrap an existing tightly packed RGBA buffer
    pub fn from_vec(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(AppError::VideoError(format!(
                "RGBA buffer size mismatch: {} != {}",
                data.len(),
                expected
            )));
        }
        Ok(Self { data, width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    /// Rotate clockwise by a quarter-turn multiple. Identity rotation
    /// returns the raster unchanged without copying.
    pub fn rotated(self, rotation: Rotation) -> Result<RgbaRaster> {
        if rotation.is_identity() {
            return Ok(self);
        }
        let (w, h) = (self.width, self.height);
        let (dst_w, dst_h) = match rotation {
            Rotation::Deg90 | Rotation::Deg270 => (h, w),
            _ => (w, h),
        };
        let mut dst = RgbaRaster::new(dst_w, dst_h)?;
        for y in 0..h {
            for x in 0..w {
                let (dx, dy) = match rotation {
                    Rotation::Deg90 => (h - 1 - y, x),
                    Rotation::Deg180 => (w - 1 - x, h - 1 - y),
                    Rotation::Deg270 => (y, w - 1 - x),
                    Rotation::Deg0 => (x, y),
                };
                dst.put_pixel(dx, dy, self.pixel(x, y));
            }
        }
        Ok(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raster() -> RgbaRaster {
        // 2x3 raster with distinct pixels
        let mut r = RgbaRaster::new(2, 3).unwrap();
        for y in 0..3 {
            for x in 0..2 {
                let v = (y * 2 + x) as u8;
                r.put_pixel(x, y, [v, v, v, 255]);
            }
        }
        r
    }

    #[test]
    fn test_from_vec_size_mismatch() {
        assert!(RgbaRaster::from_vec(vec![0u8; 10], 2, 2).is_err());
        assert!(RgbaRaster::from_vec(vec![0u8; 16], 2, 2).is_ok());
    }

    #[test]
    fn test_rotate_90_swaps_dimensions() {
        let r = sample_raster().rotated(Rotation::Deg90).unwrap();
        assert_eq!(r.width(), 3);
        assert_eq!(r.height(), 2);
        // top-left of source (0,0) moves to top-right column
        assert_eq!(r.pixel(2, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn test_rotate_180_twice_is_identity() {
        let original = sample_raster();
        let twice = original
            .clone()
            .rotated(Rotation::Deg180)
            .unwrap()
            .rotated(Rotation::Deg180)
            .unwrap();
        assert_eq!(original, twice);
    }

    #[test]
    fn test_rotate_identity_is_noop() {
        let original = sample_raster();
        let rotated = original.clone().rotated(Rotation::Deg0).unwrap();
        assert_eq!(original, rotated);
    }
}
