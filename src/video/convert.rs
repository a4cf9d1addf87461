//! Color-space conversion between capture-native layouts and the formats
//! the pipeline consumers need
//!
//! Two pipelines start here:
//! - the preview path repacks semi-planar YUV into NV21, runs it through a
//!   JPEG compress/decode round trip and yields an RGBA raster for the
//!   inference engine and the overlay burn-in
//! - the planar path produces an I420 buffer for the outbound video source
//!
//! All sample access honors the source plane's row and pixel stride; rows
//! are never assumed contiguous.

use bytes::Bytes;
use turbojpeg::{Compressor, Decompressor, Image, PixelFormat as TJPixelFormat, Subsamp, YuvImage};

use super::format::{PixelFormat, Resolution};
use super::raster::RgbaRaster;
use super::raw::RawFrame;
use crate::error::{AppError, Result};

/// Fallible byte-buffer allocation. A failed allocation surfaces as an
/// error with nothing half-built left behind.
fn try_alloc(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| AppError::VideoError(format!("buffer allocation failed ({} bytes)", len)))?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Planar YUV 4:2:0 buffer with three independently strided planes
#[derive(Debug, Clone)]
pub struct I420Buffer {
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
    resolution: Resolution,
    y_stride: usize,
    chroma_stride: usize,
}

impl I420Buffer {
    /// Allocate with tight strides (luma stride = width, chroma stride =
    /// ceil(width / 2))
    pub fn new(resolution: Resolution) -> Result<Self> {
        Self::with_strides(
            resolution,
            resolution.width as usize,
            resolution.chroma_width() as usize,
        )
    }

    /// Allocate with explicit destination strides. Strides smaller than the
    /// logical row width are invalid.
    pub fn with_strides(resolution: Resolution, y_stride: usize, chroma_stride: usize) -> Result<Self> {
        if y_stride < resolution.width as usize || chroma_stride < resolution.chroma_width() as usize {
            return Err(AppError::VideoError(format!(
                "I420 strides ({}, {}) below logical width for {}",
                y_stride, chroma_stride, resolution
            )));
        }
        let y = try_alloc(y_stride * resolution.height as usize)?;
        let u = try_alloc(chroma_stride * resolution.chroma_height() as usize)?;
        let v = try_alloc(chroma_stride * resolution.chroma_height() as usize)?;
        Ok(Self {
            y,
            u,
            v,
            resolution,
            y_stride,
            chroma_stride,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn y_stride(&self) -> usize {
        self.y_stride
    }

    pub fn chroma_stride(&self) -> usize {
        self.chroma_stride
    }

    pub fn y_plane(&self) -> &[u8] {
        &self.y
    }

    pub fn u_plane(&self) -> &[u8] {
        &self.u
    }

    pub fn v_plane(&self) -> &[u8] {
        &self.v
    }

    #[inline]
    pub fn y_sample(&self, row: usize, col: usize) -> u8 {
        self.y[row * self.y_stride + col]
    }

    #[inline]
    pub fn u_sample(&self, row: usize, col: usize) -> u8 {
        self.u[row * self.chroma_stride + col]
    }

    #[inline]
    pub fn v_sample(&self, row: usize, col: usize) -> u8 {
        self.v[row * self.chroma_stride + col]
    }

    /// Pack into one tight Y,U,V buffer (the layout the outbound track
    /// writer submits)
    pub fn to_contiguous(&self) -> Bytes {
        let w = self.resolution.width as usize;
        let h = self.resolution.height as usize;
        let cw = self.resolution.chroma_width() as usize;
        let ch = self.resolution.chroma_height() as usize;
        let mut out = Vec::with_capacity(w * h + 2 * cw * ch);
        for row in 0..h {
            out.extend_from_slice(&self.y[row * self.y_stride..row * self.y_stride + w]);
        }
        for row in 0..ch {
            out.extend_from_slice(&self.u[row * self.chroma_stride..row * self.chroma_stride + cw]);
        }
        for row in 0..ch {
            out.extend_from_slice(&self.v[row * self.chroma_stride..row * self.chroma_stride + cw]);
        }
        Bytes::from(out)
    }
}

/// Repack a semi-planar frame into a contiguous NV21 buffer: the luma plane
/// followed by interleaved chroma pairs ordered V before U.
pub fn repack_nv21(frame: &RawFrame) -> Result<Vec<u8>> {
    if frame.format != PixelFormat::Yuv420SemiPlanar {
        return Err(AppError::VideoError(format!(
            "NV21 repack expects semi-planar input, got {}",
            frame.format
        )));
    }
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let chroma_w = frame.resolution.chroma_width() as usize;
    let chroma_h = frame.resolution.chroma_height() as usize;
    let y_size = width * height;

    let mut nv21 = try_alloc(y_size + 2 * chroma_w * chroma_h)?;
    let y_plane = frame.plane(0);
    let u_plane = frame.plane(1);
    let v_plane = frame.plane(2);

    let mut offset = 0;
    for row in 0..height {
        for col in 0..width {
            nv21[offset] = y_plane.sample(row, col);
            offset += 1;
        }
    }
    for row in 0..chroma_h {
        for col in 0..chroma_w {
            nv21[offset] = v_plane.sample(row, col);
            nv21[offset + 1] = u_plane.sample(row, col);
            offset += 2;
        }
    }
    Ok(nv21)
}

/// Copy a semi-planar frame into a freshly allocated planar I420 buffer.
///
/// Luma is copied sample-by-sample honoring the source strides; U and V land
/// in separate destination planes at ceiling-halved resolution.
pub fn semi_planar_to_i420(frame: &RawFrame) -> Result<I420Buffer> {
    if frame.format != PixelFormat::Yuv420SemiPlanar {
        return Err(AppError::VideoError(format!(
            "planar conversion expects semi-planar input, got {}",
            frame.format
        )));
    }
    let mut dst = I420Buffer::new(frame.resolution)?;
    copy_semi_planar_into(frame, &mut dst);
    Ok(dst)
}

fn copy_semi_planar_into(frame: &RawFrame, dst: &mut I420Buffer) {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let chroma_w = frame.resolution.chroma_width() as usize;
    let chroma_h = frame.resolution.chroma_height() as usize;

    let y_plane = frame.plane(0);
    for row in 0..height {
        let dst_row = row * dst.y_stride;
        for col in 0..width {
            dst.y[dst_row + col] = y_plane.sample(row, col);
        }
    }

    let u_plane = frame.plane(1);
    let v_plane = frame.plane(2);
    for row in 0..chroma_h {
        let dst_row = row * dst.chroma_stride;
        for col in 0..chroma_w {
            dst.u[dst_row + col] = u_plane.sample(row, col);
            dst.v[dst_row + col] = v_plane.sample(row, col);
        }
    }
}

/// Full-range BT.601 RGB -> YUV, integer arithmetic, clamped to 8 bits
#[inline]
fn rgb_to_y(r: i32, g: i32, b: i32) -> u8 {
    ((77 * r + 150 * g + 29 * b + 128) >> 8).clamp(0, 255) as u8
}

#[inline]
fn rgb_to_u(r: i32, g: i32, b: i32) -> i32 {
    ((-43 * r - 85 * g + 128 * b + 128) >> 8) + 128
}

#[inline]
fn rgb_to_v(r: i32, g: i32, b: i32) -> i32 {
    ((128 * r - 107 * g - 21 * b + 128) >> 8) + 128
}

/// Convert a decoded RGBA raster to planar I420.
///
/// Chroma is averaged over each 2x2 block; blocks clipped by an odd edge
/// average only the pixels they actually cover.
pub fn rgba_to_i420(raster: &RgbaRaster) -> Result<I420Buffer> {
    let resolution = raster.resolution();
    let mut dst = I420Buffer::new(resolution)?;
    let width = resolution.width;
    let height = resolution.height;

    for y in 0..height {
        let dst_row = y as usize * dst.y_stride;
        for x in 0..width {
            let [r, g, b, _] = raster.pixel(x, y);
            dst.y[dst_row + x as usize] = rgb_to_y(r as i32, g as i32, b as i32);
        }
    }

    for cy in 0..resolution.chroma_height() {
        let dst_row = cy as usize * dst.chroma_stride;
        for cx in 0..resolution.chroma_width() {
            let mut u_sum = 0i32;
            let mut v_sum = 0i32;
            let mut count = 0i32;
            for dy in 0..2u32 {
                for dx in 0..2u32 {
                    let (px, py) = (cx * 2 + dx, cy * 2 + dy);
                    if px < width && py < height {
                        let [r, g, b, _] = raster.pixel(px, py);
                        u_sum += rgb_to_u(r as i32, g as i32, b as i32);
                        v_sum += rgb_to_v(r as i32, g as i32, b as i32);
                        count += 1;
                    }
                }
            }
            dst.u[dst_row + cx as usize] = (u_sum / count).clamp(0, 255) as u8;
            dst.v[dst_row + cx as usize] = (v_sum / count).clamp(0, 255) as u8;
        }
    }
    Ok(dst)
}

/// Produce the planar buffer for an outbound frame from either source kind
pub fn to_planar_yuv(frame: &RawFrame, decoded: Option<&RgbaRaster>) -> Result<I420Buffer> {
    match frame.format {
        PixelFormat::Yuv420SemiPlanar => semi_planar_to_i420(frame),
        PixelFormat::Rgba8888 => match decoded {
            Some(raster) => rgba_to_i420(raster),
            None => Err(AppError::VideoError(
                "RGBA planar conversion requires the decoded raster".into(),
            )),
        },
    }
}

/// Converter for the preview path: NV21 repack, JPEG round trip, decode to
/// RGBA, rotation. The JPEG detour is the cheapest route to a decoded
/// raster the inference engine accepts.
pub struct PreviewConverter {
    compressor: Compressor,
    decompressor: Decompressor,
}

/// JPEG quality for the preview round trip
const PREVIEW_JPEG_QUALITY: i32 = 90;

impl PreviewConverter {
    pub fn new() -> Result<Self> {
        let mut compressor = Compressor::new()
            .map_err(|e| AppError::VideoError(format!("failed to create JPEG compressor: {}", e)))?;
        compressor
            .set_quality(PREVIEW_JPEG_QUALITY)
            .map_err(|e| AppError::VideoError(format!("failed to set JPEG quality: {}", e)))?;
        let decompressor = Decompressor::new()
            .map_err(|e| AppError::VideoError(format!("failed to create JPEG decompressor: {}", e)))?;
        Ok(Self {
            compressor,
            decompressor,
        })
    }

    /// Convert a captured frame into the decoded RGBA preview raster.
    ///
    /// Semi-planar input goes through NV21 repack and the JPEG round trip;
    /// packed RGBA input is row-copied directly. Sensor rotation is applied
    /// to the decoded raster last.
    pub fn to_preview(&mut self, frame: &RawFrame) -> Result<RgbaRaster> {
        let raster = match frame.format {
            PixelFormat::Yuv420SemiPlanar => {
                let nv21 = repack_nv21(frame)?;
                let jpeg = self.compress_nv21(&nv21, frame.resolution)?;
                self.decode_rgba(&jpeg, frame.resolution)?
            }
            PixelFormat::Rgba8888 => copy_rgba_rows(frame)?,
        };
        raster.rotated(frame.rotation)
    }

    /// Compress an NV21 buffer to JPEG. turbojpeg consumes planar YUV, so
    /// the interleaved chroma tail is split into U and V planes first.
    fn compress_nv21(&mut self, nv21: &[u8], resolution: Resolution) -> Result<Vec<u8>> {
        let width = resolution.width as usize;
        let height = resolution.height as usize;
        let chroma_w = resolution.chroma_width() as usize;
        let chroma_h = resolution.chroma_height() as usize;
        let y_size = width * height;
        let chroma_size = chroma_w * chroma_h;

        let mut planar = try_alloc(y_size + 2 * chroma_size)?;
        planar[..y_size].copy_from_slice(&nv21[..y_size]);
        let (u_dst, v_dst) = planar[y_size..].split_at_mut(chroma_size);
        for (i, pair) in nv21[y_size..].chunks_exact(2).enumerate() {
            v_dst[i] = pair[0];
            u_dst[i] = pair[1];
        }

        let yuv = YuvImage {
            pixels: planar.as_slice(),
            width,
            align: 1,
            height,
            subsamp: Subsamp::Sub2x2,
        };
        self.compressor
            .compress_yuv_to_vec(yuv)
            .map_err(|e| AppError::VideoError(format!("JPEG compression failed: {}", e)))
    }

    fn decode_rgba(&mut self, jpeg: &[u8], expected: Resolution) -> Result<RgbaRaster> {
        let header = self
            .decompressor
            .read_header(jpeg)
            .map_err(|e| AppError::VideoError(format!("JPEG header read failed: {}", e)))?;
        if header.width as u32 != expected.width || header.height as u32 != expected.height {
            return Err(AppError::VideoError(format!(
                "JPEG size mismatch: {}x{} (expected {})",
                header.width, header.height, expected
            )));
        }

        let pitch = header.width * 4;
        let mut image = Image {
            pixels: try_alloc(header.height * pitch)?,
            width: header.width,
            pitch,
            height: header.height,
            format: TJPixelFormat::RGBA,
        };
        self.decompressor
            .decompress(jpeg, image.as_deref_mut())
            .map_err(|e| AppError::VideoError(format!("JPEG decode failed: {}", e)))?;

        RgbaRaster::from_vec(image.pixels, expected.width, expected.height)
    }
}

/// Row-copy a packed RGBA frame into a tight raster. Any pixel stride other
/// than 4 means the plane is not what it claims to be; fail instead of
/// misreading memory.
fn copy_rgba_rows(frame: &RawFrame) -> Result<RgbaRaster> {
    let plane = frame.plane(0);
    if plane.pixel_stride() != 4 {
        return Err(AppError::VideoError(format!(
            "RGBA plane has unsupported pixel stride {}",
            plane.pixel_stride()
        )));
    }
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let row_len = width * 4;
    if plane.len() < (height - 1) * plane.row_stride() + row_len {
        return Err(AppError::VideoError("RGBA plane buffer truncated".into()));
    }

    let mut data = try_alloc(row_len * height)?;
    for row in 0..height {
        data[row * row_len..(row + 1) * row_len].copy_from_slice(plane.row(row, row_len));
    }
    RgbaRaster::from_vec(data, frame.width(), frame.height())
}
