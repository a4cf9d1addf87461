//! Frame ingestion and color-space conversion

pub mod annotate;
pub mod convert;
pub mod format;
pub mod frame;
pub mod raster;
pub mod raw;

pub use annotate::{FrameAnnotator, OverlayStyle, SkeletonOverlay};
pub use convert::{repack_nv21, rgba_to_i420, semi_planar_to_i420, I420Buffer, PreviewConverter};
pub use format::{PixelFormat, Resolution, Rotation};
pub use frame::PlanarFrame;
pub use raster::RgbaRaster;
pub use raw::{Plane, RawFrame};
