//! Image processing: pure Rust pixel work for the transform pipeline.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory` |
//! | **Crop / resize** | `imageops::crop_imm`, Lanczos3 `imageops::resize` |
//! | **Blur** | `imageops::fast_blur`, regions in parallel via rayon |
//! | **Watermark** | built-in 5×7 bitmap font, alpha-blended plate |
//! | **Encode → JPEG** | `image::codecs::jpeg::JpegEncoder` |
//! | **Encode → WebP** | `webp::Encoder` (lossy) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for geometry (unit testable)
//! - **Parameters**: Quality and blur strength knobs
//! - **Engines**: [`crop`], [`blur`], [`watermark`], each a pure function over pixels
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`] for the codecs

pub mod backend;
pub mod blur;
pub mod calculations;
pub mod crop;
mod glyphs;
mod params;
pub mod rust_backend;
pub mod watermark;

pub use backend::{BackendError, ImageBackend};
pub use blur::apply_blur;
pub use crop::{CropRegion, compute_crop_region};
pub use params::{BlurStrength, Quality};
pub use rust_backend::RustBackend;
pub use watermark::apply_watermark;
