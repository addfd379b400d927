//! Pure Rust codec backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP) | `image::load_from_memory` (format sniffed from magic bytes) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder::new_with_quality` |
//! | Encode → WebP | `webp::Encoder` (lossy, libwebp) |
//!
//! The `image` crate's own WebP encoder is lossless-only, so it cannot honor
//! the `q` parameter; lossy WebP goes through `webp` instead.

use super::backend::{BackendError, ImageBackend};
use super::params::Quality;
use crate::transform::OutputFormat;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageEncoder, RgbaImage};
use tracing::debug;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_jpeg(image: &RgbaImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.value())
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| BackendError::Encode(format!("JPEG encode failed: {e}")))?;
    Ok(out)
}

fn encode_webp(image: &RgbaImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let encoder = webp::Encoder::from_rgba(image.as_raw(), image.width(), image.height());
    let encoded = encoder
        .encode_simple(false, quality.value() as f32)
        .map_err(|e| BackendError::Encode(format!("WebP encode failed: {e:?}")))?;
    Ok(encoded.to_vec())
}

impl ImageBackend for RustBackend {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, BackendError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| BackendError::Decode(format!("Failed to decode original: {e}")))?;
        debug!(
            width = img.width(),
            height = img.height(),
            "decoded original"
        );
        Ok(img.to_rgba8())
    }

    fn encode(
        &self,
        image: &RgbaImage,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError> {
        let encoded = match format {
            OutputFormat::Jpeg => encode_jpeg(image, quality)?,
            OutputFormat::WebP => encode_webp(image, quality)?,
        };
        debug!(
            width = image.width(),
            height = image.height(),
            ?format,
            quality = quality.value(),
            bytes = encoded.len(),
            "encoded frame"
        );
        Ok(encoded)
    }
}
