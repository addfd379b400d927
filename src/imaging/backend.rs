//! Codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the seam between the pipeline and the
//! codecs: decode original bytes into an RGBA frame, and encode a finished
//! frame into the requested output format.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend): pure Rust decoders
//! from the `image` crate plus libwebp for lossy WebP output.

use super::params::Quality;
use crate::transform::OutputFormat;
use image::RgbaImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Trait for codec backends.
///
/// Implementations must be `Sync`: one backend instance is shared by every
/// in-flight request.
pub trait ImageBackend: Send + Sync {
    /// Decode original bytes (any supported input format) into RGBA8.
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, BackendError>;

    /// Encode a frame into `format` at `quality`.
    fn encode(
        &self,
        image: &RgbaImage,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError>;
}
