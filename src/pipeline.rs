//! Pipeline orchestrator.
//!
//! Runs one transformation over one decoded frame, in a fixed order:
//!
//! ```text
//! decode → crop → blur → resize → watermark → encode
//! ```
//!
//! Crop comes first so every later step works against the post-crop
//! [`Frame`]: blur boxes and the saliency point are projected through it, never
//! through the original dimensions. Resize comes after the content-sensitive
//! edits so their geometry is computed at full resolution, and watermark
//! follows resize so the mark is sized for the delivered frame.
//!
//! The orchestrator is synchronous and CPU-bound; the request handler runs it
//! on the blocking pool. Any decode or encode failure aborts the whole run
//! with [`PipelineError`]; nothing is returned partially.

use crate::imaging::calculations::{Frame, PixelRect, ResizePlan, plan_resize};
use crate::imaging::{
    BackendError, ImageBackend, Quality, apply_blur, apply_watermark, compute_crop_region,
};
use crate::metadata::ImageMetadata;
use crate::transform::{BlurMode, TransformSpec, WatermarkKind};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use thiserror::Error;
use tracing::debug;

/// Letterbox color for `fit=contain`.
const CANVAS_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Processing failed: {0}")]
    Backend(#[from] BackendError),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        "processing_failed"
    }
}

/// Encoded pipeline output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Per-request pipeline inputs beyond the spec itself.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions<'a> {
    pub metadata: Option<&'a ImageMetadata>,
    pub blur: BlurMode,
    pub watermark: Option<WatermarkKind>,
    pub slug: Option<&'a str>,
    pub brand_text: &'a str,
}

/// Transform `original` according to `spec`.
pub fn run(
    backend: &dyn ImageBackend,
    original: &[u8],
    spec: &TransformSpec,
    options: RunOptions<'_>,
) -> Result<Rendered, PipelineError> {
    let image = backend.decode(original)?;
    let (image, frame) = crop_step(image, spec, options.metadata);
    let image = apply_blur(image, options.blur, &frame, options.metadata);
    let (image, content) = resize_step(image, spec);
    let image = watermark_step(image, &frame, content, options);

    let bytes = backend.encode(&image, spec.format, Quality::new(spec.quality))?;
    Ok(Rendered {
        bytes,
        content_type: spec.format.content_type(),
    })
}

/// Crop toward the requested box; without a crop mode the frame is the
/// whole image.
///
/// The crop targets the requested aspect ratio when both dimensions are
/// given, otherwise the image's own.
fn crop_step(
    image: RgbaImage,
    spec: &TransformSpec,
    metadata: Option<&ImageMetadata>,
) -> (RgbaImage, Frame) {
    let (width, height) = image.dimensions();
    let full = Frame::full(width, height);
    let Some(mode) = spec.crop else {
        return (image, full);
    };
    let target = match (spec.width, spec.height) {
        (Some(w), Some(h)) => (w, h),
        _ => (width, height),
    };
    let Some(region) = compute_crop_region(mode, width, height, target.0, target.1, metadata)
    else {
        debug!(?mode, "no computable crop, step skipped");
        return (image, full);
    };
    debug!(?mode, ?region, "cropping");
    let cropped =
        imageops::crop_imm(&image, region.left, region.top, region.width, region.height).to_image();
    (cropped, Frame::cropped(region, width, height))
}

/// Resize per the fit mode.
///
/// Returns the area of the output occupied by the frame when it was
/// letterboxed onto a larger canvas.
fn resize_step(image: RgbaImage, spec: &TransformSpec) -> (RgbaImage, Option<PixelRect>) {
    let Some(plan) = plan_resize(image.dimensions(), spec.width, spec.height, spec.fit) else {
        debug!(dimensions = ?image.dimensions(), "resize skipped (would not shrink)");
        return (image, None);
    };
    debug!(?plan, fit = ?spec.fit, "resizing");
    let resized = match plan {
        ResizePlan::Scale { width, height } => {
            imageops::resize(&image, width, height, FilterType::Lanczos3)
        }
        ResizePlan::Cover { fill, crop } => {
            let filled = imageops::resize(&image, fill.0, fill.1, FilterType::Lanczos3);
            let left = (fill.0 - crop.0) / 2;
            let top = (fill.1 - crop.1) / 2;
            imageops::crop_imm(&filled, left, top, crop.0, crop.1).to_image()
        }
        ResizePlan::Contain { scaled, canvas } => {
            let inner = imageops::resize(&image, scaled.0, scaled.1, FilterType::Lanczos3);
            let mut out = RgbaImage::from_pixel(canvas.0, canvas.1, CANVAS_COLOR);
            let x = (canvas.0 - scaled.0) / 2;
            let y = (canvas.1 - scaled.1) / 2;
            imageops::overlay(&mut out, &inner, x as i64, y as i64);
            return (
                out,
                Some(PixelRect {
                    left: x,
                    top: y,
                    width: scaled.0,
                    height: scaled.1,
                }),
            );
        }
    };
    (resized, None)
}

/// Map a frame-normalized point onto a canvas where the frame occupies
/// `content`.
fn letterbox_point(point: (f64, f64), content: &PixelRect, canvas: (u32, u32)) -> (f64, f64) {
    (
        (content.left as f64 + point.0 * content.width as f64) / canvas.0.max(1) as f64,
        (content.top as f64 + point.1 * content.height as f64) / canvas.1.max(1) as f64,
    )
}

fn watermark_step(
    image: RgbaImage,
    frame: &Frame,
    content: Option<PixelRect>,
    options: RunOptions<'_>,
) -> RgbaImage {
    let Some(kind) = options.watermark else {
        return image;
    };
    // frame-normalized coordinates survive a plain resize unchanged
    let saliency = options
        .metadata
        .and_then(ImageMetadata::primary_saliency)
        .map(|p| frame.project_point(&p))
        .map(|p| match &content {
            Some(rect) => letterbox_point(p, rect, image.dimensions()),
            None => p,
        });
    apply_watermark(image, kind, options.slug, options.brand_text, saliency)
}
