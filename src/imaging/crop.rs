//! Crop strategy engine.
//!
//! Picks the pixel box to crop from the original image, given a crop mode and
//! (optionally) the detector's region metadata:
//!
//! 1. `center`, or no metadata at all → the largest box with the target
//!    aspect ratio, centered in the image.
//! 2. A semantic mode (`face`, `body`, `interest`, `explicit`) → the most
//!    confident region of that kind with confidence ≥ [`MIN_CONFIDENCE`].
//!    Ties go to the region published first.
//! 3. No qualifying region → `interest` first tries a saliency crop (a
//!    center-crop-sized box centered on the primary saliency point); every
//!    mode then falls back to the center crop.
//!
//! Every function here is pure: identical inputs always yield an identical
//! box, and every returned box lies inside the image.

use super::calculations::{
    PixelRect, inscribed_aspect_box, normalized_to_pixels, place_box_around,
};
use crate::metadata::{ImageMetadata, Region, RegionKind};
use crate::transform::CropMode;

/// Pixel-space crop box, always contained in the source image.
pub type CropRegion = PixelRect;

/// Regions below this confidence are ignored.
pub const MIN_CONFIDENCE: f32 = 0.5;

/// Compute the crop box for `mode`, falling back to a center crop when the
/// requested kind has no usable region.
///
/// Returns `None` only when no center crop is computable either (zero-sized
/// image or target), in which case the caller skips the crop step.
pub fn compute_crop_region(
    mode: CropMode,
    image_w: u32,
    image_h: u32,
    target_w: u32,
    target_h: u32,
    metadata: Option<&ImageMetadata>,
) -> Option<CropRegion> {
    let semantic = metadata.and_then(|meta| match region_kind(mode) {
        None => None,
        Some(kind) => select_region(meta.regions(kind))
            .map(|r| normalized_to_pixels(r, image_w, image_h))
            .or_else(|| {
                (kind == RegionKind::Interest)
                    .then(|| saliency_crop(meta, image_w, image_h, target_w, target_h))
                    .flatten()
            }),
    });
    semantic.or_else(|| center_crop(image_w, image_h, target_w, target_h))
}

/// The largest target-aspect box inscribed in the image, centered.
pub fn center_crop(image_w: u32, image_h: u32, target_w: u32, target_h: u32) -> Option<CropRegion> {
    let (w, h) = inscribed_aspect_box((image_w, image_h), (target_w, target_h))?;
    Some(PixelRect {
        left: (image_w - w) / 2,
        top: (image_h - h) / 2,
        width: w,
        height: h,
    })
}

/// Most confident usable region at or above [`MIN_CONFIDENCE`].
///
/// Stable: among equal confidences the earliest region wins.
pub fn select_region(regions: &[Region]) -> Option<&Region> {
    regions
        .iter()
        .filter(|r| r.is_usable() && r.confidence() >= MIN_CONFIDENCE)
        .fold(None, |best: Option<&Region>, r| match best {
            Some(b) if b.confidence() >= r.confidence() => Some(b),
            _ => Some(r),
        })
}

/// Center-crop-sized box centered on the primary saliency point.
///
/// Only the primary point is consulted; lower-ranked points are not used as
/// fallbacks.
fn saliency_crop(
    meta: &ImageMetadata,
    image_w: u32,
    image_h: u32,
    target_w: u32,
    target_h: u32,
) -> Option<CropRegion> {
    let point = meta.primary_saliency()?;
    let (w, h) = inscribed_aspect_box((image_w, image_h), (target_w, target_h))?;
    let center = (
        point.center_x as f64 * image_w as f64,
        point.center_y as f64 * image_h as f64,
    );
    Some(place_box_around(center, (w, h), (image_w, image_h)))
}

fn region_kind(mode: CropMode) -> Option<RegionKind> {
    match mode {
        CropMode::Face => Some(RegionKind::Face),
        CropMode::Body => Some(RegionKind::Body),
        CropMode::Interest => Some(RegionKind::Interest),
        CropMode::Explicit => Some(RegionKind::Explicit),
        CropMode::Center => None,
    }
}
