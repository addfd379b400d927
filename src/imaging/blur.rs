//! Blur engine.
//!
//! Applies the resolved [`BlurMode`] to the post-crop frame:
//!
//! - `none` returns the frame untouched.
//! - `full` runs a single strong Gaussian pass over the whole frame.
//! - `face` blurs every face box (confidence ≥ [`MIN_CONFIDENCE`]).
//! - `eyes` blurs the eye boxes of each qualifying face; a face without
//!   published eyes is blurred whole so nothing identifying leaks.
//!
//! Region boxes come from the metadata, so they are mapped through the
//! [`Frame`] first; boxes cropped away entirely are dropped. Each box is
//! padded by [`REGION_PADDING`] of its size so the blur covers the edges of
//! the detection. Patches are blurred in parallel with rayon and composited
//! back in metadata order.

use super::calculations::{Frame, PixelRect};
use super::crop::MIN_CONFIDENCE;
use super::params::BlurStrength;
use crate::metadata::{ImageMetadata, Region};
use crate::transform::BlurMode;
use image::RgbaImage;
use image::imageops;
use rayon::prelude::*;
use tracing::debug;

/// Fraction of a region's width/height added on every side before blurring.
pub const REGION_PADDING: f64 = 0.1;

/// Apply `mode` to `image`.
///
/// With a regional mode and no usable regions (or no metadata at all) the
/// input is returned unchanged.
pub fn apply_blur(
    image: RgbaImage,
    mode: BlurMode,
    frame: &Frame,
    metadata: Option<&ImageMetadata>,
) -> RgbaImage {
    match mode {
        BlurMode::None => image,
        BlurMode::Full => imageops::fast_blur(&image, BlurStrength::full_frame().sigma),
        BlurMode::Face | BlurMode::Eyes => {
            let boxes = blur_boxes(mode, frame, metadata);
            if boxes.is_empty() {
                debug!(%mode, "no usable regions, blur skipped");
                return image;
            }
            blur_regions(image, &boxes, BlurStrength::region())
        }
    }
}

/// Pixel boxes (frame space, padded, clipped) that `mode` should blur.
pub fn blur_boxes(
    mode: BlurMode,
    frame: &Frame,
    metadata: Option<&ImageMetadata>,
) -> Vec<PixelRect> {
    let Some(meta) = metadata else {
        return Vec::new();
    };
    let faces = meta
        .faces
        .iter()
        .filter(|r| r.is_usable() && r.confidence() >= MIN_CONFIDENCE);

    let regions: Vec<&Region> = match mode {
        BlurMode::Face => faces.collect(),
        BlurMode::Eyes => faces
            .flat_map(|face| {
                let eyes: Vec<&Region> = face.eyes.iter().filter(|e| e.is_usable()).collect();
                if eyes.is_empty() { vec![face] } else { eyes }
            })
            .collect(),
        BlurMode::None | BlurMode::Full => Vec::new(),
    };

    regions
        .into_iter()
        .filter_map(|r| frame.project_rect(r))
        .map(|rect| pad_rect(rect, REGION_PADDING, frame.width(), frame.height()))
        .collect()
}

/// Grow `rect` by `fraction` of its size on each side, clipped to the frame.
pub fn pad_rect(rect: PixelRect, fraction: f64, frame_w: u32, frame_h: u32) -> PixelRect {
    let dx = (rect.width as f64 * fraction).round() as u32;
    let dy = (rect.height as f64 * fraction).round() as u32;
    let left = rect.left.saturating_sub(dx);
    let top = rect.top.saturating_sub(dy);
    let right = (rect.right() + dx).min(frame_w);
    let bottom = (rect.bottom() + dy).min(frame_h);
    PixelRect {
        left,
        top,
        width: right.saturating_sub(left),
        height: bottom.saturating_sub(top),
    }
}

fn blur_regions(mut image: RgbaImage, boxes: &[PixelRect], strength: BlurStrength) -> RgbaImage {
    let patches: Vec<(PixelRect, RgbaImage)> = boxes
        .par_iter()
        .filter(|b| b.width > 0 && b.height > 0)
        .map(|b| {
            let patch = imageops::crop_imm(&image, b.left, b.top, b.width, b.height).to_image();
            (*b, imageops::fast_blur(&patch, strength.sigma))
        })
        .collect();

    debug!(regions = patches.len(), sigma = strength.sigma, "blurring regions");
    for (b, patch) in &patches {
        imageops::replace(&mut image, patch, b.left as i64, b.top as i64);
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::checkerboard_frame;

    fn face_meta(faces: Vec<Region>) -> ImageMetadata {
        ImageMetadata {
            faces,
            ..Default::default()
        }
    }

    // =========================================================================
    // Box selection
    // =========================================================================

    #[test]
    fn face_boxes_are_padded_projections() {
        let frame = Frame::full(1000, 1000);
        let meta = face_meta(vec![Region::new(0.4, 0.4, 0.2, 0.2)]);
        assert_eq!(
            blur_boxes(BlurMode::Face, &frame, Some(&meta)),
            vec![PixelRect {
                left: 380,
                top: 380,
                width: 240,
                height: 240
            }]
        );
    }

    #[test]
    fn low_confidence_faces_are_not_blurred() {
        let frame = Frame::full(100, 100);
        let meta = face_meta(vec![Region::new(0.4, 0.4, 0.2, 0.2).with_confidence(0.3)]);
        assert!(blur_boxes(BlurMode::Face, &frame, Some(&meta)).is_empty());
    }

    #[test]
    fn eyes_mode_prefers_eye_boxes() {
        let frame = Frame::full(1000, 1000);
        let meta = face_meta(vec![Region::new(0.2, 0.2, 0.4, 0.4).with_eyes(vec![
            Region::new(0.3, 0.3, 0.05, 0.05),
            Region::new(0.45, 0.3, 0.05, 0.05),
        ])]);
        let boxes = blur_boxes(BlurMode::Eyes, &frame, Some(&meta));
        assert_eq!(boxes.len(), 2);
        assert!(boxes.iter().all(|b| b.width == 60 && b.height == 60));
    }

    #[test]
    fn eyes_mode_falls_back_to_face_box() {
        let frame = Frame::full(1000, 1000);
        let meta = face_meta(vec![Region::new(0.4, 0.4, 0.2, 0.2)]);
        assert_eq!(
            blur_boxes(BlurMode::Eyes, &frame, Some(&meta)),
            blur_boxes(BlurMode::Face, &frame, Some(&meta))
        );
    }

    #[test]
    fn boxes_follow_the_crop() {
        let crop = PixelRect {
            left: 500,
            top: 0,
            width: 500,
            height: 1000,
        };
        let frame = Frame::cropped(crop, 1000, 1000);
        let meta = face_meta(vec![
            // cropped away
            Region::new(0.0, 0.0, 0.2, 0.2),
            // inside the crop
            Region::new(0.6, 0.1, 0.1, 0.1),
        ]);
        let boxes = blur_boxes(BlurMode::Face, &frame, Some(&meta));
        assert_eq!(
            boxes,
            vec![PixelRect {
                left: 90,
                top: 90,
                width: 120,
                height: 120
            }]
        );
    }

    #[test]
    fn padding_is_clipped_at_frame_edges() {
        let rect = PixelRect {
            left: 0,
            top: 0,
            width: 100,
            height: 100,
        };
        assert_eq!(
            pad_rect(rect, 0.1, 105, 200),
            PixelRect {
                left: 0,
                top: 0,
                width: 105,
                height: 110
            }
        );
    }

    // =========================================================================
    // Pixel effects
    // =========================================================================

    #[test]
    fn none_is_identity() {
        let img = checkerboard_frame(64, 64);
        let out = apply_blur(img.clone(), BlurMode::None, &Frame::full(64, 64), None);
        assert_eq!(out, img);
    }

    #[test]
    fn regional_blur_without_regions_is_identity() {
        let img = checkerboard_frame(64, 64);
        let meta = ImageMetadata::default();
        let out = apply_blur(img.clone(), BlurMode::Face, &Frame::full(64, 64), Some(&meta));
        assert_eq!(out, img);
        let out = apply_blur(img.clone(), BlurMode::Eyes, &Frame::full(64, 64), None);
        assert_eq!(out, img);
    }

    #[test]
    fn full_blur_changes_pixels_and_keeps_dimensions() {
        let img = checkerboard_frame(64, 48);
        let out = apply_blur(img.clone(), BlurMode::Full, &Frame::full(64, 48), None);
        assert_eq!(out.dimensions(), (64, 48));
        assert_ne!(out, img);
    }

    #[test]
    fn face_blur_only_touches_the_face_box() {
        let img = checkerboard_frame(100, 100);
        let meta = face_meta(vec![Region::new(0.5, 0.5, 0.3, 0.3)]);
        let out = apply_blur(img.clone(), BlurMode::Face, &Frame::full(100, 100), Some(&meta));

        // outside the padded box: untouched
        assert_eq!(out.get_pixel(5, 5), img.get_pixel(5, 5));
        assert_eq!(out.get_pixel(20, 90), img.get_pixel(20, 90));
        // inside: smoothed
        let inside_changed = (50..80).any(|x| out.get_pixel(x, 65) != img.get_pixel(x, 65));
        assert!(inside_changed);
    }
}
