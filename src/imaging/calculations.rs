//! Pure geometry for the transform pipeline.
//!
//! All functions here are pure and testable without any I/O or images. This
//! is the only place where pixel geometry is clamped: user-supplied values are
//! validated (never clamped) in [`crate::transform`], but boxes derived from
//! ML metadata or aspect-ratio math are forced inside the image here.

use crate::metadata::{Region, SaliencyPoint};
use crate::transform::FitMode;

/// An axis-aligned box in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn right(&self) -> u32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }

    /// True when the box lies entirely within a `width x height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }
}

/// Convert a normalized region into a pixel box clamped to the image.
///
/// The origin is clamped first, then the size is trimmed so the box never
/// extends past the right or bottom edge. Width and height are at least 1.
pub fn normalized_to_pixels(region: &Region, image_w: u32, image_h: u32) -> PixelRect {
    let left = scale_clamped(region.x, image_w).min(image_w.saturating_sub(1));
    let top = scale_clamped(region.y, image_h).min(image_h.saturating_sub(1));
    let width = scale_clamped(region.w, image_w).clamp(1, (image_w - left).max(1));
    let height = scale_clamped(region.h, image_h).clamp(1, (image_h - top).max(1));
    PixelRect {
        left,
        top,
        width,
        height,
    }
}

fn scale_clamped(normalized: f32, extent: u32) -> u32 {
    if !normalized.is_finite() {
        return 0;
    }
    (normalized.max(0.0) as f64 * extent as f64).round().min(extent as f64) as u32
}

/// Largest box with the target aspect ratio that fits inside the source.
///
/// Returns `None` when any input dimension is zero (no aspect to honor).
///
/// ```text
/// source 1000x800, target 300x300 → 800x800
/// source 1000x800, target 400x100 → 1000x250
/// ```
pub fn inscribed_aspect_box(source: (u32, u32), target: (u32, u32)) -> Option<(u32, u32)> {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;
    if src_w == 0 || src_h == 0 || tgt_w == 0 || tgt_h == 0 {
        return None;
    }

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    let (w, h) = if src_aspect > tgt_aspect {
        // Source is wider: full height, trimmed width
        let w = (src_h as f64 * tgt_aspect).round() as u32;
        (w, src_h)
    } else {
        // Source is taller (or equal): full width, trimmed height
        let h = (src_w as f64 / tgt_aspect).round() as u32;
        (src_w, h)
    };
    Some((w.clamp(1, src_w), h.clamp(1, src_h)))
}

/// Center a `size` box on `center` and slide it so it stays inside the image.
pub fn place_box_around(center: (f64, f64), size: (u32, u32), image: (u32, u32)) -> PixelRect {
    let (w, h) = (size.0.min(image.0), size.1.min(image.1));
    let max_left = (image.0 - w) as f64;
    let max_top = (image.1 - h) as f64;
    let left = (center.0 - w as f64 / 2.0).round().clamp(0.0, max_left) as u32;
    let top = (center.1 - h as f64 / 2.0).round().clamp(0.0, max_top) as u32;
    PixelRect {
        left,
        top,
        width: w,
        height: h,
    }
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        let h = tgt_h;
        let w = ((h as f64 * src_aspect).round() as u32).max(tgt_w);
        (w, h)
    } else {
        let w = tgt_w;
        let h = ((w as f64 / src_aspect).round() as u32).max(tgt_h);
        (w, h)
    }
}

/// What the resize step should do to the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Plain scale to exactly these dimensions.
    Scale { width: u32, height: u32 },
    /// Scale to `fill`, then center-trim to `crop`.
    Cover { fill: (u32, u32), crop: (u32, u32) },
    /// Scale to `scaled`, then letterbox onto a `canvas`-sized background.
    Contain {
        scaled: (u32, u32),
        canvas: (u32, u32),
    },
}

impl ResizePlan {
    /// Dimensions of the frame after the plan runs.
    pub fn output_dimensions(&self) -> (u32, u32) {
        match *self {
            ResizePlan::Scale { width, height } => (width, height),
            ResizePlan::Cover { crop, .. } => crop,
            ResizePlan::Contain { canvas, .. } => canvas,
        }
    }
}

/// Decide how to resize `current` toward the requested box.
///
/// Never upscales: returns `None` whenever the plan would not make the frame
/// strictly smaller in the fit direction. With only one dimension requested,
/// every fit mode behaves like [`FitMode::Inside`].
pub fn plan_resize(
    current: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
    fit: FitMode,
) -> Option<ResizePlan> {
    let (cur_w, cur_h) = current;
    if cur_w == 0 || cur_h == 0 {
        return None;
    }

    let (Some(box_w), Some(box_h)) = (width, height) else {
        return plan_inside(current, width, height);
    };

    match fit {
        FitMode::Inside => plan_inside(current, width, height),
        FitMode::Contain => {
            let ResizePlan::Scale {
                width: sw,
                height: sh,
            } = plan_inside(current, width, height)?
            else {
                return None;
            };
            if box_w <= cur_w && box_h <= cur_h && (sw, sh) != (box_w, box_h) {
                Some(ResizePlan::Contain {
                    scaled: (sw, sh),
                    canvas: (box_w, box_h),
                })
            } else {
                Some(ResizePlan::Scale {
                    width: sw,
                    height: sh,
                })
            }
        }
        FitMode::Cover => {
            if box_w > cur_w || box_h > cur_h || (box_w, box_h) == current {
                return None;
            }
            Some(ResizePlan::Cover {
                fill: calculate_fill_dimensions(current, (box_w, box_h)),
                crop: (box_w, box_h),
            })
        }
        FitMode::Fill => {
            let (w, h) = (box_w.min(cur_w), box_h.min(cur_h));
            if (w, h) == current {
                return None;
            }
            Some(ResizePlan::Scale {
                width: w,
                height: h,
            })
        }
    }
}

/// Scale to fit within the given bounds, preserving aspect ratio.
fn plan_inside(current: (u32, u32), width: Option<u32>, height: Option<u32>) -> Option<ResizePlan> {
    let (cur_w, cur_h) = current;
    let factor = [
        width.map(|w| w as f64 / cur_w as f64),
        height.map(|h| h as f64 / cur_h as f64),
    ]
    .into_iter()
    .flatten()
    .fold(f64::INFINITY, f64::min);

    if !factor.is_finite() || factor >= 1.0 {
        return None;
    }
    let w = ((cur_w as f64 * factor).round() as u32).clamp(1, cur_w);
    let h = ((cur_h as f64 * factor).round() as u32).clamp(1, cur_h);
    if (w, h) == current {
        return None;
    }
    Some(ResizePlan::Scale {
        width: w,
        height: h,
    })
}

/// The post-crop frame, expressed against the original image.
///
/// Metadata coordinates are normalized to the original; every engine that
/// runs after the crop goes through a `Frame` to map them into the pixels it
/// is actually working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Crop box within the original image.
    pub crop: PixelRect,
    pub source_width: u32,
    pub source_height: u32,
}

impl Frame {
    /// A frame covering the whole original image.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            crop: PixelRect {
                left: 0,
                top: 0,
                width,
                height,
            },
            source_width: width,
            source_height: height,
        }
    }

    pub fn cropped(crop: PixelRect, source_width: u32, source_height: u32) -> Self {
        Self {
            crop,
            source_width,
            source_height,
        }
    }

    pub fn width(&self) -> u32 {
        self.crop.width
    }

    pub fn height(&self) -> u32 {
        self.crop.height
    }

    /// Map a normalized region into frame pixels, clipped to the frame.
    ///
    /// Returns `None` for unusable regions and for regions that fall entirely
    /// outside the frame.
    pub fn project_rect(&self, region: &Region) -> Option<PixelRect> {
        if !region.is_usable() {
            return None;
        }
        let sw = self.source_width as f64;
        let sh = self.source_height as f64;
        let fx = self.crop.left as f64;
        let fy = self.crop.top as f64;
        let fw = self.crop.width as f64;
        let fh = self.crop.height as f64;

        let x0 = (region.x as f64 * sw - fx).clamp(0.0, fw).round();
        let y0 = (region.y as f64 * sh - fy).clamp(0.0, fh).round();
        let x1 = ((region.x + region.w) as f64 * sw - fx).clamp(0.0, fw).round();
        let y1 = ((region.y + region.h) as f64 * sh - fy).clamp(0.0, fh).round();

        if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
            return None;
        }
        Some(PixelRect {
            left: x0 as u32,
            top: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }

    /// Map a normalized saliency point into frame-relative normalized space.
    ///
    /// The result can fall outside `0..=1` when the point was cropped away;
    /// distance comparisons stay meaningful either way.
    pub fn project_point(&self, point: &SaliencyPoint) -> (f64, f64) {
        let px = point.center_x as f64 * self.source_width as f64 - self.crop.left as f64;
        let py = point.center_y as f64 * self.source_height as f64 - self.crop.top as f64;
        (
            px / self.crop.width.max(1) as f64,
            py / self.crop.height.max(1) as f64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // inscribed_aspect_box
    // =========================================================================

    #[test]
    fn inscribed_square_in_landscape() {
        assert_eq!(inscribed_aspect_box((1000, 800), (300, 300)), Some((800, 800)));
    }

    #[test]
    fn inscribed_wide_in_landscape() {
        assert_eq!(inscribed_aspect_box((1000, 800), (400, 100)), Some((1000, 250)));
    }

    #[test]
    fn inscribed_portrait_in_landscape() {
        // 4:5 inside 1200x800 → height-bound, 640x800
        assert_eq!(inscribed_aspect_box((1200, 800), (400, 500)), Some((640, 800)));
    }

    #[test]
    fn inscribed_degenerate_target() {
        assert_eq!(inscribed_aspect_box((1000, 800), (0, 300)), None);
    }

    // =========================================================================
    // normalized_to_pixels / place_box_around
    // =========================================================================

    #[test]
    fn normalized_region_scales_to_pixels() {
        let r = Region::new(0.1, 0.25, 0.5, 0.5);
        assert_eq!(
            normalized_to_pixels(&r, 1000, 800),
            PixelRect {
                left: 100,
                top: 200,
                width: 500,
                height: 400
            }
        );
    }

    #[test]
    fn normalized_region_overflowing_is_trimmed() {
        let r = Region::new(0.8, 0.9, 0.5, 0.5);
        let px = normalized_to_pixels(&r, 1000, 800);
        assert_eq!(px.left, 800);
        assert_eq!(px.width, 200);
        assert_eq!(px.top, 720);
        assert_eq!(px.height, 80);
        assert!(px.fits_within(1000, 800));
    }

    #[test]
    fn normalized_region_out_of_range_origin_is_clamped() {
        let r = Region::new(1.5, -0.2, 0.1, 0.1);
        let px = normalized_to_pixels(&r, 100, 100);
        assert_eq!(px.left, 99);
        assert_eq!(px.top, 0);
        assert!(px.fits_within(100, 100));
    }

    #[test]
    fn box_near_edge_slides_inside() {
        let b = place_box_around((990.0, 10.0), (200, 200), (1000, 800));
        assert_eq!(
            b,
            PixelRect {
                left: 800,
                top: 0,
                width: 200,
                height: 200
            }
        );
    }

    // =========================================================================
    // calculate_fill_dimensions
    // =========================================================================

    #[test]
    fn fill_wider_source_to_portrait_target() {
        assert_eq!(calculate_fill_dimensions((800, 600), (400, 500)), (667, 500));
    }

    #[test]
    fn fill_taller_source_to_landscape_target() {
        assert_eq!(calculate_fill_dimensions((600, 800), (500, 400)), (500, 667));
    }

    #[test]
    fn fill_same_aspect_ratio() {
        assert_eq!(calculate_fill_dimensions((800, 600), (400, 300)), (400, 300));
    }

    // =========================================================================
    // plan_resize
    // =========================================================================

    #[test]
    fn inside_scales_by_tighter_bound() {
        assert_eq!(
            plan_resize((1000, 800), Some(500), Some(500), FitMode::Inside),
            Some(ResizePlan::Scale {
                width: 500,
                height: 400
            })
        );
    }

    #[test]
    fn inside_single_dimension() {
        assert_eq!(
            plan_resize((1000, 800), None, Some(200), FitMode::Cover),
            Some(ResizePlan::Scale {
                width: 250,
                height: 200
            })
        );
    }

    #[test]
    fn never_upscales() {
        assert_eq!(
            plan_resize((300, 200), Some(600), Some(400), FitMode::Inside),
            None
        );
        assert_eq!(
            plan_resize((300, 200), Some(600), Some(400), FitMode::Cover),
            None
        );
        assert_eq!(
            plan_resize((300, 200), Some(600), Some(400), FitMode::Fill),
            None
        );
        assert_eq!(plan_resize((300, 200), None, None, FitMode::Inside), None);
    }

    #[test]
    fn cover_fills_then_trims() {
        assert_eq!(
            plan_resize((800, 600), Some(400), Some(500), FitMode::Cover),
            Some(ResizePlan::Cover {
                fill: (667, 500),
                crop: (400, 500)
            })
        );
    }

    #[test]
    fn cover_requiring_upscale_is_skipped() {
        assert_eq!(
            plan_resize((1000, 800), Some(1200), Some(300), FitMode::Cover),
            None
        );
    }

    #[test]
    fn contain_letterboxes_onto_requested_canvas() {
        assert_eq!(
            plan_resize((1000, 800), Some(500), Some(500), FitMode::Contain),
            Some(ResizePlan::Contain {
                scaled: (500, 400),
                canvas: (500, 500)
            })
        );
    }

    #[test]
    fn contain_without_room_for_canvas_behaves_like_inside() {
        assert_eq!(
            plan_resize((1000, 100), Some(500), Some(500), FitMode::Contain),
            Some(ResizePlan::Scale {
                width: 500,
                height: 50
            })
        );
    }

    #[test]
    fn fill_caps_each_dimension() {
        assert_eq!(
            plan_resize((1000, 800), Some(400), Some(900), FitMode::Fill),
            Some(ResizePlan::Scale {
                width: 400,
                height: 800
            })
        );
    }

    #[test]
    fn plan_output_never_exceeds_input() {
        for fit in [
            FitMode::Inside,
            FitMode::Contain,
            FitMode::Cover,
            FitMode::Fill,
        ] {
            for (w, h) in [(100, 100), (2000, 50), (16, 4096), (999, 801)] {
                if let Some(plan) = plan_resize((1000, 800), Some(w), Some(h), fit) {
                    let (ow, oh) = plan.output_dimensions();
                    assert!(ow <= 1000 && oh <= 800, "{fit:?} {w}x{h} → {ow}x{oh}");
                }
            }
        }
    }

    // =========================================================================
    // Frame projection
    // =========================================================================

    #[test]
    fn full_frame_projects_directly() {
        let frame = Frame::full(1000, 800);
        assert_eq!(
            frame.project_rect(&Region::new(0.1, 0.1, 0.2, 0.25)),
            Some(PixelRect {
                left: 100,
                top: 80,
                width: 200,
                height: 200
            })
        );
    }

    #[test]
    fn cropped_frame_offsets_and_clips() {
        let crop = PixelRect {
            left: 200,
            top: 0,
            width: 600,
            height: 800,
        };
        let frame = Frame::cropped(crop, 1000, 800);
        // Region spans x 100..300 in the original; only 200..300 survives
        let projected = frame.project_rect(&Region::new(0.1, 0.0, 0.2, 0.5)).unwrap();
        assert_eq!(projected.left, 0);
        assert_eq!(projected.width, 100);
        assert_eq!(projected.height, 400);
    }

    #[test]
    fn region_outside_crop_is_dropped() {
        let crop = PixelRect {
            left: 500,
            top: 0,
            width: 500,
            height: 800,
        };
        let frame = Frame::cropped(crop, 1000, 800);
        assert_eq!(frame.project_rect(&Region::new(0.0, 0.0, 0.2, 0.2)), None);
    }

    #[test]
    fn saliency_point_relative_to_crop() {
        let crop = PixelRect {
            left: 100,
            top: 100,
            width: 400,
            height: 200,
        };
        let frame = Frame::cropped(crop, 1000, 1000);
        let (x, y) = frame.project_point(&SaliencyPoint {
            center_x: 0.3,
            center_y: 0.2,
        });
        assert!((x - 0.5).abs() < 1e-6);
        assert!((y - 0.5).abs() < 1e-6);
    }
}
