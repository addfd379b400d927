//! Watermark engine.
//!
//! Draws a short text mark (the brand string, or `@slug` for user marks)
//! into one corner of the frame, on a translucent backing plate so it reads
//! on any background.
//!
//! Placement avoids the most important part of the picture: each of the four
//! corners is scored by squared distance from the overlay's center to the
//! primary saliency point, and the farthest corner wins. Corners are scored
//! in the order top-left, top-right, bottom-left, bottom-right; ties keep the
//! earlier corner. Without a saliency point the mark goes bottom-right.
//!
//! Text is rendered with the [`glyphs`](super::glyphs) bitmap font, scaled
//! with the frame. A mark that does not fit (tiny thumbnails) is skipped.

use super::glyphs::{self, GLYPH_SPACING, GLYPH_WIDTH};
use crate::transform::WatermarkKind;
use image::{Pixel, Rgba, RgbaImage};
use tracing::debug;

/// Gap between the overlay and the frame edge, before scaling.
pub const EDGE_PADDING: u32 = 12;
/// Gap between the text and the plate edge, before scaling.
const PLATE_PADDING: u32 = 2;
const PLATE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 115]);
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];
}

/// Overlay geometry for a frame of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Pixel size of one font cell.
    pub scale: u32,
    pub overlay: (u32, u32),
    pub margin: u32,
}

/// Font scale for a frame: one font pixel per 250 px of the short side.
pub fn text_scale(frame_w: u32, frame_h: u32) -> u32 {
    (frame_w.min(frame_h) / 250).max(1)
}

/// Compute the overlay layout, or `None` when it would not fit.
pub fn layout(text: &str, frame_w: u32, frame_h: u32) -> Option<Layout> {
    let (tw, th) = glyphs::text_extent(text);
    if tw == 0 {
        return None;
    }
    let scale = text_scale(frame_w, frame_h);
    let overlay = (
        (tw + 2 * PLATE_PADDING) * scale,
        (th + 2 * PLATE_PADDING) * scale,
    );
    let margin = EDGE_PADDING * scale;
    if overlay.0 + 2 * margin > frame_w || overlay.1 + 2 * margin > frame_h {
        return None;
    }
    Some(Layout {
        scale,
        overlay,
        margin,
    })
}

/// Top-left pixel of the overlay when placed in `corner`.
pub fn corner_origin(corner: Corner, frame: (u32, u32), overlay: (u32, u32), margin: u32) -> (u32, u32) {
    let right = frame.0 - margin - overlay.0;
    let bottom = frame.1 - margin - overlay.1;
    match corner {
        Corner::TopLeft => (margin, margin),
        Corner::TopRight => (right, margin),
        Corner::BottomLeft => (margin, bottom),
        Corner::BottomRight => (right, bottom),
    }
}

/// Pick the corner farthest from `saliency` (frame-normalized).
pub fn choose_corner(
    frame: (u32, u32),
    overlay: (u32, u32),
    margin: u32,
    saliency: Option<(f64, f64)>,
) -> Corner {
    let Some((sx, sy)) = saliency else {
        return Corner::BottomRight;
    };
    let target = (sx * frame.0 as f64, sy * frame.1 as f64);

    let mut best = Corner::TopLeft;
    let mut best_distance = f64::NEG_INFINITY;
    for corner in Corner::ALL {
        let (x, y) = corner_origin(corner, frame, overlay, margin);
        let cx = x as f64 + overlay.0 as f64 / 2.0;
        let cy = y as f64 + overlay.1 as f64 / 2.0;
        let distance = (cx - target.0).powi(2) + (cy - target.1).powi(2);
        if distance > best_distance {
            best = corner;
            best_distance = distance;
        }
    }
    best
}

/// Text drawn for `kind`, or `None` when nothing should be drawn.
pub fn watermark_text(kind: WatermarkKind, user_slug: Option<&str>, brand_text: &str) -> Option<String> {
    let text = match (kind, user_slug) {
        (WatermarkKind::None, _) => return None,
        (WatermarkKind::User, Some(slug)) if !slug.is_empty() => format!("@{slug}"),
        (WatermarkKind::User | WatermarkKind::Brand, _) => brand_text.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Composite the watermark for `kind` onto `image`.
pub fn apply_watermark(
    mut image: RgbaImage,
    kind: WatermarkKind,
    user_slug: Option<&str>,
    brand_text: &str,
    saliency: Option<(f64, f64)>,
) -> RgbaImage {
    let Some(text) = watermark_text(kind, user_slug, brand_text) else {
        return image;
    };
    let frame = image.dimensions();
    let Some(layout) = layout(&text, frame.0, frame.1) else {
        debug!(width = frame.0, height = frame.1, "watermark does not fit, skipped");
        return image;
    };
    let corner = choose_corner(frame, layout.overlay, layout.margin, saliency);
    let origin = corner_origin(corner, frame, layout.overlay, layout.margin);
    debug!(?corner, text = %text, scale = layout.scale, "placing watermark");

    draw_plate(&mut image, origin, layout.overlay);
    draw_text(
        &mut image,
        &text,
        (
            origin.0 + PLATE_PADDING * layout.scale,
            origin.1 + PLATE_PADDING * layout.scale,
        ),
        layout.scale,
    );
    image
}

fn draw_plate(image: &mut RgbaImage, origin: (u32, u32), size: (u32, u32)) {
    for y in origin.1..origin.1 + size.1 {
        for x in origin.0..origin.0 + size.0 {
            image.get_pixel_mut(x, y).blend(&PLATE_COLOR);
        }
    }
}

fn draw_text(image: &mut RgbaImage, text: &str, origin: (u32, u32), scale: u32) {
    let advance = (GLYPH_WIDTH + GLYPH_SPACING) * scale;
    for (i, c) in text.chars().enumerate() {
        let g = glyphs::glyph(c);
        let gx = origin.0 + i as u32 * advance;
        for y in 0..glyphs::GLYPH_HEIGHT * scale {
            for x in 0..GLYPH_WIDTH * scale {
                if glyphs::is_set(&g, x / scale, y / scale) {
                    image.put_pixel(gx + x, origin.1 + y, TEXT_COLOR);
                }
            }
        }
    }
}
