//! Shared test utilities for the ims test suite.
//!
//! Synthetic frames and encoded originals, so tests never depend on fixture
//! files on disk.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let original = jpeg_bytes(320, 240);
//! let frame = checkerboard_frame(64, 64);
//! ```

use image::codecs::jpeg::JpegEncoder;
use image::{ImageEncoder, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

const CHECKER_CELL: u32 = 8;

/// Smooth horizontal/vertical gradient. Low detail, deterministic.
pub fn gradient_frame(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgba([r, g, 128, 255])
    })
}

/// Black/white checkerboard with 8px cells. Blurring it visibly changes pixels.
pub fn checkerboard_frame(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if ((x / CHECKER_CELL) + (y / CHECKER_CELL)) % 2 == 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 255])
        }
    })
}

/// Detailed frame: checkerboard modulated by the gradient.
fn detailed_frame(width: u32, height: u32) -> RgbaImage {
    let gradient = gradient_frame(width, height);
    let checker = checkerboard_frame(width, height);
    RgbaImage::from_fn(width, height, |x, y| {
        let g = gradient.get_pixel(x, y).0;
        let c = checker.get_pixel(x, y).0;
        Rgba([
            g[0] / 2 + c[0] / 2,
            g[1] / 2 + c[1] / 2,
            g[2] / 2 + c[2] / 2,
            255,
        ])
    })
}

/// JPEG-encoded original of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let rgb = image::DynamicImage::ImageRgba8(detailed_frame(width, height)).to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .write_image(
            rgb.as_raw(),
            width,
            height,
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
    out
}

/// PNG-encoded original of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    detailed_frame(width, height)
        .write_to(&mut cursor, ImageFormat::Png)
        .unwrap();
    cursor.into_inner()
}
