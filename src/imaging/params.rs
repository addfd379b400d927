//! Parameter types for pixel operations.
//!
//! These describe *how strongly* to do something, not *what* to do. The
//! request contract in [`crate::transform`] decides what happens; the engines
//! in this module tree read these knobs.
//!
//! - [`Quality`]: Lossy encoding quality (1–100).
//! - [`BlurStrength`]: Gaussian sigma for the full-frame and per-region blurs.

/// Quality setting for lossy image encoding (1-100).
///
/// Request values are validated by the parser before they get here; the clamp
/// only keeps internally built values inside what the encoders accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(crate::transform::DEFAULT_QUALITY as u8)
    }
}

/// Gaussian blur strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurStrength {
    pub sigma: f32,
}

impl BlurStrength {
    /// Single strong pass over the whole frame.
    pub fn full_frame() -> Self {
        Self { sigma: 24.0 }
    }

    /// Lighter pass applied to each face or eye box.
    pub fn region() -> Self {
        Self { sigma: 10.0 }
    }
}
