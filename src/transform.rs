//! Transform request contract.
//!
//! Turns the raw query parameters of `GET /i/{imageId}` into a canonical,
//! bounded [`TransformSpec`]. Parsing is the only place user input enters the
//! core, so it follows two rules:
//!
//! - **Reject, never clamp.** A numeric value that is present but unparsable
//!   or out of bounds fails with a [`ParseError`] carrying a stable code
//!   (`invalid_version`, `invalid_dimension`, `invalid_quality`). Silently
//!   clamping would let two different URLs produce the same bytes under
//!   different cache keys, and would change meaning across deployments if the
//!   bounds ever moved. Clamping is reserved for internally computed pixel
//!   geometry (see [`crate::imaging`]).
//! - **Enums are lenient.** Enumerated fields are matched case-insensitively
//!   against a fixed allow-list. An unrecognized value for an optional field
//!   (`crop`, `blur`, `context`, `watermark`) is treated as absent; for a
//!   required field (`fit`, `fmt`) it falls back to the default.
//!
//! ## Parameters
//!
//! | Canonical | Alias | Type | Default |
//! |---|---|---|---|
//! | `v` | `version` | integer in `[1, 1]` | `1` |
//! | `w` | `width` | integer in `[16, 4096]` | none |
//! | `h` | `height` | integer in `[16, 4096]` | none |
//! | `fit` | | `cover` `contain` `fill` `inside` | `inside` |
//! | `fmt` | `format` | `jpeg` `webp` | `jpeg` |
//! | `q` | `quality` | integer in `[1, 100]` | `85` |
//! | `crop` | | `face` `body` `interest` `explicit` `center` | none |
//! | `blur` | | `none` `eyes` `face` `full` | none |
//! | `context` | | `public` `private` | none |
//! | `watermark` | | `brand` `user` `none` | none |
//! | `slug` | | `[A-Za-z0-9_.-]{1,32}` | none |
//!
//! Empty values are treated as absent, matching how the cache key drops them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Contract version emitted by this build.
pub const CURRENT_VERSION: u32 = 1;
/// Oldest contract version still accepted.
pub const MIN_VERSION: u32 = 1;
pub const MIN_DIMENSION: u32 = 16;
pub const MAX_WIDTH: u32 = 4096;
pub const MAX_HEIGHT: u32 = 4096;
pub const MIN_QUALITY: u32 = 1;
pub const MAX_QUALITY: u32 = 100;
pub const DEFAULT_QUALITY: u32 = 85;
const MAX_SLUG_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unsupported version {value:?}: expected {min}..={max}", min = MIN_VERSION, max = CURRENT_VERSION)]
    InvalidVersion { value: String },
    #[error("invalid {field} {value:?}: expected {min}..={max}", min = MIN_DIMENSION)]
    InvalidDimension {
        field: &'static str,
        value: String,
        max: u32,
    },
    #[error("invalid quality {value:?}: expected {min}..={max}", min = MIN_QUALITY, max = MAX_QUALITY)]
    InvalidQuality { value: String },
}

impl ParseError {
    /// Stable machine-readable code for the wire contract.
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::InvalidVersion { .. } => "invalid_version",
            ParseError::InvalidDimension { .. } => "invalid_dimension",
            ParseError::InvalidQuality { .. } => "invalid_quality",
        }
    }
}

/// How a resize target box is applied to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum FitMode {
    Cover,
    Contain,
    Fill,
    #[default]
    Inside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    WebP,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::WebP => "image/webp",
        }
    }
}

/// Which semantic region (or plain geometry) drives the crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CropMode {
    Face,
    Body,
    Interest,
    Explicit,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlurMode {
    None,
    Eyes,
    Face,
    Full,
}

impl BlurMode {
    /// True for modes that need region metadata to do anything.
    pub fn is_regional(self) -> bool {
        matches!(self, BlurMode::Eyes | BlurMode::Face)
    }
}

impl fmt::Display for BlurMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlurMode::None => "none",
            BlurMode::Eyes => "eyes",
            BlurMode::Face => "face",
            BlurMode::Full => "full",
        })
    }
}

/// Viewing surface classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatermarkKind {
    Brand,
    User,
    None,
}

/// Validated, immutable description of a requested transformation.
///
/// Every field is either defined or explicitly absent; a spec built from an
/// empty query is fully usable (see [`TransformSpec::default`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransformSpec {
    pub version: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: FitMode,
    pub format: OutputFormat,
    pub quality: u32,
    pub crop: Option<CropMode>,
    pub blur: Option<BlurMode>,
    pub context: Option<Context>,
    pub watermark: Option<WatermarkKind>,
    pub slug: Option<String>,
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            width: None,
            height: None,
            fit: FitMode::default(),
            format: OutputFormat::default(),
            quality: DEFAULT_QUALITY,
            crop: None,
            blur: None,
            context: None,
            watermark: None,
            slug: None,
        }
    }
}

impl TransformSpec {
    /// Watermark that will actually be drawn (`none` collapses to absent).
    pub fn active_watermark(&self) -> Option<WatermarkKind> {
        self.watermark.filter(|k| *k != WatermarkKind::None)
    }
}

/// Parse raw query parameters into a [`TransformSpec`].
///
/// `None` behaves exactly like an empty map.
pub fn parse(raw: Option<&HashMap<String, String>>) -> Result<TransformSpec, ParseError> {
    let empty = HashMap::new();
    let raw = raw.unwrap_or(&empty);
    let get = |names: &[&str]| lookup(raw, names);

    let version = match get(&["v", "version"]) {
        None => CURRENT_VERSION,
        Some(raw_v) => raw_v
            .parse::<u32>()
            .ok()
            .filter(|v| (MIN_VERSION..=CURRENT_VERSION).contains(v))
            .ok_or_else(|| ParseError::InvalidVersion {
                value: raw_v.to_string(),
            })?,
    };

    let width = parse_dimension(get(&["w", "width"]), "width", MAX_WIDTH)?;
    let height = parse_dimension(get(&["h", "height"]), "height", MAX_HEIGHT)?;

    let quality = match get(&["q", "quality"]) {
        None => DEFAULT_QUALITY,
        Some(raw_q) => raw_q
            .parse::<u32>()
            .ok()
            .filter(|q| (MIN_QUALITY..=MAX_QUALITY).contains(q))
            .ok_or_else(|| ParseError::InvalidQuality {
                value: raw_q.to_string(),
            })?,
    };

    let fit = get(&["fit"]).and_then(parse_fit).unwrap_or_default();
    let format = get(&["fmt", "format"])
        .and_then(parse_format)
        .unwrap_or_default();

    Ok(TransformSpec {
        version,
        width,
        height,
        fit,
        format,
        quality,
        crop: get(&["crop"]).and_then(parse_crop),
        blur: get(&["blur"]).and_then(parse_blur),
        context: get(&["context"]).and_then(parse_context),
        watermark: get(&["watermark"]).and_then(parse_watermark),
        slug: get(&["slug"]).filter(|s| is_valid_slug(s)).map(str::to_string),
    })
}

/// First non-empty value among `names` (canonical name first, then aliases).
fn lookup<'a>(raw: &'a HashMap<String, String>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|n| raw.get(*n))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

fn parse_dimension(
    raw: Option<&str>,
    field: &'static str,
    max: u32,
) -> Result<Option<u32>, ParseError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    raw.parse::<u32>()
        .ok()
        .filter(|d| (MIN_DIMENSION..=max).contains(d))
        .map(Some)
        .ok_or_else(|| ParseError::InvalidDimension {
            field,
            value: raw.to_string(),
            max,
        })
}

fn parse_fit(raw: &str) -> Option<FitMode> {
    match raw.to_ascii_lowercase().as_str() {
        "cover" => Some(FitMode::Cover),
        "contain" => Some(FitMode::Contain),
        "fill" => Some(FitMode::Fill),
        "inside" => Some(FitMode::Inside),
        _ => None,
    }
}

fn parse_format(raw: &str) -> Option<OutputFormat> {
    match raw.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
        "webp" => Some(OutputFormat::WebP),
        _ => None,
    }
}

fn parse_crop(raw: &str) -> Option<CropMode> {
    match raw.to_ascii_lowercase().as_str() {
        "face" => Some(CropMode::Face),
        "body" => Some(CropMode::Body),
        "interest" => Some(CropMode::Interest),
        "explicit" => Some(CropMode::Explicit),
        "center" => Some(CropMode::Center),
        _ => None,
    }
}

fn parse_blur(raw: &str) -> Option<BlurMode> {
    match raw.to_ascii_lowercase().as_str() {
        "none" => Some(BlurMode::None),
        "eyes" => Some(BlurMode::Eyes),
        "face" => Some(BlurMode::Face),
        "full" => Some(BlurMode::Full),
        _ => None,
    }
}

fn parse_context(raw: &str) -> Option<Context> {
    match raw.to_ascii_lowercase().as_str() {
        "public" => Some(Context::Public),
        "private" => Some(Context::Private),
        _ => None,
    }
}

fn parse_watermark(raw: &str) -> Option<WatermarkKind> {
    match raw.to_ascii_lowercase().as_str() {
        "brand" => Some(WatermarkKind::Brand),
        "user" => Some(WatermarkKind::User),
        "none" => Some(WatermarkKind::None),
        _ => None,
    }
}

fn is_valid_slug(raw: &str) -> bool {
    raw.len() <= MAX_SLUG_LEN
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
