//! Service configuration module.
//!
//! Handles loading and validating the service's `config.toml`. Every key is
//! optional; a missing file means stock defaults, which run a working server
//! with storage unconfigured (every image request answers 503 until
//! `[storage] root` is set).
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [server]
//! bind = "0.0.0.0:8080"
//!
//! [storage]
//! # root = "/srv/originals"   # Directory holding original images
//!
//! [metadata]
//! # root = "/srv/metadata"    # Directory holding <image_id>.json ML documents
//!
//! [cache]
//! max_entries = 512           # 0 disables the result cache
//! ttl_secs = 3600             # 0 keeps entries until evicted by capacity
//!
//! [blur_policy]
//! version = 1
//! public_default = "face"     # none | eyes | face | full
//! private_default = "none"
//! respect_ml_suggestion = true
//! disabled = false
//!
//! [watermark]
//! brand_text = "IMS"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::policy::BlurPolicyConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Longest brand string the watermark engine will lay out.
pub const MAX_BRAND_TEXT_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. Config files need only specify the
/// values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
    pub cache: CacheConfig,
    pub blur_policy: BlurPolicyConfig,
    pub watermark: WatermarkConfig,
}

impl ServiceConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "server.bind must be a socket address, got {:?}",
                self.server.bind
            )));
        }
        let brand = self.watermark.brand_text.trim();
        if brand.is_empty() {
            return Err(ConfigError::Validation(
                "watermark.brand_text must not be empty".into(),
            ));
        }
        if brand.chars().count() > MAX_BRAND_TEXT_LEN {
            return Err(ConfigError::Validation(format!(
                "watermark.brand_text must be at most {MAX_BRAND_TEXT_LEN} characters"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Where originals live. No root means storage is not configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

/// Where ML metadata documents live. No root means no metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum rendered variants kept in memory. `0` disables caching.
    pub max_entries: usize,
    /// Entry lifetime in seconds. `0` means no expiry.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 512,
            ttl_secs: 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkConfig {
    /// Text drawn for `watermark=brand`, and for `user` marks without a slug.
    pub brand_text: String,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            brand_text: "IMS".to_string(),
        }
    }
}

// =============================================================================
// Config loading and validation
// =============================================================================

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, or stock defaults when no path is given.
///
/// An explicitly named file that does not exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    match path {
        Some(path) => parse_config(&fs::read_to_string(path)?),
        None => {
            let config = ServiceConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# IMS Configuration
# =================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# HTTP server
# ---------------------------------------------------------------------------
[server]
# Address the server listens on.
bind = "0.0.0.0:8080"

# ---------------------------------------------------------------------------
# Original image storage
# ---------------------------------------------------------------------------
[storage]
# Directory holding original images. Image ids map to files in this
# directory, either by exact name or by name plus .jpg/.jpeg/.png/.webp.
# Without a root every image request answers 503 storage_unavailable.
# root = "/srv/originals"

# ---------------------------------------------------------------------------
# ML metadata (faces, bodies, saliency)
# ---------------------------------------------------------------------------
[metadata]
# Directory holding one <image_id>.json document per image. Without a
# root, crops fall back to center and region blurs do nothing.
# root = "/srv/metadata"

# ---------------------------------------------------------------------------
# Result cache
# ---------------------------------------------------------------------------
[cache]
# Maximum number of rendered variants kept in memory. 0 disables caching.
max_entries = 512
# Seconds before an entry is considered stale. 0 disables expiry.
ttl_secs = 3600

# ---------------------------------------------------------------------------
# Privacy blur policy
# ---------------------------------------------------------------------------
# Applies when a request sets `context` but does not force a `blur` mode.
# Modes: "none", "eyes", "face", "full".
[blur_policy]
# Revision tag reported by GET /admin/blur-policy.
version = 1
# Default for context=public.
public_default = "face"
# Default for context=private.
private_default = "none"
# When true, public images are only blurred if the detector suggested it.
respect_ml_suggestion = true
# Kill switch: no blur at all, even when a request forces one.
disabled = false

# ---------------------------------------------------------------------------
# Watermark
# ---------------------------------------------------------------------------
[watermark]
# Text drawn for watermark=brand (and watermark=user without a slug).
# Letters, digits and @ . - _ render; anything else draws as a blank.
brand_text = "IMS"
"##
}
