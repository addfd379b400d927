//! ML region metadata.
//!
//! Detection itself happens elsewhere; this module only models the structured
//! document the detector publishes for each image and the collaborator that
//! serves it. Coordinates are normalized to the *original* image (`0.0..=1.0`
//! on both axes), so the same document stays valid for every derived variant.
//!
//! ```json
//! {
//!   "faces":    [{"x": 0.1, "y": 0.1, "w": 0.2, "h": 0.2, "confidence": 0.9,
//!                 "eyes": [{"x": 0.13, "y": 0.15, "w": 0.05, "h": 0.02}]}],
//!   "bodies":   [],
//!   "interest": [],
//!   "explicit": [],
//!   "saliency": [{"centerX": 0.5, "centerY": 0.4}],
//!   "suggestedBlur": false
//! }
//! ```
//!
//! Saliency points are ordered by relevance; the first one is the primary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Confidence assumed for regions the detector published without one.
pub const DEFAULT_CONFIDENCE: f32 = 1.0;

/// A normalized bounding box describing a semantic area of the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Eye sub-boxes, only published for faces.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub eyes: Vec<Region>,
}

impl Region {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            confidence: None,
            eyes: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_eyes(mut self, eyes: Vec<Region>) -> Self {
        self.eyes = eyes;
        self
    }

    /// Effective confidence: absent means fully trusted.
    pub fn confidence(&self) -> f32 {
        self.confidence.unwrap_or(DEFAULT_CONFIDENCE)
    }

    /// Finite coordinates and a positive area.
    pub fn is_usable(&self) -> bool {
        [self.x, self.y, self.w, self.h]
            .iter()
            .all(|v| v.is_finite())
            && self.w > 0.0
            && self.h > 0.0
    }
}

/// A visually important point, normalized to the original image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaliencyPoint {
    pub center_x: f32,
    pub center_y: f32,
}

/// Semantic region groups published by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Face,
    Body,
    Interest,
    Explicit,
}

/// The per-image document produced by the detection pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageMetadata {
    pub faces: Vec<Region>,
    pub bodies: Vec<Region>,
    pub interest: Vec<Region>,
    pub explicit: Vec<Region>,
    pub saliency: Vec<SaliencyPoint>,
    /// The detector's own opinion on whether the image warrants a privacy blur.
    pub suggested_blur: bool,
}

impl ImageMetadata {
    pub fn regions(&self, kind: RegionKind) -> &[Region] {
        match kind {
            RegionKind::Face => &self.faces,
            RegionKind::Body => &self.bodies,
            RegionKind::Interest => &self.interest,
            RegionKind::Explicit => &self.explicit,
        }
    }

    /// The most relevant saliency point, if any.
    pub fn primary_saliency(&self) -> Option<SaliencyPoint> {
        self.saliency
            .iter()
            .copied()
            .find(|p| p.center_x.is_finite() && p.center_y.is_finite())
    }
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed metadata document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read-only source of per-image ML metadata.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch the document for `image_id`. `Ok(None)` means the detector has
    /// not published anything for this image.
    async fn fetch(&self, image_id: &str) -> Result<Option<ImageMetadata>, MetadataError>;
}

/// Provider reading `<root>/<image_id>.json`.
pub struct FsMetadataProvider {
    root: PathBuf,
}

impl FsMetadataProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MetadataProvider for FsMetadataProvider {
    async fn fetch(&self, image_id: &str) -> Result<Option<ImageMetadata>, MetadataError> {
        if !crate::storage::is_safe_key(image_id) {
            return Ok(None);
        }
        let path = self.root.join(format!("{image_id}.json"));
        let content = match tokio::fs::read(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(image_id, "no metadata document");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&content)?))
    }
}

/// Provider used when no metadata source is configured.
pub struct NoMetadata;

#[async_trait]
impl MetadataProvider for NoMetadata {
    async fn fetch(&self, _image_id: &str) -> Result<Option<ImageMetadata>, MetadataError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_detector_document() {
        let doc = r#"{
            "faces": [{"x": 0.1, "y": 0.2, "w": 0.3, "h": 0.4, "confidence": 0.8,
                       "eyes": [{"x": 0.15, "y": 0.25, "w": 0.05, "h": 0.02}]}],
            "saliency": [{"centerX": 0.5, "centerY": 0.25}],
            "suggestedBlur": true
        }"#;
        let meta: ImageMetadata = serde_json::from_str(doc).unwrap();
        assert_eq!(meta.faces.len(), 1);
        assert_eq!(meta.faces[0].confidence(), 0.8);
        assert_eq!(meta.faces[0].eyes.len(), 1);
        assert!(meta.bodies.is_empty());
        assert!(meta.suggested_blur);
        assert_eq!(
            meta.primary_saliency(),
            Some(SaliencyPoint {
                center_x: 0.5,
                center_y: 0.25
            })
        );
    }

    #[test]
    fn missing_confidence_is_fully_trusted() {
        assert_eq!(Region::new(0.0, 0.0, 0.5, 0.5).confidence(), 1.0);
    }

    #[test]
    fn degenerate_regions_are_not_usable() {
        assert!(Region::new(0.1, 0.1, 0.2, 0.2).is_usable());
        assert!(!Region::new(0.1, 0.1, 0.0, 0.2).is_usable());
        assert!(!Region::new(f32::NAN, 0.1, 0.2, 0.2).is_usable());
    }

    #[test]
    fn regions_by_kind() {
        let meta = ImageMetadata {
            bodies: vec![Region::new(0.0, 0.0, 1.0, 1.0)],
            ..Default::default()
        };
        assert_eq!(meta.regions(RegionKind::Body).len(), 1);
        assert!(meta.regions(RegionKind::Face).is_empty());
    }

    #[tokio::test]
    async fn fs_provider_reads_json_by_image_id() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("cat.json"),
            r#"{"faces":[{"x":0.1,"y":0.1,"w":0.2,"h":0.2}]}"#,
        )
        .unwrap();
        let provider = FsMetadataProvider::new(tmp.path());

        let meta = provider.fetch("cat").await.unwrap().unwrap();
        assert_eq!(meta.faces.len(), 1);
        assert!(provider.fetch("dog").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fs_provider_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        let provider = FsMetadataProvider::new(tmp.path());
        assert!(provider.fetch("../etc/passwd").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fs_provider_surfaces_malformed_documents() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("bad.json"), "not json").unwrap();
        let provider = FsMetadataProvider::new(tmp.path());
        assert!(matches!(
            provider.fetch("bad").await,
            Err(MetadataError::Json(_))
        ));
    }
}
