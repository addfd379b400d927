//! Original-image storage collaborator.
//!
//! The service never owns originals; it reads them through [`Storage`]. The
//! filesystem implementation maps an image id to a file under a root
//! directory, trying the bare id first and then the common image extensions.

use async_trait::async_trait;
use bytes::Bytes;
use image::ImageFormat;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Extensions tried, in order, when the bare id does not exist.
const EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage is not configured")]
    NotConfigured,
    #[error("Image not found: {0}")]
    NotFound(String),
    #[error("Storage read failed: {0}")]
    Io(#[from] io::Error),
}

/// A stored original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<StoredObject, StorageError>;

    fn is_configured(&self) -> bool;
}

/// Ids are single path segments: no separators, no parent references.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && !key.contains("..")
        && !key.contains(['/', '\\', '\0'])
}

/// Filesystem storage rooted at a directory. Unconfigured without a root.
#[derive(Debug, Clone, Default)]
pub struct FsStorage {
    root: Option<PathBuf>,
}

impl FsStorage {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn candidates(root: &Path, key: &str) -> Vec<PathBuf> {
        std::iter::once(root.join(key))
            .chain(EXTENSIONS.iter().map(|ext| root.join(format!("{key}.{ext}"))))
            .collect()
    }
}

fn content_type_for(path: &Path) -> String {
    ImageFormat::from_path(path)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream")
        .to_string()
}

#[async_trait]
impl Storage for FsStorage {
    async fn fetch(&self, key: &str) -> Result<StoredObject, StorageError> {
        let root = self.root.as_ref().ok_or(StorageError::NotConfigured)?;
        if !is_safe_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        for path in Self::candidates(root, key) {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    debug!(path = %path.display(), bytes = bytes.len(), "fetched original");
                    return Ok(StoredObject {
                        bytes: Bytes::from(bytes),
                        content_type: content_type_for(&path),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                // a directory named like the id is not an image
                Err(e) if e.kind() == io::ErrorKind::IsADirectory => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::NotFound(key.to_string()))
    }

    fn is_configured(&self) -> bool {
        self.root.is_some()
    }
}
