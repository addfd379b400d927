//! Request handler: the boundary between the wire contract and the core.
//!
//! One call to [`Services::handle`] serves one `GET /i/{image_id}`:
//!
//! ```text
//! storage configured? → parse → cache lookup → fetch original
//!     → (metadata, only if needed) → resolve blur → pipeline → cache fill
//! ```
//!
//! The handler is transport-agnostic: it returns a [`Rendered`] value or a
//! [`HandlerError`] carrying the stable error code and HTTP status, and
//! [`crate::server`] turns those into responses.
//!
//! ML metadata is fetched lazily. A request that neither crops, watermarks,
//! nor ends up needing region data for its blur never touches the metadata
//! provider.

use crate::cache::{CacheEntry, ResultCache, cache_key};
use crate::config::ServiceConfig;
use crate::imaging::{ImageBackend, RustBackend};
use crate::metadata::{FsMetadataProvider, ImageMetadata, MetadataProvider, NoMetadata};
use crate::pipeline::{self, RunOptions};
use crate::policy::{self, BlurPolicy, BlurPolicyConfig};
use crate::storage::{FsStorage, Storage, StorageError};
use crate::transform::{self, BlurMode, Context, ParseError, TransformSpec};
use axum::http::StatusCode;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Storage backend is not configured")]
    StorageUnavailable,
    #[error("{0}")]
    InvalidSpec(#[from] ParseError),
    #[error("No stored image for {0:?}")]
    ImageNotFound(String),
    #[error("Failed to fetch original: {0}")]
    UpstreamFetchFailed(String),
    #[error("{0}")]
    ProcessingFailed(String),
}

impl HandlerError {
    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::StorageUnavailable => "storage_unavailable",
            HandlerError::InvalidSpec(e) => e.code(),
            HandlerError::ImageNotFound(_) => "image_not_found",
            HandlerError::UpstreamFetchFailed(_) => "upstream_fetch_failed",
            HandlerError::ProcessingFailed(_) => "processing_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            HandlerError::InvalidSpec(_) => StatusCode::BAD_REQUEST,
            HandlerError::ImageNotFound(_) => StatusCode::NOT_FOUND,
            HandlerError::UpstreamFetchFailed(_) => StatusCode::BAD_GATEWAY,
            HandlerError::ProcessingFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for HandlerError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotConfigured => HandlerError::StorageUnavailable,
            StorageError::NotFound(id) => HandlerError::ImageNotFound(id),
            StorageError::Io(e) => HandlerError::UpstreamFetchFailed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }
}

/// A successful response body plus the headers derived from it.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub bytes: Bytes,
    pub content_type: String,
    pub etag: String,
    pub cache: CacheStatus,
}

impl Rendered {
    fn from_entry(entry: &CacheEntry, cache: CacheStatus) -> Self {
        Self {
            bytes: entry.bytes.clone(),
            content_type: entry.content_type.clone(),
            etag: entry.etag.clone(),
            cache,
        }
    }
}

/// How the blur mode for a request gets decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlurPlan {
    /// Settled without metadata.
    Fixed(BlurMode),
    /// Depends on the metadata (ML suggestion or region data).
    Resolve(Context),
}

/// Everything a request needs, shared across the server.
pub struct Services {
    pub storage: Arc<dyn Storage>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub backend: Arc<dyn ImageBackend>,
    pub cache: ResultCache,
    pub policy: BlurPolicy,
    pub brand_text: String,
}

impl Services {
    pub fn from_config(config: &ServiceConfig) -> Self {
        let metadata: Arc<dyn MetadataProvider> = match &config.metadata.root {
            Some(root) => Arc::new(FsMetadataProvider::new(root)),
            None => Arc::new(NoMetadata),
        };
        Self {
            storage: Arc::new(FsStorage::new(config.storage.root.clone())),
            metadata,
            backend: Arc::new(RustBackend::new()),
            cache: ResultCache::new(config.cache.max_entries, config.cache.ttl()),
            policy: BlurPolicy::new(config.blur_policy.clone()),
            brand_text: config.watermark.brand_text.trim().to_string(),
        }
    }

    /// Swap the blur policy and drop every cached variant rendered under the
    /// old one.
    pub fn set_policy(&self, config: BlurPolicyConfig) {
        self.policy.set(config);
        let dropped = self.cache.len();
        self.cache.clear();
        info!(dropped, "result cache cleared after policy swap");
    }

    /// Serve one transform request.
    pub async fn handle(
        &self,
        image_id: &str,
        params: &HashMap<String, String>,
    ) -> Result<Rendered, HandlerError> {
        if !self.storage.is_configured() {
            return Err(HandlerError::StorageUnavailable);
        }
        let spec = transform::parse(Some(params)).inspect_err(|e| {
            debug!(image_id, code = e.code(), "rejected transform: {e}");
        })?;

        let key = cache_key(image_id, params);
        if let Some(entry) = self.cache.get(&key) {
            debug!(%key, "cache hit");
            return Ok(Rendered::from_entry(&entry, CacheStatus::Hit));
        }

        let original = self.storage.fetch(image_id).await.map_err(|e| {
            if matches!(e, StorageError::Io(_)) {
                warn!(image_id, "storage read failed: {e}");
            }
            HandlerError::from(e)
        })?;

        let policy = self.policy.snapshot();
        let plan = blur_plan(&policy, &spec);
        let metadata = if needs_metadata(&spec, plan) {
            self.load_metadata(image_id).await
        } else {
            None
        };
        let blur = finish_plan(plan, &policy, &spec, metadata.as_ref());
        debug!(image_id, %blur, has_metadata = metadata.is_some(), "running pipeline");

        let rendered = self.render(original.bytes, spec, metadata, blur).await?;
        let entry = CacheEntry::new(rendered.bytes, rendered.content_type);
        let response = Rendered::from_entry(&entry, CacheStatus::Miss);
        self.cache.set(key, entry);
        Ok(response)
    }

    async fn load_metadata(&self, image_id: &str) -> Option<ImageMetadata> {
        match self.metadata.fetch(image_id).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(image_id, "metadata unavailable, continuing without: {e}");
                None
            }
        }
    }

    /// Run the pipeline on the blocking pool.
    async fn render(
        &self,
        original: Bytes,
        spec: TransformSpec,
        metadata: Option<ImageMetadata>,
        blur: BlurMode,
    ) -> Result<pipeline::Rendered, HandlerError> {
        let backend = Arc::clone(&self.backend);
        let brand_text = self.brand_text.clone();
        let result = tokio::task::spawn_blocking(move || {
            let options = RunOptions {
                metadata: metadata.as_ref(),
                blur,
                watermark: spec.active_watermark(),
                slug: spec.slug.as_deref(),
                brand_text: &brand_text,
            };
            pipeline::run(backend.as_ref(), &original, &spec, options)
        })
        .await;

        match result {
            Ok(Ok(rendered)) => Ok(rendered),
            Ok(Err(e)) => {
                error!("pipeline failed: {e}");
                Err(HandlerError::ProcessingFailed(e.to_string()))
            }
            Err(join) => {
                error!("pipeline task aborted: {join}");
                Err(HandlerError::ProcessingFailed(
                    "image processing aborted".to_string(),
                ))
            }
        }
    }
}

/// Decide whether blur needs the policy, and for which context.
///
/// Without a context and without a forced mode there is nothing to resolve;
/// a forced mode without a context resolves as public.
fn blur_plan(policy: &BlurPolicyConfig, spec: &TransformSpec) -> BlurPlan {
    let context = match (spec.context, spec.blur) {
        (None, None) => return BlurPlan::Fixed(BlurMode::None),
        (Some(context), _) => context,
        (None, Some(_)) => Context::Public,
    };
    let without_ml = policy::resolve(policy, context, false, spec.blur, policy.disabled);
    if policy::depends_on_ml(policy, context, spec.blur, policy.disabled) {
        BlurPlan::Resolve(context)
    } else {
        BlurPlan::Fixed(without_ml)
    }
}

fn finish_plan(
    plan: BlurPlan,
    policy: &BlurPolicyConfig,
    spec: &TransformSpec,
    metadata: Option<&ImageMetadata>,
) -> BlurMode {
    match plan {
        BlurPlan::Fixed(mode) => mode,
        BlurPlan::Resolve(context) => {
            let suggested = metadata.is_some_and(|m| m.suggested_blur);
            policy::resolve(policy, context, suggested, spec.blur, policy.disabled)
        }
    }
}

/// Blur mode for `spec` once the metadata (if any) is known.
pub fn resolve_blur(
    policy: &BlurPolicyConfig,
    spec: &TransformSpec,
    metadata: Option<&ImageMetadata>,
) -> BlurMode {
    finish_plan(blur_plan(policy, spec), policy, spec, metadata)
}

fn needs_metadata(spec: &TransformSpec, plan: BlurPlan) -> bool {
    spec.crop.is_some()
        || spec.active_watermark().is_some()
        || match plan {
            BlurPlan::Resolve(_) => true,
            BlurPlan::Fixed(mode) => mode.is_regional(),
        }
}
