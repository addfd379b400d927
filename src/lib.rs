//! # IMS
//!
//! An on-the-fly image manipulation service. A client asks for a derived
//! variant of a stored original with a query string; the service parses it
//! into a [`transform::TransformSpec`], runs crop, blur, resize, watermark
//! and encode, and serves the bytes with long-lived cache headers.
//!
//! # Request Flow
//!
//! ```text
//! GET /i/{id}?w=400&h=300&crop=face&fmt=webp
//!   → parse        query        →  TransformSpec   (validate, defaults)
//!   → cache        id + query   →  hit? return
//!   → storage      id           →  original bytes
//!   → policy       spec + ML    →  effective BlurMode
//!   → pipeline     bytes + spec →  encoded variant  (blocking pool)
//!   → cache        store, respond with X-Cache: miss
//! ```
//!
//! Each step is a plain function or a trait object, so unit tests exercise the
//! geometry and policy logic without touching the network or a real codec.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`transform`] | Query-parameter parser and validator producing `TransformSpec` |
//! | [`metadata`] | ML metadata types (faces, bodies, saliency) and providers |
//! | [`policy`] | Blur policy document and the precedence resolver |
//! | [`imaging`] | Pixel work: crop strategies, blur, watermark, codecs |
//! | [`pipeline`] | Fixed-order orchestration of one transform |
//! | [`cache`] | Bounded LRU result cache with TTL and hit statistics |
//! | [`storage`] | Original-image storage trait and filesystem implementation |
//! | [`handler`] | Request handling independent of HTTP framing |
//! | [`server`] | axum router, headers, error bodies, graceful shutdown |
//! | [`config`] | `config.toml` loading and validation |
//!
//! # Design Decisions
//!
//! ## Explicit Versioning, Immutable Responses
//!
//! Every variant is addressed by its full query string, including `v`. Changing
//! any output-affecting input requires a new URL, so responses can be cached by
//! browsers and CDNs for a year without revalidation.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling and JPEG encoding use the `image` crate; WebP goes
//! through `webp`. No ImageMagick, no system libraries beyond libwebp.
//!
//! ## Lazy Metadata
//!
//! ML metadata is loaded only when a crop mode or the blur policy actually needs
//! it. A plain resize never touches the metadata provider.

pub mod cache;
pub mod config;
pub mod handler;
pub mod imaging;
pub mod metadata;
pub mod pipeline;
pub mod policy;
pub mod server;
pub mod storage;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_helpers;
