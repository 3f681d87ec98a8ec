//! Imageforge - scheduling and caching core for batch image conversion
//!
//! This library provides the primitives behind a batch image converter:
//! a bounded-concurrency task pool built on a custom deque, a retry
//! wrapper with exponential backoff and jitter, a durable key/value
//! store with LRU purging, and a conversion pipeline composing them with
//! content-addressed caching.
//!
//! # High-Level API
//!
//! For most use cases, the [`convert`] module provides the pipeline:
//!
//! ```ignore
//! use imageforge::config::PipelineConfig;
//! use imageforge::convert::{CodecConverter, ConvertPipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! let pipeline = ConvertPipeline::new(CodecConverter::new, PipelineConfig::default())?;
//!
//! let image = pipeline
//!     .import_image("photo.png", format, bytes, &CancellationToken::new())
//!     .await?;
//! let outcome = pipeline
//!     .convert_all(vec![image.id], &CancellationToken::new(), |done, total| {
//!         println!("{done}/{total}");
//!     })
//!     .await?;
//! ```

pub mod config;
pub mod convert;
pub mod deque;
pub mod logging;
pub mod pool;
pub mod retry;
pub mod store;

/// Version of the imageforge library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
