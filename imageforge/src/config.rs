//! Pipeline configuration.

use crate::retry::RetryPolicy;
use crate::store::default_root;
use std::path::PathBuf;

/// Default concurrency ceiling for bulk conversion.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default bounding-box edge for generated previews, in pixels.
pub const DEFAULT_PREVIEW_EDGE: u32 = 256;

/// Default budget for cached conversion results.
pub const DEFAULT_MAX_CACHED_CONVERSIONS: usize = 200;

/// Configuration for the conversion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum conversions in flight during bulk operations.
    pub concurrency: usize,
    /// Retry policy for flaky conversion workers.
    pub retry: RetryPolicy,
    /// Root directory for the conversion cache and image store.
    pub cache_root: PathBuf,
    /// Entry budget of the conversion-result cache.
    pub max_cached_conversions: usize,
    /// Previews are fitted within this square edge.
    pub preview_edge: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            cache_root: default_root(),
            max_cached_conversions: DEFAULT_MAX_CACHED_CONVERSIONS,
            preview_edge: DEFAULT_PREVIEW_EDGE,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bulk-conversion concurrency ceiling.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the cache root directory.
    pub fn with_cache_root(mut self, root: PathBuf) -> Self {
        self.cache_root = root;
        self
    }

    /// Sets the conversion-cache entry budget.
    pub fn with_max_cached_conversions(mut self, max: usize) -> Self {
        self.max_cached_conversions = max;
        self
    }

    /// Sets the preview bounding-box edge.
    pub fn with_preview_edge(mut self, edge: u32) -> Self {
        self.preview_edge = edge;
        self
    }
}
