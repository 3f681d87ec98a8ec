//! Conversion pipeline: content-addressed caching, retry, and pooled
//! fan-out.
//!
//! Single conversions check the conversion cache first; a miss runs the
//! worker wrapped in [`Retry`] and writes the result back under the same
//! content+options key. Bulk conversion fans out through the task pool
//! in settle-all mode: one image's failure never blocks the others, and
//! the aggregate outcome separates successes from failures. These are
//! two deliberately distinct failure policies.

use super::hash::conversion_key;
use super::registry::{validate_image, ImageRegistry, ManagedImage};
use super::types::{ConvertError, ConvertOptions, ImageFormat, StoredFile};
use super::worker::{ImageConverter, WorkerHandle};
use crate::config::PipelineConfig;
use crate::pool::{settle_pool, PoolError};
use crate::retry::Retry;
use crate::store::{DiskStore, StoreConfig};
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Schema version of the conversion-result cache.
pub const CONVERSION_CACHE_VERSION: u32 = 1;

/// Schema version of the uploaded-image store.
pub const IMAGE_STORE_VERSION: u32 = 1;

/// Quality used for generated previews.
const PREVIEW_QUALITY: u8 = 60;

/// One successfully converted image.
#[derive(Debug, Clone)]
pub struct ConvertedOutput {
    /// Id of the source image.
    pub id: String,
    /// Output filename derived from the display name.
    pub name: String,
    /// Output format.
    pub format: ImageFormat,
    /// Encoded output data.
    pub bytes: Bytes,
}

/// One failed item of a bulk conversion.
#[derive(Debug, thiserror::Error)]
#[error("image {id}: {error}")]
pub struct BatchFailure {
    /// Id of the source image.
    pub id: String,
    /// Why it failed.
    #[source]
    pub error: ConvertError,
}

/// Aggregate result of a settle-all bulk conversion.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Items that converted, in completion order.
    pub succeeded: Vec<ConvertedOutput>,
    /// Items that failed, individually retryable by the caller.
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    /// Total settled items.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Whether every item succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Conversion pipeline over an injected converter factory.
///
/// Cheap to clone: the worker handle, stores and registry are shared.
pub struct ConvertPipeline<C, F>
where
    C: ImageConverter,
    F: Fn() -> C + Send + Sync + 'static,
{
    worker: Arc<WorkerHandle<C, F>>,
    cache: DiskStore<StoredFile>,
    registry: ImageRegistry,
    config: PipelineConfig,
}

impl<C, F> Clone for ConvertPipeline<C, F>
where
    C: ImageConverter,
    F: Fn() -> C + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            worker: Arc::clone(&self.worker),
            cache: self.cache.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C, F> ConvertPipeline<C, F>
where
    C: ImageConverter,
    F: Fn() -> C + Send + Sync + 'static,
{
    /// Builds a pipeline from a converter factory and configuration.
    pub fn new(factory: F, config: PipelineConfig) -> Result<Self, ConvertError> {
        if config.concurrency == 0 {
            return Err(ConvertError::InvalidConfig(
                "concurrency must be a positive integer".to_string(),
            ));
        }

        let cache = DiskStore::new(
            StoreConfig::new("conversions", "results", CONVERSION_CACHE_VERSION)
                .with_root(config.cache_root.clone())
                .with_max_entries(config.max_cached_conversions),
        );
        let image_store = DiskStore::new(
            StoreConfig::new("images", "uploads", IMAGE_STORE_VERSION)
                .with_root(config.cache_root.clone())
                .with_validator(validate_image),
        );

        Ok(Self {
            worker: Arc::new(WorkerHandle::new(factory)),
            cache,
            registry: ImageRegistry::new(image_store),
            config,
        })
    }

    /// The persistent image registry behind this pipeline.
    pub fn registry(&self) -> &ImageRegistry {
        &self.registry
    }

    /// Imports an image: stages the original, generates a low-resolution
    /// preview through the worker, and marks the image ready.
    pub async fn import_image(
        &self,
        display_name: &str,
        format: ImageFormat,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<ManagedImage, ConvertError> {
        let staged = self
            .registry
            .stage(display_name, format, bytes.clone())
            .await?;

        let preview_options = ConvertOptions::new(ImageFormat::Jpeg)
            .with_quality(PREVIEW_QUALITY)
            .with_max_dimensions(self.config.preview_edge, self.config.preview_edge);

        let worker = self.worker.get().await;
        let preview = worker
            .convert(Bytes::from(bytes), &preview_options, cancel)
            .await?;

        let preview_file = StoredFile {
            name: format!("{}.preview.jpg", display_name),
            format: ImageFormat::Jpeg,
            bytes: preview.to_vec(),
        };
        self.registry.attach_preview(&staged.id, preview_file).await
    }

    /// Converts raw bytes under the given options, going through the
    /// content-addressed cache.
    ///
    /// A cache hit returns immediately without touching the worker. On a
    /// miss the worker runs wrapped in retry with backoff; cancellation
    /// vetoes further attempts and resets the worker so its state never
    /// crosses the cancellation boundary.
    pub async fn convert_bytes(
        &self,
        input: Bytes,
        options: &ConvertOptions,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ConvertError> {
        let key = conversion_key(&input, options);

        if let Some(cached) = self.cache.get(&key).await? {
            debug!(key = %key, "conversion cache hit");
            return Ok(Bytes::from(cached.bytes));
        }
        debug!(key = %key, format = %options.format, "conversion cache miss");

        let retry = Retry::new(self.config.retry.clone())
            .with_should_retry(|error: &ConvertError| !error.is_cancelled())
            .with_on_attempt_failure(|error, attempt| {
                warn!(attempt, error = %error, "conversion attempt failed");
            });

        let result = retry
            .run(|| {
                let worker = Arc::clone(&self.worker);
                let input = input.clone();
                let options = options.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return Err(ConvertError::Cancelled);
                    }
                    let converter = worker.get().await;
                    converter.convert(input, &options, &cancel).await
                }
            })
            .await;

        match result {
            Ok(converted) => {
                let stored = StoredFile {
                    name: format!("converted.{}", options.format.extension()),
                    format: options.format,
                    bytes: converted.to_vec(),
                };
                self.cache.set(&key, stored).await?;
                Ok(converted)
            }
            Err(error) => {
                // A cancelled or crashed worker is not reused for the
                // next attempt.
                if matches!(error, ConvertError::Cancelled | ConvertError::Worker(_)) {
                    self.worker.reset().await;
                }
                Err(error)
            }
        }
    }

    /// Converts one managed image by id.
    ///
    /// Only ready images are eligible; the image's target policy and
    /// quality select the options, with `Keep` resolving to its current
    /// format.
    pub async fn convert_image(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<ConvertedOutput, ConvertError> {
        let image = self.registry.get(id).await?;
        if !image.ready {
            return Err(ConvertError::NotReady(image.id));
        }

        let options = image.options();
        let bytes = self
            .convert_bytes(Bytes::from(image.original.bytes.clone()), &options, cancel)
            .await?;

        Ok(ConvertedOutput {
            id: image.id,
            name: output_name(&image.display_name, options.format),
            format: options.format,
            bytes,
        })
    }

    /// Converts all the given images through the pool in settle-all mode.
    ///
    /// At most the configured concurrency runs at once. `progress` is
    /// invoked with `(settled, total)` after every item, failures
    /// included; the outcome reports successes and failures separately.
    pub async fn convert_all<P>(
        &self,
        ids: Vec<String>,
        cancel: &CancellationToken,
        progress: P,
    ) -> Result<BatchOutcome, ConvertError>
    where
        P: Fn(usize, usize) + Send + Sync + 'static,
    {
        let total = ids.len();
        let settled = Arc::new(AtomicUsize::new(0));
        let progress = Arc::new(progress);

        let mut tasks = Vec::with_capacity(total);
        for id in ids {
            let pipeline = self.clone();
            let cancel = cancel.clone();
            let settled = Arc::clone(&settled);
            let progress = Arc::clone(&progress);
            tasks.push(move || async move {
                let result = pipeline.convert_image(&id, &cancel).await;
                let done = settled.fetch_add(1, Ordering::SeqCst) + 1;
                progress(done, total);
                result.map_err(|error| BatchFailure { id, error })
            });
        }

        let results = settle_pool(tasks, self.config.concurrency)
            .await
            .map_err(|error| match error {
                PoolError::InvalidConcurrency(n) => ConvertError::InvalidConfig(format!(
                    "concurrency must be a positive integer, got {}",
                    n
                )),
                PoolError::Task(failure) => failure.error,
            })?;

        let mut outcome = BatchOutcome::default();
        for result in results {
            match result {
                Ok(output) => outcome.succeeded.push(output),
                Err(failure) => outcome.failed.push(failure),
            }
        }

        info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            total,
            "bulk conversion settled"
        );
        Ok(outcome)
    }
}

/// Output filename: display name with its extension swapped for the
/// output format's.
fn output_name(display_name: &str, format: ImageFormat) -> String {
    let stem = display_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(display_name);
    format!("{}.{}", stem, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_swaps_extension() {
        assert_eq!(output_name("photo.png", ImageFormat::Jpeg), "photo.jpg");
        assert_eq!(output_name("archive.tar.png", ImageFormat::WebP), "archive.tar.webp");
        assert_eq!(output_name("noext", ImageFormat::Png), "noext.png");
    }

    #[test]
    fn batch_outcome_accounting() {
        let outcome = BatchOutcome {
            succeeded: vec![],
            failed: vec![BatchFailure {
                id: "x".to_string(),
                error: ConvertError::Cancelled,
            }],
        };
        assert_eq!(outcome.total(), 1);
        assert!(!outcome.is_complete());
        assert!(BatchOutcome::default().is_complete());
    }
}
