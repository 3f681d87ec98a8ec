//! Conversion capability boundary and owned worker handle.
//!
//! The pipeline treats conversion as an opaque, possibly flaky,
//! cancellable unit of work behind [`ImageConverter`]. The worker
//! instance itself is held by [`WorkerHandle`]: created from an injected
//! factory on first use and rebuilt by [`WorkerHandle::reset`], so a
//! cancelled or fatally failed worker is never reused for the next
//! attempt.

use super::types::{ConvertError, ConvertOptions};
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// An asynchronous image conversion capability.
///
/// Implementations must be cheap to construct: the owning
/// [`WorkerHandle`] recreates them after cancellation or fatal failure.
pub trait ImageConverter: Send + Sync + 'static {
    /// Converts `input` according to `options`.
    ///
    /// A fired `cancel` token must surface as [`ConvertError::Cancelled`]
    /// rather than a partial result.
    fn convert(
        &self,
        input: Bytes,
        options: &ConvertOptions,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Bytes, ConvertError>> + Send;

    /// Converter name for logging.
    fn name(&self) -> &str;
}

/// Explicitly owned conversion worker slot.
///
/// Replaces a process-wide lazily-created singleton: the handle owns the
/// instance, creation happens on first [`get`](WorkerHandle::get), and
/// [`reset`](WorkerHandle::reset) drops it so the next use starts fresh.
pub struct WorkerHandle<C, F>
where
    C: ImageConverter,
    F: Fn() -> C + Send + Sync,
{
    factory: F,
    slot: Mutex<Option<Arc<C>>>,
}

impl<C, F> WorkerHandle<C, F>
where
    C: ImageConverter,
    F: Fn() -> C + Send + Sync,
{
    /// Creates a handle; no worker exists until first use.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            slot: Mutex::new(None),
        }
    }

    /// Returns the current worker, creating it if necessary.
    pub async fn get(&self) -> Arc<C> {
        let mut slot = self.slot.lock().await;
        if let Some(worker) = slot.as_ref() {
            return Arc::clone(worker);
        }
        let worker = Arc::new((self.factory)());
        debug!(converter = worker.name(), "conversion worker created");
        *slot = Some(Arc::clone(&worker));
        worker
    }

    /// Drops the current worker so the next [`get`](WorkerHandle::get)
    /// builds a fresh one.
    ///
    /// Called after cancellation or a fatal conversion failure; stateful
    /// worker resources must not cross a cancellation boundary.
    pub async fn reset(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(worker) = slot.take() {
            debug!(converter = worker.name(), "conversion worker reset");
        }
    }
}
