//! Image conversion: content-addressed caching, retried workers, and
//! bulk fan-out through the task pool.

mod codec;
mod hash;
mod orchestrator;
mod registry;
mod types;
mod worker;

pub use codec::CodecConverter;
pub use hash::conversion_key;
pub use orchestrator::{
    BatchFailure, BatchOutcome, ConvertPipeline, ConvertedOutput, CONVERSION_CACHE_VERSION,
    IMAGE_STORE_VERSION,
};
pub use registry::{generate_id, validate_image, ImageRegistry, ManagedImage};
pub use types::{
    ConvertError, ConvertOptions, ImageFormat, StoredFile, TargetFormat, DEFAULT_QUALITY,
};
pub use worker::{ImageConverter, WorkerHandle};
