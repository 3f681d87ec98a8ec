//! Durable key/value store with schema validation and LRU purge.
//!
//! One database directory per logical cache purpose, one store directory
//! per record collection, one shared reference-counted connection per
//! store instance. See [`DiskStore`] for the operation contract.

mod connection;
mod disk;
mod index;
mod types;

pub use connection::{ConnectionGuard, StoreConn};
pub use disk::DiskStore;
pub use index::LruIndex;
pub use types::{default_root, now_ms, CacheRecord, StoreConfig, StoreError, ValidatorFn, PURGE_SLACK};
