//! Core types for the durable key/value store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// How far past `max_entries` the store may grow before a background
/// purge is scheduled.
pub const PURGE_SLACK: usize = 10;

/// Caller-supplied value validator, run on every write and read.
pub type ValidatorFn<T> = Arc<dyn Fn(&T) -> Result<(), String> + Send + Sync>;

/// Store-related errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error during store operations
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value failed the store's schema contract
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    /// A record could not be encoded for persistence
    #[error("record serialization failed: {0}")]
    Serialize(String),
}

/// One persisted record: a key, its access stamp, and the payload.
///
/// `last_accessed` is wall-clock milliseconds since the epoch, refreshed
/// on every read and write so the purge's oldest-first ordering reflects
/// actual use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord<T> {
    pub key: String,
    pub last_accessed: u64,
    pub data: T,
}

/// Store configuration.
///
/// A store is addressed by `(database, store)` under a root directory;
/// `version` selects the on-disk schema. Opening an existing store at a
/// different version drops every record (destructive migration).
pub struct StoreConfig<T> {
    /// Root directory holding all databases.
    pub root: PathBuf,
    /// Database name (one directory per logical cache purpose).
    pub database: String,
    /// Object-store name within the database.
    pub store: String,
    /// Schema version persisted alongside the records.
    pub version: u32,
    /// Entry budget; exceeding it by more than [`PURGE_SLACK`] schedules
    /// a background purge down to this count.
    pub max_entries: Option<usize>,
    /// Optional value validator applied on `set` and `get`.
    pub validator: Option<ValidatorFn<T>>,
}

impl<T> StoreConfig<T> {
    /// Creates a configuration rooted at the platform cache directory.
    pub fn new(database: impl Into<String>, store: impl Into<String>, version: u32) -> Self {
        Self {
            root: default_root(),
            database: database.into(),
            store: store.into(),
            version,
            max_entries: None,
            validator: None,
        }
    }

    /// Overrides the root directory.
    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root = root;
        self
    }

    /// Sets the entry budget that triggers background purges.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Sets the value validator.
    pub fn with_validator(
        mut self,
        validator: impl Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }
}

impl<T> Clone for StoreConfig<T> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            database: self.database.clone(),
            store: self.store.clone(),
            version: self.version,
            max_entries: self.max_entries,
            validator: self.validator.clone(),
        }
    }
}

/// Default store root: the platform cache directory.
pub fn default_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("imageforge")
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
