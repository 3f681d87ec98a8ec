//! Durable key/value store with schema validation and LRU purge.
//!
//! Each store lives at `<root>/<database>/<store>/` and holds one JSON
//! record file per key plus a `VERSION` marker. Record filenames are the
//! hex SHA3-256 digest of the key, which keeps arbitrary keys filesystem
//! safe; the key itself is recoverable from the record body.
//!
//! Opening a store whose persisted version differs from the configured
//! one drops every record and rewrites the marker. This destructive
//! migration policy is deliberate: a schema bump invalidates cached
//! conversion results wholesale rather than attempting upgrades.

use super::connection::{ConnectionGuard, ConnectionShell, StoreConn};
use super::index::LruIndex;
use super::types::{now_ms, CacheRecord, StoreConfig, StoreError, PURGE_SLACK};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha3::{Digest, Sha3_256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Filename of the schema version marker.
const VERSION_FILE: &str = "VERSION";

/// Extension of record files.
const RECORD_EXT: &str = "entry";

/// Generic persistent key/value store with a single shared connection
/// and least-recently-used purging.
pub struct DiskStore<T> {
    config: StoreConfig<T>,
    shell: ConnectionShell,
}

impl<T> Clone for DiskStore<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            shell: self.shell.clone(),
        }
    }
}

impl<T> DiskStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates a store handle. No I/O happens until the first operation.
    pub fn new(config: StoreConfig<T>) -> Self {
        Self {
            config,
            shell: ConnectionShell::new(),
        }
    }

    /// Directory holding this store's record files.
    fn store_dir(&self) -> PathBuf {
        self.config
            .root
            .join(&self.config.database)
            .join(&self.config.store)
    }

    /// Path of the record file for `key`.
    fn record_path(dir: &Path, key: &str) -> PathBuf {
        let mut digest = String::with_capacity(64);
        for byte in Sha3_256::digest(key.as_bytes()) {
            let _ = write!(digest, "{:02x}", byte);
        }
        dir.join(format!("{}.{}", digest, RECORD_EXT))
    }

    /// Acquires the shared connection, opening the store if needed.
    async fn acquire(&self) -> Result<ConnectionGuard, StoreError> {
        self.shell.acquire(self.open_conn()).await
    }

    /// Opens the store: ensures the directory, applies the version
    /// policy, and rebuilds the index from the record files.
    async fn open_conn(&self) -> Result<StoreConn, StoreError> {
        let dir = self.store_dir();
        tokio::fs::create_dir_all(&dir).await?;

        let version_path = dir.join(VERSION_FILE);
        let persisted = match tokio::fs::read_to_string(&version_path).await {
            Ok(contents) => contents.trim().parse::<u32>().ok(),
            Err(_) => None,
        };

        if persisted != Some(self.config.version) {
            if let Some(old) = persisted {
                warn!(
                    database = %self.config.database,
                    store = %self.config.store,
                    from = old,
                    to = self.config.version,
                    "store version changed, dropping all records"
                );
            }
            clear_records(&dir).await?;
            tokio::fs::write(&version_path, self.config.version.to_string()).await?;
        }

        let index = LruIndex::new();
        let mut skipped = 0u64;
        let mut dir_reader = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = dir_reader.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    // Only the header matters here; the payload is decoded
                    // lazily on get.
                    match serde_json::from_slice::<CacheRecord<serde_json::Value>>(&bytes) {
                        Ok(record) => index.record(&record.key, record.last_accessed),
                        Err(_) => skipped += 1,
                    }
                }
                Err(_) => skipped += 1,
            }
        }

        debug!(
            database = %self.config.database,
            store = %self.config.store,
            records = index.len(),
            skipped,
            "store opened"
        );

        Ok(StoreConn { dir, index })
    }

    /// Stores `value` under `key`, replacing any existing record.
    ///
    /// The value is validated first; an invalid value fails with
    /// [`StoreError::SchemaValidation`] and nothing is written. When the
    /// store has grown more than [`PURGE_SLACK`] entries past its budget,
    /// a background purge is scheduled; its failures are logged, never
    /// surfaced to the `set` caller.
    pub async fn set(&self, key: &str, value: T) -> Result<(), StoreError> {
        if let Some(validator) = &self.config.validator {
            validator(&value).map_err(StoreError::SchemaValidation)?;
        }

        let guard = self.acquire().await?;
        let conn = guard.conn();

        let stamp = now_ms();
        let record = CacheRecord {
            key: key.to_string(),
            last_accessed: stamp,
            data: value,
        };
        let bytes =
            serde_json::to_vec(&record).map_err(|e| StoreError::Serialize(e.to_string()))?;

        write_atomic(&Self::record_path(&conn.dir, key), &bytes).await?;
        conn.index.record(key, stamp);

        self.maybe_schedule_purge(conn.index.len());
        Ok(())
    }

    /// Fetches the value for `key`, or `None` if absent.
    ///
    /// A hit refreshes the record's access stamp so recently read
    /// entries survive future purges. The refresh is best-effort: a
    /// failed rewrite is logged and the read still succeeds.
    pub async fn get(&self, key: &str) -> Result<Option<T>, StoreError> {
        let guard = self.acquire().await?;
        let conn = guard.conn();
        let path = Self::record_path(&conn.dir, key);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut record: CacheRecord<T> = serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::SchemaValidation(format!("corrupt record for key {}: {}", key, e))
        })?;
        if let Some(validator) = &self.config.validator {
            validator(&record.data).map_err(StoreError::SchemaValidation)?;
        }

        let stamp = now_ms();
        record.last_accessed = stamp;
        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                if let Err(e) = write_atomic(&path, &bytes).await {
                    warn!(key, error = %e, "failed to refresh access stamp");
                }
            }
            Err(e) => warn!(key, error = %e, "failed to re-encode record for stamp refresh"),
        }
        conn.index.touch(key, stamp);

        Ok(Some(record.data))
    }

    /// Removes the record for `key`, if any.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let guard = self.acquire().await?;
        let conn = guard.conn();
        let path = Self::record_path(&conn.dir, key);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        conn.index.remove(key);
        Ok(())
    }

    /// Deletes the least-recently-accessed records until at most
    /// `num_to_keep` remain. No-op if already at or below the target.
    pub async fn purge(&self, num_to_keep: usize) -> Result<(), StoreError> {
        let guard = self.acquire().await?;
        let conn = guard.conn();

        if conn.index.len() <= num_to_keep {
            return Ok(());
        }

        let mut removed = 0usize;
        for (key, _stamp) in conn.index.oldest_first() {
            if conn.index.len() <= num_to_keep {
                break;
            }
            let path = Self::record_path(&conn.dir, &key);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            conn.index.remove(&key);
            removed += 1;
        }

        debug!(
            database = %self.config.database,
            store = %self.config.store,
            removed,
            kept = conn.index.len(),
            "purged least-recently-used records"
        );
        Ok(())
    }

    /// Returns every stored value, in unspecified order.
    ///
    /// Unlike [`DiskStore::get`], this does not refresh access stamps.
    pub async fn get_all(&self) -> Result<Vec<T>, StoreError> {
        let guard = self.acquire().await?;
        let conn = guard.conn();

        let mut values = Vec::with_capacity(conn.index.len());
        for key in conn.index.keys() {
            let path = Self::record_path(&conn.dir, &key);
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let record: CacheRecord<T> = serde_json::from_slice(&bytes).map_err(|e| {
                StoreError::SchemaValidation(format!("corrupt record for key {}: {}", key, e))
            })?;
            values.push(record.data);
        }
        Ok(values)
    }

    /// Number of records currently stored.
    pub async fn len(&self) -> Result<usize, StoreError> {
        let guard = self.acquire().await?;
        Ok(guard.conn().index.len())
    }

    /// Schedules a fire-and-forget purge once the store has outgrown its
    /// budget by more than [`PURGE_SLACK`].
    fn maybe_schedule_purge(&self, count: usize) {
        let Some(max_entries) = self.config.max_entries else {
            return;
        };
        if count <= max_entries + PURGE_SLACK {
            return;
        }

        let store = self.clone();
        tokio::spawn(async move {
            if let Err(e) = store.purge(max_entries).await {
                warn!(error = %e, "scheduled store purge failed");
            }
        });
    }

    /// Whether the shared connection is currently open.
    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.shell.is_open()
    }
}

/// Writes `bytes` to `path` atomically via a temp file and rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("{:08x}.tmp", rand::random::<u32>()));
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Removes every record file in `dir`.
async fn clear_records(dir: &Path) -> std::io::Result<()> {
    let mut dir_reader = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = dir_reader.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXT) {
            tokio::fs::remove_file(&path).await?;
        }
    }
    Ok(())
}
