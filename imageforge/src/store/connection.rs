//! Shared, reference-counted store connection.
//!
//! A store's directory handle and in-memory index are opened lazily on
//! first use and shared across concurrent operations. Each operation
//! acquires a scoped guard that increments the use count; the guard's
//! drop decrements it on every exit path, and the connection is closed
//! once the count returns to zero. An async gate serializes the open
//! handshake so at most one is in flight per store instance regardless
//! of caller concurrency.

use super::index::LruIndex;
use super::types::StoreError;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// An open store: its directory and the index rebuilt from it.
pub struct StoreConn {
    /// Directory holding the record files.
    pub dir: PathBuf,
    /// In-memory LRU index over the records.
    pub index: LruIndex,
}

struct ConnState {
    open_count: usize,
    conn: Option<Arc<StoreConn>>,
}

struct ShellInner {
    state: Mutex<ConnState>,
    /// Serializes the open handshake across concurrent first acquires.
    open_gate: tokio::sync::Mutex<()>,
}

/// Shared connection slot with reference counting.
///
/// Clones share the same slot; the store hands one to every operation.
#[derive(Clone)]
pub struct ConnectionShell {
    inner: Arc<ShellInner>,
}

impl ConnectionShell {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShellInner {
                state: Mutex::new(ConnState {
                    open_count: 0,
                    conn: None,
                }),
                open_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Acquires the shared connection, running `open` only if no
    /// connection currently exists.
    ///
    /// The returned guard keeps the connection alive; dropping the last
    /// guard closes it.
    pub async fn acquire<Fut>(&self, open: Fut) -> Result<ConnectionGuard, StoreError>
    where
        Fut: Future<Output = Result<StoreConn, StoreError>>,
    {
        if let Some(guard) = self.try_reuse() {
            return Ok(guard);
        }

        let _gate = self.inner.open_gate.lock().await;
        // Another acquirer may have opened while we waited for the gate.
        if let Some(guard) = self.try_reuse() {
            return Ok(guard);
        }

        let conn = Arc::new(open.await?);
        let mut state = self.inner.state.lock().unwrap();
        state.conn = Some(Arc::clone(&conn));
        state.open_count += 1;
        debug!(dir = %conn.dir.display(), "store connection opened");

        Ok(ConnectionGuard {
            conn,
            shell: self.clone(),
        })
    }

    /// Joins an existing connection, if one is open.
    fn try_reuse(&self) -> Option<ConnectionGuard> {
        let mut state = self.inner.state.lock().unwrap();
        let conn = state.conn.clone()?;
        state.open_count += 1;
        Some(ConnectionGuard {
            conn,
            shell: self.clone(),
        })
    }

    /// Whether a connection is currently open.
    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.inner.state.lock().unwrap().conn.is_some()
    }
}

impl Default for ConnectionShell {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped handle on the shared connection.
///
/// Dropping the guard releases one reference; the last release closes
/// the connection and discards the in-memory index.
pub struct ConnectionGuard {
    conn: Arc<StoreConn>,
    shell: ConnectionShell,
}

impl ConnectionGuard {
    /// The open connection this guard keeps alive.
    pub fn conn(&self) -> &StoreConn {
        &self.conn
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut state = self.shell.inner.state.lock().unwrap();
        state.open_count -= 1;
        if state.open_count == 0 {
            state.conn = None;
            debug!("store connection closed");
        }
    }
}
