//! SQLite connection pool with read/write separation and retry logic.
//!
//! - Maintains a **write mutex** per DB for serialized write access
//! - Creates fresh **read connections** per operation (no mutex, concurrent via WAL)
//! - Retries reads that hit `SQLITE_BUSY` / `SQLITE_LOCKED` with exponential backoff
//!
//! Connections are opened fresh each time rather than kept open, so a request
//! thread never holds a handle across calls and the memoisation GC ticker can
//! share the same file without coordination beyond SQLite's own locking.

use crate::core::db;
use crate::core::error::CatalogError;
use rusqlite::Connection;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

/// Maximum retry attempts for busy/locked errors.
const MAX_RETRIES: u32 = 5;
/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 50;
/// Maximum delay cap (milliseconds).
const MAX_DELAY_MS: u64 = 2_000;

/// Write connection busy_timeout in seconds.
const WRITE_BUSY_TIMEOUT_SECS: u32 = 5;
/// Read connection busy_timeout in seconds.
const READ_BUSY_TIMEOUT_SECS: u32 = 5;

struct PoolEntry {
    write_lock: Mutex<()>,
    db_path: PathBuf,
}

pub struct SqlitePool {
    entries: Mutex<FxHashMap<PathBuf, Arc<PoolEntry>>>,
}

impl SqlitePool {
    fn new() -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    fn get_entry(&self, db_path: &Path) -> Result<Arc<PoolEntry>, CatalogError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CatalogError::Config("SqlitePool entries lock poisoned".to_string()))?;
        let entry = entries
            .entry(db_path.to_path_buf())
            .or_insert_with(|| {
                Arc::new(PoolEntry {
                    write_lock: Mutex::new(()),
                    db_path: db_path.to_path_buf(),
                })
            });
        Ok(Arc::clone(entry))
    }

    /// Execute a closure with a write connection for the given DB path.
    /// Write access is serialized per-DB via mutex. Writes are not retried:
    /// an insert that lost a race must surface to the caller.
    pub fn with_write<F, R>(&self, db_path: &Path, f: F) -> Result<R, CatalogError>
    where
        F: FnOnce(&Connection) -> Result<R, CatalogError>,
    {
        let entry = self.get_entry(db_path)?;
        let _guard = entry
            .write_lock
            .lock()
            .map_err(|_| CatalogError::Config("Pool write lock poisoned".to_string()))?;

        let conn =
            db::db_connect_pooled(&entry.db_path.to_string_lossy(), WRITE_BUSY_TIMEOUT_SECS)?;

        f(&conn)
    }

    /// Execute a closure with a read connection (no mutex serialization).
    /// Reads are idempotent, so busy/locked failures are retried.
    pub fn with_read<F, R>(&self, db_path: &Path, mut f: F) -> Result<R, CatalogError>
    where
        F: FnMut(&Connection) -> Result<R, CatalogError>,
    {
        retry_on_busy(|| {
            let conn = db::db_connect_pooled(&db_path.to_string_lossy(), READ_BUSY_TIMEOUT_SECS)?;
            f(&conn)
        })
    }
}

/// Retry a closure on `SQLITE_BUSY` / `DatabaseLocked` with exponential backoff.
fn retry_on_busy<F, R>(mut f: F) -> Result<R, CatalogError>
where
    F: FnMut() -> Result<R, CatalogError>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if is_busy_error(&e) && attempt < MAX_RETRIES => {
                attempt += 1;
                let delay_ms = (BASE_DELAY_MS * 2u64.pow(attempt - 1)).min(MAX_DELAY_MS);
                tracing::debug!(attempt, delay_ms, "sqlite busy, retrying read");
                thread::sleep(Duration::from_millis(delay_ms));
            }
            Err(e) => return Err(e),
        }
    }
}

pub(crate) fn is_busy_error(err: &CatalogError) -> bool {
    match err {
        CatalogError::Store(rusqlite::Error::SqliteFailure(code, _)) => matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

/// Global pool instance (same lifetime as the process).
pub fn global_pool() -> &'static SqlitePool {
    static POOL: OnceLock<SqlitePool> = OnceLock::new();
    POOL.get_or_init(SqlitePool::new)
}
