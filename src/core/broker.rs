use crate::core::cancel::RequestContext;
use crate::core::db;
use crate::core::error::CatalogError;
use crate::core::pool;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// The broker is the thin waist every catalog round trip goes through.
///
/// It checks the request's cancellation before touching the database, routes
/// through the process-wide pool and traces each operation by name.
#[derive(Debug, Clone)]
pub struct CatalogBroker {
    db_path: PathBuf,
}

impl CatalogBroker {
    pub fn new(root: &Path) -> Self {
        Self {
            db_path: db::catalog_db_path(root),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run a read-only closure. May be retried on busy errors, so it must not write.
    pub fn read<F, R>(&self, ctx: &RequestContext, op: &str, f: F) -> Result<R, CatalogError>
    where
        F: FnMut(&Connection) -> Result<R, CatalogError>,
    {
        ctx.check(op)?;
        let _span = tracing::debug_span!("catalog_read", op).entered();
        let result = pool::global_pool().with_read(&self.db_path, f);
        self.trace_outcome(op, &result);
        result
    }

    /// Run a closure holding the per-database write lock.
    pub fn write<F, R>(&self, ctx: &RequestContext, op: &str, f: F) -> Result<R, CatalogError>
    where
        F: FnOnce(&Connection) -> Result<R, CatalogError>,
    {
        ctx.check(op)?;
        let _span = tracing::debug_span!("catalog_write", op).entered();
        let result = pool::global_pool().with_write(&self.db_path, f);
        self.trace_outcome(op, &result);
        result
    }

    fn trace_outcome<R>(&self, op: &str, result: &Result<R, CatalogError>) {
        match result {
            Ok(_) => tracing::debug!(op, status = "success"),
            Err(e) if e.is_not_found() => tracing::debug!(op, status = "not_found", error = %e),
            Err(e) => tracing::debug!(op, status = "error", error = %e),
        }
    }
}
