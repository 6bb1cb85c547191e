use crate::core::error::CatalogError;
use crate::core::schemas;
use rusqlite::{Connection, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn db_connect(db_path: &str) -> Result<Connection, CatalogError> {
    db_connect_pooled(db_path, 5)
}

pub fn db_connect_pooled(db_path: &str, busy_timeout_secs: u32) -> Result<Connection, CatalogError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(u64::from(busy_timeout_secs)))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

pub fn catalog_db_path(root: &Path) -> PathBuf {
    root.join(schemas::CATALOG_DB_NAME)
}

/// Creates the store root and every catalog table. Safe to call repeatedly.
pub fn initialize_catalog_db(root: &Path) -> Result<PathBuf, CatalogError> {
    fs::create_dir_all(root)?;
    let db_path = catalog_db_path(root);
    let conn = db_connect(&db_path.to_string_lossy())?;

    let tx = conn.unchecked_transaction()?;
    for stmt in schemas::CATALOG_SCHEMA_STATEMENTS {
        tx.execute(stmt, [])?;
    }
    tx.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![schemas::CATALOG_SCHEMA_VERSION.to_string()],
    )?;
    tx.commit()?;

    tracing::debug!(path = %db_path.display(), "catalog database initialized");
    Ok(db_path)
}

pub fn schema_version(conn: &Connection) -> Result<Option<u32>, CatalogError> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    Ok(value.and_then(|v| v.parse().ok()))
}
