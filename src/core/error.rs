use crate::plugins::zenodo::ZenodoError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("SQLite error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Publisher error: {0}")]
    Publisher(ZenodoError),
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CatalogError::Cancelled(_))
    }

    /// Maps `QueryReturnedNoRows` to `NotFound(what)`, leaving other errors as store failures.
    pub(crate) fn from_lookup(err: rusqlite::Error, what: impl Into<String>) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => CatalogError::NotFound(what.into()),
            other => CatalogError::Store(other),
        }
    }

    /// Classifies constraint failures on insert. Only a key collision is
    /// `AlreadyExists(id)`; a dangling reference is `NotFound` and a rejected
    /// value is `InvalidInput`.
    pub(crate) fn from_insert(err: rusqlite::Error, id: impl Into<String>) -> Self {
        use rusqlite::ffi;

        let extended = match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                code.extended_code
            }
            _ => return CatalogError::Store(err),
        };
        match extended {
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                CatalogError::AlreadyExists(id.into())
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                CatalogError::NotFound(format!("record referenced by {}", id.into()))
            }
            ffi::SQLITE_CONSTRAINT_CHECK | ffi::SQLITE_CONSTRAINT_NOTNULL => {
                CatalogError::InvalidInput(format!("{} rejected: {}", id.into(), err))
            }
            _ => CatalogError::Store(err),
        }
    }
}

impl From<ZenodoError> for CatalogError {
    fn from(err: ZenodoError) -> Self {
        match err {
            ZenodoError::Cancelled(msg) => CatalogError::Cancelled(msg),
            other => CatalogError::Publisher(other),
        }
    }
}
