//! Store handle for the catalog's on-disk state.
//!
//! A `Store` is the root directory holding `catalog.db` (and optionally
//! `catalog.toml`). Opening one initializes the schema, so every handle a
//! caller gets points at a usable database.

use crate::core::broker::CatalogBroker;
use crate::core::db;
use crate::core::error::CatalogError;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute or caller-relative path to the store root directory
    pub root: PathBuf,
}

impl Store {
    /// Opens (creating if needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let root = root.into();
        db::initialize_catalog_db(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn broker(&self) -> CatalogBroker {
        CatalogBroker::new(&self.root)
    }
}
