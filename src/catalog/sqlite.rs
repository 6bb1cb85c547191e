//! SQLite-backed catalog store.
//!
//! The storage traits are implemented next to the record types they persist
//! (`expressions.rs`, `modules.rs`); DOI records live here.

use crate::catalog::storage::DoiStorage;
use crate::core::broker::CatalogBroker;
use crate::core::cancel::RequestContext;
use crate::core::error::CatalogError;
use crate::core::store::Store;
use crate::plugins::zenodo::DoiMetadata;
use rusqlite::params;

#[derive(Debug, Clone)]
pub struct SqliteCatalogStore {
    broker: CatalogBroker,
}

impl SqliteCatalogStore {
    pub fn new(store: &Store) -> Self {
        Self {
            broker: store.broker(),
        }
    }

    pub(crate) fn broker(&self) -> &CatalogBroker {
        &self.broker
    }
}

impl DoiStorage for SqliteCatalogStore {
    fn put_doi(
        &self,
        ctx: &RequestContext,
        id: &str,
        doi: &DoiMetadata,
        recorded_unix_sec: i64,
    ) -> Result<(), CatalogError> {
        let encoded = serde_json::to_string(doi)?;
        self.broker.write(ctx, "dois.put", |conn| {
            conn.execute(
                "INSERT INTO dois(id, metadata, recorded_unix_sec) VALUES(?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    metadata = excluded.metadata,
                    recorded_unix_sec = excluded.recorded_unix_sec",
                params![id, encoded, recorded_unix_sec],
            )?;
            Ok(())
        })
    }

    fn get_doi(&self, ctx: &RequestContext, id: &str) -> Result<DoiMetadata, CatalogError> {
        let raw: String = self.broker.read(ctx, "dois.get", |conn| {
            conn.query_row(
                "SELECT metadata FROM dois WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| CatalogError::from_lookup(e, id))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}
