//! Modules: named, versioned libraries referenced by expressions.
//!
//! A module header is written once. Code lives in its versions, which form
//! an append-only chain ordered by semantic version. Listing returns version
//! summaries without source; fetching one version returns its source.

use crate::catalog::model::{Origin, UserInfo, decode_json_column};
use crate::catalog::semver::{self, SemanticVersion, module_version_id};
use crate::catalog::sqlite::SqliteCatalogStore;
use crate::catalog::storage::{ModuleStorage, ModuleVersionStorage};
use crate::core::cancel::RequestContext;
use crate::core::error::CatalogError;
use crate::plugins::zenodo::{DoiMetadata, ZenodoError, ZenodoPublishResponse};
use regex::Regex;
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Comment stored on the version every module starts with.
pub const INITIAL_VERSION_COMMENT: &str = "Initial version";

static MODULE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]$|^[A-Za-z_]+[A-Za-z0-9_]*[A-Za-z0-9]$").unwrap()
});

/// Module names are imported into the evaluator as variables, so they must
/// be identifiers.
pub fn is_valid_module_name(name: &str) -> bool {
    MODULE_NAME.is_match(name)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModuleInput {
    pub name: String,
    pub source_code: String,
    pub comments: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi_metadata: Option<DoiMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModuleVersionInput {
    /// One of "", "patch", "minor", "major".
    pub version_update: String,
    pub source_code: String,
    pub comments: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi_metadata: Option<DoiMetadata>,
}

/// Module header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub name: String,
    pub comments: String,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleVersion {
    pub id: String,
    #[serde(rename = "moduleID")]
    pub module_id: String,
    pub source_code: String,
    pub version: SemanticVersion,
    pub tags: Vec<String>,
    pub comments: String,
    pub time_stamp_unix_sec: i64,
}

impl ModuleVersion {
    pub fn new(
        module_id: &str,
        version: SemanticVersion,
        source_code: String,
        comments: String,
        tags: Vec<String>,
        time_stamp_unix_sec: i64,
    ) -> Self {
        Self {
            id: module_version_id(module_id, version),
            module_id: module_id.to_string(),
            source_code,
            version,
            tags,
            comments,
            time_stamp_unix_sec,
        }
    }

    pub fn summary(&self) -> ModuleVersionSummary {
        ModuleVersionSummary {
            version: self.version,
            tags: self.tags.clone(),
            comments: self.comments.clone(),
            time_stamp_unix_sec: self.time_stamp_unix_sec,
        }
    }

    pub fn with_source(&self) -> ModuleVersionWithSource {
        ModuleVersionWithSource {
            source_code: self.source_code.clone(),
            summary: self.summary(),
        }
    }
}

/// A version as listed: no source code, version as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleVersionSummary {
    #[serde(with = "semver::as_string")]
    pub version: SemanticVersion,
    pub tags: Vec<String>,
    pub comments: String,
    pub time_stamp_unix_sec: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleVersionWithSource {
    pub source_code: String,
    #[serde(flatten)]
    pub summary: ModuleVersionSummary,
}

/// Header plus every version summary, as returned by listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleWire {
    #[serde(flatten)]
    pub module: Module,
    pub versions: Vec<ModuleVersionSummary>,
}

/// Header plus one version with its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpecificVersionWire {
    #[serde(flatten)]
    pub module: Module,
    pub version: ModuleVersionWithSource,
}

/// Result of a module write that may also have published a DOI. The write
/// has committed whatever `publication` says.
#[derive(Debug)]
pub struct ModuleWriteOutcome {
    pub module: ModuleSpecificVersionWire,
    pub publication: Option<Result<ZenodoPublishResponse, ZenodoError>>,
}

impl ModuleWriteOutcome {
    pub fn publish_error(&self) -> Option<&ZenodoError> {
        self.publication.as_ref().and_then(|r| r.as_ref().err())
    }
}

const MODULE_COLUMNS: &str = "id, name, comments, shared, creator_name, creator_user_id, creator_email,
    created_unix_time_sec, modified_unix_time_sec";

const VERSION_COLUMNS: &str =
    "id, module_id, major, minor, patch, source_code, tags, comments, time_stamp_unix_sec";

fn module_from_row(row: &Row<'_>) -> rusqlite::Result<Module> {
    Ok(Module {
        id: row.get(0)?,
        name: row.get(1)?,
        comments: row.get(2)?,
        origin: Origin {
            shared: row.get(3)?,
            creator: UserInfo {
                name: row.get(4)?,
                user_id: row.get(5)?,
                email: row.get(6)?,
            },
            created_unix_time_sec: row.get(7)?,
            modified_unix_time_sec: row.get(8)?,
        },
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<ModuleVersion> {
    let tags: String = row.get(6)?;
    Ok(ModuleVersion {
        id: row.get(0)?,
        module_id: row.get(1)?,
        version: SemanticVersion::new(row.get(2)?, row.get(3)?, row.get(4)?),
        source_code: row.get(5)?,
        tags: decode_json_column(6, &tags)?,
        comments: row.get(7)?,
        time_stamp_unix_sec: row.get(8)?,
    })
}

impl ModuleStorage for SqliteCatalogStore {
    fn list_modules(&self, ctx: &RequestContext) -> Result<Vec<Module>, CatalogError> {
        self.broker().read(ctx, "modules.list", |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM modules ORDER BY id", MODULE_COLUMNS))?;
            let rows = stmt.query_map([], module_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    fn get_module(&self, ctx: &RequestContext, id: &str) -> Result<Module, CatalogError> {
        self.broker().read(ctx, "modules.get", |conn| {
            conn.query_row(
                &format!("SELECT {} FROM modules WHERE id = ?1", MODULE_COLUMNS),
                params![id],
                module_from_row,
            )
            .map_err(|e| CatalogError::from_lookup(e, id))
        })
    }

    fn insert_module(&self, ctx: &RequestContext, module: &Module) -> Result<(), CatalogError> {
        self.broker().write(ctx, "modules.insert", |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO modules({}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    MODULE_COLUMNS
                ),
                params![
                    module.id,
                    module.name,
                    module.comments,
                    module.origin.shared,
                    module.origin.creator.name,
                    module.origin.creator.user_id,
                    module.origin.creator.email,
                    module.origin.created_unix_time_sec,
                    module.origin.modified_unix_time_sec,
                ],
            )
            .map_err(|e| CatalogError::from_insert(e, &module.id))?;
            Ok(())
        })
    }

    fn delete_module(&self, ctx: &RequestContext, id: &str) -> Result<(), CatalogError> {
        self.broker().write(ctx, "modules.delete", |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM module_versions WHERE module_id = ?1", params![id])?;
            tx.execute("DELETE FROM modules WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(())
        })
    }
}

impl ModuleVersionStorage for SqliteCatalogStore {
    fn list_module_versions(
        &self,
        ctx: &RequestContext,
        module_id: &str,
    ) -> Result<Vec<ModuleVersion>, CatalogError> {
        self.broker().read(ctx, "module_versions.list", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM module_versions WHERE module_id = ?1
                 ORDER BY major ASC, minor ASC, patch ASC",
                VERSION_COLUMNS
            ))?;
            let rows = stmt.query_map(params![module_id], version_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    fn latest_module_version(
        &self,
        ctx: &RequestContext,
        module_id: &str,
    ) -> Result<ModuleVersion, CatalogError> {
        self.broker().read(ctx, "module_versions.latest", |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM module_versions WHERE module_id = ?1
                     ORDER BY major DESC, minor DESC, patch DESC LIMIT 1",
                    VERSION_COLUMNS
                ),
                params![module_id],
                version_from_row,
            )
            .map_err(|e| CatalogError::from_lookup(e, format!("versions of module {}", module_id)))
        })
    }

    fn get_module_version(
        &self,
        ctx: &RequestContext,
        module_id: &str,
        version: SemanticVersion,
    ) -> Result<ModuleVersion, CatalogError> {
        let id = module_version_id(module_id, version);
        self.broker().read(ctx, "module_versions.get", |conn| {
            conn.query_row(
                &format!("SELECT {} FROM module_versions WHERE id = ?1", VERSION_COLUMNS),
                params![id],
                version_from_row,
            )
            .map_err(|e| CatalogError::from_lookup(e, id.as_str()))
        })
    }

    fn insert_module_version(
        &self,
        ctx: &RequestContext,
        version: &ModuleVersion,
    ) -> Result<(), CatalogError> {
        let tags = serde_json::to_string(&version.tags)?;
        self.broker().write(ctx, "module_versions.insert", |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO module_versions({}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    VERSION_COLUMNS
                ),
                params![
                    version.id,
                    version.module_id,
                    version.version.major,
                    version.version.minor,
                    version.version.patch,
                    version.source_code,
                    tags,
                    version.comments,
                    version.time_stamp_unix_sec,
                ],
            )
            .map_err(|e| CatalogError::from_insert(e, &version.id))?;
            Ok(())
        })
    }
}
