//! Expression records and their SQLite persistence.

use crate::catalog::model::{Origin, UserInfo, decode_json_column, decode_optional_json_column};
use crate::catalog::semver::SemanticVersion;
use crate::catalog::sqlite::SqliteCatalogStore;
use crate::catalog::storage::ExpressionStorage;
use crate::core::cancel::RequestContext;
use crate::core::error::CatalogError;
use crate::plugins::zenodo::DoiMetadata;
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SourceLanguage {
    #[serde(rename = "LUA")]
    Lua,
    #[default]
    #[serde(rename = "PIXLANG")]
    Pixlang,
}

impl SourceLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceLanguage::Lua => "LUA",
            SourceLanguage::Pixlang => "PIXLANG",
        }
    }
}

impl fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceLanguage {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LUA" => Ok(SourceLanguage::Lua),
            "PIXLANG" => Ok(SourceLanguage::Pixlang),
            _ => Err(CatalogError::InvalidInput(format!(
                "Unknown source language: {}",
                s
            ))),
        }
    }
}

/// A `(moduleID, version)` pair an expression depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleReference {
    #[serde(rename = "moduleID")]
    pub module_id: String,
    pub version: String,
}

/// Telemetry reported by the evaluator after a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExpressionExecStats {
    pub data_required: Vec<String>,
    pub runtime_ms: f64,
    pub timestamp_unix_sec: i64,
}

/// Caller-editable fields of an expression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExpressionInput {
    pub name: String,
    pub source_code: String,
    pub source_language: SourceLanguage,
    pub comments: String,
    pub tags: Vec<String>,
    pub module_references: Vec<ModuleReference>,
}

impl ExpressionInput {
    /// Every module reference must carry a full `M.m.p` version.
    pub fn validate_module_references(&self) -> Result<(), CatalogError> {
        for r in &self.module_references {
            if r.module_id.is_empty() {
                return Err(CatalogError::InvalidInput(
                    "Module reference has an empty module id".to_string(),
                ));
            }
            r.version.parse::<SemanticVersion>()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expression {
    pub id: String,
    pub name: String,
    pub source_code: String,
    pub source_language: SourceLanguage,
    pub comments: String,
    pub tags: Vec<String>,
    pub module_references: Vec<ModuleReference>,
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_exec_stats: Option<ExpressionExecStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi_metadata: Option<DoiMetadata>,
}

impl Expression {
    pub fn from_input(id: String, input: ExpressionInput, origin: Origin) -> Self {
        Self {
            id,
            name: input.name,
            source_code: input.source_code,
            source_language: input.source_language,
            comments: input.comments,
            tags: input.tags,
            module_references: input.module_references,
            origin,
            recent_exec_stats: None,
            doi_metadata: None,
        }
    }
}

const EXPRESSION_COLUMNS: &str = "id, name, source_code, source_language, comments, tags, module_references,
    shared, creator_name, creator_user_id, creator_email, created_unix_time_sec, modified_unix_time_sec,
    recent_exec_stats, doi_metadata";

/// `source_code` is selected as '' when listing.
const EXPRESSION_LIST_COLUMNS: &str = "id, name, '' AS source_code, source_language, comments, tags, module_references,
    shared, creator_name, creator_user_id, creator_email, created_unix_time_sec, modified_unix_time_sec,
    recent_exec_stats, doi_metadata";

fn expression_from_row(row: &Row<'_>) -> rusqlite::Result<Expression> {
    let language: String = row.get(3)?;
    let source_language = language.parse().map_err(|e: CatalogError| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let tags: String = row.get(5)?;
    let refs: String = row.get(6)?;
    Ok(Expression {
        id: row.get(0)?,
        name: row.get(1)?,
        source_code: row.get(2)?,
        source_language,
        comments: row.get(4)?,
        tags: decode_json_column(5, &tags)?,
        module_references: decode_json_column(6, &refs)?,
        origin: Origin {
            shared: row.get(7)?,
            creator: UserInfo {
                name: row.get(8)?,
                user_id: row.get(9)?,
                email: row.get(10)?,
            },
            created_unix_time_sec: row.get(11)?,
            modified_unix_time_sec: row.get(12)?,
        },
        recent_exec_stats: decode_optional_json_column(13, row.get(13)?)?,
        doi_metadata: decode_optional_json_column(14, row.get(14)?)?,
    })
}

fn select_expression(conn: &Connection, id: &str) -> Result<Expression, CatalogError> {
    conn.query_row(
        &format!("SELECT {} FROM expressions WHERE id = ?1", EXPRESSION_COLUMNS),
        params![id],
        expression_from_row,
    )
    .map_err(|e| CatalogError::from_lookup(e, id))
}

impl ExpressionStorage for SqliteCatalogStore {
    fn list_expressions(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        include_shared: bool,
    ) -> Result<Vec<Expression>, CatalogError> {
        self.broker().read(ctx, "expressions.list", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM expressions
                 WHERE creator_user_id = ?1 OR (?2 AND shared = 1)
                 ORDER BY id",
                EXPRESSION_LIST_COLUMNS
            ))?;
            let rows = stmt.query_map(params![user_id, include_shared], expression_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    fn get_expression(&self, ctx: &RequestContext, id: &str) -> Result<Expression, CatalogError> {
        self.broker()
            .read(ctx, "expressions.get", |conn| select_expression(conn, id))
    }

    fn insert_expression(&self, ctx: &RequestContext, expr: &Expression) -> Result<(), CatalogError> {
        let tags = serde_json::to_string(&expr.tags)?;
        let refs = serde_json::to_string(&expr.module_references)?;
        let stats = expr
            .recent_exec_stats
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let doi = expr
            .doi_metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.broker().write(ctx, "expressions.insert", |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO expressions({}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    EXPRESSION_COLUMNS
                ),
                params![
                    expr.id,
                    expr.name,
                    expr.source_code,
                    expr.source_language.as_str(),
                    expr.comments,
                    tags,
                    refs,
                    expr.origin.shared,
                    expr.origin.creator.name,
                    expr.origin.creator.user_id,
                    expr.origin.creator.email,
                    expr.origin.created_unix_time_sec,
                    expr.origin.modified_unix_time_sec,
                    stats,
                    doi,
                ],
            )
            .map_err(|e| CatalogError::from_insert(e, &expr.id))?;
            Ok(())
        })
    }

    fn replace_expression(
        &self,
        ctx: &RequestContext,
        expr: &Expression,
    ) -> Result<Expression, CatalogError> {
        let tags = serde_json::to_string(&expr.tags)?;
        let refs = serde_json::to_string(&expr.module_references)?;

        self.broker().write(ctx, "expressions.replace", |conn| {
            let tx = conn.unchecked_transaction()?;
            let changed = tx.execute(
                "UPDATE expressions SET
                    name = ?2, source_code = ?3, source_language = ?4, comments = ?5,
                    tags = ?6, module_references = ?7, shared = ?8,
                    creator_name = ?9, creator_user_id = ?10, creator_email = ?11,
                    created_unix_time_sec = ?12, modified_unix_time_sec = ?13,
                    recent_exec_stats = NULL
                 WHERE id = ?1",
                params![
                    expr.id,
                    expr.name,
                    expr.source_code,
                    expr.source_language.as_str(),
                    expr.comments,
                    tags,
                    refs,
                    expr.origin.shared,
                    expr.origin.creator.name,
                    expr.origin.creator.user_id,
                    expr.origin.creator.email,
                    expr.origin.created_unix_time_sec,
                    expr.origin.modified_unix_time_sec,
                ],
            )?;
            if changed == 0 {
                return Err(CatalogError::NotFound(expr.id.clone()));
            }
            let stored = select_expression(&tx, &expr.id)?;
            tx.commit()?;
            Ok(stored)
        })
    }

    fn set_recent_exec_stats(
        &self,
        ctx: &RequestContext,
        id: &str,
        stats: &ExpressionExecStats,
    ) -> Result<(), CatalogError> {
        let encoded = serde_json::to_string(stats)?;
        self.broker().write(ctx, "expressions.set_stats", |conn| {
            let changed = conn.execute(
                "UPDATE expressions SET recent_exec_stats = ?2 WHERE id = ?1",
                params![id, encoded],
            )?;
            if changed == 0 {
                return Err(CatalogError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }

    fn set_expression_doi(
        &self,
        ctx: &RequestContext,
        id: &str,
        doi: &DoiMetadata,
    ) -> Result<(), CatalogError> {
        let encoded = serde_json::to_string(doi)?;
        self.broker().write(ctx, "expressions.set_doi", |conn| {
            let changed = conn.execute(
                "UPDATE expressions SET doi_metadata = ?2 WHERE id = ?1",
                params![id, encoded],
            )?;
            if changed == 0 {
                return Err(CatalogError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }

    fn delete_expression(&self, ctx: &RequestContext, id: &str) -> Result<(), CatalogError> {
        self.broker().write(ctx, "expressions.delete", |conn| {
            let deleted = conn.execute("DELETE FROM expressions WHERE id = ?1", params![id])?;
            if deleted == 0 {
                tracing::debug!(id, "delete matched no expression");
            }
            Ok(())
        })
    }
}
