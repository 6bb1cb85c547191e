//! Storage seams for the catalog.
//!
//! The facade depends only on these traits, so tests can substitute a store
//! and the SQLite engine can be swapped without touching business rules.
//! Every method takes the caller's `RequestContext`; implementations check it
//! before each round trip.

use crate::catalog::expressions::{Expression, ExpressionExecStats};
use crate::catalog::modules::{Module, ModuleVersion};
use crate::catalog::semver::SemanticVersion;
use crate::core::cancel::RequestContext;
use crate::core::error::CatalogError;
use crate::plugins::zenodo::DoiMetadata;

pub trait ExpressionStorage: Send + Sync {
    /// Expressions created by `user_id`, plus every shared one when
    /// `include_shared` is set. Source code is elided.
    fn list_expressions(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        include_shared: bool,
    ) -> Result<Vec<Expression>, CatalogError>;

    fn get_expression(&self, ctx: &RequestContext, id: &str) -> Result<Expression, CatalogError>;

    fn insert_expression(&self, ctx: &RequestContext, expr: &Expression) -> Result<(), CatalogError>;

    /// Overwrites every mutable field, clears run stats and keeps any DOI
    /// metadata already attached. Returns the row as stored.
    fn replace_expression(
        &self,
        ctx: &RequestContext,
        expr: &Expression,
    ) -> Result<Expression, CatalogError>;

    fn set_recent_exec_stats(
        &self,
        ctx: &RequestContext,
        id: &str,
        stats: &ExpressionExecStats,
    ) -> Result<(), CatalogError>;

    fn set_expression_doi(
        &self,
        ctx: &RequestContext,
        id: &str,
        doi: &DoiMetadata,
    ) -> Result<(), CatalogError>;

    /// Deleting an absent id succeeds.
    fn delete_expression(&self, ctx: &RequestContext, id: &str) -> Result<(), CatalogError>;
}

pub trait ModuleStorage: Send + Sync {
    fn list_modules(&self, ctx: &RequestContext) -> Result<Vec<Module>, CatalogError>;

    fn get_module(&self, ctx: &RequestContext, id: &str) -> Result<Module, CatalogError>;

    fn insert_module(&self, ctx: &RequestContext, module: &Module) -> Result<(), CatalogError>;

    /// Removes a header and any versions under it. Used to compensate a
    /// failed create.
    fn delete_module(&self, ctx: &RequestContext, id: &str) -> Result<(), CatalogError>;
}

pub trait ModuleVersionStorage: Send + Sync {
    /// All versions of a module in ascending version order.
    fn list_module_versions(
        &self,
        ctx: &RequestContext,
        module_id: &str,
    ) -> Result<Vec<ModuleVersion>, CatalogError>;

    /// Highest version of a module. `NotFound` if it has none.
    fn latest_module_version(
        &self,
        ctx: &RequestContext,
        module_id: &str,
    ) -> Result<ModuleVersion, CatalogError>;

    fn get_module_version(
        &self,
        ctx: &RequestContext,
        module_id: &str,
        version: SemanticVersion,
    ) -> Result<ModuleVersion, CatalogError>;

    /// Fails with `AlreadyExists` if the derived version id is taken.
    fn insert_module_version(
        &self,
        ctx: &RequestContext,
        version: &ModuleVersion,
    ) -> Result<(), CatalogError>;
}

pub trait DoiStorage: Send + Sync {
    /// Records (or replaces) the DOI metadata for an expression id or module version id.
    fn put_doi(
        &self,
        ctx: &RequestContext,
        id: &str,
        doi: &DoiMetadata,
        recorded_unix_sec: i64,
    ) -> Result<(), CatalogError>;

    fn get_doi(&self, ctx: &RequestContext, id: &str) -> Result<DoiMetadata, CatalogError>;
}

/// Everything the catalog facade needs from a store.
pub trait CatalogStorage: ExpressionStorage + ModuleStorage + ModuleVersionStorage + DoiStorage {}

impl<T> CatalogStorage for T where T: ExpressionStorage + ModuleStorage + ModuleVersionStorage + DoiStorage {}
