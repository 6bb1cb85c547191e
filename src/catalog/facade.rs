//! The catalog facade: business rules over the storage traits.
//!
//! Every operation is self-contained. The facade holds handles to the store,
//! the user directory, the DOI publisher and the injected clock/id providers,
//! and nothing else.

use crate::catalog::expressions::{Expression, ExpressionExecStats, ExpressionInput};
use crate::catalog::model::{Origin, UserInfo};
use crate::catalog::modules::{
    INITIAL_VERSION_COMMENT, Module, ModuleInput, ModuleSpecificVersionWire, ModuleVersion,
    ModuleVersionInput, ModuleWire, ModuleWriteOutcome, is_valid_module_name,
};
use crate::catalog::semver::{SemanticVersion, VersionBump};
use crate::catalog::sqlite::SqliteCatalogStore;
use crate::catalog::storage::CatalogStorage;
use crate::core::cancel::RequestContext;
use crate::core::config::CatalogConfig;
use crate::core::error::CatalogError;
use crate::core::store::Store;
use crate::core::time::{Clock, IdGenerator, SystemClock, UlidIdGenerator};
use crate::plugins::users::UserDirectory;
use crate::plugins::zenodo::{DoiArtifact, DoiCreator, DoiMetadata, DoiPublisher, ZenodoPublisher};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct Catalog {
    store: Arc<dyn CatalogStorage>,
    users: Arc<dyn UserDirectory>,
    publisher: Arc<dyn DoiPublisher>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl Catalog {
    pub fn new(
        store: Arc<dyn CatalogStorage>,
        users: Arc<dyn UserDirectory>,
        publisher: Arc<dyn DoiPublisher>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            users,
            publisher,
            clock,
            ids,
        }
    }

    /// Production wiring: SQLite store, Zenodo publisher, wall clock, ULIDs.
    /// The user directory is shared with the caller so its cache is too.
    pub fn open(store: &Store, config: &CatalogConfig, users: Arc<dyn UserDirectory>) -> Self {
        Self::new(
            Arc::new(SqliteCatalogStore::new(store)),
            users,
            Arc::new(ZenodoPublisher::new(config.zenodo.clone())),
            Arc::new(SystemClock),
            Arc::new(UlidIdGenerator),
        )
    }

    /// Swap in the current `{name, email}` for the stored user id. Lookup
    /// failures keep the stored snapshot; only cancellation is returned.
    fn refresh_creator(&self, ctx: &RequestContext, origin: &mut Origin) -> Result<(), CatalogError> {
        match self.users.lookup(ctx, &origin.creator.user_id) {
            Ok(details) => {
                origin.creator.name = details.name;
                origin.creator.email = details.email;
                Ok(())
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                tracing::info!(
                    user_id = %origin.creator.user_id,
                    error = %e,
                    "failed to refresh creator, keeping stored snapshot"
                );
                Ok(())
            }
        }
    }

    pub fn list_expressions(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        include_shared: bool,
        refresh_creator: bool,
    ) -> Result<BTreeMap<String, Expression>, CatalogError> {
        let items = self.store.list_expressions(ctx, user_id, include_shared)?;
        let mut result = BTreeMap::new();
        for mut item in items {
            if refresh_creator {
                self.refresh_creator(ctx, &mut item.origin)?;
            }
            result.insert(item.id.clone(), item);
        }
        Ok(result)
    }

    pub fn get_expression(
        &self,
        ctx: &RequestContext,
        id: &str,
        refresh_creator: bool,
    ) -> Result<Expression, CatalogError> {
        let mut expr = self.store.get_expression(ctx, id)?;
        if refresh_creator {
            self.refresh_creator(ctx, &mut expr.origin)?;
        }
        Ok(expr)
    }

    pub fn create_expression(
        &self,
        ctx: &RequestContext,
        input: ExpressionInput,
        creator: &UserInfo,
        create_shared: bool,
    ) -> Result<Expression, CatalogError> {
        if input.source_code.is_empty() {
            return Err(CatalogError::InvalidInput(
                "Expression source code must not be empty".to_string(),
            ));
        }
        input.validate_module_references()?;

        let now = self.clock.now_unix_sec();
        let expr = Expression::from_input(
            self.ids.new_id(),
            input,
            Origin {
                shared: create_shared,
                creator: creator.clone(),
                created_unix_time_sec: now,
                modified_unix_time_sec: now,
            },
        );
        self.store.insert_expression(ctx, &expr)?;
        tracing::info!(id = %expr.id, user_id = %creator.user_id, "expression created");
        Ok(expr)
    }

    /// Replaces an expression wholesale. An empty `input.source_code` falls
    /// back to `existing_source_code`. `created_unix_sec` and `is_shared`
    /// come from the caller's prior read.
    #[allow(clippy::too_many_arguments)]
    pub fn update_expression(
        &self,
        ctx: &RequestContext,
        id: &str,
        mut input: ExpressionInput,
        creator: &UserInfo,
        created_unix_sec: i64,
        is_shared: bool,
        existing_source_code: &str,
    ) -> Result<Expression, CatalogError> {
        if input.source_code.is_empty() {
            input.source_code = existing_source_code.to_string();
        }
        if input.source_code.is_empty() {
            return Err(CatalogError::InvalidInput(format!(
                "Expression {} has no source code",
                id
            )));
        }
        input.validate_module_references()?;

        let expr = Expression::from_input(
            id.to_string(),
            input,
            Origin {
                shared: is_shared,
                creator: creator.clone(),
                created_unix_time_sec: created_unix_sec,
                modified_unix_time_sec: self.clock.now_unix_sec(),
            },
        );
        self.store.replace_expression(ctx, &expr)
    }

    pub fn store_expression_recent_run_stats(
        &self,
        ctx: &RequestContext,
        id: &str,
        stats: &ExpressionExecStats,
    ) -> Result<(), CatalogError> {
        self.store.set_recent_exec_stats(ctx, id, stats)
    }

    pub fn delete_expression(&self, ctx: &RequestContext, id: &str) -> Result<(), CatalogError> {
        self.store.delete_expression(ctx, id)
    }

    /// Deposits `zip_bytes` as `<id>.zip` and records the assigned DOI on the
    /// expression and in the DOI collection.
    pub fn publish_expression_to_zenodo(
        &self,
        ctx: &RequestContext,
        id: &str,
        zip_bytes: Vec<u8>,
        metadata: &DoiMetadata,
    ) -> Result<Expression, CatalogError> {
        let mut expr = self.store.get_expression(ctx, id)?;
        let artifact = DoiArtifact {
            filename: format!("{}.zip", id),
            bytes: zip_bytes,
        };
        let published = self.publisher.publish(ctx, &artifact, metadata)?;

        let doi = metadata.with_publication(&published);
        self.store.set_expression_doi(ctx, id, &doi)?;
        self.store
            .put_doi(ctx, id, &doi, self.clock.now_unix_sec())?;
        tracing::info!(id, doi = %doi.doi, "expression published");

        expr.doi_metadata = Some(doi);
        Ok(expr)
    }

    /// Every module with its version summaries. A module without versions
    /// fails the whole listing.
    pub fn list_modules(
        &self,
        ctx: &RequestContext,
        refresh_creator: bool,
    ) -> Result<BTreeMap<String, ModuleWire>, CatalogError> {
        let headers = self.store.list_modules(ctx)?;
        let mut result = BTreeMap::new();
        for mut module in headers {
            let versions = self.store.list_module_versions(ctx, &module.id)?;
            if versions.is_empty() {
                let msg = format!("No versions for module {}", module.id);
                tracing::error!(module_id = %module.id, "{}", msg);
                return Err(CatalogError::InvariantViolation(msg));
            }
            if refresh_creator {
                self.refresh_creator(ctx, &mut module.origin)?;
            }
            result.insert(
                module.id.clone(),
                ModuleWire {
                    versions: versions.iter().map(ModuleVersion::summary).collect(),
                    module,
                },
            );
        }
        Ok(result)
    }

    /// One version of a module with its source; the latest if `version` is `None`.
    pub fn get_module(
        &self,
        ctx: &RequestContext,
        id: &str,
        version: Option<SemanticVersion>,
        refresh_creator: bool,
    ) -> Result<ModuleSpecificVersionWire, CatalogError> {
        let mut module = self.store.get_module(ctx, id)?;
        let version = match version {
            Some(v) => v,
            None => self.store.latest_module_version(ctx, id)?.version,
        };
        let found = self.store.get_module_version(ctx, id, version)?;
        if refresh_creator {
            self.refresh_creator(ctx, &mut module.origin)?;
        }
        Ok(ModuleSpecificVersionWire {
            module,
            version: found.with_source(),
        })
    }

    /// Writes the header and its `0.0.1` version. If the version write fails
    /// the header is deleted again.
    pub fn create_module(
        &self,
        ctx: &RequestContext,
        input: ModuleInput,
        creator: &UserInfo,
        publish_doi: bool,
    ) -> Result<ModuleWriteOutcome, CatalogError> {
        if !is_valid_module_name(&input.name) {
            return Err(CatalogError::InvalidInput(format!(
                "Invalid module name: {}",
                input.name
            )));
        }

        let now = self.clock.now_unix_sec();
        let module = Module {
            id: self.ids.new_id(),
            name: input.name,
            comments: input.comments,
            origin: Origin {
                shared: true,
                creator: creator.clone(),
                created_unix_time_sec: now,
                modified_unix_time_sec: now,
            },
        };
        self.store.insert_module(ctx, &module)?;

        let version = ModuleVersion::new(
            &module.id,
            SemanticVersion::INITIAL,
            input.source_code,
            INITIAL_VERSION_COMMENT.to_string(),
            input.tags,
            now,
        );
        if let Err(e) = self.store.insert_module_version(ctx, &version) {
            if let Err(rollback) = self.store.delete_module(ctx, &module.id) {
                tracing::error!(
                    module_id = %module.id,
                    error = %rollback,
                    "failed to delete module header after version insert failed"
                );
            }
            return Err(e);
        }
        tracing::info!(module_id = %module.id, name = %module.name, "module created");

        let wire = ModuleSpecificVersionWire {
            module,
            version: version.with_source(),
        };
        self.finish_module_write(ctx, wire, &version, input.doi_metadata, publish_doi)
    }

    /// Appends a version bumped from the current latest by the selector.
    pub fn add_module_version(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: ModuleVersionInput,
        publish_doi: bool,
    ) -> Result<ModuleWriteOutcome, CatalogError> {
        let bump: VersionBump = input.version_update.parse()?;
        let module = self.store.get_module(ctx, id)?;

        let latest = match self.store.latest_module_version(ctx, id) {
            Ok(v) => v,
            Err(e) if e.is_not_found() => {
                let msg = format!("No versions for module {}", id);
                tracing::error!(module_id = id, "{}", msg);
                return Err(CatalogError::InvariantViolation(msg));
            }
            Err(e) => return Err(e),
        };

        let version = ModuleVersion::new(
            id,
            latest.version.bump(bump)?,
            input.source_code,
            input.comments,
            input.tags,
            self.clock.now_unix_sec(),
        );
        self.store.insert_module_version(ctx, &version)?;
        tracing::info!(module_id = id, version = %version.version, "module version added");

        let wire = ModuleSpecificVersionWire {
            module,
            version: version.with_source(),
        };
        self.finish_module_write(ctx, wire, &version, input.doi_metadata, publish_doi)
    }

    fn finish_module_write(
        &self,
        ctx: &RequestContext,
        wire: ModuleSpecificVersionWire,
        version: &ModuleVersion,
        metadata: Option<DoiMetadata>,
        publish_doi: bool,
    ) -> Result<ModuleWriteOutcome, CatalogError> {
        if !publish_doi {
            return Ok(ModuleWriteOutcome {
                module: wire,
                publication: None,
            });
        }

        let metadata = metadata.unwrap_or_else(|| default_module_metadata(&wire));
        let artifact = DoiArtifact {
            filename: format!("{}.json", wire.module.id),
            bytes: serde_json::to_vec(&wire)?,
        };
        let publication = self.publisher.publish(ctx, &artifact, &metadata);
        match &publication {
            Ok(published) => {
                let doi = metadata.with_publication(published);
                if let Err(e) =
                    self.store
                        .put_doi(ctx, &version.id, &doi, self.clock.now_unix_sec())
                {
                    tracing::error!(version_id = %version.id, error = %e, "failed to record module DOI");
                }
            }
            Err(e) => {
                tracing::error!(version_id = %version.id, error = %e, "module DOI publication failed");
            }
        }

        Ok(ModuleWriteOutcome {
            module: wire,
            publication: Some(publication),
        })
    }

    pub fn get_doi(&self, ctx: &RequestContext, id: &str) -> Result<DoiMetadata, CatalogError> {
        self.store.get_doi(ctx, id)
    }
}

/// Metadata used when a module is published without any supplied.
pub fn default_module_metadata(wire: &ModuleSpecificVersionWire) -> DoiMetadata {
    let module = &wire.module;
    let version = wire.version.summary.version.to_string();
    let description = if module.comments.is_empty() {
        module.name.clone()
    } else {
        module.comments.clone()
    };
    let creators = if module.origin.creator.name.is_empty() {
        Vec::new()
    } else {
        vec![DoiCreator {
            name: module.origin.creator.name.clone(),
            ..Default::default()
        }]
    };
    DoiMetadata {
        title: format!("{} v{}", module.name, version),
        description,
        creators,
        keywords: wire.version.summary.tags.join(","),
        version,
        ..Default::default()
    }
}
