//! `expr`, `module` and `doi` subcommands.

use crate::catalog::expressions::{ExpressionExecStats, ExpressionInput, ModuleReference, SourceLanguage};
use crate::catalog::model::UserInfo;
use crate::catalog::modules::{ModuleInput, ModuleVersionInput, ModuleWriteOutcome};
use crate::catalog::Catalog;
use crate::catalog::semver::SemanticVersion;
use crate::core::cancel::RequestContext;
use crate::core::error::CatalogError;
use crate::core::output;
use crate::core::time::{Clock, SystemClock};
use crate::plugins::users::UserDirectory;
use crate::plugins::zenodo::DoiMetadata;
use clap::{Args, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

/// Identifies the acting user. Without `--user-name` the directory supplies the details.
#[derive(Args, Debug, Clone)]
pub struct CreatorArgs {
    #[clap(long = "user-id")]
    pub user_id: String,
    #[clap(long = "user-name")]
    pub user_name: Option<String>,
    #[clap(long = "user-email")]
    pub user_email: Option<String>,
}

impl CreatorArgs {
    pub fn resolve(
        &self,
        ctx: &RequestContext,
        users: &dyn UserDirectory,
    ) -> Result<UserInfo, CatalogError> {
        if let Some(name) = &self.user_name {
            return Ok(UserInfo::new(
                name.clone(),
                self.user_id.clone(),
                self.user_email.clone().unwrap_or_default(),
            ));
        }
        let found = users.lookup(ctx, &self.user_id).map_err(|e| {
            if e.is_not_found() {
                CatalogError::InvalidInput(format!(
                    "Unknown user {}; pass --user-name or run `user set`",
                    self.user_id
                ))
            } else {
                e
            }
        })?;
        Ok(UserInfo::new(
            found.name,
            self.user_id.clone(),
            self.user_email.clone().unwrap_or(found.email),
        ))
    }
}

/// Source text given inline or read from a file.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    #[clap(long, conflicts_with = "source_file")]
    pub source: Option<String>,
    #[clap(long = "source-file")]
    pub source_file: Option<PathBuf>,
}

impl SourceArgs {
    fn read(&self) -> Result<String, CatalogError> {
        match (&self.source, &self.source_file) {
            (Some(s), _) => Ok(s.clone()),
            (None, Some(path)) => Ok(fs::read_to_string(path)?),
            (None, None) => Ok(String::new()),
        }
    }
}

#[derive(Args, Debug)]
pub struct ExprCli {
    #[clap(subcommand)]
    pub command: ExprCommand,
}

#[derive(Subcommand, Debug)]
pub enum ExprCommand {
    /// List a user's expressions (and shared ones with --include-shared)
    List {
        #[clap(long = "user-id")]
        user_id: String,
        #[clap(long)]
        include_shared: bool,
        #[clap(long)]
        refresh_creator: bool,
        /// One line per expression instead of JSON
        #[clap(long)]
        text: bool,
    },
    /// Show one expression with its source
    Get {
        id: String,
        #[clap(long)]
        refresh_creator: bool,
    },
    Create {
        #[clap(long)]
        name: String,
        #[clap(flatten)]
        source: SourceArgs,
        #[clap(long, default_value = "PIXLANG")]
        language: String,
        #[clap(long, default_value = "")]
        comments: String,
        #[clap(long = "tag")]
        tags: Vec<String>,
        /// `<moduleID>@<major>.<minor>.<patch>`, repeatable
        #[clap(long = "module-ref")]
        module_refs: Vec<String>,
        #[clap(long)]
        shared: bool,
        #[clap(flatten)]
        creator: CreatorArgs,
    },
    /// Replace an expression. Omitted source keeps the stored source.
    Update {
        id: String,
        #[clap(long)]
        name: String,
        #[clap(flatten)]
        source: SourceArgs,
        #[clap(long, default_value = "PIXLANG")]
        language: String,
        #[clap(long, default_value = "")]
        comments: String,
        #[clap(long = "tag")]
        tags: Vec<String>,
        #[clap(long = "module-ref")]
        module_refs: Vec<String>,
        #[clap(flatten)]
        creator: CreatorArgs,
    },
    /// Record evaluator telemetry for an expression
    Stats {
        id: String,
        #[clap(long)]
        runtime_ms: f64,
        #[clap(long = "data-required")]
        data_required: Vec<String>,
    },
    Delete { id: String },
    /// Deposit a zip of the expression and record the DOI
    Publish {
        id: String,
        #[clap(long)]
        zip: PathBuf,
        /// JSON file holding the DOI metadata
        #[clap(long)]
        metadata: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct ModuleCli {
    #[clap(subcommand)]
    pub command: ModuleCommand,
}

#[derive(Subcommand, Debug)]
pub enum ModuleCommand {
    List {
        #[clap(long)]
        refresh_creator: bool,
        #[clap(long)]
        text: bool,
    },
    /// Show one version (latest by default) with source
    Get {
        id: String,
        #[clap(long)]
        version: Option<String>,
        #[clap(long)]
        refresh_creator: bool,
    },
    Create {
        #[clap(long)]
        name: String,
        #[clap(flatten)]
        source: SourceArgs,
        #[clap(long, default_value = "")]
        comments: String,
        #[clap(long = "tag")]
        tags: Vec<String>,
        #[clap(flatten)]
        creator: CreatorArgs,
        #[clap(long)]
        publish_doi: bool,
        /// JSON file holding DOI metadata; derived from the module if omitted
        #[clap(long)]
        metadata: Option<PathBuf>,
    },
    /// Append a version bumped from the latest
    AddVersion {
        id: String,
        /// patch, minor or major
        #[clap(long, default_value = "")]
        bump: String,
        #[clap(flatten)]
        source: SourceArgs,
        #[clap(long, default_value = "")]
        comments: String,
        #[clap(long = "tag")]
        tags: Vec<String>,
        #[clap(long)]
        publish_doi: bool,
        #[clap(long)]
        metadata: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct DoiCli {
    #[clap(subcommand)]
    pub command: DoiCommand,
}

#[derive(Subcommand, Debug)]
pub enum DoiCommand {
    /// Show the DOI recorded for an expression id or module version id
    Get { id: String },
}

fn parse_module_refs(raw: &[String]) -> Result<Vec<ModuleReference>, CatalogError> {
    raw.iter()
        .map(|r| {
            let (module_id, version) = r.rsplit_once('@').ok_or_else(|| {
                CatalogError::InvalidInput(format!(
                    "Module reference '{}' must look like <moduleID>@<version>",
                    r
                ))
            })?;
            Ok(ModuleReference {
                module_id: module_id.to_string(),
                version: version.to_string(),
            })
        })
        .collect()
}

fn read_metadata(path: &Path) -> Result<DoiMetadata, CatalogError> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn report_module_write(outcome: &ModuleWriteOutcome) -> Result<(), CatalogError> {
    if let Some(e) = outcome.publish_error() {
        output::warn(&format!("module saved but DOI publication failed: {}", e));
    }
    output::print_json(&outcome.module)
}

pub fn run_expr_cli(
    catalog: &Catalog,
    users: &dyn UserDirectory,
    ctx: &RequestContext,
    cli: ExprCli,
) -> Result<(), CatalogError> {
    match cli.command {
        ExprCommand::List {
            user_id,
            include_shared,
            refresh_creator,
            text,
        } => {
            let items = catalog.list_expressions(ctx, &user_id, include_shared, refresh_creator)?;
            if text {
                for (id, e) in &items {
                    let shared = if e.origin.shared { "shared" } else { "private" };
                    println!(
                        "{}",
                        output::render_row(id, &e.name, &format!("{} {} {}", e.source_language, shared, e.comments))
                    );
                }
                Ok(())
            } else {
                output::print_json(&items)
            }
        }
        ExprCommand::Get {
            id,
            refresh_creator,
        } => output::print_json(&catalog.get_expression(ctx, &id, refresh_creator)?),
        ExprCommand::Create {
            name,
            source,
            language,
            comments,
            tags,
            module_refs,
            shared,
            creator,
        } => {
            let input = ExpressionInput {
                name,
                source_code: source.read()?,
                source_language: language.parse::<SourceLanguage>()?,
                comments,
                tags,
                module_references: parse_module_refs(&module_refs)?,
            };
            let creator = creator.resolve(ctx, users)?;
            output::print_json(&catalog.create_expression(ctx, input, &creator, shared)?)
        }
        ExprCommand::Update {
            id,
            name,
            source,
            language,
            comments,
            tags,
            module_refs,
            creator,
        } => {
            let existing = catalog.get_expression(ctx, &id, false)?;
            let input = ExpressionInput {
                name,
                source_code: source.read()?,
                source_language: language.parse::<SourceLanguage>()?,
                comments,
                tags,
                module_references: parse_module_refs(&module_refs)?,
            };
            let creator = creator.resolve(ctx, users)?;
            let updated = catalog.update_expression(
                ctx,
                &id,
                input,
                &creator,
                existing.origin.created_unix_time_sec,
                existing.origin.shared,
                &existing.source_code,
            )?;
            output::print_json(&updated)
        }
        ExprCommand::Stats {
            id,
            runtime_ms,
            data_required,
        } => {
            let stats = ExpressionExecStats {
                data_required,
                runtime_ms,
                timestamp_unix_sec: SystemClock.now_unix_sec(),
            };
            catalog.store_expression_recent_run_stats(ctx, &id, &stats)?;
            output::print_json(&serde_json::json!({"id": id, "recentExecStats": stats}))
        }
        ExprCommand::Delete { id } => {
            catalog.delete_expression(ctx, &id)?;
            output::print_json(&serde_json::json!({"id": id, "deleted": true}))
        }
        ExprCommand::Publish { id, zip, metadata } => {
            let bytes = fs::read(&zip)?;
            let metadata = read_metadata(&metadata)?;
            output::print_json(&catalog.publish_expression_to_zenodo(ctx, &id, bytes, &metadata)?)
        }
    }
}

pub fn run_module_cli(
    catalog: &Catalog,
    users: &dyn UserDirectory,
    ctx: &RequestContext,
    cli: ModuleCli,
) -> Result<(), CatalogError> {
    match cli.command {
        ModuleCommand::List {
            refresh_creator,
            text,
        } => {
            let modules = catalog.list_modules(ctx, refresh_creator)?;
            if text {
                for (id, m) in &modules {
                    let latest = m
                        .versions
                        .last()
                        .map(|v| v.version.to_string())
                        .unwrap_or_default();
                    println!(
                        "{}",
                        output::render_row(id, &m.module.name, &format!("v{} ({} versions)", latest, m.versions.len()))
                    );
                }
                Ok(())
            } else {
                output::print_json(&modules)
            }
        }
        ModuleCommand::Get {
            id,
            version,
            refresh_creator,
        } => {
            let version = version
                .as_deref()
                .map(str::parse::<SemanticVersion>)
                .transpose()?;
            output::print_json(&catalog.get_module(ctx, &id, version, refresh_creator)?)
        }
        ModuleCommand::Create {
            name,
            source,
            comments,
            tags,
            creator,
            publish_doi,
            metadata,
        } => {
            let input = ModuleInput {
                name,
                source_code: source.read()?,
                comments,
                tags,
                doi_metadata: metadata.as_deref().map(read_metadata).transpose()?,
            };
            let creator = creator.resolve(ctx, users)?;
            report_module_write(&catalog.create_module(ctx, input, &creator, publish_doi)?)
        }
        ModuleCommand::AddVersion {
            id,
            bump,
            source,
            comments,
            tags,
            publish_doi,
            metadata,
        } => {
            let input = ModuleVersionInput {
                version_update: bump,
                source_code: source.read()?,
                comments,
                tags,
                doi_metadata: metadata.as_deref().map(read_metadata).transpose()?,
            };
            report_module_write(&catalog.add_module_version(ctx, &id, input, publish_doi)?)
        }
    }
}

pub fn run_doi_cli(catalog: &Catalog, ctx: &RequestContext, cli: DoiCli) -> Result<(), CatalogError> {
    match cli.command {
        DoiCommand::Get { id } => output::print_json(&catalog.get_doi(ctx, &id)?),
    }
}
