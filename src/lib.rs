//! PIXLISE expression and module catalog.
//!
//! A versioned, multi-tenant store for user-authored *expressions* (small
//! programs evaluated over spectrometer scans) and *modules* (reusable
//! libraries with semantic-version chains), plus the pieces that sit around
//! it: DOI publication through Zenodo, a user directory used to refresh
//! creator snapshots, and a memoisation cache with a garbage collector.
//!
//! # Architecture
//!
//! ## The Thin Waist
//!
//! Every database round trip goes through [`core::broker::CatalogBroker`],
//! which checks the caller's [`core::cancel::RequestContext`], serializes
//! writes per database and traces the operation.
//!
//! ## Seams
//!
//! [`catalog::Catalog`] depends only on traits: the storage traits in
//! [`catalog::storage`], [`plugins::users::UserDirectory`],
//! [`plugins::zenodo::DoiPublisher`] and the clock/id providers in
//! [`core::time`]. Production wiring uses SQLite, Zenodo, the wall clock and
//! ULIDs.
//!
//! # Examples
//!
//! ```bash
//! pixlise-catalog init
//! pixlise-catalog user set 999 --name Peter --email p@x
//! pixlise-catalog module create --name Geo --source 'g()' --user-id 999
//! pixlise-catalog module add-version <id> --bump minor --source 'h()'
//! pixlise-catalog memo gc
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: store, broker, config, logging, cancellation, time
//! - [`catalog`]: expressions, modules, versions and the facade
//! - [`plugins`]: Zenodo publisher, user directory, memoisation

pub mod catalog;
mod cli;
pub mod core;
pub mod plugins;

use crate::catalog::Catalog;
use crate::catalog::commands;
use crate::cli::{Cli, Command};
use crate::core::cancel::RequestContext;
use crate::core::config::CatalogConfig;
use crate::core::error::CatalogError;
use crate::core::output;
use crate::core::store::Store;
use crate::core::telemetry;
use crate::core::time::{Clock, SystemClock};
use crate::plugins::memoisation::{MemoisationStore, run_memo_cli};
use crate::plugins::users::{SqliteUserDirectory, UserDirectory, run_user_cli};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

pub fn run() -> Result<(), CatalogError> {
    let cli = Cli::parse();

    let mut config = CatalogConfig::load(cli.store.as_deref())?;
    if let Some(format) = cli.log_format {
        config.log.format = format;
    }
    telemetry::init_logging(config.log.format);

    let ctx = match cli.timeout_secs {
        Some(secs) => RequestContext::with_timeout(Duration::from_secs(secs)),
        None => RequestContext::background(),
    };

    let store = Store::open(config.store_root())?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let users = Arc::new(SqliteUserDirectory::new(
        &store,
        Arc::clone(&clock),
        config.users.cache_max_age_sec,
    ));

    let open_catalog =
        || Catalog::open(&store, &config, Arc::clone(&users) as Arc<dyn UserDirectory>);

    match cli.command {
        Command::Init => {
            use colored::Colorize;
            eprintln!(
                "{} catalog ready at {}",
                "✓".bright_green(),
                store.root().display()
            );
            output::print_json(&serde_json::json!({"store": store.root()}))
        }
        Command::Expr(expr_cli) => {
            let catalog = open_catalog();
            commands::run_expr_cli(&catalog, users.as_ref(), &ctx, expr_cli)
        }
        Command::Module(module_cli) => {
            let catalog = open_catalog();
            commands::run_module_cli(&catalog, users.as_ref(), &ctx, module_cli)
        }
        Command::Doi(doi_cli) => {
            let catalog = open_catalog();
            commands::run_doi_cli(&catalog, &ctx, doi_cli)
        }
        Command::User(user_cli) => run_user_cli(&users, &ctx, user_cli),
        Command::Memo(memo_cli) => {
            let memo = MemoisationStore::new(&store, clock);
            run_memo_cli(&memo, &config.memoisation, &ctx, memo_cli)
        }
    }
}
