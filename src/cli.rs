//! CLI struct definitions for the pixlise-catalog command-line interface.
//!
//! Top-level clap types live here. Subsystem argument types live next to the
//! code they drive.

use crate::catalog::commands::{DoiCli, ExprCli, ModuleCli};
use crate::core::config::LogFormat;
use crate::plugins::memoisation::MemoCli;
use crate::plugins::users::UserCli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "pixlise-catalog",
    version = env!("CARGO_PKG_VERSION"),
    about = "Catalog of PIXLISE expressions and versioned modules, with Zenodo DOI publication and a memoisation cache."
)]
pub(crate) struct Cli {
    /// Store root holding catalog.db (defaults to $PIXLISE_CATALOG_DIR or ./.pixlise/data)
    #[clap(long, global = true)]
    pub store: Option<PathBuf>,
    /// Abort the command if it runs longer than this
    #[clap(long, global = true)]
    pub timeout_secs: Option<u64>,
    /// Log format on stderr
    #[clap(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create the store and its schema
    Init,
    /// Expressions
    Expr(ExprCli),
    /// Modules and their versions
    Module(ModuleCli),
    /// Recorded DOI publications
    Doi(DoiCli),
    /// User directory
    User(UserCli),
    /// Memoisation cache
    Memo(MemoCli),
}
