//! Logging setup. Events go to stderr so JSON command output on stdout stays clean.

use crate::core::config::LogFormat;
use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "PIXLISE_LOG";
const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber. Returns false if one was already installed.
pub fn init_logging(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let result = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
    result.is_ok()
}
