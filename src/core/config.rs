//! Catalog configuration: `catalog.toml` under the store root, overridden by
//! the environment.

use crate::core::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "catalog.toml";
pub const DEFAULT_STORE_ROOT: &str = ".pixlise/data";

pub const ENV_STORE_ROOT: &str = "PIXLISE_CATALOG_DIR";
pub const ENV_ZENODO_URI: &str = "ZENODO_URI";
pub const ENV_ZENODO_ACCESS_TOKEN: &str = "ZENODO_ACCESS_TOKEN";
pub const ENV_ZENODO_TIMEOUT_SECS: &str = "ZENODO_TIMEOUT_SECS";
pub const ENV_MEMO_MAX_AGE_SEC: &str = "MEMOISATION_MAX_AGE_SEC";
pub const ENV_MEMO_GC_INTERVAL_SEC: &str = "MEMOISATION_GC_INTERVAL_SEC";
pub const ENV_LOG_FORMAT: &str = "PIXLISE_LOG_FORMAT";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    pub store_root: Option<PathBuf>,
    pub zenodo: ZenodoConfig,
    pub memoisation: MemoisationConfig,
    pub users: UsersConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ZenodoConfig {
    pub uri: Option<String>,
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ZenodoConfig {
    fn default() -> Self {
        Self {
            uri: None,
            access_token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoisationConfig {
    /// Items not read for longer than this are eligible for collection.
    pub max_age_sec: i64,
    pub gc_interval_sec: u64,
}

impl Default for MemoisationConfig {
    fn default() -> Self {
        Self {
            max_age_sec: 7 * 24 * 60 * 60,
            gc_interval_sec: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UsersConfig {
    pub cache_max_age_sec: i64,
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            cache_max_age_sec: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(CatalogError::Config(format!(
                "Unknown log format '{}' (expected compact, pretty or json)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl CatalogConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        toml::from_str(content).map_err(|e| CatalogError::Config(e.to_string()))
    }

    /// Load config for the given root (or the root named by the environment),
    /// then apply environment overrides.
    pub fn load(store_root: Option<&Path>) -> Result<Self, CatalogError> {
        let root = store_root
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(ENV_STORE_ROOT).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_ROOT));

        let mut config = Self::load_file(&root)?;
        config.apply_env_from(|key| env::var(key).ok())?;
        if let Some(explicit) = store_root {
            config.store_root = Some(explicit.to_path_buf());
        } else if config.store_root.is_none() {
            config.store_root = Some(root);
        }
        Ok(config)
    }

    /// Reads `<root>/catalog.toml`. A missing file yields the defaults.
    pub fn load_file(root: &Path) -> Result<Self, CatalogError> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
            .map_err(|e| CatalogError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply overrides from a variable lookup. Blank values count as unset.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), CatalogError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_STORE_ROOT) {
            self.store_root = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_ZENODO_URI) {
            self.zenodo.uri = Some(v);
        }
        if let Some(v) = get(ENV_ZENODO_ACCESS_TOKEN) {
            self.zenodo.access_token = Some(v);
        }
        if let Some(v) = get(ENV_ZENODO_TIMEOUT_SECS) {
            self.zenodo.timeout_secs = parse_number(ENV_ZENODO_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = get(ENV_MEMO_MAX_AGE_SEC) {
            self.memoisation.max_age_sec = parse_number(ENV_MEMO_MAX_AGE_SEC, &v)?;
        }
        if let Some(v) = get(ENV_MEMO_GC_INTERVAL_SEC) {
            self.memoisation.gc_interval_sec = parse_number(ENV_MEMO_GC_INTERVAL_SEC, &v)?;
        }
        if let Some(v) = get(ENV_LOG_FORMAT) {
            self.log.format = v.parse()?;
        }
        Ok(())
    }

    pub fn store_root(&self) -> PathBuf {
        self.store_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_ROOT))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, CatalogError> {
    value.trim().parse().map_err(|_| {
        CatalogError::Config(format!("{} must be a non-negative number, got '{}'", key, value))
    })
}
