//! Reader configuration and its resolution.
//!
//! Resolution order: explicit path → `RB_CONFIG` → XDG config dir → defaults,
//! followed by per-setting environment overrides (`RB_CACHE_FORMAT`,
//! `RB_CACHE_SCOPE`, `RB_USE_CACHE`, `RB_PROGRESS`).

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rb_table::CacheFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BagError, Result};

/// Environment variable names.
pub const ENV_CONFIG_PATH: &str = "RB_CONFIG";
pub const ENV_CACHE_FORMAT: &str = "RB_CACHE_FORMAT";
pub const ENV_CACHE_SCOPE: &str = "RB_CACHE_SCOPE";
pub const ENV_USE_CACHE: &str = "RB_USE_CACHE";
pub const ENV_PROGRESS: &str = "RB_PROGRESS";

/// Standard config file name.
const CONFIG_FILENAME: &str = "config.json";

/// Application name for XDG directories.
const APP_NAME: &str = "rosbag2-tools";

/// Which topics get cache files after an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// Every extracted topic (default).
    #[default]
    AllTopics,
    /// Only the topic that was asked for.
    RequestedOnly,
}

impl FromStr for CacheScope {
    type Err = BagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all_topics" | "all" => Ok(CacheScope::AllTopics),
            "requested_only" | "requested" => Ok(CacheScope::RequestedOnly),
            _ => Err(BagError::InvalidSetting {
                name: "cache_scope".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for CacheScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheScope::AllTopics => write!(f, "all_topics"),
            CacheScope::RequestedOnly => write!(f, "requested_only"),
        }
    }
}

/// How chatty extraction progress is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressMode {
    /// Progress at debug level only.
    Off,
    /// One info line per topic (default).
    #[default]
    Topics,
    /// Per topic, plus one info line every `progress_interval` records.
    Records,
}

impl FromStr for ProgressMode {
    type Err = BagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(ProgressMode::Off),
            "topics" => Ok(ProgressMode::Topics),
            "records" => Ok(ProgressMode::Records),
            _ => Err(BagError::InvalidSetting {
                name: "progress".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Bag reader settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BagConfig {
    /// Format used for cache lookups and writes.
    pub cache_format: CacheFormat,
    pub cache_scope: CacheScope,
    /// Serve tables from existing cache files.
    pub use_cache: bool,
    pub progress: ProgressMode,
    /// Records between progress lines in [`ProgressMode::Records`].
    pub progress_interval: u64,
}

impl Default for BagConfig {
    fn default() -> Self {
        BagConfig {
            cache_format: CacheFormat::Parquet,
            cache_scope: CacheScope::AllTopics,
            use_cache: true,
            progress: ProgressMode::Topics,
            progress_interval: 1000,
        }
    }
}

impl BagConfig {
    /// Load from a JSON file; absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| BagError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_cache_format(mut self, format: CacheFormat) -> Self {
        self.cache_format = format;
        self
    }

    pub fn with_cache_scope(mut self, scope: CacheScope) -> Self {
        self.cache_scope = scope;
        self
    }

    pub fn with_use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    pub fn with_progress(mut self, progress: ProgressMode) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    /// Apply `RB_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CACHE_FORMAT) {
            self.cache_format = value.parse()?;
        }
        if let Some(value) = lookup(ENV_CACHE_SCOPE) {
            self.cache_scope = value.parse()?;
        }
        if let Some(value) = lookup(ENV_USE_CACHE) {
            self.use_cache = parse_bool(ENV_USE_CACHE, &value)?;
        }
        if let Some(value) = lookup(ENV_PROGRESS) {
            self.progress = value.parse()?;
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BagError::InvalidSetting {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Path passed by the caller.
    ExplicitPath,

    /// Path from `RB_CONFIG`.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::ExplicitPath => write!(f, "explicit path"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// A resolved configuration and where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub config: BagConfig,
    pub source: ConfigSource,
    pub path: Option<PathBuf>,
}

/// Resolve configuration from the process environment.
pub fn resolve_config(explicit: Option<&Path>) -> Result<ResolvedConfig> {
    resolve_config_with(explicit, |name| std::env::var(name).ok(), xdg_config_dir())
}

/// Resolve configuration with an injected environment and XDG directory.
///
/// An explicit path must exist. A missing `RB_CONFIG` target is skipped with
/// a warning, as is a missing XDG file (silently).
pub fn resolve_config_with<F>(
    explicit: Option<&Path>,
    lookup: F,
    xdg_dir: Option<PathBuf>,
) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let (path, source) = match explicit {
        Some(path) if path.is_file() => (Some(path.to_path_buf()), ConfigSource::ExplicitPath),
        Some(path) => return Err(BagError::NotFound(path.to_path_buf())),
        None => discover(&lookup, xdg_dir),
    };

    let mut config = match &path {
        Some(path) => BagConfig::load(path)?,
        None => BagConfig::default(),
    };
    config.apply_env_overrides(&lookup)?;

    debug!(
        source = %source,
        path = ?path,
        cache_format = %config.cache_format,
        cache_scope = %config.cache_scope,
        use_cache = config.use_cache,
        "Resolved bag reader config"
    );
    Ok(ResolvedConfig {
        config,
        source,
        path,
    })
}

fn discover<F>(lookup: &F, xdg_dir: Option<PathBuf>) -> (Option<PathBuf>, ConfigSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(env_path) = lookup(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.is_file() {
            return (Some(path), ConfigSource::Environment);
        }
        warn!(path = %path.display(), "{ENV_CONFIG_PATH} points to a missing file; ignoring it");
    }

    if let Some(dir) = xdg_dir {
        let path = dir.join(CONFIG_FILENAME);
        if path.is_file() {
            return (Some(path), ConfigSource::XdgConfig);
        }
    }

    (None, ConfigSource::BuiltinDefault)
}

/// Get the XDG config directory for rosbag2-tools.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}
