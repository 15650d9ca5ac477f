use std::path::{Path, PathBuf};

use serde::Deserialize;

// =============================================================================
// Fetch-related constants
// =============================================================================

/// Timeout for a single manifest fetch in milliseconds (30 seconds)
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;

/// Number of manifests fetched at the same time
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

/// Delay between starting each fetch request to avoid rate limiting (10ms)
pub const DEFAULT_FETCH_STAGGER_DELAY_MS: u64 = 10;

/// Interval at which the source list file is polled for edits (2 seconds)
pub const DEFAULT_WATCH_POLL_INTERVAL_MS: u64 = 2_000;

pub const DEFAULT_USER_AGENT: &str = "vpm-registry";

/// Source list written on first start
pub const DEFAULT_SOURCE: &str =
    "https://vpm.directus.app/assets/936917f9-c2d4-4470-a5bc-9bb38176fa01.json";

const APP_DIR_NAME: &str = "vpm-registry";

/// Resolver configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverConfig {
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub watch: WatchConfig,
    /// Whether resolution considers beta versions unless told otherwise
    pub allow_beta: bool,
}

impl ResolverConfig {
    /// Load configuration from a JSON file; a missing file yields defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Directory holding the manifest cache records
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .directory
            .clone()
            .unwrap_or_else(|| data_dir().join("repositories"))
    }
}

/// Cache-related configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Overrides the cache record directory
    pub directory: Option<PathBuf>,
}

/// Network fetch configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchConfig {
    pub timeout_ms: u64,
    pub max_concurrent: usize,
    pub stagger_delay_ms: u64,
    /// Use the last recorded manifest when a source cannot be fetched
    pub fallback_to_cache: bool,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            max_concurrent: DEFAULT_MAX_CONCURRENT_FETCHES,
            stagger_delay_ms: DEFAULT_FETCH_STAGGER_DELAY_MS,
            fallback_to_cache: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Source list watcher configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchConfig {
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_WATCH_POLL_INTERVAL_MS,
        }
    }
}

/// Returns the path to the data directory for vpm-registry.
/// Uses $XDG_DATA_HOME/vpm-registry if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/vpm-registry,
/// or ./vpm-registry if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the configuration file.
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Returns the path to the source list file.
pub fn sources_path() -> PathBuf {
    data_dir().join("repositories.json")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("vpm-registry.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join(APP_DIR_NAME)
}
