use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error fetching {locator}: {source}")]
    Network {
        locator: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Timed out fetching {locator} after {timeout_ms}ms")]
    Timeout { locator: String, timeout_ms: u64 },

    #[error("Unexpected status {status} fetching {locator}")]
    InvalidResponse { locator: String, status: u16 },

    #[error("No cache record for {0}")]
    NotCached(String),

    #[error("Failed to read cache record for {locator}: {source}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Malformed manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Manifest is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why one configured source did not fully refresh
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Fetched and decoded, but the cache record could not be written
    #[error(transparent)]
    Cache(#[from] CacheError),
}
