//! Per-source fetch logic used by cache reconciliation

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::catalog::model::Repository;
use crate::config::FetchConfig;
use crate::repository::error::SourceError;
use crate::repository::source::RepositorySource;
use crate::repository::store::{CacheStore, record_key};

/// Result of refreshing one configured source
#[derive(Debug)]
pub struct SourceOutcome {
    pub locator: String,
    /// Repository to aggregate, fresh or from the fallback
    pub repository: Option<Arc<Repository>>,
    /// Why the refresh failed or only partly succeeded
    pub error: Option<SourceError>,
    used_fallback: bool,
}

impl SourceOutcome {
    /// True when the repository came from the fallback after a failed fetch
    pub fn is_fallback(&self) -> bool {
        self.used_fallback
    }
}

async fn fetch_repository(
    source: &dyn RepositorySource,
    locator: &str,
) -> Result<(Vec<u8>, Repository), SourceError> {
    let bytes = source.fetch(locator).await?;
    let repository = Repository::from_manifest(locator, &bytes)?;
    Ok((bytes, repository))
}

/// Fetch one source, record it on disk and decode it
///
/// Handles:
/// - Fetching the manifest from the network source
/// - Decoding it; an undecodable manifest counts as a failed fetch
/// - Writing the raw bytes to the source's cache record; a failed write is
///   reported alongside the fresh repository
/// - Falling back to the previous record when the fetch failed
async fn fetch_and_cache_source(
    network: &dyn RepositorySource,
    fallback: Option<&dyn RepositorySource>,
    store: &CacheStore,
    locator: &str,
) -> SourceOutcome {
    let error = match fetch_repository(network, locator).await {
        Ok((bytes, repository)) => {
            let write_error = store
                .write(&record_key(locator), &bytes)
                .inspect_err(|e| error!("Failed to write cache record for {}: {}", locator, e))
                .err();
            info!(
                "Loaded repository {} with {} packages",
                repository.label(),
                repository.packages.len()
            );
            return SourceOutcome {
                locator: locator.to_string(),
                repository: Some(Arc::new(repository)),
                error: write_error.map(SourceError::from),
                used_fallback: false,
            };
        }
        Err(e) => {
            error!("Error while updating repository {}: {}", locator, e);
            e
        }
    };

    let repository = match fallback {
        Some(fallback) => match fetch_repository(fallback, locator).await {
            Ok((_, repository)) => {
                warn!(
                    "Using {} copy of repository {} after failed update",
                    fallback.kind(),
                    locator
                );
                Some(Arc::new(repository))
            }
            Err(e) => {
                info!("No {} fallback for {}: {}", fallback.kind(), locator, e);
                None
            }
        },
        None => None,
    };

    SourceOutcome {
        locator: locator.to_string(),
        used_fallback: repository.is_some(),
        repository,
        error: Some(error),
    }
}

/// Refresh every locator, in parallel, preserving locator order in the result
///
/// At most `max_concurrent` fetches run at once and successive fetches start
/// `stagger_delay_ms` apart. Failures are logged and reported per source;
/// they never abort the others.
pub async fn refresh_sources(
    network: &dyn RepositorySource,
    fallback: Option<&dyn RepositorySource>,
    store: &CacheStore,
    locators: &[String],
    options: &FetchConfig,
) -> Vec<SourceOutcome> {
    let semaphore = Semaphore::new(options.max_concurrent.max(1));

    let futures = locators.iter().enumerate().map(|(i, locator)| {
        let delay = Duration::from_millis(options.stagger_delay_ms * i as u64);
        let semaphore = &semaphore;
        async move {
            sleep(delay).await;
            let _permit = semaphore.acquire().await.ok();
            fetch_and_cache_source(network, fallback, store, locator).await
        }
    });

    join_all(futures).await
}
