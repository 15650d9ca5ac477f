//! Manifest source backed by the on-disk record store

use crate::repository::error::{CacheError, FetchError};
use crate::repository::source::RepositorySource;
use crate::repository::store::{CacheStore, record_key};

/// Serves the last manifest recorded for a locator
pub struct CacheSource {
    store: CacheStore,
}

impl CacheSource {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl RepositorySource for CacheSource {
    fn kind(&self) -> &'static str {
        "cache"
    }

    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        match self.store.read(&record_key(locator)) {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(FetchError::NotCached(locator.to_string())),
            Err(CacheError::Io { source, .. }) => Err(FetchError::Io {
                locator: locator.to_string(),
                source,
            }),
        }
    }
}
