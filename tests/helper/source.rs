//! In-memory repository source

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use vpm_registry::repository::error::FetchError;
use vpm_registry::repository::source::RepositorySource;

/// Serves manifests from memory; unknown locators answer 404
#[derive(Default)]
pub struct MockSource {
    manifests: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manifest(self, locator: &str, manifest: Vec<u8>) -> Self {
        self.set_manifest(locator, manifest);
        self
    }

    pub fn set_manifest(&self, locator: &str, manifest: Vec<u8>) {
        self.manifests
            .lock()
            .unwrap()
            .insert(locator.to_string(), manifest);
    }

    /// Make `locator` unreachable from now on
    pub fn take_offline(&self, locator: &str) {
        self.manifests.lock().unwrap().remove(locator);
    }

    /// Number of fetches served or refused so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositorySource for MockSource {
    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.manifests
            .lock()
            .unwrap()
            .get(locator)
            .cloned()
            .ok_or_else(|| FetchError::InvalidResponse {
                locator: locator.to_string(),
                status: 404,
            })
    }
}
