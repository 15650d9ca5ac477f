//! Source trait for obtaining raw repository manifests

#[cfg(test)]
use mockall::automock;

use crate::repository::error::FetchError;

/// Trait for fetching one repository's raw manifest by locator
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait RepositorySource: Send + Sync {
    /// Short name for diagnostics (e.g. "http", "cache")
    fn kind(&self) -> &'static str;

    /// Fetches the raw manifest bytes for `locator`
    ///
    /// # Arguments
    /// * `locator` - The configured source string, usually a URL
    ///
    /// # Returns
    /// * `Ok(Vec<u8>)` - The manifest document as fetched
    /// * `Err(FetchError)` - Transport, status, timeout or cache failure,
    ///   always carrying the locator
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError>;
}
