//! Repository cache reconciliation
//!
//! Keeps the on-disk manifest records in step with the configured source
//! list and publishes a fresh [`PackageCatalog`] after every reconciliation.
//!
//! Policy:
//! - `init` runs once; later calls are no-ops.
//! - A refresh happens when the records on disk no longer match the
//!   configured sources, or when no refresh has happened yet this session.
//!   Otherwise the catalog is rebuilt from the records alone.
//! - Records of sources that are no longer configured are deleted before a
//!   refresh; records of configured sources are kept.
//!
//! All reconciliation is serialized by one async mutex. Readers take an
//! `Arc` snapshot of the catalog and never see a half-built one.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::catalog::index::PackageCatalog;
use crate::catalog::model::Repository;
use crate::config::FetchConfig;
use crate::repository::error::{CacheError, SourceError};
use crate::repository::refresh::refresh_sources;
use crate::repository::source::RepositorySource;
use crate::repository::sources::CacheSource;
use crate::repository::store::{CacheStore, record_key};
use crate::source_list::SourceProvider;

/// Callback invoked with the new catalog after each reconciliation
pub type Subscriber = Arc<dyn Fn(&PackageCatalog) + Send + Sync>;

/// Process-lifetime state shared by every cache created by one caller.
///
/// Never persisted: a new process always starts without a refresh.
#[derive(Debug, Default)]
pub struct Session {
    refreshed: AtomicBool,
}

impl Session {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn has_refreshed(&self) -> bool {
        self.refreshed.load(Ordering::Acquire)
    }

    fn mark_refreshed(&self) {
        self.refreshed.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Sources were fetched from the network
    Refreshed,
    /// The catalog was rebuilt from cache records
    Reloaded,
    /// Nothing was done
    Skipped,
}

/// A configured source whose refresh failed or could not be recorded
#[derive(Debug)]
pub struct SourceFailure {
    pub locator: String,
    pub error: SourceError,
    /// The previous cache record was used instead of a fresh fetch
    pub used_fallback: bool,
}

/// Structured outcome of one reconciliation
#[derive(Debug)]
pub struct ReconcileReport {
    pub mode: ReconcileMode,
    /// Sources whose repository made it into the catalog
    pub loaded: Vec<String>,
    pub failures: Vec<SourceFailure>,
    /// Keys of cache records deleted because their source was removed
    pub removed_records: Vec<String>,
    pub conflicts: usize,
}

impl ReconcileReport {
    fn skipped() -> Self {
        Self {
            mode: ReconcileMode::Skipped,
            loaded: Vec::new(),
            failures: Vec::new(),
            removed_records: Vec::new(),
            conflicts: 0,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    initialized: bool,
}

pub struct RepositoryCache {
    store: CacheStore,
    sources: Arc<dyn SourceProvider>,
    network: Arc<dyn RepositorySource>,
    fallback: Option<CacheSource>,
    fetch: FetchConfig,
    session: Arc<Session>,
    state: AsyncMutex<State>,
    catalog: RwLock<Arc<PackageCatalog>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl RepositoryCache {
    pub fn new(
        store: CacheStore,
        sources: Arc<dyn SourceProvider>,
        network: Arc<dyn RepositorySource>,
        session: Arc<Session>,
        fetch: FetchConfig,
    ) -> Self {
        let fallback = fetch
            .fallback_to_cache
            .then(|| CacheSource::new(store.clone()));
        Self {
            store,
            sources,
            network,
            fallback,
            fetch,
            session,
            state: AsyncMutex::new(State::default()),
            catalog: RwLock::new(Arc::new(PackageCatalog::default())),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Current catalog snapshot
    pub fn catalog(&self) -> Arc<PackageCatalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Repositories of the current catalog, in aggregation order
    pub fn repositories(&self) -> Vec<Arc<Repository>> {
        self.catalog().repositories().to_vec()
    }

    /// Register a callback run after every successful reconciliation, on the
    /// task that performed it
    pub fn subscribe(&self, callback: impl Fn(&PackageCatalog) + Send + Sync + 'static) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// True if the records on disk do not match the configured sources
    pub fn is_stale(&self) -> Result<bool, CacheError> {
        let on_disk = self.store.keys()?;
        let configured: BTreeSet<String> =
            self.sources.sources().iter().map(|s| record_key(s)).collect();
        Ok(on_disk != configured)
    }

    /// First reconciliation of the process; later calls do nothing
    pub async fn init(&self) -> Result<ReconcileReport, CacheError> {
        let mut state = self.state.lock().await;
        if state.initialized {
            debug!("Repository cache already initialized");
            return Ok(ReconcileReport::skipped());
        }

        self.store.ensure_dir()?;
        let report = self.reconcile().await?;
        state.initialized = true;
        Ok(report)
    }

    /// Refresh when stale or not yet refreshed this session, otherwise
    /// rebuild from the cache records
    pub async fn reload(&self) -> Result<ReconcileReport, CacheError> {
        let _state = self.state.lock().await;
        self.store.ensure_dir()?;
        self.reconcile().await
    }

    /// Fetch every configured source now
    pub async fn refresh_all(&self) -> Result<ReconcileReport, CacheError> {
        let _state = self.state.lock().await;
        self.store.ensure_dir()?;
        self.refresh_locked().await
    }

    /// Rebuild the catalog from the cache records without any network access
    pub async fn load_from_cache(&self) -> Result<ReconcileReport, CacheError> {
        let _state = self.state.lock().await;
        self.load_locked()
    }

    /// React to an edit of the configured source list
    pub async fn on_source_list_changed(&self) -> Result<ReconcileReport, CacheError> {
        let mut state = self.state.lock().await;
        self.store.ensure_dir()?;
        state.initialized = true;

        if self.is_stale()? {
            info!("Source list changed, refreshing repositories");
            self.refresh_locked().await
        } else {
            debug!("Source list changed without adding or removing sources");
            self.load_locked()
        }
    }

    async fn reconcile(&self) -> Result<ReconcileReport, CacheError> {
        if self.is_stale()? || !self.session.has_refreshed() {
            self.refresh_locked().await
        } else {
            self.load_locked()
        }
    }

    async fn refresh_locked(&self) -> Result<ReconcileReport, CacheError> {
        let locators: Vec<String> = self.sources.sources().into_iter().collect();
        let removed_records = self.remove_unconfigured_records(&locators)?;

        let fallback = self
            .fallback
            .as_ref()
            .map(|source| source as &dyn RepositorySource);
        let outcomes = refresh_sources(
            self.network.as_ref(),
            fallback,
            &self.store,
            &locators,
            &self.fetch,
        )
        .await;

        let mut repositories = Vec::new();
        let mut loaded = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            let used_fallback = outcome.is_fallback();
            if let Some(repository) = outcome.repository {
                loaded.push(outcome.locator.clone());
                repositories.push(repository);
            }
            if let Some(error) = outcome.error {
                failures.push(SourceFailure {
                    locator: outcome.locator,
                    error,
                    used_fallback,
                });
            }
        }

        self.session.mark_refreshed();
        info!(
            "Refreshed {} of {} repositories",
            loaded.len(),
            locators.len()
        );

        let conflicts = self.publish(repositories);
        Ok(ReconcileReport {
            mode: ReconcileMode::Refreshed,
            loaded,
            failures,
            removed_records,
            conflicts,
        })
    }

    fn load_locked(&self) -> Result<ReconcileReport, CacheError> {
        let mut remaining = self.store.keys()?;

        // Configured sources first, in configured order, then orphaned records
        let mut records: Vec<(String, String)> = Vec::new();
        for locator in self.sources.sources() {
            let key = record_key(&locator);
            if remaining.remove(&key) {
                records.push((key, locator));
            } else {
                debug!("No cache record for {}", locator);
            }
        }
        records.extend(remaining.into_iter().map(|key| (key.clone(), key)));

        let mut repositories = Vec::new();
        let mut loaded = Vec::new();
        for (key, locator) in records {
            let bytes = match self.store.read(&key) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    error!("Error while loading repository record {}: {}", key, e);
                    continue;
                }
            };
            match Repository::from_manifest(&locator, &bytes) {
                Ok(repository) => {
                    loaded.push(locator);
                    repositories.push(Arc::new(repository));
                }
                Err(e) => warn!("Skipping unreadable repository record {}: {}", key, e),
            }
        }

        info!("Loaded {} repositories from cache", repositories.len());
        let conflicts = self.publish(repositories);
        Ok(ReconcileReport {
            mode: ReconcileMode::Reloaded,
            loaded,
            failures: Vec::new(),
            removed_records: Vec::new(),
            conflicts,
        })
    }

    /// Delete records whose source is no longer configured; keep the rest
    fn remove_unconfigured_records(&self, locators: &[String]) -> Result<Vec<String>, CacheError> {
        let configured: BTreeSet<String> = locators.iter().map(|l| record_key(l)).collect();

        let mut removed = Vec::new();
        for key in self.store.keys()? {
            if configured.contains(&key) {
                continue;
            }
            match self.store.remove(&key) {
                Ok(()) => removed.push(key),
                Err(e) => error!("Failed to remove stale cache record {}: {}", key, e),
            }
        }
        if !removed.is_empty() {
            info!("Removed {} cache records of removed sources", removed.len());
        }
        Ok(removed)
    }

    /// Swap in a catalog built from `repositories` and notify subscribers.
    /// Returns the number of name conflicts.
    fn publish(&self, repositories: Vec<Arc<Repository>>) -> usize {
        let catalog = Arc::new(PackageCatalog::build(&repositories));
        let conflicts = catalog.conflicts().len();

        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&catalog);

        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscriber in subscribers {
            subscriber(&catalog);
        }
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::error::FetchError;
    use crate::repository::source::MockRepositorySource;
    use crate::source_list::StaticSources;
    use crate::version::spec::VersionSpec;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    const ONE: &str = "https://one.example/vpm.json";
    const TWO: &str = "https://two.example/vpm.json";

    fn manifest(name: &str, package: &str, version: &str) -> Vec<u8> {
        format!(
            r#"{{"name": "{name}", "url": "{name}", "packages": {{"{package}": {{"versions": [{{"name": "{package}", "version": "{version}"}}]}}}}}}"#
        )
        .into_bytes()
    }

    fn fetch_config(fallback_to_cache: bool) -> FetchConfig {
        FetchConfig {
            stagger_delay_ms: 0,
            fallback_to_cache,
            ..Default::default()
        }
    }

    fn network_serving(expected_calls: usize) -> MockRepositorySource {
        let mut network = MockRepositorySource::new();
        network.expect_kind().return_const("http");
        network
            .expect_fetch()
            .times(expected_calls)
            .returning(|locator| match locator {
                ONE => Ok(manifest("One", "com.example.foo", "1.0.0")),
                TWO => Ok(manifest("Two", "com.example.bar", "2.0.0")),
                other => Err(FetchError::NotCached(other.to_string())),
            });
        network
    }

    struct Fixture {
        _temp_dir: TempDir,
        store: CacheStore,
        sources: Arc<StaticSources>,
        session: Arc<Session>,
    }

    impl Fixture {
        fn new(sources: &[&str]) -> Self {
            let temp_dir = TempDir::new().unwrap();
            let store = CacheStore::new(temp_dir.path().join("repositories"));
            Self {
                _temp_dir: temp_dir,
                store,
                sources: Arc::new(StaticSources::new(sources.iter().copied())),
                session: Session::new(),
            }
        }

        fn cache(&self, network: MockRepositorySource, fallback: bool) -> RepositoryCache {
            RepositoryCache::new(
                self.store.clone(),
                self.sources.clone(),
                Arc::new(network),
                self.session.clone(),
                fetch_config(fallback),
            )
        }
    }

    #[tokio::test]
    async fn init_refreshes_once_and_second_call_is_a_no_op() {
        let fixture = Fixture::new(&[ONE, TWO]);
        let cache = fixture.cache(network_serving(2), true);

        let first = cache.init().await.unwrap();
        let second = cache.init().await.unwrap();

        assert_eq!(first.mode, ReconcileMode::Refreshed);
        assert_eq!(first.loaded, vec![ONE, TWO]);
        assert_eq!(second.mode, ReconcileMode::Skipped);
        assert!(fixture.session.has_refreshed());
        assert_eq!(cache.catalog().len(), 2);
    }

    #[tokio::test]
    async fn init_loads_from_cache_when_session_already_refreshed_and_not_stale() {
        let fixture = Fixture::new(&[ONE, TWO]);
        fixture.cache(network_serving(2), true).init().await.unwrap();

        let cache = fixture.cache(network_serving(0), true);
        let report = cache.init().await.unwrap();

        assert_eq!(report.mode, ReconcileMode::Reloaded);
        assert_eq!(report.loaded, vec![ONE, TWO]);
        assert!(cache.catalog().lookup("com.example.foo").is_some());
    }

    #[tokio::test]
    async fn init_refreshes_when_stale_even_after_session_refresh() {
        let fixture = Fixture::new(&[ONE]);
        fixture.cache(network_serving(1), true).init().await.unwrap();
        fixture.sources.replace([ONE, TWO]);

        let cache = fixture.cache(network_serving(2), true);
        assert!(cache.is_stale().unwrap());
        let report = cache.init().await.unwrap();

        assert_eq!(report.mode, ReconcileMode::Refreshed);
        assert!(!cache.is_stale().unwrap());
    }

    #[tokio::test]
    async fn refresh_keeps_records_of_configured_sources_and_removes_the_rest() {
        let fixture = Fixture::new(&[ONE, TWO]);
        fixture.store.ensure_dir().unwrap();
        fixture.store.write(&record_key(ONE), b"{}").unwrap();
        fixture
            .store
            .write(&record_key("https://gone.example/vpm.json"), b"{}")
            .unwrap();

        let mut network = MockRepositorySource::new();
        network.expect_kind().return_const("http");
        network
            .expect_fetch()
            .returning(|locator| Err(FetchError::NotCached(locator.to_string())));
        let cache = fixture.cache(network, false);

        let report = cache.refresh_all().await.unwrap();

        assert_eq!(
            report.removed_records,
            vec![record_key("https://gone.example/vpm.json")]
        );
        assert!(fixture.store.read(&record_key(ONE)).unwrap().is_some());
        assert!(
            fixture
                .store
                .read(&record_key("https://gone.example/vpm.json"))
                .unwrap()
                .is_none()
        );
        assert_eq!(report.failures.len(), 2);
    }

    #[tokio::test]
    async fn removing_a_source_deletes_its_record_and_repository() {
        let fixture = Fixture::new(&[ONE, TWO]);
        let cache = fixture.cache(network_serving(3), true);
        cache.init().await.unwrap();
        assert!(fixture.store.read(&record_key(TWO)).unwrap().is_some());

        fixture.sources.replace([ONE]);
        let report = cache.on_source_list_changed().await.unwrap();

        assert_eq!(report.mode, ReconcileMode::Refreshed);
        assert_eq!(report.removed_records, vec![record_key(TWO)]);
        assert!(fixture.store.read(&record_key(TWO)).unwrap().is_none());
        let catalog = cache.catalog();
        assert!(catalog.lookup("com.example.bar").is_none());
        assert!(catalog.lookup("com.example.foo").is_some());
    }

    #[tokio::test]
    async fn unchanged_source_set_reloads_in_new_order() {
        let mut one_and_two_share = MockRepositorySource::new();
        one_and_two_share.expect_kind().return_const("http");
        one_and_two_share
            .expect_fetch()
            .times(2)
            .returning(|locator| match locator {
                ONE => Ok(manifest("One", "com.example.shared", "1.0.0")),
                _ => Ok(manifest("Two", "com.example.shared", "2.0.0")),
            });
        let fixture = Fixture::new(&[ONE, TWO]);
        let cache = fixture.cache(one_and_two_share, true);
        cache.init().await.unwrap();
        assert_eq!(
            cache
                .catalog()
                .resolve("com.example.shared", &VersionSpec::latest(), false)
                .map(|p| p.version),
            Some(VersionSpec::new(1, 0, 0))
        );

        fixture.sources.replace([TWO, ONE]);
        let report = cache.on_source_list_changed().await.unwrap();

        assert_eq!(report.mode, ReconcileMode::Reloaded);
        assert_eq!(report.conflicts, 1);
        assert_eq!(
            cache
                .catalog()
                .resolve("com.example.shared", &VersionSpec::latest(), false)
                .map(|p| p.version),
            Some(VersionSpec::new(2, 0, 0))
        );
    }

    #[tokio::test]
    async fn unreachable_source_does_not_hide_the_others() {
        let fixture = Fixture::new(&[ONE, "https://down.example/vpm.json", TWO]);
        let cache = fixture.cache(network_serving(3), false);

        let report = cache.init().await.unwrap();

        assert_eq!(report.loaded, vec![ONE, TWO]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].locator, "https://down.example/vpm.json");
        assert!(!report.failures[0].used_fallback);
        let catalog = cache.catalog();
        assert!(catalog.lookup("com.example.foo").is_some());
        assert!(catalog.lookup("com.example.bar").is_some());
    }

    #[tokio::test]
    async fn failed_refresh_uses_previous_record_when_fallback_enabled() {
        let fixture = Fixture::new(&[ONE]);
        fixture.store.ensure_dir().unwrap();
        fixture
            .store
            .write(&record_key(ONE), &manifest("One", "com.example.foo", "0.9.0"))
            .unwrap();

        let mut network = MockRepositorySource::new();
        network.expect_kind().return_const("http");
        network
            .expect_fetch()
            .times(1)
            .returning(|locator| Err(FetchError::NotCached(locator.to_string())));
        let cache = fixture.cache(network, true);

        let report = cache.init().await.unwrap();

        assert_eq!(report.loaded, vec![ONE]);
        assert!(report.failures[0].used_fallback);
        assert_eq!(
            cache
                .catalog()
                .resolve("com.example.foo", &VersionSpec::latest(), false)
                .map(|p| p.version),
            Some(VersionSpec::new(0, 9, 0))
        );
    }

    #[tokio::test]
    async fn load_from_cache_skips_unreadable_records() {
        let fixture = Fixture::new(&[ONE, TWO]);
        fixture.store.ensure_dir().unwrap();
        fixture
            .store
            .write(&record_key(ONE), &manifest("One", "com.example.foo", "1.0.0"))
            .unwrap();
        fixture.store.write(&record_key(TWO), b"not json").unwrap();
        let cache = fixture.cache(network_serving(0), true);

        let report = cache.load_from_cache().await.unwrap();

        assert_eq!(report.mode, ReconcileMode::Reloaded);
        assert_eq!(report.loaded, vec![ONE]);
        assert_eq!(cache.catalog().len(), 1);
    }

    #[tokio::test]
    async fn subscribers_are_notified_after_each_reconciliation() {
        let fixture = Fixture::new(&[ONE]);
        let cache = fixture.cache(network_serving(2), true);
        let notified = Arc::new(AtomicUsize::new(0));
        let packages_seen = Arc::new(AtomicUsize::new(0));
        {
            let notified = Arc::clone(&notified);
            let packages_seen = Arc::clone(&packages_seen);
            cache.subscribe(move |catalog| {
                notified.fetch_add(1, Ordering::SeqCst);
                packages_seen.store(catalog.len(), Ordering::SeqCst);
            });
        }

        cache.init().await.unwrap();
        cache.init().await.unwrap();
        cache.refresh_all().await.unwrap();

        assert_eq!(notified.load(Ordering::SeqCst), 2);
        assert_eq!(packages_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn catalog_snapshot_taken_before_refresh_stays_intact() {
        let fixture = Fixture::new(&[ONE]);
        let cache = fixture.cache(network_serving(1), true);
        let before = cache.catalog();

        cache.init().await.unwrap();

        assert!(before.is_empty());
        assert_eq!(cache.catalog().len(), 1);
    }
}
