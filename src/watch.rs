//! Polling change detection for the source list file

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::repository::cache::RepositoryCache;
use crate::source_list::SourceStore;

type Observation = Option<(SystemTime, u64)>;

/// Shortest accepted poll interval; a zero interval is raised to this
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Detects edits of one file by comparing modification time and length
#[derive(Debug)]
pub struct SourceWatcher {
    path: PathBuf,
    last: Observation,
}

impl SourceWatcher {
    /// Start watching `path` from its current state
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last = observe(&path);
        Self { path, last }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the file changed, appeared or disappeared since the last poll
    pub fn poll(&mut self) -> bool {
        let current = observe(&self.path);
        if current == self.last {
            return false;
        }
        self.last = current;
        true
    }
}

fn observe(path: &Path) -> Observation {
    let metadata = fs::metadata(path).ok()?;
    Some((metadata.modified().ok()?, metadata.len()))
}

/// Reconcile `cache` whenever the source list file changes, until `shutdown`
/// completes
///
/// Runs on the caller's runtime. Reconciliation failures are logged and the
/// loop keeps going. A zero `poll_interval` polls every millisecond.
pub async fn watch_sources<F>(
    mut watcher: SourceWatcher,
    store: &SourceStore,
    cache: &RepositoryCache,
    poll_interval: Duration,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    let mut ticker = interval(poll_interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!("Watching source list {:?}", watcher.path());
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Source list watcher stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        if !watcher.poll() {
            continue;
        }

        info!("Source list {:?} changed", watcher.path());
        if let Err(e) = store.reload() {
            error!("Failed to reload source list: {}", e);
            continue;
        }
        // The default list may have been restored; don't report our own write
        watcher.poll();

        match cache.on_source_list_changed().await {
            Ok(report) => debug!(
                "Reconciled after source list change: {:?}, {} repositories",
                report.mode,
                report.loaded.len()
            ),
            Err(e) => error!("Failed to reconcile repository cache: {}", e),
        }
    }
}
