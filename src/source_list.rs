//! Configured repository sources
//!
//! The source list is owned outside the resolution engine. The engine only
//! reads it through [`SourceProvider`]; [`SourceStore`] is the file-backed
//! implementation edited by the command-line front end.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use indexmap::IndexSet;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DEFAULT_SOURCE;

#[derive(Debug, Error)]
pub enum SourceListError {
    #[error("Source list I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed source list {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read access to the ordered set of configured source locators
pub trait SourceProvider: Send + Sync {
    fn sources(&self) -> IndexSet<String>;
}

/// In-memory source list, replaceable at runtime
#[derive(Debug, Default)]
pub struct StaticSources {
    sources: RwLock<IndexSet<String>>,
}

impl StaticSources {
    pub fn new<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: RwLock::new(sources.into_iter().map(Into::into).collect()),
        }
    }

    pub fn replace<I, S>(&self, sources: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.sources.write().unwrap_or_else(PoisonError::into_inner) =
            sources.into_iter().map(Into::into).collect();
    }
}

impl SourceProvider for StaticSources {
    fn sources(&self) -> IndexSet<String> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Source list persisted as a JSON array of locator strings
#[derive(Debug)]
pub struct SourceStore {
    path: PathBuf,
    sources: RwLock<IndexSet<String>>,
}

impl SourceStore {
    /// Open the source list at `path`, writing the default list if absent
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SourceListError> {
        let store = Self {
            path: path.into(),
            sources: RwLock::new(IndexSet::new()),
        };
        store.reload()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, restoring the default list if it was deleted
    pub fn reload(&self) -> Result<(), SourceListError> {
        self.ensure_exists()?;

        let bytes = fs::read(&self.path).map_err(|e| self.io_error(e))?;
        let list: Vec<String> =
            serde_json::from_slice(&bytes).map_err(|source| SourceListError::Json {
                path: self.path.clone(),
                source,
            })?;
        let sources: IndexSet<String> = list.into_iter().collect();
        debug!("Loaded {} sources from {:?}", sources.len(), self.path);

        *self.sources.write().unwrap_or_else(PoisonError::into_inner) = sources;
        Ok(())
    }

    pub fn save(&self) -> Result<(), SourceListError> {
        let list: Vec<String> = self.sources().into_iter().collect();
        let json = serde_json::to_vec_pretty(&list).map_err(|source| SourceListError::Json {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, json).map_err(|e| self.io_error(e))
    }

    /// Append a locator; returns false if it was already configured
    pub fn add(&self, locator: &str) -> Result<bool, SourceListError> {
        let inserted = self
            .sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(locator.to_string());
        if inserted {
            info!("Added repository source {}", locator);
            self.save()?;
        }
        Ok(inserted)
    }

    /// Remove a locator; returns false if it was not configured
    pub fn remove(&self, locator: &str) -> Result<bool, SourceListError> {
        let removed = self
            .sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(locator);
        if removed {
            info!("Removed repository source {}", locator);
            self.save()?;
        }
        Ok(removed)
    }

    pub fn contains(&self, locator: &str) -> bool {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(locator)
    }

    fn ensure_exists(&self) -> Result<(), SourceListError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        match fs::metadata(&self.path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Writing default source list to {:?}", self.path);
                let json = serde_json::to_vec_pretty(&[DEFAULT_SOURCE]).map_err(|source| {
                    SourceListError::Json {
                        path: self.path.clone(),
                        source,
                    }
                })?;
                fs::write(&self.path, json).map_err(|e| self.io_error(e))
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> SourceListError {
        SourceListError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SourceProvider for SourceStore {
    fn sources(&self) -> IndexSet<String> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
