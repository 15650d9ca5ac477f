//! Flat, name-keyed view over every configured repository

use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::warn;

use crate::catalog::model::{PackageEntry, PackageVersion, Repository};
use crate::version::spec::VersionSpec;

/// A package name claimed by more than one repository.
///
/// The earlier repository in configuration order keeps the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub package_name: String,
    /// Label of the repository whose entry was kept
    pub selected: String,
    /// Label of the repository whose entry was discarded
    pub skipped: String,
}

#[derive(Debug, Default)]
pub struct PackageCatalog {
    repositories: Vec<Arc<Repository>>,
    packages: IndexMap<String, Arc<Repository>>,
    conflicts: Vec<Conflict>,
}

impl PackageCatalog {
    /// Aggregate `repositories` in order; the first repository to list a
    /// package name wins it.
    pub fn build(repositories: &[Arc<Repository>]) -> Self {
        let mut packages: IndexMap<String, Arc<Repository>> = IndexMap::new();
        let mut conflicts = Vec::new();

        for repository in repositories {
            for name in repository.packages.keys() {
                match packages.entry(name.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(Arc::clone(repository));
                    }
                    Entry::Occupied(slot) => {
                        let conflict = Conflict {
                            package_name: name.clone(),
                            selected: slot.get().label().to_string(),
                            skipped: repository.label().to_string(),
                        };
                        warn!(
                            "Origin conflict for {}: selected {}, skipped {}",
                            conflict.package_name, conflict.selected, conflict.skipped
                        );
                        conflicts.push(conflict);
                    }
                }
            }
        }

        Self {
            repositories: repositories.to_vec(),
            packages,
            conflicts,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&PackageEntry> {
        self.lookup_with_repository(name).map(|(entry, _)| entry)
    }

    /// Like [`lookup`](Self::lookup), also returning the repository the
    /// entry was taken from
    pub fn lookup_with_repository(&self, name: &str) -> Option<(&PackageEntry, &Repository)> {
        let repository = self.packages.get(name)?;
        repository
            .package(name)
            .map(|entry| (entry, repository.as_ref()))
    }

    /// Resolve a version query for one package; an unknown package is
    /// simply `None`.
    pub fn resolve(
        &self,
        name: &str,
        query: &VersionSpec,
        allow_beta: bool,
    ) -> Option<&PackageVersion> {
        self.lookup(name)?.resolve(query, allow_beta)
    }

    /// Repositories the catalog was built from, in priority order
    pub fn repositories(&self) -> &[Arc<Repository>] {
        &self.repositories
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Package names in first-seen order
    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository(url: &str, packages: Vec<(&str, Vec<&str>)>) -> Arc<Repository> {
        Arc::new(Repository {
            source: url.to_string(),
            url: url.to_string(),
            packages: packages
                .into_iter()
                .map(|(name, versions)| {
                    let versions = versions
                        .into_iter()
                        .map(|v| PackageVersion::new(name, VersionSpec::parse(v)))
                        .collect();
                    (name.to_string(), PackageEntry::new(name, versions))
                })
                .collect(),
            ..Default::default()
        })
    }

    #[test]
    fn build_keeps_first_repository_for_conflicting_names() {
        let r1 = repository("https://one.example/vpm.json", vec![("foo", vec!["1.0.0"])]);
        let r2 = repository("https://two.example/vpm.json", vec![("foo", vec!["2.0.0"])]);

        let catalog = PackageCatalog::build(&[r1, r2]);

        let (entry, origin) = catalog.lookup_with_repository("foo").unwrap();
        assert_eq!(origin.url, "https://one.example/vpm.json");
        assert_eq!(entry.versions.len(), 1);
        assert_eq!(
            catalog.resolve("foo", &VersionSpec::latest(), false).map(|p| p.version),
            Some(VersionSpec::new(1, 0, 0))
        );
        assert_eq!(
            catalog.conflicts(),
            &[Conflict {
                package_name: "foo".to_string(),
                selected: "https://one.example/vpm.json".to_string(),
                skipped: "https://two.example/vpm.json".to_string(),
            }]
        );
    }

    #[test]
    fn build_depends_only_on_repository_order() {
        let r1 = repository("https://one.example/vpm.json", vec![("foo", vec!["1.0.0"])]);
        let r2 = repository("https://two.example/vpm.json", vec![("foo", vec!["2.0.0"])]);

        let catalog = PackageCatalog::build(&[r2, r1]);

        assert_eq!(
            catalog.lookup_with_repository("foo").unwrap().1.url,
            "https://two.example/vpm.json"
        );
    }

    #[test]
    fn build_merges_distinct_names_from_all_repositories() {
        let r1 = repository("r1", vec![("alpha", vec!["1.0.0"]), ("beta", vec!["0.1.0"])]);
        let r2 = repository("r2", vec![("gamma", vec!["3.0.0"])]);

        let catalog = PackageCatalog::build(&[r1, r2]);

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.repositories().len(), 2);
        assert!(catalog.conflicts().is_empty());
        assert_eq!(
            catalog.package_names().collect::<Vec<_>>(),
            vec!["alpha", "beta", "gamma"]
        );
    }

    #[test]
    fn resolve_returns_none_for_unknown_package() {
        let catalog = PackageCatalog::build(&[repository("r1", vec![("alpha", vec!["1.0.0"])])]);

        assert!(catalog.resolve("missing", &VersionSpec::latest(), true).is_none());
        assert!(catalog.lookup("missing").is_none());
    }

    #[test]
    fn resolve_delegates_dynamic_queries() {
        let catalog = PackageCatalog::build(&[repository(
            "r1",
            vec![("alpha", vec!["1.0.0", "1.4.2", "1.4.3-beta.1", "2.0.0"])],
        )]);

        let resolved = catalog.resolve("alpha", &VersionSpec::parse("1.x.x"), false);

        assert_eq!(resolved.map(|p| p.version), Some(VersionSpec::new(1, 4, 2)));
    }

    #[test]
    fn empty_catalog_has_no_packages() {
        let catalog = PackageCatalog::build(&[]);

        assert!(catalog.is_empty());
        assert!(catalog.conflicts().is_empty());
    }
}
