//! Catalog data model: repositories, package entries and package versions

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::version::resolver::resolve_version;
use crate::version::spec::VersionSpec;

/// A required-version query against another package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub package_name: String,
    pub version: VersionSpec,
}

impl Dependency {
    pub fn new(package_name: impl Into<String>, version: VersionSpec) -> Self {
        Self {
            package_name: package_name.into(),
            version,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Author {
    pub name: String,
    pub email: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub name: String,
    pub description: String,
    pub path: String,
}

/// A file or folder left behind by a pre-package installation, keyed by path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyTarget {
    pub path: String,
    pub guid: String,
}

/// One published version of a package
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersion {
    pub name: String,
    pub display_name: String,
    pub version: VersionSpec,
    /// Minimum Unity editor version
    pub unity: String,
    pub description: String,
    pub author: Author,
    pub unity_dependencies: Vec<Dependency>,
    pub package_dependencies: Vec<Dependency>,
    /// Download URL of the package archive
    pub url: String,
    /// Identifier of the repository the package claims to come from
    pub repository: String,
    pub deprecated: bool,
    pub tags: Vec<String>,
    pub vrchat_version: String,
    pub hide_in_editor: bool,
    pub samples: Vec<Sample>,
    pub legacy_folders: Vec<LegacyTarget>,
    pub legacy_files: Vec<LegacyTarget>,
}

impl PackageVersion {
    pub fn new(name: impl Into<String>, version: VersionSpec) -> Self {
        Self {
            name: name.into(),
            version,
            ..Default::default()
        }
    }

    pub fn is_beta(&self) -> bool {
        self.version.is_beta()
    }
}

/// All versions of one package name within one repository
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PackageEntry {
    pub name: String,
    pub versions: Vec<PackageVersion>,
}

impl PackageEntry {
    pub fn new(name: impl Into<String>, versions: Vec<PackageVersion>) -> Self {
        Self {
            name: name.into(),
            versions,
        }
    }

    /// Greatest version, skipping betas unless `allow_beta` is set
    pub fn most_recent(&self, allow_beta: bool) -> Option<&PackageVersion> {
        resolve_version(&VersionSpec::latest(), &self.versions, allow_beta)
    }

    /// Versions visible under the given beta policy
    pub fn visible_versions(&self, allow_beta: bool) -> impl Iterator<Item = &PackageVersion> {
        self.versions
            .iter()
            .filter(move |v| allow_beta || !v.is_beta())
    }

    pub fn resolve(&self, query: &VersionSpec, allow_beta: bool) -> Option<&PackageVersion> {
        resolve_version(query, &self.versions, allow_beta)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RepositoryFeature {
    Icon,
    Banner,
    FvpmAuthorizationOptional,
    FvpmAuthorizationRequired,
    FvpmUpload,
}

impl RepositoryFeature {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Icon" => Some(Self::Icon),
            "Banner" => Some(Self::Banner),
            "FvpmAuthorizationOptional" => Some(Self::FvpmAuthorizationOptional),
            "FvpmAuthorizationRequired" => Some(Self::FvpmAuthorizationRequired),
            "FvpmUpload" => Some(Self::FvpmUpload),
            _ => None,
        }
    }

    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            Self::FvpmAuthorizationOptional | Self::FvpmAuthorizationRequired
        )
    }
}

/// A named collection of packages decoded from one source's manifest.
///
/// Immutable once built; a refresh replaces the whole value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Repository {
    /// Locator the manifest was obtained from
    pub source: String,
    pub name: String,
    pub url: String,
    pub author: String,
    pub description: String,
    pub features: BTreeSet<RepositoryFeature>,
    /// Only read when an authorization feature is declared
    pub authorization_mode: Option<String>,
    /// Base64 image, only read when the `Icon` feature is declared
    pub icon: Option<String>,
    pub packages: IndexMap<String, PackageEntry>,
}

impl Repository {
    pub fn package(&self, name: &str) -> Option<&PackageEntry> {
        self.packages.get(name)
    }

    pub fn supports(&self, feature: RepositoryFeature) -> bool {
        self.features.contains(&feature)
    }

    /// Human-readable identifier for diagnostics
    pub fn label(&self) -> &str {
        if !self.url.is_empty() {
            &self.url
        } else if !self.name.is_empty() {
            &self.name
        } else {
            &self.source
        }
    }
}
