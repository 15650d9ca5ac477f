//! Repository manifest decoding
//!
//! A manifest is a JSON document describing one repository and every
//! published version of its packages. Decoding is lenient: missing fields
//! take defaults, malformed versions reset to `0.0.0`, and a mistyped header
//! field, feature, package or package version is skipped with a warning.
//! Only a document that is not a JSON object at all fails.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::catalog::model::{
    Author, Dependency, LegacyTarget, PackageEntry, PackageVersion, Repository, RepositoryFeature,
    Sample,
};
use crate::repository::error::ManifestError;
use crate::version::spec::VersionSpec;

/// Header fields stay untyped so one bad field never rejects the document
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RepositoryManifest {
    name: Value,
    url: Value,
    author: Option<Value>,
    description: Value,
    features: Value,
    authorization_mode: Value,
    icon: Value,
    packages: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PackageManifest {
    /// Either a list of version objects or a map of version string to object
    versions: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VersionManifest {
    name: Option<String>,
    display_name: Option<String>,
    version: Option<String>,
    unity: Option<String>,
    description: Option<String>,
    author: Option<Value>,
    dependencies: IndexMap<String, Value>,
    vpm_dependencies: IndexMap<String, Value>,
    url: Option<String>,
    repo: Option<String>,
    deprecated: Option<bool>,
    tags: Vec<String>,
    vrchat_version: Option<String>,
    hide_in_editor: Option<bool>,
    samples: Vec<SampleManifest>,
    legacy_folders: IndexMap<String, Value>,
    legacy_files: IndexMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SampleManifest {
    name: Option<String>,
    description: Option<String>,
    path: Option<String>,
}

impl Repository {
    /// Decode a repository from raw manifest bytes fetched from `source`
    pub fn from_manifest(source: &str, bytes: &[u8]) -> Result<Self, ManifestError> {
        let document: Value = serde_json::from_slice(bytes)?;
        if !document.is_object() {
            return Err(ManifestError::NotAnObject);
        }
        let manifest: RepositoryManifest = serde_json::from_value(document)?;
        Ok(manifest.into_repository(source))
    }
}

impl RepositoryManifest {
    fn into_repository(self, source: &str) -> Repository {
        let features: BTreeSet<RepositoryFeature> = array_items(source, "features", self.features)
            .into_iter()
            .filter_map(|value| {
                let feature = value.as_str().and_then(RepositoryFeature::from_name);
                if feature.is_none() {
                    warn!("Ignoring unknown feature {} in repository {}", value, source);
                }
                feature
            })
            .collect();

        let icon = string_field(source, "icon", self.icon)
            .filter(|_| features.contains(&RepositoryFeature::Icon));
        let authorization_mode = string_field(source, "authorizationMode", self.authorization_mode)
            .filter(|_| features.iter().any(RepositoryFeature::is_authorization));

        let packages = object_entries(source, "packages", self.packages)
            .into_iter()
            .filter_map(|(name, value)| {
                match serde_json::from_value::<PackageManifest>(value) {
                    Ok(package) => {
                        let versions = decode_versions(source, &name, package.versions);
                        Some((name.clone(), PackageEntry::new(name, versions)))
                    }
                    Err(e) => {
                        warn!("Skipping malformed package {} in {}: {}", name, source, e);
                        None
                    }
                }
            })
            .collect();

        Repository {
            source: source.to_string(),
            name: string_field(source, "name", self.name).unwrap_or_default(),
            url: string_field(source, "url", self.url).unwrap_or_default(),
            author: self.author.map(|a| author_from_value(&a).name).unwrap_or_default(),
            description: string_field(source, "description", self.description).unwrap_or_default(),
            features,
            authorization_mode,
            icon,
            packages,
        }
    }
}

/// A string header field; absent, null and mistyped values all read as `None`
fn string_field(source: &str, field: &str, value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Null => None,
        other => {
            warn!("Ignoring non-string {} {} in repository {}", field, other, source);
            None
        }
    }
}

fn array_items(source: &str, field: &str, value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => {
            warn!("Ignoring non-array {} {} in repository {}", field, other, source);
            Vec::new()
        }
    }
}

fn object_entries(source: &str, field: &str, value: Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        Value::Null => Vec::new(),
        other => {
            warn!("Ignoring non-object {} {} in repository {}", field, other, source);
            Vec::new()
        }
    }
}

fn decode_versions(source: &str, package_name: &str, versions: Value) -> Vec<PackageVersion> {
    let objects: Vec<Value> = match versions {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        Value::Null => Vec::new(),
        other => {
            warn!(
                "Package {} in {} has non-collection versions: {}",
                package_name, source, other
            );
            Vec::new()
        }
    };

    let mut decoded: Vec<PackageVersion> = Vec::with_capacity(objects.len());
    for object in objects {
        let manifest = match serde_json::from_value::<VersionManifest>(object) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(
                    "Skipping malformed version of {} in {}: {}",
                    package_name, source, e
                );
                continue;
            }
        };

        let package = manifest.into_package_version();
        if decoded.iter().any(|p| p.version == package.version) {
            warn!(
                "Skipping duplicate version {} of {} in {}",
                package.version, package_name, source
            );
            continue;
        }
        decoded.push(package);
    }
    decoded
}

impl VersionManifest {
    fn into_package_version(self) -> PackageVersion {
        PackageVersion {
            name: self.name.unwrap_or_default(),
            display_name: self.display_name.unwrap_or_default(),
            version: VersionSpec::parse_concrete(self.version.as_deref().unwrap_or_default()),
            unity: self.unity.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            author: self.author.as_ref().map(author_from_value).unwrap_or_default(),
            unity_dependencies: dependencies(self.dependencies),
            package_dependencies: dependencies(self.vpm_dependencies),
            url: self.url.unwrap_or_default(),
            repository: self.repo.unwrap_or_default(),
            deprecated: self.deprecated.unwrap_or(false),
            tags: self.tags,
            vrchat_version: self.vrchat_version.unwrap_or_default(),
            hide_in_editor: self.hide_in_editor.unwrap_or(false),
            samples: self
                .samples
                .into_iter()
                .map(|s| Sample {
                    name: s.name.unwrap_or_default(),
                    description: s.description.unwrap_or_default(),
                    path: s.path.unwrap_or_default(),
                })
                .collect(),
            legacy_folders: legacy_targets(self.legacy_folders),
            legacy_files: legacy_targets(self.legacy_files),
        }
    }
}

/// Dependency maps use the package name as key and the version query as value
fn dependencies(map: IndexMap<String, Value>) -> Vec<Dependency> {
    map.into_iter()
        .filter_map(|(name, query)| match query.as_str() {
            Some(query) => Some(Dependency::new(name, VersionSpec::parse(query))),
            None => {
                warn!("Ignoring dependency {} with non-string version {}", name, query);
                None
            }
        })
        .collect()
}

fn legacy_targets(map: IndexMap<String, Value>) -> Vec<LegacyTarget> {
    map.into_iter()
        .map(|(path, guid)| LegacyTarget {
            path,
            guid: guid.as_str().unwrap_or_default().to_string(),
        })
        .collect()
}

/// Authors appear either as `{name, email, url}` objects or as plain names
fn author_from_value(value: &Value) -> Author {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    match value {
        Value::String(name) => Author {
            name: name.clone(),
            ..Default::default()
        },
        Value::Object(_) => Author {
            name: field("name"),
            email: field("email"),
            url: field("url"),
        },
        _ => Author::default(),
    }
}
