//! Repository manifest builders

use serde_json::{Map, Value, json};

/// Builds the JSON manifest document of one repository
pub struct ManifestBuilder {
    name: String,
    packages: Map<String, Value>,
}

impl ManifestBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            packages: Map::new(),
        }
    }

    /// Add a package with plain versions
    pub fn package(self, name: &str, versions: &[&str]) -> Self {
        let versions = versions
            .iter()
            .map(|version| json!({ "name": name, "version": version }))
            .collect();
        self.package_with(name, versions)
    }

    /// Add a package with fully specified version objects
    pub fn package_with(mut self, name: &str, versions: Vec<Value>) -> Self {
        self.packages
            .insert(name.to_string(), json!({ "versions": versions }));
        self
    }

    pub fn build(self) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "name": self.name,
            "url": format!("https://{}.example/vpm.json", self.name.to_lowercase()),
            "author": "Test Author",
            "packages": self.packages,
        }))
        .unwrap()
    }
}
