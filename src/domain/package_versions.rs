//! Resolved package versions
//!
//! The package manager reports an environment as a list of JSON records.
//! They are deserialized into [`PackageRecord`] right at the process
//! boundary and folded into a name → version map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One package of a materialized environment as listed by `list --json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package name
    pub name: String,
    /// Resolved version string
    pub version: String,
    /// Build string (e.g. `py311h64a7726_0`)
    #[serde(default)]
    pub build_string: Option<String>,
    /// Channel the package came from
    #[serde(default)]
    pub channel: Option<String>,
}

impl PackageRecord {
    /// Create a record with name and version only
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            build_string: None,
            channel: None,
        }
    }
}

/// Mapping from package name to its resolved version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageVersions {
    versions: BTreeMap<String, String>,
}

impl PackageVersions {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold records into a map; a later record for the same name wins
    pub fn from_records(records: &[PackageRecord]) -> Self {
        records
            .iter()
            .map(|r| (r.name.clone(), r.version.clone()))
            .collect()
    }

    /// Resolved version of a package
    pub fn get(&self, name: &str) -> Option<&str> {
        self.versions.get(name).map(String::as_str)
    }

    /// Insert or replace a version
    pub fn insert(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.versions.insert(name.into(), version.into());
    }

    /// Iterate over (name, version) pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.versions.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PackageVersions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            versions: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
