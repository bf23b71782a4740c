//! Environment specification model
//!
//! An environment file is a YAML mapping with (at least) a `dependencies`
//! key. Entries of that list are either plain dependency strings such as
//! `numpy >=1.20` or structured sub-specifications such as `{pip: [...]}`.
//! Only the dependency list is ever touched; every other key is kept as is.

use serde_yaml::{Mapping, Value};

/// Key holding the dependency list
pub const DEPENDENCIES_KEY: &str = "dependencies";

/// A single entry of the dependency list
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DependencyEntry<'a> {
    /// Plain dependency string, possibly with a version constraint
    Simple(&'a str),
    /// Anything else (nested mappings, lists, numbers); never rewritten
    Structured(&'a Value),
}

impl<'a> DependencyEntry<'a> {
    /// Classify a YAML value
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::String(s) => DependencyEntry::Simple(s),
            other => DependencyEntry::Structured(other),
        }
    }
}

/// Parsed environment specification document
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentSpec {
    document: Mapping,
}

impl EnvironmentSpec {
    /// Wrap a YAML mapping; returns None when the dependency list is not a sequence
    pub fn from_mapping(mut document: Mapping) -> Option<Self> {
        match document.get(DEPENDENCIES_KEY) {
            Some(Value::Sequence(_)) => Some(Self { document }),
            Some(Value::Null) => {
                document.insert(
                    Value::String(DEPENDENCIES_KEY.to_string()),
                    Value::Sequence(Vec::new()),
                );
                Some(Self { document })
            }
            _ => None,
        }
    }

    /// Build a spec from a list of dependencies only
    pub fn from_dependencies(dependencies: Vec<Value>) -> Self {
        let mut document = Mapping::new();
        document.insert(
            Value::String(DEPENDENCIES_KEY.to_string()),
            Value::Sequence(dependencies),
        );
        Self { document }
    }

    /// The ordered dependency list
    pub fn dependencies(&self) -> &[Value] {
        match self.document.get(DEPENDENCIES_KEY) {
            Some(Value::Sequence(deps)) => deps,
            _ => &[],
        }
    }

    /// Iterate over classified dependency entries
    pub fn entries(&self) -> impl Iterator<Item = DependencyEntry<'_>> {
        self.dependencies().iter().map(DependencyEntry::classify)
    }

    /// Return a copy of this spec with a different dependency list
    pub fn with_dependencies(&self, dependencies: Vec<Value>) -> Self {
        let mut document = self.document.clone();
        document.insert(
            Value::String(DEPENDENCIES_KEY.to_string()),
            Value::Sequence(dependencies),
        );
        Self { document }
    }

    /// The underlying YAML document
    pub fn document(&self) -> &Mapping {
        &self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> EnvironmentSpec {
        let mapping: Mapping = serde_yaml::from_str(yaml).unwrap();
        EnvironmentSpec::from_mapping(mapping).unwrap()
    }

    #[test]
    fn test_dependencies_in_order() {
        let spec = parse("channels: [conda-forge]\ndependencies:\n  - foo >=1.0\n  - bar\n");
        let deps: Vec<_> = spec.dependencies().iter().filter_map(|d| d.as_str()).collect();
        assert_eq!(deps, vec!["foo >=1.0", "bar"]);
    }

    #[test]
    fn test_entries_classification() {
        let spec = parse("dependencies:\n  - foo\n  - pip:\n      - baz==2.0\n");
        let entries: Vec<_> = spec.entries().collect();
        assert_eq!(entries[0], DependencyEntry::Simple("foo"));
        assert!(matches!(entries[1], DependencyEntry::Structured(Value::Mapping(_))));
    }

    #[test]
    fn test_null_dependencies_is_empty() {
        let spec = parse("name: empty\ndependencies:\n");
        assert!(spec.dependencies().is_empty());
    }

    #[test]
    fn test_missing_or_invalid_dependencies() {
        let mapping: Mapping = serde_yaml::from_str("name: x\n").unwrap();
        assert!(EnvironmentSpec::from_mapping(mapping).is_none());

        let mapping: Mapping = serde_yaml::from_str("dependencies: foo\n").unwrap();
        assert!(EnvironmentSpec::from_mapping(mapping).is_none());
    }

    #[test]
    fn test_with_dependencies_keeps_other_keys() {
        let spec = parse("name: test\nchannels:\n  - bioconda\ndependencies:\n  - foo\n");
        let changed = spec.with_dependencies(vec![Value::String("foo =1.2".to_string())]);

        assert_eq!(changed.document().get("name"), spec.document().get("name"));
        assert_eq!(
            changed.document().get("channels"),
            spec.document().get("channels")
        );
        let keys: Vec<_> = changed
            .document()
            .keys()
            .filter_map(|k| k.as_str())
            .collect();
        assert_eq!(keys, vec!["name", "channels", "dependencies"]);
        assert_ne!(changed, spec);
    }
}
