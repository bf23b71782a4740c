//! Dependency rewriter
//!
//! Handles dependency strings of the form `name[ <op> version]` with
//! `<op>` one of `=`, `==`, `>=`, `>`, `<=`, `<` or plain whitespace:
//! - `strip_constraints` turns every such entry into its bare name
//! - `apply_versions` turns every such entry into `name =<resolved>`
//!
//! Structured entries (e.g. `pip:` blocks) and strings that do not match the
//! grammar are passed through untouched by both operations.

use crate::domain::{DependencyEntry, EnvironmentSpec, PackageVersions};
use crate::error::EnvFileError;
use regex::Regex;
use serde_yaml::Value;
use std::convert::Infallible;
use std::sync::LazyLock;

static DEPENDENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[^=<>!~\s]+)(?:[\s=<>]+(?P<constraint>.*))?$").unwrap()
});

/// A dependency string split into name and constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleDependency<'a> {
    /// Package name
    pub name: &'a str,
    /// Everything after the operator, if any
    pub constraint: Option<&'a str>,
}

/// Parse a dependency string; None if it does not follow the simple grammar
pub fn parse_dependency(dep: &str) -> Option<SimpleDependency<'_>> {
    let caps = DEPENDENCY_RE.captures(dep.trim())?;
    let name = caps.name("name")?.as_str();
    let constraint = caps
        .name("constraint")
        .map(|m| m.as_str())
        .filter(|c| !c.is_empty());
    Some(SimpleDependency { name, constraint })
}

/// Package name without a `channel::` prefix
pub fn package_name(name: &str) -> &str {
    name.rsplit_once("::").map_or(name, |(_, package)| package)
}

/// Rewrite every simple dependency with `f`, leaving everything else as is
fn map_dependencies<E, F>(spec: &EnvironmentSpec, mut f: F) -> Result<EnvironmentSpec, E>
where
    F: FnMut(&str) -> Result<String, E>,
{
    let dependencies = spec
        .entries()
        .map(|entry| match entry {
            DependencyEntry::Simple(dep) => match parse_dependency(dep) {
                Some(parsed) => f(parsed.name).map(Value::String),
                None => Ok(Value::String(dep.to_string())),
            },
            DependencyEntry::Structured(value) => Ok(value.clone()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(spec.with_dependencies(dependencies))
}

/// Build the unconstrained probe spec
pub fn strip_constraints(spec: &EnvironmentSpec) -> EnvironmentSpec {
    match map_dependencies::<Infallible, _>(spec, |name| Ok(name.to_string())) {
        Ok(stripped) => stripped,
        Err(never) => match never {},
    }
}

/// Pin every simple dependency to its resolved version
///
/// Every name in the spec must be present in `versions`, since the probe
/// spec resolved from these exact names. A `channel::` prefix is kept in the
/// output but ignored for the lookup.
pub fn apply_versions(
    spec: &EnvironmentSpec,
    versions: &PackageVersions,
) -> Result<EnvironmentSpec, EnvFileError> {
    map_dependencies(spec, |name| match versions.get(package_name(name)) {
        Some(version) => Ok(format!("{} ={}", name, version)),
        None => Err(EnvFileError::MissingResolvedVersion {
            name: name.to_string(),
        }),
    })
}
