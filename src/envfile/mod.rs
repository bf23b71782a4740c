//! Environment and pin file handling
//!
//! This module provides:
//! - Loading and saving YAML environment files
//! - The dependency rewriter (constraint stripping and version pinning)
//! - Pin file naming and content comparison

mod rewriter;

pub use rewriter::{
    apply_versions, package_name, parse_dependency, strip_constraints, SimpleDependency,
};

use crate::domain::EnvironmentSpec;
use crate::error::EnvFileError;
use serde_yaml::Mapping;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Load an environment file
pub fn load_env(path: &Path) -> Result<EnvironmentSpec, EnvFileError> {
    let content = fs::read_to_string(path).map_err(|e| EnvFileError::read_error(path, e))?;
    parse_env(path, &content)
}

/// Parse environment file content; `path` is only used for error messages
pub fn parse_env(path: &Path, content: &str) -> Result<EnvironmentSpec, EnvFileError> {
    let document: Mapping = serde_yaml::from_str(content)
        .map_err(|e| EnvFileError::yaml_parse_error(path, e.to_string()))?;
    EnvironmentSpec::from_mapping(document).ok_or_else(|| {
        EnvFileError::invalid_structure(path, "expected a 'dependencies' list")
    })
}

/// Render an environment spec as YAML
pub fn render_env(path: &Path, spec: &EnvironmentSpec) -> Result<String, EnvFileError> {
    serde_yaml::to_string(spec.document())
        .map_err(|e| EnvFileError::yaml_parse_error(path, e.to_string()))
}

/// Overwrite an environment file, returning the written content
pub fn save_env(path: &Path, spec: &EnvironmentSpec) -> Result<String, EnvFileError> {
    let content = render_env(path, spec)?;
    fs::write(path, &content).map_err(|e| EnvFileError::write_error(path, e))?;
    Ok(content)
}

/// Write a spec to a hidden temporary YAML file inside `dir`
///
/// The file is deleted when the returned handle is dropped.
pub fn write_temporary(dir: &Path, spec: &EnvironmentSpec) -> Result<NamedTempFile, EnvFileError> {
    let content = render_env(dir, spec)?;
    let mut file = tempfile::Builder::new()
        .prefix(".")
        .suffix(".yaml")
        .tempfile_in(dir)
        .map_err(|e| EnvFileError::write_error(dir, e))?;
    let path = file.path().to_path_buf();
    file.write_all(content.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| EnvFileError::write_error(path, e))?;
    Ok(file)
}

/// Sibling pin file path: `envs/foo.yaml` → `envs/foo.<platform>.pin.txt`
pub fn pin_file_path(env_path: &Path, platform: &str) -> PathBuf {
    env_path.with_extension(format!("{}.pin.txt", platform))
}

/// Read an existing pin file; a missing file yields None
pub fn read_pin_file(path: &Path) -> Result<Option<String>, EnvFileError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EnvFileError::read_error(path, e)),
    }
}

/// Overwrite a pin file wholesale
pub fn write_pin_file(path: &Path, content: &str) -> Result<(), EnvFileError> {
    fs::write(path, content).map_err(|e| EnvFileError::write_error(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ENV: &str = "name: test\nchannels:\n  - conda-forge\n  - bioconda\ndependencies:\n  - samtools >=1.9\n  - python =3.11\n";

    #[test]
    fn test_load_and_save_roundtrip_keeps_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.yaml");
        fs::write(&path, ENV).unwrap();

        let spec = load_env(&path).unwrap();
        assert_eq!(spec.dependencies().len(), 2);

        save_env(&path, &spec).unwrap();
        let reloaded = load_env(&path).unwrap();
        assert_eq!(reloaded, spec);

        let content = fs::read_to_string(&path).unwrap();
        let name_pos = content.find("name:").unwrap();
        let channels_pos = content.find("channels:").unwrap();
        let deps_pos = content.find("dependencies:").unwrap();
        assert!(name_pos < channels_pos && channels_pos < deps_pos);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_env(Path::new("/nonexistent/env.yaml")).unwrap_err();
        assert!(matches!(err, EnvFileError::ReadError { .. }));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = parse_env(Path::new("env.yaml"), "dependencies: [unclosed").unwrap_err();
        assert!(matches!(err, EnvFileError::YamlParseError { .. }));
    }

    #[test]
    fn test_parse_without_dependencies() {
        let err = parse_env(Path::new("env.yaml"), "name: x\nchannels: []\n").unwrap_err();
        assert!(matches!(err, EnvFileError::InvalidStructure { .. }));
    }

    #[test]
    fn test_pin_file_path() {
        assert_eq!(
            pin_file_path(Path::new("workflow/envs/samtools.yaml"), "linux-64"),
            PathBuf::from("workflow/envs/samtools.linux-64.pin.txt")
        );
        assert_eq!(
            pin_file_path(Path::new("env.yml"), "osx-arm64"),
            PathBuf::from("env.osx-arm64.pin.txt")
        );
    }

    #[test]
    fn test_read_pin_file_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read_pin_file(&dir.path().join("x.pin.txt")).unwrap(), None);
    }

    #[test]
    fn test_write_and_read_pin_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.linux-64.pin.txt");
        write_pin_file(&path, "@EXPLICIT\n").unwrap();
        assert_eq!(read_pin_file(&path).unwrap().as_deref(), Some("@EXPLICIT\n"));
    }

    #[test]
    fn test_write_temporary_is_hidden_and_removed() {
        let dir = TempDir::new().unwrap();
        let spec = parse_env(Path::new("env.yaml"), ENV).unwrap();
        let path = {
            let file = write_temporary(dir.path(), &spec).unwrap();
            let path = file.path().to_path_buf();
            let name = path.file_name().unwrap().to_str().unwrap().to_string();
            assert!(name.starts_with('.'));
            assert!(name.ends_with(".yaml"));
            assert_eq!(load_env(&path).unwrap(), spec);
            path
        };
        assert!(!path.exists());
    }
}
