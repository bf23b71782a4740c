//! Conda-family resolver (conda, mamba, micromamba)
//!
//! Every resolution creates a hidden, uniquely named prefix directory inside
//! the working directory, materializes the environment there, lists it and
//! removes it again.

use super::EnvResolver;
use crate::domain::{PackageRecord, PackageVersions};
use crate::error::ResolveError;
use crate::process::{CommandRunner, SystemCommandRunner};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Default package manager frontend
pub const DEFAULT_FRONTEND: &str = "mamba";

/// Subset of `info --json` we care about
#[derive(Debug, Deserialize)]
struct CondaInfo {
    platform: String,
}

/// Resolver driving a conda-compatible command line tool
pub struct CondaResolver<C = SystemCommandRunner> {
    /// Executable name, e.g. `mamba`
    frontend: String,
    /// Directory that hosts the ephemeral environments
    work_dir: PathBuf,
    runner: C,
}

impl CondaResolver<SystemCommandRunner> {
    /// Create a resolver spawning real processes in the current directory
    pub fn new(frontend: impl Into<String>) -> Self {
        Self::with_runner(frontend, ".", SystemCommandRunner::new())
    }
}

impl<C: CommandRunner> CondaResolver<C> {
    /// Create a resolver with a custom runner and working directory
    pub fn with_runner(frontend: impl Into<String>, work_dir: impl Into<PathBuf>, runner: C) -> Self {
        Self {
            frontend: frontend.into(),
            work_dir: work_dir.into(),
            runner,
        }
    }

    /// The configured frontend
    pub fn frontend(&self) -> &str {
        &self.frontend
    }

    async fn exec(&self, args: &[&str]) -> Result<String, ResolveError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner
            .run(&self.frontend, &args, None)
            .await?
            .into_stdout()
    }

    fn ephemeral_dir(&self) -> Result<TempDir, ResolveError> {
        tempfile::Builder::new()
            .prefix(".")
            .tempdir_in(&self.work_dir)
            .map_err(|source| ResolveError::Workspace {
                path: self.work_dir.clone(),
                source,
            })
    }

    /// Create an ephemeral env from `spec_path`, run `listing` against it and
    /// tear it down again, returning the listing's stdout
    async fn with_ephemeral_env(
        &self,
        spec_path: &Path,
        listing: &[&str],
    ) -> Result<String, ResolveError> {
        let dir = self.ephemeral_dir()?;
        let prefix = dir.path().to_string_lossy().to_string();
        let spec = spec_path.to_string_lossy();

        self.exec(&["env", "create", "--file", &spec, "--prefix", &prefix])
            .await?;

        let mut args = listing.to_vec();
        args.extend(["--prefix", prefix.as_str()]);
        let listed = self.exec(&args).await;

        if let Err(e) = self.exec(&["env", "remove", "--prefix", &prefix, "-y"]).await {
            tracing::warn!(prefix = %prefix, error = %e, "failed to remove ephemeral environment");
        }
        listed
    }
}

#[async_trait]
impl<C: CommandRunner> EnvResolver for CondaResolver<C> {
    async fn platform(&self) -> Result<String, ResolveError> {
        let stdout = self.exec(&["info", "--json"]).await?;
        let info: CondaInfo = serde_json::from_str(&stdout).map_err(|e| {
            ResolveError::invalid_output(format!("{} info --json", self.frontend), e.to_string())
        })?;
        Ok(info.platform)
    }

    async fn resolve(&self, spec_path: &Path) -> Result<PackageVersions, ResolveError> {
        let stdout = self.with_ephemeral_env(spec_path, &["list", "--json"]).await?;
        let records: Vec<PackageRecord> = serde_json::from_str(&stdout).map_err(|e| {
            ResolveError::invalid_output(format!("{} list --json", self.frontend), e.to_string())
        })?;
        tracing::debug!(spec = %spec_path.display(), packages = records.len(), "resolved");
        Ok(PackageVersions::from_records(&records))
    }

    async fn pin(&self, spec_path: &Path) -> Result<String, ResolveError> {
        self.with_ephemeral_env(spec_path, &["list", "--explicit", "--md5"])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::ScriptedRunner;

    const LIST_JSON: &str = r#"[
        {"name": "python", "version": "3.11.8", "build_string": "h955ad1f_0", "channel": "conda-forge"},
        {"name": "samtools", "version": "1.19.2", "build_string": "h50ea8bc_0", "channel": "bioconda"}
    ]"#;

    const EXPLICIT: &str = "@EXPLICIT\nhttps://conda.anaconda.org/conda-forge/linux-64/python-3.11.8-h955ad1f_0.conda#abc\n";

    fn resolver(runner: ScriptedRunner) -> (CondaResolver<ScriptedRunner>, TempDir) {
        let dir = TempDir::new().unwrap();
        let resolver = CondaResolver::with_runner("mamba", dir.path(), runner);
        (resolver, dir)
    }

    #[tokio::test]
    async fn test_platform() {
        let (resolver, _dir) =
            resolver(ScriptedRunner::new().on("info --json", r#"{"platform": "linux-64", "conda_version": "24.1.2"}"#));
        assert_eq!(resolver.platform().await.unwrap(), "linux-64");
    }

    #[tokio::test]
    async fn test_platform_invalid_json() {
        let (resolver, _dir) = resolver(ScriptedRunner::new().on("info --json", "not json"));
        let err = resolver.platform().await.unwrap_err();
        assert!(matches!(err, ResolveError::InvalidOutput { .. }));
    }

    #[tokio::test]
    async fn test_resolve_command_sequence() {
        let (resolver, dir) = resolver(ScriptedRunner::new().on("list --json", LIST_JSON));
        let versions = resolver.resolve(Path::new("envs/a.yaml")).await.unwrap();

        assert_eq!(versions.get("python"), Some("3.11.8"));
        assert_eq!(versions.get("samtools"), Some("1.19.2"));

        let calls = resolver.runner.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].starts_with("mamba env create --file envs/a.yaml --prefix "));
        assert!(calls[1].starts_with("mamba list --json --prefix "));
        assert!(calls[2].starts_with("mamba env remove --prefix "));
        assert!(calls[2].ends_with(" -y"));

        // same hidden prefix for all three calls, inside the working directory
        let prefix = calls[0].rsplit(' ').next().unwrap().to_string();
        assert!(calls[1].ends_with(&prefix));
        let prefix_path = PathBuf::from(&prefix);
        assert!(prefix_path.starts_with(dir.path()));
        assert!(prefix_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with('.'));
        assert!(!prefix_path.exists());
    }

    #[tokio::test]
    async fn test_resolve_create_failure() {
        let (resolver, _dir) = resolver(
            ScriptedRunner::new().fail_on("env create", "PackagesNotFoundError: nonexistent"),
        );
        let err = resolver.resolve(Path::new("envs/a.yaml")).await.unwrap_err();
        match err {
            ResolveError::ResolutionFailed { stderr, .. } => {
                assert!(stderr.contains("PackagesNotFoundError"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(resolver.runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_list_failure_still_removes() {
        let (resolver, _dir) = resolver(ScriptedRunner::new().fail_on("list --json", "corrupt"));
        let err = resolver.resolve(Path::new("envs/a.yaml")).await.unwrap_err();
        assert!(matches!(err, ResolveError::ResolutionFailed { .. }));

        let calls = resolver.runner.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[2].contains("env remove"));
    }

    #[tokio::test]
    async fn test_remove_failure_is_not_fatal() {
        let (resolver, _dir) = resolver(
            ScriptedRunner::new()
                .on("list --json", LIST_JSON)
                .fail_on("env remove", "busy"),
        );
        let versions = resolver.resolve(Path::new("envs/a.yaml")).await.unwrap();
        assert_eq!(versions.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_invalid_listing() {
        let (resolver, _dir) = resolver(ScriptedRunner::new().on("list --json", "{}"));
        let err = resolver.resolve(Path::new("envs/a.yaml")).await.unwrap_err();
        assert!(matches!(err, ResolveError::InvalidOutput { .. }));
    }

    #[tokio::test]
    async fn test_pin_returns_verbatim_text() {
        let (resolver, _dir) =
            resolver(ScriptedRunner::new().on("list --explicit --md5", EXPLICIT));
        let text = resolver.pin(Path::new("envs/a.yaml")).await.unwrap();
        assert_eq!(text, EXPLICIT);

        let calls = resolver.runner.calls();
        assert!(calls[1].starts_with("mamba list --explicit --md5 --prefix "));
    }

    #[test]
    fn test_frontend() {
        let resolver = CondaResolver::new("micromamba");
        assert_eq!(resolver.frontend(), "micromamba");
        assert_eq!(DEFAULT_FRONTEND, "mamba");
    }
}
