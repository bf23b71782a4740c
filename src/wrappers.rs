//! Wrapper version updates in workflow files
//!
//! Workflow files reference versioned wrappers like
//! `wrapper: "v3.3.3/bio/samtools/sort"`. This module bumps each reference
//! to the earliest tag that contains the latest change of the wrapper path,
//! looked up in a sparse clone of the wrapper repository.

use crate::error::{AppError, EnvFileError, ResolveError};
use crate::process::{CommandRunner, SystemCommandRunner};
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tempfile::TempDir;
use tracing::{info, warn};

/// Default wrapper repository
pub const DEFAULT_WRAPPER_REPO: &str = "https://github.com/snakemake/snakemake-wrappers.git";

static WRAPPER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<def>(?:meta_)?wrapper:\n?\s*)(?:"(?P<dq>[^"\n]+)"|'(?P<sq>[^'\n]+)')"#)
        .unwrap()
});

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:").unwrap());

/// A wrapper reference that could be resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrapperChange {
    /// Wrapper path without the version, e.g. `bio/samtools/sort`
    pub wrapper: String,
    /// Version before the update
    pub from: String,
    /// Latest version
    pub to: String,
}

impl WrapperChange {
    pub fn is_bump(&self) -> bool {
        self.from != self.to
    }
}

/// Result for one workflow file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrapperFileReport {
    /// Path of the workflow file
    pub path: PathBuf,
    /// Every resolved reference, bumped or not
    pub changes: Vec<WrapperChange>,
    /// Whether the file was rewritten
    pub written: bool,
}

struct WrapperRef<'a> {
    version: &'a str,
    wrapper: &'a str,
}

fn quoted_value<'c>(caps: &Captures<'c>) -> (&'c str, char) {
    match (caps.name("dq"), caps.name("sq")) {
        (Some(m), _) => (m.as_str(), '"'),
        (None, Some(m)) => (m.as_str(), '\''),
        (None, None) => ("", '"'),
    }
}

/// Split a reference into version and wrapper path; None for URLs and
/// values without a version prefix
fn parse_ref(value: &str) -> Option<WrapperRef<'_>> {
    if SCHEME_RE.is_match(value) {
        return None;
    }
    let (version, wrapper) = value.split_once('/')?;
    Some(WrapperRef { version, wrapper })
}

/// Wrapper paths referenced in `content`, deduplicated in order of appearance
pub fn wrapper_paths(content: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for caps in WRAPPER_RE.captures_iter(content) {
        let (value, _) = quoted_value(&caps);
        if let Some(parsed) = parse_ref(value) {
            if !paths.iter().any(|p| p == parsed.wrapper) {
                paths.push(parsed.wrapper.to_string());
            }
        }
    }
    paths
}

/// Rewrite every wrapper reference to the version returned by `lookup`
///
/// References that are URLs, lack a version or have no known latest version
/// are left untouched.
pub fn rewrite_wrapper_refs<F>(content: &str, lookup: F) -> (String, Vec<WrapperChange>)
where
    F: Fn(&str) -> Option<String>,
{
    let mut changes = Vec::new();
    let rewritten = WRAPPER_RE.replace_all(content, |caps: &Captures| {
        let original = caps[0].to_string();
        let (value, quote) = quoted_value(caps);
        let Some(parsed) = parse_ref(value) else {
            if !SCHEME_RE.is_match(value) {
                warn!(
                    "Could not parse wrapper specification '{}' (expected version/cat/name or \
                     version/cat/name/subcommand). Leaving unchanged.",
                    value
                );
            }
            return original;
        };
        let Some(latest) = lookup(parsed.wrapper) else {
            warn!(
                "Could not determine latest version of wrapper '{}'. Leaving unchanged.",
                parsed.wrapper
            );
            return original;
        };

        if latest != parsed.version {
            info!(
                "Updated wrapper '{}' from {} to {}.",
                parsed.wrapper, parsed.version, latest
            );
        } else {
            info!(
                "Wrapper '{}' is already at latest version {}.",
                parsed.wrapper, latest
            );
        }
        let replacement = format!(
            "{}{quote}{}/{}{quote}",
            &caps["def"],
            latest,
            parsed.wrapper,
            quote = quote
        );
        changes.push(WrapperChange {
            wrapper: parsed.wrapper.to_string(),
            from: parsed.version.to_string(),
            to: latest,
        });
        replacement
    });
    (rewritten.into_owned(), changes)
}

/// Sparse checkout patterns: wrapper scripts, their environments and the
/// test Snakefiles of meta-wrappers
fn sparse_checkout_patterns() -> Vec<String> {
    let mut patterns = Vec::new();
    for wrapper_pattern in ["*", "*/*"] {
        for filetype in ["wrapper.*", "environment.yaml"] {
            patterns.push(format!("/*/{}/{}", wrapper_pattern, filetype));
        }
    }
    patterns.push("/meta/*/*/test/Snakefile".to_string());
    patterns
}

/// Sparse local clone of the wrapper repository
///
/// The clone lives in a temporary directory removed on drop.
pub struct WrapperRepo<C = SystemCommandRunner> {
    dir: TempDir,
    runner: C,
}

impl<C: CommandRunner> WrapperRepo<C> {
    /// Clone `url` without checking out blobs other than the sparse patterns
    pub async fn clone_from(url: &str, runner: C) -> Result<Self, AppError> {
        let dir = TempDir::new().map_err(|source| ResolveError::Workspace {
            path: std::env::temp_dir(),
            source,
        })?;
        let repo = Self { dir, runner };

        info!("Cloning {}...", url);
        repo.git(&["clone", "--filter=blob:none", "--no-checkout", url, "."])
            .await?;
        repo.git(&["config", "core.sparseCheckoutCone", "false"])
            .await?;
        repo.git(&["sparse-checkout", "disable"]).await?;
        let patterns = sparse_checkout_patterns();
        let mut args = vec!["sparse-checkout", "set", "--no-cone"];
        args.extend(patterns.iter().map(String::as_str));
        repo.git(&args).await?;
        repo.git(&["read-tree", "-mu", "HEAD"]).await?;
        Ok(repo)
    }

    /// Use an existing checkout
    pub fn from_checkout(dir: TempDir, runner: C) -> Self {
        Self { dir, runner }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    async fn git(&self, args: &[&str]) -> Result<String, ResolveError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner
            .run("git", &args, Some(self.dir.path()))
            .await?
            .into_stdout()
    }

    /// Earliest tag containing the last commit that touched `wrapper`
    pub async fn latest_version(&self, wrapper: &str) -> Result<Option<String>, ResolveError> {
        if !self.dir.path().join(wrapper).exists() {
            return Ok(None);
        }
        let commit = self.git(&["rev-list", "-1", "HEAD", "--", wrapper]).await?;
        let commit = commit.trim();
        if commit.is_empty() {
            return Ok(None);
        }
        let tags = self
            .git(&["tag", "--sort", "creatordate", "--contains", commit])
            .await?;
        Ok(tags.lines().map(str::trim).find(|t| !t.is_empty()).map(String::from))
    }
}

/// Bump wrapper references in each workflow file, writing changed files back
pub async fn update_snakemake_wrappers<C: CommandRunner>(
    snakefiles: &[PathBuf],
    repo: &WrapperRepo<C>,
) -> Result<Vec<WrapperFileReport>, AppError> {
    let mut cache: HashMap<String, Option<String>> = HashMap::new();
    let mut reports = Vec::new();

    for path in snakefiles {
        info!(
            "Updating snakemake-wrappers and meta-wrappers in {}...",
            path.display()
        );
        let content =
            fs::read_to_string(path).map_err(|e| EnvFileError::read_error(path, e))?;

        for wrapper in wrapper_paths(&content) {
            if !cache.contains_key(&wrapper) {
                let version = repo.latest_version(&wrapper).await?;
                cache.insert(wrapper, version);
            }
        }

        let (rewritten, changes) =
            rewrite_wrapper_refs(&content, |wrapper| cache.get(wrapper).cloned().flatten());
        let written = rewritten != content;
        if written {
            fs::write(path, &rewritten).map_err(|e| EnvFileError::write_error(path, e))?;
        }
        reports.push(WrapperFileReport {
            path: path.clone(),
            changes,
            written,
        });
    }
    Ok(reports)
}
