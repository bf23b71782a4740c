//! Update/pin orchestrator for conda environment files
//!
//! This module provides:
//! - Worklist expansion: glob → dedupe → shuffle
//! - The per-file workflow: prior → probe → posterior → downgrade check → apply → pin
//! - The warn-or-abort policy for per-file failures
//! - Queuing of changed files for publishing

use crate::domain::{
    EnvReport, PackageVersions, PinStatus, RunSummary, UpdateStatus, VersionOrder,
};
use crate::envfile::{self, apply_versions, strip_constraints};
use crate::error::AppError;
use crate::progress::Progress;
use crate::publish::{compile_entity_regex, entity_label, CodeHost, PullRequest, RetryPolicy};
use crate::resolver::EnvResolver;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether to re-pin a file whose update was skipped by a downgrade conflict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPinPolicy {
    /// Pin only when no pin file exists yet
    #[default]
    OnlyIfMissing,
    /// Re-pin even if a pin file exists
    Refresh,
}

/// What a run should do
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Rewrite specs to the latest feasible versions
    pub update: bool,
    /// Write explicit pin files
    pub pin: bool,
    /// Publish changes as pull requests
    pub create_prs: bool,
    /// Label pull requests with the entity extracted from the path
    pub pr_add_label: bool,
    /// Regex with a named group `entity`
    pub entity_regex: Option<String>,
    /// Log per-file failures and continue instead of aborting
    pub warn_on_error: bool,
    /// Pinning behaviour after a downgrade conflict
    pub conflict_pin_policy: ConflictPinPolicy,
    /// Worklist shuffle seed; random when None
    pub seed: Option<u64>,
    /// Show a progress bar
    pub show_progress: bool,
}

/// Where and how to publish pull requests
#[derive(Clone)]
pub struct PublishTarget {
    /// Code host client
    pub host: Arc<dyn CodeHost>,
    /// Branch pull requests are opened against
    pub base_ref: String,
    /// Retry policy of each `create()`
    pub retry: RetryPolicy,
}

impl PublishTarget {
    pub fn new(host: Arc<dyn CodeHost>, base_ref: impl Into<String>) -> Self {
        Self {
            host,
            base_ref: base_ref.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Orchestrator for updating and pinning environment files
pub struct Orchestrator<R> {
    resolver: R,
    options: ProcessOptions,
    publisher: Option<PublishTarget>,
    /// Directory that receives temporary probe specs
    work_dir: PathBuf,
}

impl<R: EnvResolver> Orchestrator<R> {
    /// Create an orchestrator working in the current directory
    pub fn new(resolver: R, options: ProcessOptions) -> Self {
        Self {
            resolver,
            options,
            publisher: None,
            work_dir: PathBuf::from("."),
        }
    }

    /// Set the publishing target used when `create_prs` is requested
    pub fn with_publisher(mut self, publisher: PublishTarget) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Set the directory for temporary probe specs
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Path as seen by the code host, relative to the work dir when below it
    fn repo_path(&self, path: &Path) -> String {
        repo_path(path.strip_prefix(&self.work_dir).unwrap_or(path))
    }

    /// Process all environment files matching `patterns`
    pub async fn process(&self, patterns: &[String]) -> Result<RunSummary, AppError> {
        let label_regex = self.validate()?;
        let mut summary = RunSummary::new();

        let mut worklist = expand_worklist(patterns)?;
        if worklist.is_empty() {
            info!("No conda envs found at given paths: {}", patterns.join(", "));
            return Ok(summary);
        }
        shuffle(&mut worklist, self.options.seed);

        let platform = if self.options.pin {
            Some(self.resolver.platform().await?)
        } else {
            None
        };

        let progress = Progress::worklist(worklist.len(), self.options.show_progress);
        for path in &worklist {
            progress.begin(path);
            let report = self
                .process_env(path, platform.as_deref(), label_regex.as_ref())
                .await?;
            summary.add(report);
            progress.advance();
        }

        Ok(summary)
    }

    /// Check option combinations; yields the compiled label regex if labeling
    fn validate(&self) -> Result<Option<Regex>, AppError> {
        let options = &self.options;
        if !options.update && !options.pin {
            return Err(AppError::user(
                "Nothing to do: neither updating nor pinning was requested.",
            ));
        }
        if options.create_prs && self.publisher.is_none() {
            return Err(AppError::user(
                "Cannot create PRs without a configured code host.",
            ));
        }
        if !options.pr_add_label {
            return Ok(None);
        }
        match &options.entity_regex {
            Some(pattern) => compile_entity_regex(pattern).map(Some),
            None => Err(AppError::user(
                "Cannot add label to PR without --entity-regex specified.",
            )),
        }
    }

    /// Run one file through the workflow, applying the warn-or-abort policy
    async fn process_env(
        &self,
        path: &Path,
        platform: Option<&str>,
        label_regex: Option<&Regex>,
    ) -> Result<EnvReport, AppError> {
        let mut report = EnvReport::new(path);

        let mut pr = match self.pull_request(path, label_regex) {
            Ok(pr) => pr,
            Err(e) => {
                self.handle_failure(path, e, &mut report)?;
                return Ok(report);
            }
        };

        if let Err(e) = self
            .run_workflow(path, platform, &mut report, pr.as_mut())
            .await
        {
            self.handle_failure(path, e, &mut report)?;
        }

        // changes queued before a warned failure are still published
        if let Some(pr) = &pr {
            match pr.create().await {
                Ok(outcome) => report.publish = Some(outcome),
                Err(e) => self.handle_failure(path, e.into(), &mut report)?,
            }
        }
        Ok(report)
    }

    fn handle_failure(
        &self,
        path: &Path,
        error: AppError,
        report: &mut EnvReport,
    ) -> Result<(), AppError> {
        if !self.options.warn_on_error {
            return Err(error);
        }
        warn!(env = %path.display(), "Failed for conda env {}: {}", path.display(), error);
        report.error = Some(error.to_string());
        Ok(())
    }

    fn pull_request(
        &self,
        path: &Path,
        label_regex: Option<&Regex>,
    ) -> Result<Option<PullRequest>, AppError> {
        let Some(target) = self.publisher.as_ref().filter(|_| self.options.create_prs) else {
            return Ok(None);
        };
        let entity = self.repo_path(path);
        let mode = if self.options.update { "bump" } else { "pin" };
        let label = label_regex
            .map(|regex| entity_label(regex, &entity))
            .transpose()?;

        let pr = PullRequest::new(
            format!("perf: auto{} {}", mode, entity),
            format!("Automatic {} of {}.", mode, entity),
            format!("auto{}/{}", mode, entity.replace('/', "-")),
            target.base_ref.clone(),
            Arc::clone(&target.host),
        )
        .with_label(label)
        .with_retry(target.retry);
        Ok(Some(pr))
    }

    async fn run_workflow(
        &self,
        path: &Path,
        platform: Option<&str>,
        report: &mut EnvReport,
        mut pr: Option<&mut PullRequest>,
    ) -> Result<(), AppError> {
        if self.options.update {
            info!("Updating {}...", path.display());
            report.update = self.update_env(path, pr.as_deref_mut()).await?;
        }

        let Some(platform) = platform.filter(|_| self.options.pin) else {
            return Ok(());
        };
        let pin_path = envfile::pin_file_path(path, platform);
        if self.should_pin(&report.update, &pin_path) {
            info!("Pinning {}...", path.display());
            report.pin = self.update_pinning(path, &pin_path, pr).await?;
        }
        Ok(())
    }

    fn should_pin(&self, update: &UpdateStatus, pin_path: &Path) -> bool {
        if !self.options.update || update.is_updated() || !pin_path.exists() {
            return true;
        }
        matches!(update, UpdateStatus::Conflict { .. })
            && self.options.conflict_pin_policy == ConflictPinPolicy::Refresh
    }

    async fn update_env(
        &self,
        path: &Path,
        pr: Option<&mut PullRequest>,
    ) -> Result<UpdateStatus, AppError> {
        let spec = envfile::load_env(path)?;

        info!("Resolving prior versions...");
        let prior = self.resolver.resolve(path).await?;

        let probe = strip_constraints(&spec);
        let posterior = {
            let probe_file = envfile::write_temporary(&self.work_dir, &probe)?;
            info!("Resolving posterior versions...");
            self.resolver.resolve(probe_file.path()).await?
        };

        let downgraded = detect_downgrades(&prior, &posterior).inspect_err(|_| {
            debug!(env = %path.display(), "posterior versions: {:?}", posterior);
        })?;
        if !downgraded.is_empty() {
            let message = format!(
                "Env {} could not be updated because the following packages would be \
                 downgraded: {}. Please consider a manual update of the environment.",
                path.display(),
                downgraded.join(", ")
            );
            if !self.options.warn_on_error {
                return Err(AppError::user(message));
            }
            warn!(env = %path.display(), "{}", message);
            return Ok(UpdateStatus::Conflict {
                packages: downgraded,
            });
        }

        let pinned = apply_versions(&spec, &posterior)?;
        if pinned == spec {
            info!("No updates in env.");
            return Ok(UpdateStatus::Unchanged);
        }

        let content = envfile::save_env(path, &pinned)?;
        if let Some(pr) = pr {
            let entity = self.repo_path(path);
            let message = format!("perf: update {}.", entity);
            pr.add_file(entity, content, true, message);
        }
        Ok(UpdateStatus::Updated)
    }

    async fn update_pinning(
        &self,
        path: &Path,
        pin_path: &Path,
        pr: Option<&mut PullRequest>,
    ) -> Result<PinStatus, AppError> {
        let old_content = envfile::read_pin_file(pin_path)?;
        let new_content = self.resolver.pin(path).await?;

        if old_content.as_deref() == Some(new_content.as_str()) {
            info!("Pinning of {} is up to date.", path.display());
            return Ok(PinStatus::Unchanged);
        }

        envfile::write_pin_file(pin_path, &new_content)?;
        let existed = old_content.is_some();
        if let Some(pr) = pr {
            let message = if existed {
                "perf: update env pinning.".to_string()
            } else {
                format!("feat: add pinning for {}.", self.repo_path(path))
            };
            pr.add_file(self.repo_path(pin_path), new_content, existed, message);
        }
        Ok(if existed {
            PinStatus::Updated
        } else {
            PinStatus::Created
        })
    }
}

/// Packages whose posterior version is strictly lower than the prior one
///
/// Only packages present in both maps are compared. Names are sorted.
pub fn detect_downgrades(
    prior: &PackageVersions,
    posterior: &PackageVersions,
) -> Result<Vec<String>, AppError> {
    let parse = |name: &str, version: &str| {
        VersionOrder::parse(version)
            .map_err(|e| AppError::invalid_version(name, version, e.reason))
    };

    let mut downgraded = Vec::new();
    for (name, posterior_version) in posterior.iter() {
        let Some(prior_version) = prior.get(name) else {
            continue;
        };
        if parse(name, posterior_version)? < parse(name, prior_version)? {
            downgraded.push(name.to_string());
        }
    }
    // iteration is already name-ordered
    Ok(downgraded)
}

/// Expand glob patterns into a worklist deduplicated by first appearance
pub fn expand_worklist(patterns: &[String]) -> Result<Vec<PathBuf>, AppError> {
    let mut seen = HashSet::new();
    let mut worklist = Vec::new();
    for pattern in patterns {
        let paths = glob::glob(pattern)
            .map_err(|e| AppError::user(format!("Invalid glob pattern '{}': {}", pattern, e)))?;
        for entry in paths {
            match entry {
                Ok(path) => {
                    if seen.insert(path.clone()) {
                        worklist.push(path);
                    }
                }
                Err(e) => debug!("skipping unreadable path: {}", e),
            }
        }
    }
    Ok(worklist)
}

/// Shuffle the worklist, deterministically when a seed is given
pub fn shuffle(worklist: &mut [PathBuf], seed: Option<u64>) {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    worklist.shuffle(&mut rng);
}

/// Repository-relative, slash separated form of a local path
///
/// Root and drive prefixes are dropped, so absolute paths never yield `//`.
pub fn repo_path(path: &Path) -> String {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_) | Component::ParentDir))
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
