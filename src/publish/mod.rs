//! Publishing changed files as pull requests
//!
//! This module provides:
//! - `PullRequest`: the per-file change set and its `create()` step
//! - Entity-label derivation from a user supplied regex
//! - The code host abstraction and its GitHub implementation
//! - The bounded retry combinator wrapped around `create()`

mod github;
mod retry;

pub use github::{CodeHost, GitHubClient, PullInfo};
pub use retry::{retry, RetryPolicy, DEFAULT_ATTEMPTS, DEFAULT_DELAY};

use crate::domain::PublishOutcome;
use crate::error::{AppError, RemoteError};
use regex::Regex;
use std::sync::Arc;
use tracing::info;

/// Name of the capture group holding the label
pub const ENTITY_GROUP: &str = "entity";

/// One queued file write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Repository-relative path
    pub path: String,
    /// Full new content
    pub content: String,
    /// Whether the file already exists upstream
    pub is_updated: bool,
    /// Commit message
    pub message: String,
}

/// A pull request under construction
pub struct PullRequest {
    title: String,
    body: String,
    branch: String,
    base_ref: String,
    label: Option<String>,
    files: Vec<FileChange>,
    host: Arc<dyn CodeHost>,
    retry: RetryPolicy,
}

impl PullRequest {
    /// Create an empty change set
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        branch: impl Into<String>,
        base_ref: impl Into<String>,
        host: Arc<dyn CodeHost>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            branch: branch.into(),
            base_ref: base_ref.into(),
            label: None,
            files: Vec::new(),
            host,
            retry: RetryPolicy::default(),
        }
    }

    /// Attach a label to the pull request once it is opened
    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    /// Override the retry policy of `create()`
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn files(&self) -> &[FileChange] {
        &self.files
    }

    /// Queue a file write
    pub fn add_file(
        &mut self,
        path: impl Into<String>,
        content: impl Into<String>,
        is_updated: bool,
        message: impl Into<String>,
    ) {
        self.files.push(FileChange {
            path: path.into(),
            content: content.into(),
            is_updated,
            message: message.into(),
        });
    }

    /// Commit all queued files to the branch and open the pull request
    ///
    /// The whole sequence is retried on transient failures. Re-running it
    /// against a branch with an open pull request does not open another one.
    pub async fn create(&self) -> Result<PublishOutcome, RemoteError> {
        if self.files.is_empty() {
            info!("No files to commit.");
            return Ok(PublishOutcome::NothingToCommit);
        }
        retry(self.retry, || self.create_once()).await
    }

    async fn create_once(&self) -> Result<PublishOutcome, RemoteError> {
        let branch_exists = match self.host.branch_sha(&self.branch).await {
            Ok(_) => {
                info!("Branch {} already exists.", self.branch);
                true
            }
            Err(e) if e.is_not_found() => {
                info!("Creating branch {}...", self.branch);
                let base_sha = self.host.branch_sha(&self.base_ref).await?;
                self.host.create_branch(&self.branch, &base_sha).await?;
                false
            }
            Err(e) => return Err(e),
        };

        for file in &self.files {
            let sha = self.current_sha(file, branch_exists).await?;
            self.host
                .put_file(
                    &file.path,
                    &file.content,
                    &file.message,
                    &self.branch,
                    sha.as_deref(),
                )
                .await?;
        }

        if let Some(existing) = self.host.find_open_pull(&self.branch, &self.base_ref).await? {
            info!("PR already exists: {}", existing.html_url);
            return Ok(PublishOutcome::Existing);
        }

        let pr = self
            .host
            .create_pull(&self.title, &self.body, &self.branch, &self.base_ref)
            .await?;
        if let Some(label) = &self.label {
            self.host.add_label(pr.number, label).await?;
        }
        info!("Created PR: {}", pr.html_url);
        Ok(PublishOutcome::Created { url: pr.html_url })
    }

    /// Blob hash to update against, or None to create the file
    async fn current_sha(
        &self,
        file: &FileChange,
        branch_exists: bool,
    ) -> Result<Option<String>, RemoteError> {
        if branch_exists {
            info!("Obtaining sha of {} on branch {}...", file.path, self.branch);
            match self.host.file_sha(&file.path, &self.branch).await {
                Ok(sha) => Ok(Some(sha)),
                Err(e) if e.is_not_found() && !file.is_updated => Ok(None),
                Err(e) if e.is_not_found() => Err(RemoteError::MissingFile {
                    path: file.path.clone(),
                    branch: self.branch.clone(),
                }),
                Err(e) => Err(e),
            }
        } else if file.is_updated {
            info!("Obtaining sha of {} on branch {}...", file.path, self.base_ref);
            match self.host.file_sha(&file.path, &self.base_ref).await {
                Ok(sha) => Ok(Some(sha)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        } else {
            Ok(None)
        }
    }
}

/// Compile a user supplied entity regex, anchored at the start of the input
pub fn compile_entity_regex(pattern: &str) -> Result<Regex, AppError> {
    let regex = Regex::new(&format!("^(?:{})", pattern))
        .map_err(|e| AppError::user(format!("Invalid --entity-regex: {}", e)))?;
    if !regex.capture_names().flatten().any(|n| n == ENTITY_GROUP) {
        return Err(AppError::user(
            "No group 'entity' found in given --entity-regex.",
        ));
    }
    Ok(regex)
}

/// Extract the label for `entity` (usually an environment file path)
pub fn entity_label(regex: &Regex, entity: &str) -> Result<String, AppError> {
    let caps = regex
        .captures(entity)
        .ok_or_else(|| AppError::user(format!("Given --entity-regex did not match {}.", entity)))?;
    caps.name(ENTITY_GROUP)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| AppError::user("No group 'entity' found in given --entity-regex."))
}
