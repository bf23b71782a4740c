//! Code hosting API
//!
//! This module provides:
//! - The `CodeHost` trait with the handful of operations publishing needs
//! - A GitHub REST implementation with per-request retry and backoff

use crate::config::PublishConfig;
use crate::error::RemoteError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Default timeout for HTTP requests (30 seconds)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default User-Agent header
const DEFAULT_USER_AGENT: &str = concat!("flowdeploy/", env!("CARGO_PKG_VERSION"));

/// Maximum number of retry attempts per request
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BASE_DELAY_MS: u64 = 100;

/// An open pull request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullInfo {
    /// Pull request number
    pub number: u64,
    /// Web URL
    pub html_url: String,
}

/// Remote repository operations used by the publisher
///
/// Absence of a branch or file is reported as [`RemoteError::NotFound`].
#[async_trait]
pub trait CodeHost: Send + Sync {
    /// Head commit of a branch
    async fn branch_sha(&self, branch: &str) -> Result<String, RemoteError>;

    /// Create `branch` pointing at commit `sha`
    async fn create_branch(&self, branch: &str, sha: &str) -> Result<(), RemoteError>;

    /// Blob hash of `path` at `git_ref`
    async fn file_sha(&self, path: &str, git_ref: &str) -> Result<String, RemoteError>;

    /// Create (`sha` None) or update (`sha` Some) a file on `branch`
    async fn put_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
        sha: Option<&str>,
    ) -> Result<(), RemoteError>;

    /// Open pull request from `head` into `base`, if any
    async fn find_open_pull(&self, head: &str, base: &str)
        -> Result<Option<PullInfo>, RemoteError>;

    /// Open a new pull request
    async fn create_pull(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullInfo, RemoteError>;

    /// Attach a label to a pull request
    async fn add_label(&self, number: u64, label: &str) -> Result<(), RemoteError>;
}

#[derive(Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Deserialize)]
struct ContentEntry {
    sha: String,
}

#[derive(Deserialize)]
struct PullEntry {
    number: u64,
    html_url: String,
    head: PullHead,
}

#[derive(Deserialize)]
struct PullHead {
    #[serde(rename = "ref")]
    git_ref: String,
}

/// GitHub REST API client
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: String,
    repository: String,
    token: String,
    max_retries: u32,
}

impl GitHubClient {
    /// Create a client for the repository named in `config`
    pub fn new(config: &PublishConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| {
                RemoteError::network("HTTP client", format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            repository: config.repository.clone(),
            token: config.token.clone(),
            max_retries: MAX_RETRIES,
        })
    }

    /// Set the maximum number of retries per request
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Account owning the repository, as used in `owner:branch` head filters
    fn owner(&self) -> &str {
        self.repository
            .split_once('/')
            .map_or(self.repository.as_str(), |(owner, _)| owner)
    }

    fn repo_url(&self, tail: &str) -> Result<Url, RemoteError> {
        let raw = format!("{}/repos/{}/{}", self.api_url, self.repository, tail);
        Url::parse(&raw).map_err(|e| RemoteError::InvalidResponse {
            resource: raw.clone(),
            message: format!("invalid URL: {}", e),
        })
    }

    /// Send a request, retrying rate limits, 5xx responses and network errors
    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
        resource: &str,
    ) -> Result<reqwest::Response, RemoteError> {
        let mut last_error = None;
        let mut delay = BASE_DELAY_MS;

        for attempt in 0..=self.max_retries {
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(&self.token)
                .header("Accept", "application/vnd.github+json")
                .header("X-GitHub-Api-Version", "2022-11-28");
            if let Some(body) = body {
                request = request.json(body);
            }

            let error = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Err(RemoteError::not_found(resource));
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        RemoteError::RateLimited {
                            resource: resource.to_string(),
                        }
                    } else if is_retryable_server_status(status) {
                        RemoteError::Server {
                            resource: resource.to_string(),
                            status: status.as_u16(),
                        }
                    } else {
                        let message = response.text().await.unwrap_or_default();
                        return Err(RemoteError::Http {
                            resource: resource.to_string(),
                            status: status.as_u16(),
                            message,
                        });
                    }
                }
                Err(e) => RemoteError::network(resource, e.to_string()),
            };

            tracing::debug!(attempt, error = %error, "request failed");
            last_error = Some(error);
            if attempt < self.max_retries {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| RemoteError::network(resource, "unknown error")))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
        resource: &str,
    ) -> Result<T, RemoteError> {
        let response = self.send(method, url, body, resource).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::InvalidResponse {
                resource: resource.to_string(),
                message: format!("failed to parse JSON: {}", e),
            })
    }
}

fn is_retryable_server_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 500 | 502 | 503 | 504)
}

#[async_trait]
impl CodeHost for GitHubClient {
    async fn branch_sha(&self, branch: &str) -> Result<String, RemoteError> {
        let url = self.repo_url(&format!("git/ref/heads/{}", branch))?;
        let resource = format!("branch {}", branch);
        let git_ref: GitRef = self.send_json(Method::GET, &url, None, &resource).await?;
        Ok(git_ref.object.sha)
    }

    async fn create_branch(&self, branch: &str, sha: &str) -> Result<(), RemoteError> {
        let url = self.repo_url("git/refs")?;
        let body = json!({ "ref": format!("refs/heads/{}", branch), "sha": sha });
        let resource = format!("branch {}", branch);
        self.send(Method::POST, &url, Some(&body), &resource).await?;
        Ok(())
    }

    async fn file_sha(&self, path: &str, git_ref: &str) -> Result<String, RemoteError> {
        let mut url = self.repo_url(&format!("contents/{}", path))?;
        url.query_pairs_mut().append_pair("ref", git_ref);
        let resource = format!("{} on {}", path, git_ref);
        let entry: ContentEntry = self.send_json(Method::GET, &url, None, &resource).await?;
        Ok(entry.sha)
    }

    async fn put_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
        sha: Option<&str>,
    ) -> Result<(), RemoteError> {
        let url = self.repo_url(&format!("contents/{}", path))?;
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content.as_bytes()),
            "branch": branch,
        });
        if let Some(sha) = sha {
            body["sha"] = Value::String(sha.to_string());
        }
        let resource = format!("{} on {}", path, branch);
        self.send(Method::PUT, &url, Some(&body), &resource).await?;
        Ok(())
    }

    async fn find_open_pull(
        &self,
        head: &str,
        base: &str,
    ) -> Result<Option<PullInfo>, RemoteError> {
        // the head filter keeps the answer to one page however many PRs are open
        let mut url = self.repo_url("pulls")?;
        url.query_pairs_mut()
            .append_pair("state", "open")
            .append_pair("head", &format!("{}:{}", self.owner(), head))
            .append_pair("base", base)
            .append_pair("per_page", "100");
        let pulls: Vec<PullEntry> = self
            .send_json(Method::GET, &url, None, "pull requests")
            .await?;
        Ok(pulls
            .into_iter()
            .find(|pr| pr.head.git_ref == head)
            .map(|pr| PullInfo {
                number: pr.number,
                html_url: pr.html_url,
            }))
    }

    async fn create_pull(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullInfo, RemoteError> {
        let url = self.repo_url("pulls")?;
        let payload = json!({ "title": title, "body": body, "head": head, "base": base });
        self.send_json(Method::POST, &url, Some(&payload), "pull requests")
            .await
    }

    async fn add_label(&self, number: u64, label: &str) -> Result<(), RemoteError> {
        let url = self.repo_url(&format!("issues/{}/labels", number))?;
        let body = json!({ "labels": [label] });
        let resource = format!("labels of #{}", number);
        self.send(Method::POST, &url, Some(&body), &resource).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn config() -> PublishConfig {
        PublishConfig {
            token: "ghp_x".to_string(),
            repository: "acme/workflow".to_string(),
            base_ref: "main".to_string(),
            api_url: "https://api.github.com".to_string(),
        }
    }

    #[test]
    fn test_client_creation() {
        let client = GitHubClient::new(&config()).unwrap();
        assert_eq!(client.max_retries, MAX_RETRIES);
        assert_eq!(client.with_max_retries(0).max_retries, 0);
    }

    #[test]
    fn test_repo_url() {
        let client = GitHubClient::new(&config()).unwrap();
        let url = client.repo_url("git/ref/heads/autobump/envs-a.yaml").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/workflow/git/ref/heads/autobump/envs-a.yaml"
        );
    }

    #[test]
    fn test_query_is_encoded() {
        let client = GitHubClient::new(&config()).unwrap();
        let mut url = client.repo_url("contents/envs/a.yaml").unwrap();
        url.query_pairs_mut().append_pair("ref", "autobump/envs a");
        assert_eq!(url.query(), Some("ref=autobump%2Fenvs+a"));
    }

    #[test]
    fn test_retryable_statuses() {
        for code in [500, 502, 503, 504] {
            assert!(is_retryable_server_status(StatusCode::from_u16(code).unwrap()));
        }
        assert!(!is_retryable_server_status(StatusCode::NOT_IMPLEMENTED));
        assert!(!is_retryable_server_status(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[test]
    fn test_pull_entry_deserialize() {
        let json = r#"[{"number": 7, "html_url": "https://github.com/acme/workflow/pull/7",
                        "head": {"ref": "autobump/envs-a.yaml", "label": "acme:autobump/envs-a.yaml"}}]"#;
        let pulls: Vec<PullEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(pulls[0].head.git_ref, "autobump/envs-a.yaml");
        assert_eq!(pulls[0].number, 7);
    }

    fn mock_client(server: &MockServer) -> GitHubClient {
        let config = PublishConfig {
            api_url: server.base_url(),
            ..config()
        };
        GitHubClient::new(&config).unwrap()
    }

    const BRANCH_PATH: &str = "/repos/acme/workflow/git/ref/heads/autobump/envs-a.yaml";

    #[test]
    fn test_owner_of_repository() {
        let client = GitHubClient::new(&config()).unwrap();
        assert_eq!(client.owner(), "acme");
    }

    #[tokio::test]
    async fn test_missing_branch_is_not_found() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path(BRANCH_PATH);
                then.status(404).body(r#"{"message": "Not Found"}"#);
            })
            .await;

        let err = mock_client(&server)
            .branch_sha("autobump/envs-a.yaml")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start_async().await;
        let unavailable = server
            .mock_async(|when, then| {
                when.method(GET).path(BRANCH_PATH);
                then.status(503);
            })
            .await;

        let client = mock_client(&server);
        let request = tokio::spawn(async move { client.branch_sha("autobump/envs-a.yaml").await });

        // swap in a healthy answer while the client backs off
        while unavailable.hits_async().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let healthy = server
            .mock_async(|when, then| {
                when.method(GET).path(BRANCH_PATH);
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"ref": "refs/heads/autobump/envs-a.yaml", "object": {"sha": "abc123"}}"#);
            })
            .await;
        let first_hits = unavailable.hits_async().await;
        unavailable.delete_async().await;

        let sha = request.await.unwrap().unwrap();
        assert_eq!(sha, "abc123");
        assert!(first_hits >= 1);
        assert_eq!(healthy.hits_async().await, 1);
    }

    #[tokio::test]
    async fn test_server_error_gives_up_after_retries() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path(BRANCH_PATH);
                then.status(502);
            })
            .await;

        let err = mock_client(&server)
            .with_max_retries(1)
            .branch_sha("autobump/envs-a.yaml")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Server { status: 502, .. }));
        assert!(err.is_transient());
        assert_eq!(mock.hits_async().await, 2);
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path(BRANCH_PATH);
                then.status(429);
            })
            .await;

        let err = mock_client(&server)
            .with_max_retries(0)
            .branch_sha("autobump/envs-a.yaml")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::RateLimited { .. }));
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn test_validation_failure_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/repos/acme/workflow/pulls");
                then.status(422)
                    .body(r#"{"message": "A pull request already exists"}"#);
            })
            .await;

        let err = mock_client(&server)
            .create_pull("title", "body", "autobump/envs-a.yaml", "main")
            .await
            .unwrap_err();
        match err {
            RemoteError::Http {
                status, message, ..
            } => {
                assert_eq!(status, 422);
                assert!(message.contains("already exists"));
            }
            other => panic!("expected Http error, got {:?}", other),
        }
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn test_find_open_pull_filters_by_head() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/repos/acme/workflow/pulls")
                    .query_param("state", "open")
                    .query_param("head", "acme:autobump/envs-a.yaml")
                    .query_param("base", "main");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(
                        r#"[{"number": 42, "html_url": "https://github.com/acme/workflow/pull/42",
                             "head": {"ref": "autobump/envs-a.yaml"}}]"#,
                    );
            })
            .await;

        let pull = mock_client(&server)
            .find_open_pull("autobump/envs-a.yaml", "main")
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(
            pull,
            Some(PullInfo {
                number: 42,
                html_url: "https://github.com/acme/workflow/pull/42".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_find_open_pull_none() {
        let server = MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/repos/acme/workflow/pulls")
                    .query_param("head", "acme:autobump/envs-b.yaml");
                then.status(200)
                    .header("content-type", "application/json")
                    .body("[]");
            })
            .await;

        let pull = mock_client(&server)
            .find_open_pull("autobump/envs-b.yaml", "main")
            .await
            .unwrap();
        assert_eq!(pull, None);
    }

    #[test]
    fn test_user_agent() {
        assert!(DEFAULT_USER_AGENT.starts_with("flowdeploy/"));
        assert_eq!(BASE_DELAY_MS, 100);
    }
}
