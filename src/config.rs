//! Publishing configuration
//!
//! Credentials and repository context are read from the environment exactly
//! once, at the entry point, and then passed down explicitly.

use crate::error::ConfigError;

/// Default REST endpoint of the code host
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Everything needed to talk to the code hosting API
#[derive(Clone, PartialEq, Eq)]
pub struct PublishConfig {
    /// API token
    pub token: String,
    /// Target repository as `owner/name`
    pub repository: String,
    /// Branch pull requests are opened against
    pub base_ref: String,
    /// REST API base URL
    pub api_url: String,
}

impl std::fmt::Debug for PublishConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishConfig")
            .field("token", &"***")
            .field("repository", &self.repository)
            .field("base_ref", &self.base_ref)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl PublishConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let require = |name: &str| get(name).ok_or_else(|| ConfigError::missing_env(name));

        let token = require("GITHUB_TOKEN")?;
        let repository = require("GITHUB_REPOSITORY")?;
        if !is_owner_and_name(&repository) {
            return Err(ConfigError::InvalidValue {
                name: "GITHUB_REPOSITORY".to_string(),
                value: repository,
                message: "expected <owner>/<name>".to_string(),
            });
        }
        let base_ref = match get("GITHUB_BASE_REF") {
            Some(base_ref) => base_ref,
            None => require("GITHUB_REF_NAME")?,
        };
        let api_url = get("GITHUB_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            token,
            repository,
            base_ref,
            api_url,
        })
    }
}

fn is_owner_and_name(repository: &str) -> bool {
    matches!(
        repository.split_once('/'),
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_prefers_base_ref() {
        let config = PublishConfig::from_lookup(lookup(&[
            ("GITHUB_TOKEN", "ghp_x"),
            ("GITHUB_REPOSITORY", "acme/workflow"),
            ("GITHUB_BASE_REF", "main"),
            ("GITHUB_REF_NAME", "feature"),
        ]))
        .unwrap();
        assert_eq!(config.base_ref, "main");
        assert_eq!(config.repository, "acme/workflow");
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_from_lookup_falls_back_to_ref_name() {
        let config = PublishConfig::from_lookup(lookup(&[
            ("GITHUB_TOKEN", "ghp_x"),
            ("GITHUB_REPOSITORY", "acme/workflow"),
            ("GITHUB_BASE_REF", ""),
            ("GITHUB_REF_NAME", "master"),
            ("GITHUB_API_URL", "https://ghe.example.com/api/v3/"),
        ]))
        .unwrap();
        assert_eq!(config.base_ref, "master");
        assert_eq!(config.api_url, "https://ghe.example.com/api/v3");
    }

    #[test]
    fn test_missing_token() {
        let err = PublishConfig::from_lookup(lookup(&[("GITHUB_REPOSITORY", "acme/x")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnvironmentVariable { ref name } if name == "GITHUB_TOKEN"
        ));
    }

    #[test]
    fn test_missing_ref() {
        let err = PublishConfig::from_lookup(lookup(&[
            ("GITHUB_TOKEN", "ghp_x"),
            ("GITHUB_REPOSITORY", "acme/workflow"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("GITHUB_REF_NAME"));
    }

    #[test]
    fn test_invalid_repository() {
        let err = PublishConfig::from_lookup(lookup(&[
            ("GITHUB_TOKEN", "ghp_x"),
            ("GITHUB_REPOSITORY", "workflow"),
            ("GITHUB_REF_NAME", "main"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_debug_hides_token() {
        let config = PublishConfig::from_lookup(lookup(&[
            ("GITHUB_TOKEN", "ghp_secret"),
            ("GITHUB_REPOSITORY", "acme/workflow"),
            ("GITHUB_REF_NAME", "main"),
        ]))
        .unwrap();
        assert!(!format!("{:?}", config).contains("ghp_secret"));
    }
}
