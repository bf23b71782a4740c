//! Application error types using thiserror
//!
//! Error hierarchy:
//! - User / InvalidVersion: conditions the user has to fix
//! - EnvFileError: reading, parsing and writing environment and pin files
//! - ResolveError: failures of the external package manager
//! - RemoteError: code hosting API failures while publishing
//! - ConfigError: missing or conflicting configuration

use std::path::PathBuf;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad input or an unmet precondition the user can fix
    #[error("{0}")]
    User(String),

    /// A version string could not be ordered
    #[error("cannot parse version {version} of package {package}: {reason}")]
    InvalidVersion {
        package: String,
        version: String,
        reason: String,
    },

    /// Environment or pin file related errors
    #[error(transparent)]
    EnvFile(#[from] EnvFileError),

    /// External package manager related errors
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Code hosting API related errors
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Configuration related errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors related to environment and pin files
#[derive(Error, Debug)]
pub enum EnvFileError {
    /// Failed to read a file
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parsing error
    #[error("failed to parse YAML in {path}: {message}")]
    YamlParseError { path: PathBuf, message: String },

    /// The document has no usable dependency list
    #[error("invalid environment file {path}: {message}")]
    InvalidStructure { path: PathBuf, message: String },

    /// A dependency of the probe spec is missing from the resolved environment
    #[error("resolved environment contains no version for dependency '{name}'")]
    MissingResolvedVersion { name: String },
}

/// Errors related to the external package manager
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The tool could not be started at all
    #[error("failed to execute '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool exited with a non-zero status
    #[error("'{command}' failed with {status}:\n{stderr}\n{stdout}")]
    ResolutionFailed {
        command: String,
        status: String,
        stderr: String,
        stdout: String,
    },

    /// The tool produced output we could not understand
    #[error("unexpected output of '{command}': {message}")]
    InvalidOutput { command: String, message: String },

    /// Failed to set up an ephemeral location
    #[error("failed to prepare ephemeral environment in {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors related to the code hosting API
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Resource does not exist (used as a control-flow signal)
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Rate limit exceeded
    #[error("rate limit exceeded for {resource}")]
    RateLimited { resource: String },

    /// Server side failure
    #[error("server error {status} for {resource}")]
    Server { resource: String, status: u16 },

    /// Network request failed
    #[error("request for {resource} failed: {message}")]
    Network { resource: String, message: String },

    /// Non-retryable HTTP failure
    #[error("HTTP {status} for {resource}: {message}")]
    Http {
        resource: String,
        status: u16,
        message: String,
    },

    /// Response body could not be decoded
    #[error("invalid response for {resource}: {message}")]
    InvalidResponse { resource: String, message: String },

    /// A file that should be updated does not exist on the target branch
    #[error("{path} is expected to exist on branch {branch} but was not found")]
    MissingFile { path: String, branch: String },
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is not set
    #[error("missing environment variable '{name}' is required")]
    MissingEnvironmentVariable { name: String },

    /// Invalid configuration value
    #[error("invalid value '{value}' for {name}: {message}")]
    InvalidValue {
        name: String,
        value: String,
        message: String,
    },
}

impl AppError {
    /// Creates a new User error
    pub fn user(message: impl Into<String>) -> Self {
        AppError::User(message.into())
    }

    /// Creates a new InvalidVersion error
    pub fn invalid_version(
        package: impl Into<String>,
        version: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        AppError::InvalidVersion {
            package: package.into(),
            version: version.into(),
            reason: reason.into(),
        }
    }
}

impl EnvFileError {
    /// Creates a new ReadError
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EnvFileError::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Creates a new WriteError
    pub fn write_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EnvFileError::WriteError {
            path: path.into(),
            source,
        }
    }

    /// Creates a new YamlParseError
    pub fn yaml_parse_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        EnvFileError::YamlParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new InvalidStructure error
    pub fn invalid_structure(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        EnvFileError::InvalidStructure {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl ResolveError {
    /// Creates a new ResolutionFailed error from captured process output
    pub fn resolution_failed(
        command: impl Into<String>,
        status: impl Into<String>,
        stderr: impl Into<String>,
        stdout: impl Into<String>,
    ) -> Self {
        ResolveError::ResolutionFailed {
            command: command.into(),
            status: status.into(),
            stderr: stderr.into(),
            stdout: stdout.into(),
        }
    }

    /// Creates a new InvalidOutput error
    pub fn invalid_output(command: impl Into<String>, message: impl Into<String>) -> Self {
        ResolveError::InvalidOutput {
            command: command.into(),
            message: message.into(),
        }
    }
}

impl RemoteError {
    /// Creates a new NotFound error
    pub fn not_found(resource: impl Into<String>) -> Self {
        RemoteError::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates a new Network error
    pub fn network(resource: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError::Network {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Returns true for "not found" responses
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }

    /// Returns true for failures worth retrying (rate limits, 5xx, network)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::RateLimited { .. }
                | RemoteError::Server { .. }
                | RemoteError::Network { .. }
        )
    }
}

impl ConfigError {
    /// Creates a new MissingEnvironmentVariable error
    pub fn missing_env(name: impl Into<String>) -> Self {
        ConfigError::MissingEnvironmentVariable { name: name.into() }
    }
}
