//! Environment resolution through an external package manager
//!
//! The orchestrator only depends on the [`EnvResolver`] capability; the
//! single concrete backend is [`CondaResolver`].

mod conda;

pub use conda::{CondaResolver, DEFAULT_FRONTEND};

use crate::domain::PackageVersions;
use crate::error::ResolveError;
use async_trait::async_trait;
use std::path::Path;

/// Capability to materialize environment specs into concrete versions
#[async_trait]
pub trait EnvResolver: Send + Sync {
    /// Platform identifier used in pin file names (e.g. `linux-64`)
    async fn platform(&self) -> Result<String, ResolveError>;

    /// Resolve the spec at `spec_path` into package versions
    async fn resolve(&self, spec_path: &Path) -> Result<PackageVersions, ResolveError>;

    /// Resolve the spec at `spec_path` into explicit lock text
    async fn pin(&self, spec_path: &Path) -> Result<String, ResolveError>;
}
