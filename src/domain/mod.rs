//! Core domain models for flowdeploy
//!
//! This module contains the fundamental types used throughout the application:
//! - Version ordering following the conda conventions
//! - Environment specification documents and their dependency entries
//! - Resolved package versions
//! - Run summary and per-file results

mod env_spec;
mod package_versions;
mod summary;
pub mod version_order;

pub use env_spec::{DependencyEntry, EnvironmentSpec, DEPENDENCIES_KEY};
pub use package_versions::{PackageRecord, PackageVersions};
pub use summary::{EnvReport, PinStatus, PublishOutcome, RunSummary, UpdateStatus};
pub use version_order::{InvalidVersion, VersionOrder};
