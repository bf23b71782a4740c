//! flowdeploy - maintenance library for deployable workflow repositories
//!
//! This library provides the core functionality for keeping a workflow's
//! software stack current:
//! - Updating conda environment files to the latest feasible versions
//! - Writing explicit per-platform pin files
//! - Publishing each changed file as a pull request
//! - Bumping versioned wrapper references in workflow files

pub mod cli;
pub mod config;
pub mod domain;
pub mod envfile;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod process;
pub mod progress;
pub mod publish;
pub mod resolver;
pub mod wrappers;
