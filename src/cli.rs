//! CLI argument parsing module for flowdeploy

use crate::orchestrator::{ConflictPinPolicy, ProcessOptions};
use crate::resolver::DEFAULT_FRONTEND;
use crate::wrappers::DEFAULT_WRAPPER_REPO;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Maintenance of deployable workflow repositories
#[derive(Parser, Debug, Clone)]
#[command(
    name = "flowdeploy",
    version,
    about = "Keep conda environments and wrapper references of workflows up to date"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    // Output options
    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Enable quiet mode - minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output the run report in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Update conda environment files to the latest feasible versions
    UpdateCondaEnvs {
        /// Environment files or glob patterns
        #[arg(required = true)]
        envfiles: Vec<String>,

        /// Also write explicit pin files after updating
        #[arg(long)]
        pin_envs: bool,

        /// Re-pin a file whose update was skipped by a downgrade conflict
        /// even if a pin file exists
        #[arg(long)]
        refresh_pin_on_conflict: bool,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Write explicit pin files for conda environment files
    PinCondaEnvs {
        /// Environment files or glob patterns
        #[arg(required = true)]
        envfiles: Vec<String>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Bump snakemake wrapper references to their latest release
    UpdateSnakemakeWrappers {
        /// Workflow files to rewrite
        #[arg(required = true)]
        snakefiles: Vec<PathBuf>,

        /// Git URL of the wrapper repository
        #[arg(long, default_value = DEFAULT_WRAPPER_REPO)]
        wrapper_repo: String,
    },
}

/// Options shared by the conda environment commands
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Package manager used to resolve environments
    #[arg(long, default_value = DEFAULT_FRONTEND)]
    pub conda_frontend: String,

    /// Publish changes as pull requests
    #[arg(long)]
    pub create_prs: bool,

    /// Label pull requests with the entity matched by --entity-regex
    #[arg(long)]
    pub pr_add_label: bool,

    /// Regex with a named group `entity`, matched at the start of each path
    #[arg(long)]
    pub entity_regex: Option<String>,

    /// Log per-file failures and continue with the next file; exits with 2
    /// when every file failed or would have downgraded packages
    #[arg(long)]
    pub warn_on_error: bool,
}

impl Cli {
    /// Whether a progress bar should be drawn on stderr
    pub fn show_progress(&self) -> bool {
        !self.quiet && !self.json
    }
}

impl Command {
    /// Conda options and env file patterns, if this is a conda command
    pub fn conda_args(&self) -> Option<(&CommonArgs, &[String])> {
        match self {
            Command::UpdateCondaEnvs {
                envfiles, common, ..
            }
            | Command::PinCondaEnvs { envfiles, common } => Some((common, envfiles)),
            Command::UpdateSnakemakeWrappers { .. } => None,
        }
    }

    /// Build orchestrator options for a conda command
    pub fn process_options(&self, show_progress: bool) -> Option<ProcessOptions> {
        let (update, pin, refresh) = match self {
            Command::UpdateCondaEnvs {
                pin_envs,
                refresh_pin_on_conflict,
                ..
            } => (true, *pin_envs, *refresh_pin_on_conflict),
            Command::PinCondaEnvs { .. } => (false, true, false),
            Command::UpdateSnakemakeWrappers { .. } => return None,
        };
        let (common, _) = self.conda_args()?;

        Some(ProcessOptions {
            update,
            pin,
            create_prs: common.create_prs,
            pr_add_label: common.pr_add_label,
            entity_regex: common.entity_regex.clone(),
            warn_on_error: common.warn_on_error,
            conflict_pin_policy: if refresh {
                ConflictPinPolicy::Refresh
            } else {
                ConflictPinPolicy::OnlyIfMissing
            },
            seed: None,
            show_progress,
        })
    }
}
