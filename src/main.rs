//! flowdeploy - maintenance tool for deployable workflow repositories
//!
//! Updates and pins the conda environments of a workflow, optionally
//! publishing every changed file as a pull request, and bumps versioned
//! wrapper references in workflow files.

use clap::Parser;
use flowdeploy::cli::{Cli, Command};
use flowdeploy::config::PublishConfig;
use flowdeploy::orchestrator::{Orchestrator, PublishTarget};
use flowdeploy::output::ReportStyle;
use flowdeploy::process::SystemCommandRunner;
use flowdeploy::progress::{LogWriter, Progress};
use flowdeploy::publish::GitHubClient;
use flowdeploy::resolver::CondaResolver;
use flowdeploy::wrappers::{update_snakemake_wrappers, WrapperRepo};
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit code when every processed file failed under --warn-on-error
const EXIT_ALL_FAILED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr around any progress bar; RUST_LOG takes precedence over
/// the verbosity flags
fn init_logging(cli: &Cli) {
    let default_level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_writer(LogWriter)
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!cli.no_color)
        .try_init()
        .ok();

    if cli.no_color {
        colored::control::set_override(false);
    }
}

/// Main application logic
async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let formatter = ReportStyle::from_cli(&cli).formatter();
    let mut stdout = io::stdout().lock();

    if let Command::UpdateSnakemakeWrappers {
        snakefiles,
        wrapper_repo,
    } = &cli.command
    {
        let repo = {
            let _spinner = Progress::spinner("Cloning wrapper repository...", cli.show_progress());
            WrapperRepo::clone_from(wrapper_repo, SystemCommandRunner::new()).await?
        };

        let reports = update_snakemake_wrappers(snakefiles, &repo).await?;
        formatter.format_wrappers(&reports, &mut stdout)?;
        stdout.flush()?;
        return Ok(ExitCode::SUCCESS);
    }

    let (Some((common, envfiles)), Some(options)) = (
        cli.command.conda_args(),
        cli.command.process_options(cli.show_progress()),
    ) else {
        return Ok(ExitCode::SUCCESS);
    };
    let warn_on_error = options.warn_on_error;

    let resolver = CondaResolver::new(common.conda_frontend.clone());
    let mut orchestrator = Orchestrator::new(resolver, options);
    if common.create_prs {
        let config = PublishConfig::from_env()?;
        let client = GitHubClient::new(&config)?;
        orchestrator =
            orchestrator.with_publisher(PublishTarget::new(Arc::new(client), config.base_ref));
    }

    let summary = orchestrator.process(envfiles).await?;

    formatter.format_run(&summary, &mut stdout)?;
    stdout.flush()?;

    if warn_on_error && summary.all_failed() {
        return Ok(ExitCode::from(EXIT_ALL_FAILED));
    }
    Ok(ExitCode::SUCCESS)
}
