//! Text output formatter for human-readable display
//!
//! One line per environment file with its update, pin and pull request
//! outcome, followed by a summary line.

use crate::domain::{EnvReport, PinStatus, PublishOutcome, RunSummary, UpdateStatus};
use crate::output::{OutputFormatter, Verbosity};
use crate::wrappers::WrapperFileReport;
use colored::Colorize;
use std::io::Write;

#[derive(Debug, Clone, Copy)]
enum Style {
    Bold,
    Green,
    Yellow,
    Red,
    Dimmed,
}

/// Text formatter for human-readable output
pub struct TextFormatter {
    verbosity: Verbosity,
    color: bool,
}

impl TextFormatter {
    /// Create a new text formatter
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            color: true,
        }
    }

    /// Create a new text formatter with color option
    pub fn with_color(verbosity: Verbosity, color: bool) -> Self {
        Self { verbosity, color }
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if !self.color {
            return text.to_string();
        }
        match style {
            Style::Bold => text.bold().to_string(),
            Style::Green => text.green().to_string(),
            Style::Yellow => text.yellow().to_string(),
            Style::Red => text.red().bold().to_string(),
            Style::Dimmed => text.dimmed().to_string(),
        }
    }

    fn update_label(&self, status: &UpdateStatus) -> String {
        let style = match status {
            UpdateStatus::Updated => Style::Green,
            UpdateStatus::Conflict { .. } => Style::Yellow,
            UpdateStatus::Unchanged | UpdateStatus::NotRequested => Style::Dimmed,
        };
        self.paint(&status.to_string(), style)
    }

    fn pin_label(&self, status: PinStatus) -> String {
        let style = if status.is_written() {
            Style::Green
        } else {
            Style::Dimmed
        };
        self.paint(&status.to_string(), style)
    }

    fn publish_label(&self, outcome: &PublishOutcome) -> String {
        match outcome {
            PublishOutcome::NothingToCommit => self.paint("nothing to commit", Style::Dimmed),
            PublishOutcome::Created { url } => self.paint(url, Style::Green),
            PublishOutcome::Existing => self.paint("already open", Style::Dimmed),
        }
    }

    fn is_visible(&self, env: &EnvReport) -> bool {
        match self.verbosity {
            Verbosity::Quiet => false,
            Verbosity::Normal => {
                env.has_changes()
                    || env.is_failed()
                    || matches!(env.update, UpdateStatus::Conflict { .. })
            }
            Verbosity::Verbose => true,
        }
    }

    fn format_env(&self, env: &EnvReport, writer: &mut dyn Write) -> std::io::Result<()> {
        write!(writer, "{}", self.paint(&env.path.display().to_string(), Style::Bold))?;
        if env.update != UpdateStatus::NotRequested {
            write!(writer, "  update: {}", self.update_label(&env.update))?;
        }
        write!(writer, "  pin: {}", self.pin_label(env.pin))?;
        if let Some(outcome) = &env.publish {
            write!(writer, "  pr: {}", self.publish_label(outcome))?;
        }
        writeln!(writer)?;
        if let Some(error) = &env.error {
            writeln!(writer, "  {} {}", self.paint("failed:", Style::Red), error)?;
        }
        Ok(())
    }
}

impl OutputFormatter for TextFormatter {
    fn format_run(&self, summary: &RunSummary, writer: &mut dyn Write) -> std::io::Result<()> {
        if summary.files_processed() == 0 {
            return writeln!(writer, "{}", self.paint("No conda envs processed.", Style::Dimmed));
        }

        for env in summary.envs.iter().filter(|e| self.is_visible(e)) {
            self.format_env(env, writer)?;
        }

        let failed = summary.files_failed();
        let failed_display = if failed > 0 {
            self.paint(&format!("{} failed", failed), Style::Red)
        } else {
            "0 failed".to_string()
        };
        writeln!(
            writer,
            "{} {} processed: {} updated, {} pinned, {}",
            summary.files_processed(),
            if summary.files_processed() == 1 {
                "env"
            } else {
                "envs"
            },
            self.paint(&summary.files_updated().to_string(), Style::Green),
            self.paint(&summary.pins_written().to_string(), Style::Green),
            failed_display
        )
    }

    fn format_wrappers(
        &self,
        reports: &[WrapperFileReport],
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        let mut bumped = 0;
        for report in reports {
            let bumps: Vec<_> = report.changes.iter().filter(|c| c.is_bump()).collect();
            bumped += bumps.len();
            if self.verbosity == Verbosity::Quiet || (bumps.is_empty() && self.verbosity != Verbosity::Verbose) {
                continue;
            }
            writeln!(writer, "{}", self.paint(&report.path.display().to_string(), Style::Bold))?;
            let width = bumps.iter().map(|c| c.wrapper.len()).max().unwrap_or(0);
            for change in bumps {
                if self.color {
                    writeln!(
                        writer,
                        "  {:width$} {} {} {}",
                        change.wrapper,
                        change.from.dimmed(),
                        "→".dimmed(),
                        change.to.bright_white().bold(),
                        width = width
                    )?;
                } else {
                    writeln!(
                        writer,
                        "  {:width$} {} -> {}",
                        change.wrapper,
                        change.from,
                        change.to,
                        width = width
                    )?;
                }
            }
        }

        let files = reports.iter().filter(|r| r.written).count();
        writeln!(
            writer,
            "{} {} bumped in {} of {} files",
            bumped,
            if bumped == 1 { "wrapper" } else { "wrappers" },
            files,
            reports.len()
        )
    }
}
