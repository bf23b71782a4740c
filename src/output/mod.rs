//! Run reports on stdout
//!
//! Text for people reading a terminal, JSON for CI jobs that consume the
//! result of a run. Logs go to stderr and never mix with the report.

mod json;
mod text;

pub use json::JsonFormatter;
pub use text::TextFormatter;

use crate::cli::Cli;
use crate::domain::RunSummary;
use crate::wrappers::WrapperFileReport;
use std::io::Write;

/// How much of a run the text report shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Only the summary line
    Quiet,
    /// Changed and failed files plus the summary
    #[default]
    Normal,
    /// Every file, including unchanged ones
    Verbose,
}

impl Verbosity {
    /// `--quiet` wins over `--verbose`
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, true) => Verbosity::Verbose,
            (false, false) => Verbosity::Normal,
        }
    }
}

/// Rendering chosen on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStyle {
    Text { verbosity: Verbosity, color: bool },
    Json,
}

impl Default for ReportStyle {
    fn default() -> Self {
        ReportStyle::Text {
            verbosity: Verbosity::Normal,
            color: true,
        }
    }
}

impl ReportStyle {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            return ReportStyle::Json;
        }
        ReportStyle::Text {
            verbosity: Verbosity::from_flags(cli.verbose, cli.quiet),
            color: !cli.no_color,
        }
    }

    /// Formatter rendering this style
    pub fn formatter(self) -> Box<dyn OutputFormatter> {
        match self {
            ReportStyle::Text { verbosity, color } => {
                Box::new(TextFormatter::with_color(verbosity, color))
            }
            ReportStyle::Json => Box::new(JsonFormatter::new()),
        }
    }
}

/// Writes the report of a run
pub trait OutputFormatter {
    /// Report of an update or pin run over environment files
    fn format_run(&self, summary: &RunSummary, writer: &mut dyn Write) -> std::io::Result<()>;

    /// Report of a wrapper update run over workflow files
    fn format_wrappers(
        &self,
        reports: &[WrapperFileReport],
        writer: &mut dyn Write,
    ) -> std::io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn style(args: &[&str]) -> ReportStyle {
        let mut argv = vec!["flowdeploy"];
        argv.extend_from_slice(args);
        argv.extend(["pin-conda-envs", "envs/a.yaml"]);
        ReportStyle::from_cli(&Cli::parse_from(argv))
    }

    #[test]
    fn test_quiet_wins_over_verbose() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
    }

    #[test]
    fn test_default_style_is_colored_text() {
        assert_eq!(style(&[]), ReportStyle::default());
    }

    #[test]
    fn test_json_ignores_verbosity() {
        assert_eq!(style(&["--json", "--verbose"]), ReportStyle::Json);
    }

    #[test]
    fn test_no_color() {
        assert_eq!(
            style(&["-q", "--no-color"]),
            ReportStyle::Text {
                verbosity: Verbosity::Quiet,
                color: false
            }
        );
    }

    #[test]
    fn test_json_formatter_renders_empty_run() {
        let mut buf = Vec::new();
        ReportStyle::Json
            .formatter()
            .format_run(&RunSummary::new(), &mut buf)
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["summary"]["processed"], 0);
    }
}
