//! JSON output formatter for machine processing

use crate::domain::{EnvReport, RunSummary};
use crate::output::OutputFormatter;
use crate::wrappers::WrapperFileReport;
use serde::Serialize;
use std::io::Write;

/// JSON formatter for machine-readable output
#[derive(Debug, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new() -> Self {
        Self
    }
}

/// JSON representation of a run
#[derive(Serialize)]
struct JsonRun<'a> {
    summary: JsonSummary,
    envs: &'a [EnvReport],
}

#[derive(Serialize)]
struct JsonSummary {
    processed: usize,
    updated: usize,
    pinned: usize,
    failed: usize,
}

#[derive(Serialize)]
struct JsonWrappers<'a> {
    bumped: usize,
    files: &'a [WrapperFileReport],
}

fn write_json<T: Serialize>(value: &T, writer: &mut dyn Write) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

impl OutputFormatter for JsonFormatter {
    fn format_run(&self, summary: &RunSummary, writer: &mut dyn Write) -> std::io::Result<()> {
        let output = JsonRun {
            summary: JsonSummary {
                processed: summary.files_processed(),
                updated: summary.files_updated(),
                pinned: summary.pins_written(),
                failed: summary.files_failed(),
            },
            envs: &summary.envs,
        };
        write_json(&output, writer)
    }

    fn format_wrappers(
        &self,
        reports: &[WrapperFileReport],
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        let bumped = reports
            .iter()
            .flat_map(|r| &r.changes)
            .filter(|c| c.is_bump())
            .count();
        write_json(&JsonWrappers { bumped, files: reports }, writer)
    }
}
