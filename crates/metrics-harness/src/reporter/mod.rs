//! Report rendering
//!
//! # Output Formats
//!
//! - **JSON**: Machine-readable format for CI integration
//! - **Console**: Plain-text tables for terminals and job logs
//!
//! # Example
//!
//! ```no_run
//! use metrics_harness::reporter::{OutputFormat, Reporter};
//! use metrics_harness::report::Report;
//!
//! # fn example(report: Report) -> anyhow::Result<()> {
//! Reporter::new(OutputFormat::Console).report(&report)?;
//!
//! // Or write to a file
//! Reporter::new(OutputFormat::JsonPretty).write_to_file(&report, "out/report.json")?;
//! # Ok(())
//! # }
//! ```

mod console;
mod json;

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

use crate::report::Report;

pub use console::ConsoleReporter;
pub use json::JsonReporter;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// JSON format for machine parsing
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Plain-text tables
    #[default]
    Console,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "json-pretty" => Ok(OutputFormat::JsonPretty),
            "console" => Ok(OutputFormat::Console),
            other => Err(format!(
                "unknown format '{}', expected console, json, or json-pretty",
                other
            )),
        }
    }
}

/// Renders a [`Report`] in the chosen format
pub struct Reporter {
    format: OutputFormat,
}

impl Reporter {
    /// Create a new reporter with the specified output format
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Report to stdout
    pub fn report(&self, report: &Report) -> Result<()> {
        let output = self.format_report(report)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(output.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }

    /// Write the report to a file, creating parent directories
    pub fn write_to_file<P: AsRef<Path>>(&self, report: &Report, path: P) -> Result<()> {
        let path = path.as_ref();
        let output = self.format_report(report)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, output).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Format the report as a string
    pub fn format_report(&self, report: &Report) -> Result<String> {
        match self.format {
            OutputFormat::Json => JsonReporter::format(report, false),
            OutputFormat::JsonPretty => JsonReporter::format(report, true),
            OutputFormat::Console => ConsoleReporter::format(report),
        }
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(OutputFormat::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metric;
    use crate::report::MetricRow;
    use chrono::Utc;

    fn create_test_report() -> Report {
        Report {
            title: "iOS Performance metrics".to_string(),
            generated_at: Utc::now(),
            subjects: vec!["Plain".to_string(), "Instrumented".to_string()],
            current: vec![MetricRow {
                metric: Metric::AppSize,
                values: vec!["1.00 MiB".to_string(), "1.20 MiB".to_string()],
                diff: "204.80 KiB".to_string(),
            }],
            sections: vec![],
        }
    }

    #[test]
    fn test_reporter_json_format() {
        let output = Reporter::new(OutputFormat::Json)
            .format_report(&create_test_report())
            .unwrap();
        assert!(output.contains("iOS Performance metrics"));
        assert!(output.contains("\"app_size\""));
    }

    #[test]
    fn test_reporter_console_format() {
        let output = Reporter::new(OutputFormat::Console)
            .format_report(&create_test_report())
            .unwrap();
        assert!(output.contains("iOS Performance metrics"));
        assert!(output.contains("App size"));
    }

    #[test]
    fn test_write_to_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/report.json");
        Reporter::new(OutputFormat::JsonPretty)
            .write_to_file(&create_test_report(), &path)
            .unwrap();

        let parsed: Report = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.title, "iOS Performance metrics");
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("JSON-Pretty".parse::<OutputFormat>(), Ok(OutputFormat::JsonPretty));
        assert_eq!("console".parse::<OutputFormat>(), Ok(OutputFormat::Console));
        assert!("markdown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_default_format() {
        let reporter = Reporter::default();
        assert_eq!(reporter.format, OutputFormat::Console);
    }
}
