//! Console reporter for comparison reports
//!
//! Renders plain-text tables, one column per app plus the diff.

use anyhow::Result;
use std::fmt::Write;

use crate::metric::Metric;
use crate::report::{HistorySection, MetricRow, Report};

/// Console format reporter
pub struct ConsoleReporter;

impl ConsoleReporter {
    /// Format a report for console output
    pub fn format(report: &Report) -> Result<String> {
        let mut output = String::new();

        writeln!(output)?;
        writeln!(output, "{}", report.title)?;
        writeln!(output, "{}", "=".repeat(report.title.chars().count()))?;
        writeln!(output, "Generated: {}", report.generated_at.to_rfc3339())?;
        writeln!(output)?;

        let rows: Vec<(&str, &MetricRow)> = report
            .current
            .iter()
            .map(|row| (row.metric.title(), row))
            .collect();
        Self::format_table(&mut output, "", &report.subjects, &rows)?;

        for section in &report.sections {
            Self::format_section(&mut output, section, &report.subjects)?;
        }

        Ok(output)
    }

    fn format_section(output: &mut String, section: &HistorySection, subjects: &[String]) -> Result<()> {
        writeln!(output)?;
        writeln!(output, "{}", section.name)?;
        writeln!(output, "{}", "-".repeat(section.name.chars().count()))?;

        for metric in Metric::ALL {
            let rows: Vec<(&str, &MetricRow)> = section.rows_for(metric).collect();
            if rows.is_empty() {
                continue;
            }
            writeln!(output)?;
            writeln!(output, "  {}", metric.title())?;
            Self::format_table(output, "Revision", subjects, &rows)?;
        }
        Ok(())
    }

    /// Right-aligned table; the first column holds `first_header` and row names
    fn format_table(
        output: &mut String,
        first_header: &str,
        subjects: &[String],
        rows: &[(&str, &MetricRow)],
    ) -> Result<()> {
        let mut header: Vec<&str> = vec![first_header];
        header.extend(subjects.iter().map(String::as_str));
        header.push("Diff");

        let table: Vec<Vec<&str>> = rows
            .iter()
            .map(|(name, row)| {
                let mut cells = vec![*name];
                cells.extend(row.values.iter().map(String::as_str));
                cells.push(row.diff.as_str());
                cells
            })
            .collect();

        let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
        for cells in &table {
            for (i, cell) in cells.iter().enumerate() {
                if let Some(width) = widths.get_mut(i) {
                    *width = (*width).max(cell.chars().count());
                }
            }
        }

        Self::format_line(output, &header, &widths)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        let rule: Vec<&str> = rule.iter().map(String::as_str).collect();
        Self::format_line(output, &rule, &widths)?;
        for cells in &table {
            Self::format_line(output, cells, &widths)?;
        }
        Ok(())
    }

    fn format_line(output: &mut String, cells: &[&str], widths: &[usize]) -> Result<()> {
        write!(output, " ")?;
        for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
            if i == 0 {
                write!(output, " {:<width$}", cell, width = *width)?;
            } else {
                write!(output, " | {:>width$}", cell, width = *width)?;
            }
        }
        writeln!(output)?;
        Ok(())
    }
}
