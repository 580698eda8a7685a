//! Comparison report built from the current record and result histories
//!
//! The report holds display-ready strings; rendering it is up to a
//! [`Reporter`](crate::reporter::Reporter).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::history::ResultHistory;
use crate::metric::{Metric, DIFF_KEY};
use crate::record::ResultRecord;

/// One metric across all subjects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub metric: Metric,
    pub values: Vec<String>,
    pub diff: String,
}

impl MetricRow {
    fn read(metric: Metric, record: &ResultRecord, subjects: usize) -> Self {
        Self {
            metric,
            values: (0..subjects)
                .map(|i| metric.display_value(record, &i.to_string()))
                .collect(),
            diff: metric.display_value(record, DIFF_KEY),
        }
    }
}

/// One archived run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRow {
    pub revision: String,
    pub rows: Vec<MetricRow>,
}

/// Up to `history_depth` archived runs from one history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySection {
    pub name: String,
    pub revisions: Vec<RevisionRow>,
}

impl HistorySection {
    /// Rows of `metric`, one per revision, newest first
    pub fn rows_for(&self, metric: Metric) -> impl Iterator<Item = (&str, &MetricRow)> + '_ {
        self.revisions.iter().filter_map(move |revision| {
            revision
                .rows
                .iter()
                .find(|row| row.metric == metric)
                .map(|row| (revision.revision.as_str(), row))
        })
    }
}

/// Current results plus historical context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    /// Column headers, one per app
    pub subjects: Vec<String>,
    pub current: Vec<MetricRow>,
    pub sections: Vec<HistorySection>,
}

/// Assembles a [`Report`] section by section
///
/// ```
/// use metrics_harness::record::ResultRecord;
/// use metrics_harness::report::ReportBuilder;
///
/// # fn example() -> metrics_harness::Result<()> {
/// let dir = tempfile::tempdir().unwrap();
/// let record = ResultRecord::open(dir.path().join("latest.properties"))?;
/// record.set("startup_time", "0", 412.5)?;
///
/// let report = ReportBuilder::new(None, vec!["Plain".into(), "Instrumented".into()])
///     .current(&record)
///     .build();
/// assert_eq!(report.current[0].values[0], "412.50 ms");
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
#[derive(Debug)]
pub struct ReportBuilder {
    title: String,
    subjects: Vec<String>,
    current: Vec<MetricRow>,
    sections: Vec<HistorySection>,
}

impl ReportBuilder {
    /// `result_name` distinguishes several result sets of one repository
    pub fn new(result_name: Option<&str>, subjects: Vec<String>) -> Self {
        let title = match result_name.filter(|n| !n.is_empty()) {
            Some(name) => format!("{} Performance metrics", name),
            None => "Performance metrics".to_string(),
        };
        Self {
            title,
            subjects,
            current: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn current(mut self, record: &ResultRecord) -> Self {
        self.current = self.rows(record);
        self
    }

    /// Add up to `depth` entries of `history`, newest first
    ///
    /// An empty history adds no section.
    pub fn history(mut self, name: impl Into<String>, history: &ResultHistory, depth: usize) -> Result<Self> {
        let name = name.into();
        let entries = history.items(depth)?;
        if entries.is_empty() {
            debug!("Skipping '{}' - no archived results", name);
            return Ok(self);
        }

        let revisions = entries
            .iter()
            .map(|entry| RevisionRow {
                revision: entry.display_label(),
                rows: self.rows(&entry.record),
            })
            .collect();
        self.sections.push(HistorySection { name, revisions });
        Ok(self)
    }

    pub fn build(self) -> Report {
        Report {
            title: self.title,
            generated_at: Utc::now(),
            subjects: self.subjects,
            current: self.current,
            sections: self.sections,
        }
    }

    fn rows(&self, record: &ResultRecord) -> Vec<MetricRow> {
        Metric::ALL
            .iter()
            .map(|metric| MetricRow::read(*metric, record, self.subjects.len()))
            .collect()
    }
}
