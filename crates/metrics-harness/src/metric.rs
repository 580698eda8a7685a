//! The metrics tracked per run and the bounds their diffs are checked against

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bytesize::ByteSize;
use crate::error::MetricsError;
use crate::record::ResultRecord;

/// Record key of the second-minus-first difference
pub const DIFF_KEY: &str = "diff";

/// A metric compared between the apps under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Filtered mean launch duration in milliseconds
    StartupTime,
    /// Size of the build artifact in bytes
    AppSize,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::StartupTime, Metric::AppSize];

    /// Scope under which values are stored in a result record
    pub fn scope(self) -> &'static str {
        match self {
            Metric::StartupTime => "startup_time",
            Metric::AppSize => "app_size",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Metric::StartupTime => "Startup time",
            Metric::AppSize => "App size",
        }
    }

    /// Read `name` from `record` and render it in this metric's unit
    pub fn display_value(self, record: &ResultRecord, name: &str) -> String {
        match self {
            Metric::StartupTime => format!("{} ms", record.get_decimal(self.scope(), name)),
            Metric::AppSize => record.get_bytes(self.scope(), name),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Exclusive lower and upper bounds on a diff
///
/// ```
/// use metrics_harness::metric::{DiffBounds, Metric};
///
/// let bounds = DiffBounds::new(Some(0.0), Some(150.0));
/// assert!(bounds.check(Metric::StartupTime, 42.0, |d| format!("{:.2} ms", d)).is_empty());
/// assert_eq!(bounds.check(Metric::StartupTime, 150.0, |d| format!("{:.2} ms", d)).len(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiffBounds<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: PartialOrd + Copy> DiffBounds<T> {
    pub fn new(min: Option<T>, max: Option<T>) -> Self {
        Self { min, max }
    }

    /// Violations of `diff > min` and `diff < max`, rendered with `show`
    pub fn check(&self, metric: Metric, diff: T, show: impl Fn(T) -> String) -> Vec<MetricsError> {
        let mut violations = Vec::new();
        if let Some(min) = self.min {
            if !(diff > min) {
                violations.push(MetricsError::ThresholdViolation {
                    metric: metric.title().to_string(),
                    diff: show(diff),
                    relation: "greater than",
                    bound: show(min),
                });
            }
        }
        if let Some(max) = self.max {
            if !(diff < max) {
                violations.push(MetricsError::ThresholdViolation {
                    metric: metric.title().to_string(),
                    diff: show(diff),
                    relation: "less than",
                    bound: show(max),
                });
            }
        }
        violations
    }
}

impl DiffBounds<ByteSize> {
    /// Check a size diff, rendering values with the byte-size codec
    pub fn check_bytes(&self, diff: i64) -> Vec<MetricsError> {
        self.check(Metric::AppSize, ByteSize(diff), |b| b.to_string())
    }
}

impl DiffBounds<f64> {
    /// Check a startup-time diff in milliseconds
    pub fn check_millis(&self, diff: f64) -> Vec<MetricsError> {
        self.check(Metric::StartupTime, diff, |ms| format!("{:.2} ms", ms))
    }
}
