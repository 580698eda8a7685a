//! Startup-time sampling with outlier filtering and retries
//!
//! The sampler measures one subject at a time, one reading at a time: the
//! measurement source is a single shared device and overlapping launches
//! would corrupt the timings.
//!
//! ```text
//! for each subject:
//!   attempt 1..=retries
//!     settle ── prepare ── reading ── pause ── reading ── pause ── ...
//!     too few readings?        -> IncompleteMeasurement, next attempt
//!     filtered std dev too big -> UnstableMeasurement, next attempt
//!     otherwise accept the attempt's unfiltered readings
//!   no attempt accepted -> MeasurementExhausted (aborts the run)
//! ```
//!
//! # Example
//!
//! ```
//! use metrics_harness::config::{SamplerOptions, Subject};
//! use metrics_harness::sampler::Sampler;
//! use metrics_harness::source::MeasurementSource;
//! use std::time::Duration;
//!
//! struct Fixed(i64);
//!
//! impl MeasurementSource for Fixed {
//!     fn measure(&mut self, _: &Subject, _: u32) -> metrics_harness::Result<Option<i64>> {
//!         Ok(Some(self.0))
//!     }
//! }
//!
//! # fn example() -> metrics_harness::Result<()> {
//! let mut options = SamplerOptions::with_runs(5);
//! options.reading_delay = Duration::ZERO;
//! options.settle_delay = Duration::ZERO;
//!
//! let apps = vec![Subject::new("plain", "plain.apk"), Subject::new("instrumented", "inst.apk")];
//! let result = Sampler::new(options, Fixed(420)).run(&apps)?;
//! assert_eq!(result.diff, Some(0.0));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::thread;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{SamplerOptions, Subject};
use crate::error::{MetricsError, Result};
use crate::metric::{DiffBounds, Metric, DIFF_KEY};
use crate::record::ResultRecord;
use crate::source::MeasurementSource;
use crate::stats::{filter_outliers, Statistics};

/// Readings of one accepted attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSet {
    pub subject: String,
    /// Attempt that was accepted, starting at 1
    pub attempt: u32,
    /// Every reading of the attempt, in collection order
    pub samples: Vec<i64>,
}

impl MeasurementSet {
    /// Readings within the IQR fences, in collection order
    pub fn filtered(&self) -> Vec<i64> {
        filter_outliers(&self.samples)
    }
}

/// Statistics of one subject's accepted measurement set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub name: String,
    pub label: String,
    pub set: MeasurementSet,
    /// Statistics over all readings
    pub raw: Statistics,
    /// Statistics after outlier removal
    pub filtered: Statistics,
    pub outliers_removed: usize,
}

impl SubjectSummary {
    fn new(subject: &Subject, set: MeasurementSet) -> Self {
        let filtered_samples = set.filtered();
        let raw = Statistics::of(&set.samples).unwrap_or_default();
        let filtered = Statistics::of(&filtered_samples).unwrap_or_default();

        info!(
            "{}: launch times (original) | mean: {:.2} ms | stddev: {:.2} | {} values: {:?}",
            subject.name, raw.mean, raw.std_dev, raw.count, set.samples
        );
        info!(
            "{}: launch times (filtered) | mean: {:.2} ms | stddev: {:.2} | {} values: {:?}",
            subject.name, filtered.mean, filtered.std_dev, filtered.count, filtered_samples
        );

        Self {
            name: subject.name.clone(),
            label: subject.label().to_string(),
            outliers_removed: set.samples.len() - filtered_samples.len(),
            set,
            raw,
            filtered,
        }
    }
}

/// Outcome of a startup-time run
#[derive(Debug)]
pub struct StartupTimeResult {
    pub subjects: Vec<SubjectSummary>,
    /// Filtered mean of the second subject minus that of the first
    pub diff: Option<f64>,
    /// Diff bound violations; the run still completes
    pub violations: Vec<MetricsError>,
}

impl StartupTimeResult {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Store each subject's filtered mean and the diff under `startup_time`
    pub fn write_to(&self, record: &ResultRecord) -> Result<()> {
        let scope = Metric::StartupTime.scope();
        for (i, summary) in self.subjects.iter().enumerate() {
            record.set(scope, &i.to_string(), summary.filtered.mean)?;
        }
        if let Some(diff) = self.diff {
            record.set(scope, DIFF_KEY, diff)?;
        }
        Ok(())
    }
}

/// Collects stable startup-time measurements from a [`MeasurementSource`]
pub struct Sampler<S> {
    options: SamplerOptions,
    source: S,
}

impl<S: MeasurementSource> Sampler<S> {
    pub fn new(options: SamplerOptions, source: S) -> Self {
        Self { options, source }
    }

    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }

    /// Measure every subject in order, then compare the first two
    ///
    /// # Errors
    ///
    /// The first fatal error ends the run: [`MetricsError::MeasurementExhausted`]
    /// when a subject never produced an acceptable attempt, or whatever the
    /// source reported as fatal. Diff bound violations are not errors here,
    /// they end up in [`StartupTimeResult::violations`].
    #[instrument(skip_all, fields(subjects = subjects.len(), runs = self.options.runs))]
    pub fn run(&mut self, subjects: &[Subject]) -> Result<StartupTimeResult> {
        let mut summaries = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let set = self.collect(subject)?;
            summaries.push(SubjectSummary::new(subject, set));
        }

        let mut diff = None;
        let mut violations = Vec::new();
        if let [first, second] = summaries.as_slice() {
            let value = second.filtered.mean - first.filtered.mean;
            info!(
                "{} takes approximately {:.3} ms {} time to start than {}",
                second.name,
                value.abs(),
                if value >= 0.0 { "more" } else { "less" },
                first.name
            );

            let bounds = DiffBounds::new(self.options.diff_min, self.options.diff_max);
            violations = bounds.check_millis(value);
            for violation in &violations {
                warn!("{}", violation);
            }
            diff = Some(value);
        }

        Ok(StartupTimeResult {
            subjects: summaries,
            diff,
            violations,
        })
    }

    /// Retry attempts for `subject` until one is accepted
    #[instrument(skip_all, fields(subject = %subject.name))]
    pub fn collect(&mut self, subject: &Subject) -> Result<MeasurementSet> {
        let retries = self.options.retries;
        let mut last_failure = None;

        for attempt in 1..=retries {
            thread::sleep(self.options.settle_delay);
            self.source.prepare(subject)?;

            match self.attempt(subject, attempt) {
                Ok(set) => {
                    info!("{}: accepted attempt {}/{}", subject.name, attempt, retries);
                    return Ok(set);
                }
                Err(e) if e.is_retryable() => {
                    info!("{}", e);
                    if attempt < retries {
                        info!(
                            "{}: retrying startup time collection: {}/{}",
                            subject.name,
                            attempt + 1,
                            retries
                        );
                    }
                    last_failure = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let err = MetricsError::MeasurementExhausted {
            subject: subject.name.clone(),
            attempts: retries,
            last: last_failure.map(|e| e.to_string()).unwrap_or_default(),
        };
        error!("{}", err);
        Err(err)
    }

    /// One pass of `runs` readings
    fn attempt(&mut self, subject: &Subject, attempt: u32) -> Result<MeasurementSet> {
        let runs = self.options.runs;
        let mut samples = Vec::with_capacity(runs as usize);

        for reading in 1..=runs {
            debug!("{}: measuring startup time {}/{}", subject.name, reading, runs);
            match self.source.measure(subject, attempt)? {
                Some(value) => samples.push(value),
                None => debug!("{}: reading {} produced no measurement", subject.name, reading),
            }
            thread::sleep(self.options.reading_delay);
        }

        info!(
            "{}: collected {}/{} startup times (try {}/{})",
            subject.name,
            samples.len(),
            runs,
            attempt,
            self.options.retries
        );

        let required = self.options.required_readings();
        if samples.len() < required {
            return Err(MetricsError::IncompleteMeasurement {
                subject: subject.name.clone(),
                attempt,
                obtained: samples.len(),
                required,
                runs,
            });
        }

        if self.options.std_dev_max > 0.0 {
            let std_dev = Statistics::std_dev_of(&filter_outliers(&samples));
            if std_dev > self.options.std_dev_max {
                return Err(MetricsError::UnstableMeasurement {
                    subject: subject.name.clone(),
                    attempt,
                    std_dev,
                    max: self.options.std_dev_max,
                });
            }
        }

        Ok(MeasurementSet {
            subject: subject.name.clone(),
            attempt,
            samples,
        })
    }

    /// Give back the source, e.g. to inspect a test double
    pub fn into_source(self) -> S {
        self.source
    }
}
