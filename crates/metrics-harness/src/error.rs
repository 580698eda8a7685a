//! Error types for measurement, result storage, and processing

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Errors raised by the metrics harness
#[derive(Error, Debug)]
pub enum MetricsError {
    /// A human-readable byte size could not be parsed
    #[error("Couldn't parse human-readable binary size '{input}': {reason}")]
    Parse { input: String, reason: String },

    /// An attempt yielded fewer readings than the completeness threshold
    #[error("{subject}: collected {obtained}/{runs} readings in attempt {attempt}, at least {required} required")]
    IncompleteMeasurement {
        subject: String,
        attempt: u32,
        obtained: usize,
        required: usize,
        runs: u32,
    },

    /// The filtered readings of an attempt were too spread out
    #[error("{subject}: filtered std dev {std_dev:.2} exceeds {max:.2} in attempt {attempt}")]
    UnstableMeasurement {
        subject: String,
        attempt: u32,
        std_dev: f64,
        max: f64,
    },

    /// Every attempt for a subject was rejected
    #[error("{subject}: no stable measurement after {attempts} attempts (last: {last})")]
    MeasurementExhausted {
        subject: String,
        attempts: u32,
        last: String,
    },

    /// A computed difference is outside the configured bounds
    #[error("{metric}: diff {diff} is not {relation} {bound}")]
    ThresholdViolation {
        metric: String,
        diff: String,
        relation: &'static str,
        bound: String,
    },

    /// A result file or history directory cannot be created, read, or written
    #[error("Storage unavailable at {}: {source}", .path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CI artifact could not be obtained
    #[error("Artifact '{artifact}' unavailable for branch '{branch}': {reason}")]
    ArtifactUnavailable {
        branch: String,
        artifact: String,
        reason: String,
    },

    /// A scope or name contains a character reserved by the key format
    #[error("Invalid result key part '{0}': must not be empty or contain '.', '=', or line breaks")]
    InvalidKey(String),

    /// A history label can't be embedded into a file name
    #[error("Invalid history label '{0}'")]
    InvalidLabel(String),

    /// History entries can't be rotated, e.g. two of them claim the same index
    #[error("History directory {} is corrupted at index {index}: {reason}", .dir.display())]
    HistoryCorrupted {
        dir: PathBuf,
        index: u32,
        reason: &'static str,
    },

    /// The measurement source failed in a way that retrying won't fix
    #[error("Measurement source failed for {subject}: {message}")]
    Source { subject: String, message: String },

    /// Configuration values that can't work together
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The latest results file to process does not exist
    #[error("Can't process latest results - the file doesn't exist: {}", .0.display())]
    MissingResults(PathBuf),
}

impl MetricsError {
    /// Whether the Sampler may recover from this error by retrying the attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MetricsError::IncompleteMeasurement { .. } | MetricsError::UnstableMeasurement { .. }
        )
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MetricsError::StorageUnavailable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(input: &str, reason: impl Into<String>) -> Self {
        MetricsError::Parse {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
