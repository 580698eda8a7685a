//! Measurement sources the sampler reads startup times from
//!
//! A source is a synchronous request/response capability: each call to
//! [`MeasurementSource::measure`] launches the subject once and reports how
//! long it took to start. A reading the instrumentation failed to record is
//! reported as `Ok(None)` and skipped; an `Err` aborts the whole run.

use regex::Regex;
use std::process::Command;
use tracing::{debug, warn};

use crate::config::{SourceConfig, Subject};
use crate::error::{MetricsError, Result};

/// Produces one startup-time reading per call
pub trait MeasurementSource {
    /// Called before every attempt, e.g. to clear a device log buffer
    fn prepare(&mut self, _subject: &Subject) -> Result<()> {
        Ok(())
    }

    /// Launch `subject` once and return its startup time in milliseconds
    fn measure(&mut self, subject: &Subject, attempt: u32) -> Result<Option<i64>>;
}

impl<S: MeasurementSource + ?Sized> MeasurementSource for &mut S {
    fn prepare(&mut self, subject: &Subject) -> Result<()> {
        (**self).prepare(subject)
    }

    fn measure(&mut self, subject: &Subject, attempt: u32) -> Result<Option<i64>> {
        (**self).measure(subject, attempt)
    }
}

/// Runs an external launcher and scrapes the startup time from its output
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    pattern: Regex,
}

impl CommandSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            program: config.program.clone(),
            args: config.args.clone(),
            pattern: config.compile_pattern()?,
        })
    }

    fn command_args(&self, subject: &Subject, attempt: u32) -> Vec<String> {
        let path = subject.path.display().to_string();
        let attempt = attempt.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{name}", &subject.name)
                    .replace("{path}", &path)
                    .replace("{attempt}", &attempt)
            })
            .collect()
    }
}

impl MeasurementSource for CommandSource {
    fn measure(&mut self, subject: &Subject, attempt: u32) -> Result<Option<i64>> {
        let args = self.command_args(subject, attempt);
        debug!("Running {} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| MetricsError::Source {
                subject: subject.name.clone(),
                message: format!("can't run '{}': {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MetricsError::Source {
                subject: subject.name.clone(),
                message: format!("'{}' failed with {}: {}", self.program, output.status, stderr.trim()),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(extract_duration(&self.pattern, &stdout, &subject.name))
    }
}

/// Find the single startup time reported in `output`
///
/// The pattern's `ms` group holds milliseconds; an optional `s` group adds
/// whole seconds. Zero or several matches mean the reading is unusable.
pub fn extract_duration(pattern: &Regex, output: &str, subject: &str) -> Option<i64> {
    let values: Vec<Option<i64>> = pattern
        .captures_iter(output)
        .map(|caps| {
            debug!("{}: matched '{}'", subject, &caps[0]);
            let ms: i64 = caps.name("ms")?.as_str().parse().ok()?;
            let seconds: i64 = match caps.name("s") {
                Some(s) => s.as_str().parse().ok()?,
                None => 0,
            };
            seconds.checked_mul(1000)?.checked_add(ms)
        })
        .collect();

    match values.as_slice() {
        [Some(value)] => Some(*value),
        [None] => {
            warn!("{}: startup time out of range, skipping reading", subject);
            None
        }
        [] => {
            debug!("{}: no startup time in launcher output", subject);
            None
        }
        many => {
            warn!("{}: {} startup times in one reading, skipping it", subject, many.len());
            None
        }
    }
}
