//! Step outputs handed to later CI steps

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{MetricsError, Result};

/// Appends `name=value` lines to the CI step-output file, when there is one
#[derive(Debug, Clone, Default)]
pub struct StepOutputs {
    file: Option<PathBuf>,
}

impl StepOutputs {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self { file }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Record one output; values must be single-line
    pub fn write(&self, name: &str, value: impl std::fmt::Display) -> Result<()> {
        let value = value.to_string();
        if let Some(path) = &self.file {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| MetricsError::storage(path, e))?;
            writeln!(file, "{}={}", name, value.replace(['\r', '\n'], " "))
                .map_err(|e| MetricsError::storage(path, e))?;
        }
        info!("Output {}={}", name, value);
        Ok(())
    }
}
