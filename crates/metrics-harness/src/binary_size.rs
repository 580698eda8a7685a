//! Build artifact size comparison

use serde::{Deserialize, Serialize};
use std::fs;
use tracing::{info, instrument, warn};

use crate::bytesize::{self, ByteSize};
use crate::config::{BinarySizeConfig, Subject};
use crate::error::{MetricsError, Result};
use crate::metric::{DiffBounds, Metric, DIFF_KEY};
use crate::record::ResultRecord;

/// Size of one build artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSize {
    pub name: String,
    pub label: String,
    pub bytes: i64,
}

/// Outcome of a binary-size run
#[derive(Debug)]
pub struct BinarySizeResult {
    pub sizes: Vec<ArtifactSize>,
    /// Size of the second artifact minus that of the first
    pub diff: Option<i64>,
    pub violations: Vec<MetricsError>,
}

impl BinarySizeResult {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Store each size and the diff under `app_size`
    pub fn write_to(&self, record: &ResultRecord) -> Result<()> {
        let scope = Metric::AppSize.scope();
        for (i, size) in self.sizes.iter().enumerate() {
            record.set(scope, &i.to_string(), size.bytes)?;
        }
        if let Some(diff) = self.diff {
            record.set(scope, DIFF_KEY, diff)?;
        }
        Ok(())
    }
}

/// Read the size of every app's artifact and compare the first two
///
/// # Errors
///
/// [`MetricsError::StorageUnavailable`] if an artifact can't be inspected.
#[instrument(skip_all, fields(apps = apps.len()))]
pub fn measure_binary_sizes(apps: &[Subject], options: &BinarySizeConfig) -> Result<BinarySizeResult> {
    let mut sizes = Vec::with_capacity(apps.len());
    for app in apps {
        let metadata = fs::metadata(&app.path).map_err(|e| MetricsError::storage(&app.path, e))?;
        let bytes = i64::try_from(metadata.len()).unwrap_or(i64::MAX);
        info!("{}: binary size is {}", app.name, bytesize::format(bytes));
        sizes.push(ArtifactSize {
            name: app.name.clone(),
            label: app.label().to_string(),
            bytes,
        });
    }

    let mut diff = None;
    let mut violations = Vec::new();
    if let [first, second] = sizes.as_slice() {
        let value = second.bytes.saturating_sub(first.bytes);
        info!(
            "{} is {} {} than {}",
            second.name,
            bytesize::format(value.saturating_abs()),
            if value >= 0 { "larger" } else { "smaller" },
            first.name
        );

        let bounds: DiffBounds<ByteSize> = DiffBounds::new(options.diff_min, options.diff_max);
        violations = bounds.check_bytes(value);
        for violation in &violations {
            warn!("{}", violation);
        }
        diff = Some(value);
    }

    Ok(BinarySizeResult {
        sizes,
        diff,
        violations,
    })
}
