//! Percentiles and summary statistics for measured samples.

use serde::{Deserialize, Serialize};

/// Calculate percentile value from a slice of samples.
///
/// Uses linear interpolation between nearest ranks, the same definition as
/// spreadsheet `PERCENTILE.INC`.
///
/// # Arguments
///
/// * `samples` - Slice of samples (sorted internally, the caller's slice is untouched)
/// * `p` - Percentile to calculate (0.0 to 100.0)
///
/// # Returns
///
/// * `Some(value)` - The percentile value
/// * `None` - If samples is empty or p is invalid
///
/// # Examples
///
/// ```
/// use metrics_harness::stats::percentiles::percentile;
///
/// let data = vec![1, 2, 3, 4, 5];
/// assert_eq!(percentile(&data, 50.0), Some(3.0));
/// assert_eq!(percentile(&data, 25.0), Some(2.0));
/// ```
pub fn percentile(samples: &[i64], p: f64) -> Option<f64> {
    if samples.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    Some(percentile_of_sorted(&sorted, p))
}

/// Percentile of data that is already sorted ascending and non-empty.
pub(crate) fn percentile_of_sorted(sorted: &[i64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }

    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower_index = rank.floor() as usize;
    let upper_index = rank.ceil() as usize;

    let lower_value = sorted[lower_index] as f64;
    if lower_index == upper_index {
        lower_value
    } else {
        let upper_value = sorted[upper_index] as f64;
        let fraction = rank - lower_index as f64;
        lower_value + fraction * (upper_value - lower_value)
    }
}

/// Summary of a measurement set: mean, population standard deviation, count.
///
/// A pure function of the samples it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation (divides by `count`, not `count - 1`)
    pub std_dev: f64,
    pub min: i64,
    pub max: i64,
}

impl Statistics {
    /// Compute statistics from samples.
    ///
    /// Returns `None` for an empty slice.
    ///
    /// # Examples
    ///
    /// ```
    /// use metrics_harness::stats::Statistics;
    ///
    /// let stats = Statistics::of(&[2, 4, 4, 4, 5, 5, 7, 9]).unwrap();
    /// assert_eq!(stats.mean, 5.0);
    /// assert_eq!(stats.std_dev, 2.0);
    /// ```
    pub fn of(samples: &[i64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let count = samples.len();
        let sum: f64 = samples.iter().map(|&x| x as f64).sum();
        let mean = sum / count as f64;

        let squared_diffs: f64 = samples.iter().map(|&x| (x as f64 - mean).powi(2)).sum();
        let std_dev = (squared_diffs / count as f64).sqrt();

        Some(Statistics {
            count,
            mean,
            std_dev,
            min: samples.iter().copied().min().unwrap_or_default(),
            max: samples.iter().copied().max().unwrap_or_default(),
        })
    }

    /// Mean of the samples, `0.0` when empty
    pub fn mean_of(samples: &[i64]) -> f64 {
        Self::of(samples).map(|s| s.mean).unwrap_or(0.0)
    }

    /// Population standard deviation of the samples, `0.0` when empty
    pub fn std_dev_of(samples: &[i64]) -> f64 {
        Self::of(samples).map(|s| s.std_dev).unwrap_or(0.0)
    }

    /// Coefficient of variation (std_dev / mean).
    ///
    /// Returns `f64::INFINITY` if the mean is zero.
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean == 0.0 {
            f64::INFINITY
        } else {
            self.std_dev / self.mean
        }
    }
}
