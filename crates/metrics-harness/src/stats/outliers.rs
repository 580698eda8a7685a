//! Outlier detection for measured samples.
//!
//! Uses the Interquartile Range (IQR) rule: values outside
//! `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]` are outliers.

use super::percentiles::percentile_of_sorted;

/// IQR fences computed from a set of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierFences {
    /// First quartile (25th percentile)
    pub q1: f64,
    /// Third quartile (75th percentile)
    pub q3: f64,
    /// Interquartile range (Q3 - Q1)
    pub iqr: f64,
    /// Lower fence (Q1 - 1.5*IQR)
    pub lower: f64,
    /// Upper fence (Q3 + 1.5*IQR)
    pub upper: f64,
}

impl OutlierFences {
    /// Compute fences for the samples.
    ///
    /// Returns `None` for fewer than two samples, where the IQR is undefined.
    ///
    /// # Examples
    ///
    /// ```
    /// use metrics_harness::stats::OutlierFences;
    ///
    /// let fences = OutlierFences::detect(&[1, 2, 3, 4, 5, 100]).unwrap();
    /// assert!(fences.contains(5));
    /// assert!(!fences.contains(100));
    /// ```
    pub fn detect(samples: &[i64]) -> Option<Self> {
        if samples.len() < 2 {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let q1 = percentile_of_sorted(&sorted, 25.0);
        let q3 = percentile_of_sorted(&sorted, 75.0);
        let iqr = q3 - q1;

        Some(OutlierFences {
            q1,
            q3,
            iqr,
            lower: q1 - 1.5 * iqr,
            upper: q3 + 1.5 * iqr,
        })
    }

    /// Whether a value lies within the fences (inclusive)
    pub fn contains(&self, value: i64) -> bool {
        let value = value as f64;
        self.lower <= value && value <= self.upper
    }
}

/// Return the inliers of `samples`, keeping their original order.
///
/// Zero or one samples are returned unchanged.
///
/// # Examples
///
/// ```
/// use metrics_harness::stats::filter_outliers;
///
/// assert_eq!(filter_outliers(&[3, 100, 1, 2, 5, 4]), vec![3, 1, 2, 5, 4]);
/// assert_eq!(filter_outliers(&[7]), vec![7]);
/// ```
pub fn filter_outliers(samples: &[i64]) -> Vec<i64> {
    match OutlierFences::detect(samples) {
        Some(fences) => samples
            .iter()
            .copied()
            .filter(|&value| fences.contains(value))
            .collect(),
        None => samples.to_vec(),
    }
}

/// Number of samples the filter would drop
pub fn count_outliers(samples: &[i64]) -> usize {
    samples.len() - filter_outliers(samples).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_filter_empty_and_single() {
        assert_eq!(filter_outliers(&[]), Vec::<i64>::new());
        assert_eq!(filter_outliers(&[5]), vec![5]);
        assert!(OutlierFences::detect(&[5]).is_none());
    }

    #[test]
    fn test_filter_removes_high_outlier() {
        let samples = vec![1, 2, 3, 4, 5, 100];
        assert_eq!(filter_outliers(&samples), vec![1, 2, 3, 4, 5]);
        assert_eq!(count_outliers(&samples), 1);
    }

    #[test]
    fn test_filter_removes_low_outlier() {
        let samples = vec![900, 1000, 1010, 1020, 1030, 1040];
        assert_eq!(filter_outliers(&samples), vec![1000, 1010, 1020, 1030, 1040]);
    }

    #[test]
    fn test_filter_all_equal() {
        let samples = vec![5, 5, 5, 5, 5];
        let fences = OutlierFences::detect(&samples).unwrap();
        assert_eq!(fences.iqr, 0.0);
        assert_eq!(filter_outliers(&samples), samples);
    }

    #[test]
    fn test_filter_preserves_order_and_input() {
        let samples = vec![4, 1, 1000, 3, 2, 5];
        let filtered = filter_outliers(&samples);
        assert_eq!(filtered, vec![4, 1, 3, 2, 5]);
        assert_eq!(samples, vec![4, 1, 1000, 3, 2, 5]);
    }

    #[test]
    fn test_fences_match_interpolated_quartiles() {
        let samples: Vec<i64> = (1..=10).collect();
        let fences = OutlierFences::detect(&samples).unwrap();

        assert!((fences.q1 - 3.25).abs() < 1e-10);
        assert!((fences.q3 - 7.75).abs() < 1e-10);
        assert!((fences.iqr - 4.5).abs() < 1e-10);
        assert!((fences.lower - (3.25 - 6.75)).abs() < 1e-10);
        assert!((fences.upper - (7.75 + 6.75)).abs() < 1e-10);
    }

    #[test]
    fn test_values_on_the_fence_are_kept() {
        // q1 = 10, q3 = 20, iqr = 10 -> fences [-5, 35]
        let samples = vec![10, 10, 20, 20, 35];
        let fences = OutlierFences::detect(&samples[..4]).unwrap();
        assert_eq!(fences.upper, 35.0);
        assert!(fences.contains(35));
        assert!(!fences.contains(36));
    }

    #[test]
    fn test_filter_with_duplicates() {
        let samples = vec![1, 2, 2, 2, 3, 4, 5, 100];
        let filtered = filter_outliers(&samples);
        assert!(!filtered.contains(&100));
        assert_eq!(filtered.len(), 7);
    }

    proptest! {
        #[test]
        fn filtered_is_an_ordered_subsequence(samples in prop::collection::vec(0i64..10_000, 0..64)) {
            let filtered = filter_outliers(&samples);
            prop_assert!(filtered.len() <= samples.len());

            let mut remaining = samples.iter();
            for value in &filtered {
                prop_assert!(remaining.any(|s| s == value));
            }
        }

        #[test]
        fn quartiles_are_never_filtered(samples in prop::collection::vec(-5_000i64..5_000, 2..64)) {
            let filtered = filter_outliers(&samples);
            let min = *samples.iter().min().unwrap();
            let max = *samples.iter().max().unwrap();
            prop_assert!(!filtered.is_empty());
            prop_assert!(filtered.iter().all(|v| *v >= min && *v <= max));
        }
    }
}
