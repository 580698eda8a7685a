//! Statistical analysis of measured samples
//!
//! Percentiles, population statistics, and IQR-based outlier filtering.
//!
//! # Examples
//!
//! ```
//! use metrics_harness::stats::{filter_outliers, Statistics};
//!
//! let samples = vec![412, 398, 405, 1210, 401, 399];
//! let filtered = filter_outliers(&samples);
//! assert_eq!(filtered.len(), 5);
//!
//! let stats = Statistics::of(&filtered).unwrap();
//! println!("mean: {:.2} ms, std dev: {:.2}", stats.mean, stats.std_dev);
//! ```

pub mod outliers;
pub mod percentiles;

pub use outliers::{count_outliers, filter_outliers, OutlierFences};
pub use percentiles::{percentile, Statistics};
