//! Performance regression tracking for app builds
//!
//! This crate measures app startup time and binary size for two or more
//! builds under test, keeps a history of results across CI runs, and builds
//! reports that compare the latest run with that history.
//!
//! # Features
//!
//! - **Noise-tolerant sampling**: repeated readings, IQR outlier filtering,
//!   and retries until the filtered readings are stable
//! - **Result records**: flat `scope.name=value` properties files, written atomically
//! - **Result history**: directory of archived records rotated so that index 1
//!   is always the newest
//! - **Reports**: current results plus baseline and previous-run history, as
//!   JSON or console tables
//!
//! # Example
//!
//! ```no_run
//! use metrics_harness::{Config, ResultRecord, Sampler};
//! use metrics_harness::source::CommandSource;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::from_file("metrics.toml")?;
//! let startup = config.startup_time.as_ref().expect("startup_time configured");
//!
//! let source = CommandSource::new(&startup.source)?;
//! let result = Sampler::new(startup.sampler.clone(), source).run(&config.apps)?;
//!
//! let record = ResultRecord::open(&config.results.latest)?;
//! result.write_to(&record)?;
//! if !result.passed() {
//!     for violation in &result.violations {
//!         eprintln!("{}", violation);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Runs are configured using TOML files:
//!
//! ```toml
//! [[apps]]
//! name = "io.example.plain"
//! label = "Plain"
//! path = "builds/plain.apk"
//!
//! [[apps]]
//! name = "io.example.instrumented"
//! label = "Instrumented"
//! path = "builds/instrumented.apk"
//!
//! [startup_time]
//! runs = 50
//! diff_max = 150.0
//!
//! [startup_time.source]
//! program = "scripts/launch.sh"
//! args = ["{name}"]
//!
//! [binary_size]
//! diff_max = "1.5 MiB"
//!
//! [results]
//! result_name = "android"
//! ```

pub mod artifacts;
pub mod binary_size;
pub mod bytesize;
pub mod config;
pub mod error;
pub mod history;
pub mod metric;
pub mod outputs;
pub mod processor;
pub mod record;
pub mod report;
pub mod reporter;
pub mod sampler;
pub mod source;
pub mod stats;

// Re-export main types for convenience
pub use bytesize::ByteSize;
pub use config::Config;
pub use error::{MetricsError, Result};
pub use history::{HistoryEntry, ResultHistory};
pub use processor::{ResultProcessor, RunContext};
pub use record::ResultRecord;
pub use report::{Report, ReportBuilder};
pub use reporter::{OutputFormat, Reporter};
pub use sampler::{Sampler, StartupTimeResult};
