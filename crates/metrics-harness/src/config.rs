//! Configuration parsing for measurement runs
//!
//! This module provides TOML-based configuration for the apps under test,
//! the startup-time and binary-size measurements, and where results and
//! their history are stored.
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
//! std_dev_max = 50.0
//! diff_max = 150.0
//!
//! [startup_time.source]
//! program = "scripts/launch.sh"
//! args = ["{name}"]
//!
//! [binary_size]
//! diff_max = "1.5 MiB"
//! ```

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bytesize::ByteSize;
use crate::error::{MetricsError, Result};
use crate::record::DEFAULT_LATEST_PATH;

/// Matches the Android activity manager's `Displayed ...: +1s234ms` log line
pub const DEFAULT_SOURCE_PATTERN: &str = r"\+(?:(?P<s>[0-9]+)s)?(?P<ms>[0-9]+)ms";

/// Main configuration structure loaded from TOML files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Builds under test, in column order
    #[serde(default)]
    pub apps: Vec<Subject>,
    /// Startup-time measurement; skipped when absent
    #[serde(default)]
    pub startup_time: Option<StartupTimeConfig>,
    /// Binary-size measurement; skipped when absent
    #[serde(default)]
    pub binary_size: Option<BinarySizeConfig>,
    /// Result file and history locations
    #[serde(default)]
    pub results: ResultsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Relative app paths are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - Required fields are missing or values fail validation
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        for app in &mut config.apps {
            if app.path.is_relative() {
                app.path = base_dir.join(&app.path);
            }
        }
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Example
    ///
    /// ```
    /// use metrics_harness::config::Config;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let toml = r#"
    ///     [[apps]]
    ///     name = "io.example.app"
    ///     path = "app.apk"
    ///
    ///     [binary_size]
    ///     diff_max = "500 KiB"
    /// "#;
    /// let config = Config::from_str(toml)?;
    /// assert_eq!(config.apps[0].label(), "io.example.app");
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(s).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but can't produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        let measures = self.startup_time.is_some() || self.binary_size.is_some();
        if measures && self.apps.is_empty() {
            return invalid("at least one [[apps]] entry is required");
        }
        for app in &self.apps {
            if app.name.trim().is_empty() {
                return invalid("app names must not be empty");
            }
        }

        if let Some(startup) = &self.startup_time {
            startup.sampler.validate()?;
            startup.source.compile_pattern()?;
            if startup.source.program.trim().is_empty() {
                return invalid("startup_time.source.program must not be empty");
            }
        }

        if self.results.history_depth == 0 {
            return invalid("results.history_depth must be at least 1");
        }
        Ok(())
    }

    /// Display labels of the apps, in column order
    pub fn subject_labels(&self) -> Vec<String> {
        self.apps.iter().map(|a| a.label().to_string()).collect()
    }
}

fn invalid<T>(message: impl Into<String>) -> Result<T> {
    Err(MetricsError::InvalidConfig(message.into()))
}

/// One build under test
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subject {
    /// Identifier handed to the measurement source (e.g. a package name)
    pub name: String,
    /// Display name, defaults to `name`
    #[serde(default)]
    pub label: Option<String>,
    /// Path of the build artifact
    pub path: PathBuf,
}

impl Subject {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            label: None,
            path: path.into(),
        }
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Startup-time measurement settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupTimeConfig {
    #[serde(flatten)]
    pub sampler: SamplerOptions,
    /// Command that launches an app and reports its startup time
    pub source: SourceConfig,
}

/// Sampling, retry, and stability settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplerOptions {
    /// Readings per attempt
    pub runs: u32,
    /// Maximum attempts per app (default: 5)
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Maximum population std dev of the filtered readings in ms; 0 disables (default: 50)
    #[serde(default = "default_std_dev_max")]
    pub std_dev_max: f64,
    /// Fraction of `runs` an attempt must deliver (default: 1.0)
    #[serde(default = "default_minimum_fraction")]
    pub minimum_fraction: f64,
    /// The second app must start more than this many ms slower than the first
    #[serde(default)]
    pub diff_min: Option<f64>,
    /// The second app must start less than this many ms slower than the first
    #[serde(default)]
    pub diff_max: Option<f64>,
    /// Pause after each reading (default: 300ms)
    #[serde(
        rename = "reading_delay_ms",
        with = "duration_ms",
        default = "default_reading_delay"
    )]
    pub reading_delay: Duration,
    /// Pause before the first reading of every attempt (default: 1000ms)
    #[serde(
        rename = "settle_delay_ms",
        with = "duration_ms",
        default = "default_settle_delay"
    )]
    pub settle_delay: Duration,
}

impl SamplerOptions {
    /// Options with defaults for everything but the run count
    pub fn with_runs(runs: u32) -> Self {
        Self {
            runs,
            retries: default_retries(),
            std_dev_max: default_std_dev_max(),
            minimum_fraction: default_minimum_fraction(),
            diff_min: None,
            diff_max: None,
            reading_delay: default_reading_delay(),
            settle_delay: default_settle_delay(),
        }
    }

    /// Smallest number of readings an attempt must deliver
    pub fn required_readings(&self) -> usize {
        // tolerance keeps 10 * 0.7 from rounding up to 8
        let required = (self.runs as f64 * self.minimum_fraction - 1e-9).ceil();
        (required.max(1.0) as usize).min(self.runs as usize)
    }

    pub fn validate(&self) -> Result<()> {
        if self.runs == 0 {
            return invalid("startup_time.runs must be at least 1");
        }
        if self.retries == 0 {
            return invalid("startup_time.retries must be at least 1");
        }
        if !(self.std_dev_max >= 0.0) {
            return invalid("startup_time.std_dev_max must not be negative");
        }
        if !(self.minimum_fraction > 0.0 && self.minimum_fraction <= 1.0) {
            return invalid("startup_time.minimum_fraction must be in (0, 1]");
        }
        Ok(())
    }
}

fn default_retries() -> u32 {
    5
}

fn default_std_dev_max() -> f64 {
    50.0
}

fn default_minimum_fraction() -> f64 {
    1.0
}

fn default_reading_delay() -> Duration {
    Duration::from_millis(300)
}

fn default_settle_delay() -> Duration {
    Duration::from_millis(1000)
}

/// External command used as the startup-time measurement source
///
/// `{name}`, `{path}`, and `{attempt}` in `args` are substituted per reading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Regex with an `ms` group and an optional `s` group, matched against stdout
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

impl SourceConfig {
    pub fn compile_pattern(&self) -> Result<Regex> {
        let regex = Regex::new(&self.pattern).map_err(|e| {
            MetricsError::InvalidConfig(format!("startup_time.source.pattern: {}", e))
        })?;
        if !regex.capture_names().flatten().any(|n| n == "ms") {
            return invalid("startup_time.source.pattern needs a named group 'ms'");
        }
        Ok(regex)
    }
}

fn default_pattern() -> String {
    DEFAULT_SOURCE_PATTERN.to_string()
}

/// Binary-size thresholds
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BinarySizeConfig {
    /// The second app must be larger than the first by more than this
    #[serde(default)]
    pub diff_min: Option<ByteSize>,
    /// The second app must be larger than the first by less than this
    #[serde(default)]
    pub diff_max: Option<ByteSize>,
}

/// Where results live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultsConfig {
    /// Record written by the current run
    #[serde(default = "default_latest")]
    pub latest: PathBuf,
    /// History of previous runs on the current branch
    #[serde(default = "default_previous_dir")]
    pub previous_dir: PathBuf,
    /// History of the base branch
    #[serde(default = "default_baseline_dir")]
    pub baseline_dir: PathBuf,
    /// Name of the CI artifact holding the history
    #[serde(default = "default_artifact_name")]
    pub artifact_name: String,
    /// Distinguishes several result sets of one repository
    #[serde(default)]
    pub result_name: Option<String>,
    /// History entries shown per report section (default: 10)
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
}

impl ResultsConfig {
    /// Artifact name including the result-name suffix
    pub fn full_artifact_name(&self) -> String {
        match self.result_name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => format!("{}-{}", self.artifact_name, name),
            None => self.artifact_name.clone(),
        }
    }
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            latest: default_latest(),
            previous_dir: default_previous_dir(),
            baseline_dir: default_baseline_dir(),
            artifact_name: default_artifact_name(),
            result_name: None,
            history_depth: default_history_depth(),
        }
    }
}

fn default_latest() -> PathBuf {
    PathBuf::from(DEFAULT_LATEST_PATH)
}

fn default_previous_dir() -> PathBuf {
    PathBuf::from("out/results")
}

fn default_baseline_dir() -> PathBuf {
    PathBuf::from("out/baseline-results")
}

fn default_artifact_name() -> String {
    "app-sdk-metrics-results".to_string()
}

fn default_history_depth() -> usize {
    10
}

/// Serde module for serializing/deserializing Duration as milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TWO_APPS: &str = r#"
        [[apps]]
        name = "io.example.plain"
        label = "Plain"
        path = "plain.apk"

        [[apps]]
        name = "io.example.instrumented"
        path = "/builds/instrumented.apk"
    "#;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::from_str(TWO_APPS).unwrap();
        assert_eq!(config.apps.len(), 2);
        assert_eq!(config.subject_labels(), vec!["Plain", "io.example.instrumented"]);
        assert!(config.startup_time.is_none());
        assert!(config.binary_size.is_none());
        assert_eq!(config.results, ResultsConfig::default());
        assert_eq!(config.results.latest, PathBuf::from("out/latest-result.properties"));
        assert_eq!(config.results.history_depth, 10);
    }

    #[test]
    fn test_startup_time_defaults() {
        let toml = format!(
            "{}\n{}",
            TWO_APPS,
            r#"
            [startup_time]
            runs = 20

            [startup_time.source]
            program = "launch.sh"
            "#
        );
        let config = Config::from_str(&toml).unwrap();
        let startup = config.startup_time.unwrap();

        assert_eq!(startup.sampler, SamplerOptions::with_runs(20));
        assert_eq!(startup.sampler.retries, 5);
        assert_eq!(startup.sampler.std_dev_max, 50.0);
        assert_eq!(startup.sampler.reading_delay, Duration::from_millis(300));
        assert_eq!(startup.sampler.settle_delay, Duration::from_millis(1000));
        assert_eq!(startup.source.pattern, DEFAULT_SOURCE_PATTERN);
        assert!(startup.source.args.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = format!(
            "{}\n{}",
            TWO_APPS,
            r#"
            [startup_time]
            runs = 50
            retries = 3
            std_dev_max = 0.0
            minimum_fraction = 0.9
            diff_min = 0.0
            diff_max = 150.0
            reading_delay_ms = 0
            settle_delay_ms = 250

            [startup_time.source]
            program = "adb-launch"
            args = ["--wait", "{name}"]
            pattern = 'took (?P<ms>\d+)ms'

            [binary_size]
            diff_min = "100 KiB"
            diff_max = "1.5 MiB"

            [results]
            latest = "build/result.properties"
            result_name = "android"
            history_depth = 5
            "#
        );
        let config = Config::from_str(&toml).unwrap();

        let startup = config.startup_time.unwrap();
        assert_eq!(startup.sampler.runs, 50);
        assert_eq!(startup.sampler.retries, 3);
        assert_eq!(startup.sampler.std_dev_max, 0.0);
        assert_eq!(startup.sampler.minimum_fraction, 0.9);
        assert_eq!(startup.sampler.diff_min, Some(0.0));
        assert_eq!(startup.sampler.diff_max, Some(150.0));
        assert_eq!(startup.sampler.reading_delay, Duration::ZERO);
        assert_eq!(startup.sampler.settle_delay, Duration::from_millis(250));
        assert_eq!(startup.source.args, vec!["--wait", "{name}"]);

        let sizes = config.binary_size.unwrap();
        assert_eq!(sizes.diff_min, Some(ByteSize(100 * 1024)));
        assert_eq!(sizes.diff_max, Some(ByteSize(1_572_864)));

        assert_eq!(config.results.latest, PathBuf::from("build/result.properties"));
        assert_eq!(config.results.full_artifact_name(), "app-sdk-metrics-results-android");
        assert_eq!(config.results.history_depth, 5);
    }

    #[test]
    fn test_required_readings() {
        let mut options = SamplerOptions::with_runs(10);
        assert_eq!(options.required_readings(), 10);

        options.minimum_fraction = 0.9;
        assert_eq!(options.required_readings(), 9);

        options.minimum_fraction = 0.7;
        assert_eq!(options.required_readings(), 7);

        options.minimum_fraction = 0.75;
        assert_eq!(options.required_readings(), 8);

        options.minimum_fraction = 0.01;
        assert_eq!(options.required_readings(), 1);
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            ("[startup_time]\nruns = 0\n[startup_time.source]\nprogram = \"x\"", "runs"),
            ("[startup_time]\nruns = 5\nretries = 0\n[startup_time.source]\nprogram = \"x\"", "retries"),
            (
                "[startup_time]\nruns = 5\nminimum_fraction = 1.5\n[startup_time.source]\nprogram = \"x\"",
                "minimum_fraction",
            ),
            ("[startup_time]\nruns = 5\nstd_dev_max = -1.0\n[startup_time.source]\nprogram = \"x\"", "std_dev_max"),
            (
                "[startup_time]\nruns = 5\n[startup_time.source]\nprogram = \"x\"\npattern = '(\\d+)'",
                "'ms'",
            ),
            ("[results]\nhistory_depth = 0", "history_depth"),
        ];

        for (extra, needle) in cases {
            let toml = format!("{}\n{}", TWO_APPS, extra);
            let err = Config::from_str(&toml).unwrap_err();
            assert!(
                format!("{:#}", err).contains(needle),
                "expected '{}' in '{:#}'",
                needle,
                err
            );
        }
    }

    #[test]
    fn test_measurements_need_apps() {
        let err = Config::from_str("[binary_size]\ndiff_max = \"1 MiB\"").unwrap_err();
        assert!(format!("{:#}", err).contains("[[apps]]"));

        // processing results alone doesn't
        assert!(Config::from_str("[results]\nhistory_depth = 3").is_ok());
    }

    #[test]
    fn test_invalid_byte_size_threshold() {
        let toml = format!("{}\n[binary_size]\ndiff_max = \"a lot\"", TWO_APPS);
        assert!(Config::from_str(&toml).is_err());
    }

    #[test]
    fn test_from_file_resolves_relative_app_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.toml");
        fs::write(&path, TWO_APPS).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.apps[0].path, dir.path().join("plain.apk"));
        assert_eq!(config.apps[1].path, PathBuf::from("/builds/instrumented.apk"));
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
