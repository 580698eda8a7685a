//! App metrics command-line tool
//!
//! Measures startup time and binary size of the configured builds and
//! turns the results into a comparison report.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use metrics_harness::artifacts::{ArtifactSource, DirectoryArtifacts, NoArtifacts};
use metrics_harness::binary_size::measure_binary_sizes;
use metrics_harness::outputs::StepOutputs;
use metrics_harness::source::CommandSource;
use metrics_harness::{
    bytesize, Config, OutputFormat, Reporter, ResultProcessor, ResultRecord, RunContext, Sampler,
};

#[derive(Parser, Debug)]
#[command(name = "app-metrics")]
#[command(version, about = "Track app startup time and binary size across CI runs")]
struct Args {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "metrics.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Measure startup times and record them in the latest results
    StartupTime,

    /// Measure build artifact sizes and record them in the latest results
    BinarySize,

    /// Compare the latest results with history, then archive them
    Process {
        /// Branch the results were produced on
        #[arg(long)]
        branch: String,

        /// Branch to compare against (defaults to --branch)
        #[arg(long)]
        base_branch: Option<String>,

        /// Label for the archived results, e.g. the commit hash
        #[arg(long)]
        revision: Option<String>,

        /// Directory holding artifacts as <branch>/<artifact>/
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,

        /// Ignore artifacts older than this many days
        #[arg(long, requires = "artifacts_dir")]
        artifact_max_age_days: Option<u64>,

        /// File receiving name=value step outputs
        #[arg(long)]
        outputs_file: Option<PathBuf>,

        /// Report format: console, json, or json-pretty
        #[arg(short, long, default_value = "console")]
        format: OutputFormat,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert between byte counts and human-readable sizes
    Bytes {
        /// Integers to format or sizes such as "1.5 MiB" to parse
        #[arg(required = true, allow_hyphen_values = true)]
        values: Vec<String>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    // stdout carries reports, so logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether all thresholds were met
fn run(args: Args) -> Result<bool> {
    match args.command {
        Command::StartupTime => startup_time(&load_config(&args.config)?),
        Command::BinarySize => binary_size(&load_config(&args.config)?),
        Command::Process {
            branch,
            base_branch,
            revision,
            artifacts_dir,
            artifact_max_age_days,
            outputs_file,
            format,
            output,
        } => {
            let config = load_config(&args.config)?;
            let mut context = RunContext::new(branch);
            if let Some(base_branch) = base_branch {
                context = context.with_base_branch(base_branch);
            }
            if let Some(revision) = revision {
                context = context.with_revision(revision);
            }

            let artifacts: Box<dyn ArtifactSource> = match artifacts_dir {
                Some(dir) => {
                    let mut source = DirectoryArtifacts::new(dir);
                    if let Some(days) = artifact_max_age_days {
                        source = source.with_max_age(days_to_duration(days));
                    }
                    Box::new(source)
                }
                None => Box::new(NoArtifacts),
            };

            let processor = ResultProcessor::new(
                &config.results,
                subject_labels(&config),
                artifacts.as_ref(),
                StepOutputs::new(outputs_file),
            );
            let report = processor.run(&context)?;

            let reporter = Reporter::new(format);
            match output {
                Some(path) => {
                    reporter.write_to_file(&report, &path)?;
                    info!("Report written to {}", path.display());
                }
                None => reporter.report(&report)?,
            }
            Ok(true)
        }
        Command::Bytes { values } => {
            for value in values {
                println!("{} = {}", value, convert_bytes(&value)?);
            }
            Ok(true)
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::from_file(path)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn subject_labels(config: &Config) -> Vec<String> {
    if config.apps.is_empty() {
        return vec!["App 0".to_string(), "App 1".to_string()];
    }
    config.subject_labels()
}

fn startup_time(config: &Config) -> Result<bool> {
    let Some(options) = &config.startup_time else {
        info!("No [startup_time] section in the configuration, skipping");
        return Ok(true);
    };

    let source = CommandSource::new(&options.source)?;
    let mut sampler = Sampler::new(options.sampler.clone(), source);
    let result = sampler.run(&config.apps)?;

    let record = ResultRecord::open(&config.results.latest)?;
    result
        .write_to(&record)
        .with_context(|| format!("Failed to record startup times in {}", record.path().display()))?;

    report_violations("Startup time", &result.violations)
}

fn binary_size(config: &Config) -> Result<bool> {
    let Some(options) = &config.binary_size else {
        info!("No [binary_size] section in the configuration, skipping");
        return Ok(true);
    };

    let result = measure_binary_sizes(&config.apps, options)?;

    let record = ResultRecord::open(&config.results.latest)?;
    result
        .write_to(&record)
        .with_context(|| format!("Failed to record binary sizes in {}", record.path().display()))?;

    report_violations("Binary size", &result.violations)
}

fn report_violations(test: &str, violations: &[metrics_harness::MetricsError]) -> Result<bool> {
    if violations.is_empty() {
        info!("{} check passed", test);
        return Ok(true);
    }
    for violation in violations {
        eprintln!("FAILED: {}", violation);
    }
    Ok(false)
}

/// Huge day counts saturate rather than overflow
fn days_to_duration(days: u64) -> Duration {
    Duration::from_secs(days.saturating_mul(24 * 60 * 60))
}

/// Integers are formatted, anything else is parsed
fn convert_bytes(value: &str) -> Result<String> {
    match value.trim().parse::<i64>() {
        Ok(bytes) => Ok(bytesize::format(bytes)),
        Err(_) => Ok(bytesize::parse(value)?.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "app-metrics",
            "--config",
            "ci/metrics.toml",
            "process",
            "--branch",
            "feature",
            "--base-branch",
            "main",
            "--format",
            "json-pretty",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("ci/metrics.toml"));
        match args.command {
            Command::Process {
                branch,
                base_branch,
                format,
                ..
            } => {
                assert_eq!(branch, "feature");
                assert_eq!(base_branch.as_deref(), Some("main"));
                assert_eq!(format, OutputFormat::JsonPretty);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_max_age_requires_artifacts_dir() {
        let result = Args::try_parse_from([
            "app-metrics",
            "process",
            "--branch",
            "main",
            "--artifact-max-age-days",
            "30",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_days_to_duration() {
        assert_eq!(days_to_duration(2), Duration::from_secs(172_800));
        assert_eq!(days_to_duration(u64::MAX), Duration::from_secs(u64::MAX));

        let args = Args::try_parse_from([
            "app-metrics",
            "process",
            "--branch",
            "main",
            "--artifacts-dir",
            "store",
            "--artifact-max-age-days",
            "18446744073709551615",
        ]);
        assert!(args.is_ok());
    }

    #[test]
    fn test_convert_bytes() {
        assert_eq!(convert_bytes("1536").unwrap(), "1.50 KiB");
        assert_eq!(convert_bytes("-12").unwrap(), "-12 B");
        assert_eq!(convert_bytes("1 KB").unwrap(), "1000");
        assert!(convert_bytes("lots").is_err());
    }
}
