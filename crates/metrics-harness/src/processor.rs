//! Post-run processing: compare the latest results with history and archive them
//!
//! ```text
//! latest-result.properties ──┐
//! baseline history (base) ───┼──> Report
//! previous history (branch) ─┘
//!                 └── latest is then archived into the previous history
//! ```

use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::artifacts::{fetch_history, ArtifactSource};
use crate::config::ResultsConfig;
use crate::error::{MetricsError, Result};
use crate::history::ResultHistory;
use crate::outputs::StepOutputs;
use crate::record::ResultRecord;
use crate::report::{Report, ReportBuilder};

/// Identity of the run being processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Branch the results were produced on
    pub branch: String,
    /// Branch to compare against, e.g. a pull request's target
    pub base_branch: String,
    /// Label for the archived entry, usually the commit hash
    pub revision: Option<String>,
}

impl RunContext {
    /// Context for a run whose baseline is its own branch
    pub fn new(branch: impl Into<String>) -> Self {
        let branch = branch.into();
        Self {
            base_branch: branch.clone(),
            branch,
            revision: None,
        }
    }

    pub fn with_base_branch(mut self, base_branch: impl Into<String>) -> Self {
        self.base_branch = base_branch.into();
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Whether the base branch has a history separate from this branch's
    pub fn has_separate_baseline(&self) -> bool {
        self.base_branch != self.branch
    }
}

/// Builds the comparison report for the latest results and archives them
pub struct ResultProcessor<'a> {
    results: &'a ResultsConfig,
    subjects: Vec<String>,
    artifacts: &'a dyn ArtifactSource,
    outputs: StepOutputs,
}

impl<'a> ResultProcessor<'a> {
    pub fn new(
        results: &'a ResultsConfig,
        subjects: Vec<String>,
        artifacts: &'a dyn ArtifactSource,
        outputs: StepOutputs,
    ) -> Self {
        Self {
            results,
            subjects,
            artifacts,
            outputs,
        }
    }

    /// Process the latest results of the run described by `context`
    ///
    /// # Errors
    ///
    /// * [`MetricsError::MissingResults`] if the latest record doesn't exist
    /// * [`MetricsError::StorageUnavailable`] if reading history or archiving fails
    ///
    /// Missing or expired artifacts are not errors; the report just has
    /// fewer sections.
    #[instrument(skip(self), fields(latest = %self.results.latest.display()))]
    pub fn run(&self, context: &RunContext) -> Result<Report> {
        let latest = ResultRecord::existing(&self.results.latest);
        if !latest.exists() {
            return Err(MetricsError::MissingResults(self.results.latest.clone()));
        }

        let artifact = self.results.full_artifact_name();
        let baseline = if context.has_separate_baseline() {
            Some(fetch_history(
                self.artifacts,
                &context.base_branch,
                &artifact,
                &self.results.baseline_dir,
            ))
        } else {
            info!(
                "Base branch is '{}' itself, its previous results serve as baseline",
                context.branch
            );
            None
        };
        let previous = fetch_history(self.artifacts, &context.branch, &artifact, &self.results.previous_dir);

        self.outputs.write("artifactName", &artifact)?;
        self.outputs
            .write("artifactPath", absolute(&self.results.previous_dir).display())?;

        let depth = self.results.history_depth;
        let mut builder =
            ReportBuilder::new(self.results.result_name.as_deref(), self.subjects.clone()).current(&latest);
        if let Some(baseline) = &baseline {
            builder = builder.history(
                format!("Baseline results on branch: {}", context.base_branch),
                baseline,
                depth,
            )?;
        }
        builder = builder.history(
            format!("Previous results on branch: {}", context.branch),
            &previous,
            depth,
        )?;
        let report = builder.build();

        self.archive(&previous, &latest, context)?;
        Ok(report)
    }

    fn archive(&self, previous: &ResultHistory, latest: &ResultRecord, context: &RunContext) -> Result<()> {
        previous.add(latest.path(), context.revision.as_deref())?;
        info!(
            "Archived latest results; {} now holds {} entries",
            previous.directory().display(),
            previous.count()?
        );
        Ok(())
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
