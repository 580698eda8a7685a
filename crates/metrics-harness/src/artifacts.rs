//! Sources of previously archived result histories
//!
//! CI keeps each branch's result history as a named artifact. Before a
//! history is read, the matching artifact is fetched into the history's
//! directory. A history that can't be fetched is treated as empty.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{MetricsError, Result};
use crate::history::ResultHistory;

/// Fetches a branch's artifact into a local directory
pub trait ArtifactSource {
    /// Extract the newest `artifact` published for `branch` into `target`
    ///
    /// History entries already in `target` are replaced by the artifact's.
    ///
    /// # Errors
    ///
    /// [`MetricsError::ArtifactUnavailable`] when there is no such artifact or it
    /// expired, [`MetricsError::StorageUnavailable`] when copying fails.
    fn fetch(&self, branch: &str, artifact: &str, target: &Path) -> Result<()>;
}

/// Artifacts laid out on disk as `<root>/<branch>/<artifact>/`
///
/// Suits CI caches mounted into the job and local runs.
#[derive(Debug, Clone)]
pub struct DirectoryArtifacts {
    root: PathBuf,
    max_age: Option<Duration>,
}

impl DirectoryArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_age: None,
        }
    }

    /// Treat artifacts last modified longer ago than `max_age` as expired
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    fn unavailable(branch: &str, artifact: &str, reason: impl Into<String>) -> MetricsError {
        MetricsError::ArtifactUnavailable {
            branch: branch.to_string(),
            artifact: artifact.to_string(),
            reason: reason.into(),
        }
    }

    fn check_age(&self, dir: &Path, branch: &str, artifact: &str) -> Result<()> {
        let Some(max_age) = self.max_age else {
            return Ok(());
        };
        let age = fs::metadata(dir)
            .and_then(|m| m.modified())
            .map_err(|e| MetricsError::storage(dir, e))?
            .elapsed()
            .unwrap_or_default();
        if age > max_age {
            return Err(Self::unavailable(
                branch,
                artifact,
                format!("expired {}s ago", (age - max_age).as_secs()),
            ));
        }
        Ok(())
    }
}

impl ArtifactSource for DirectoryArtifacts {
    fn fetch(&self, branch: &str, artifact: &str, target: &Path) -> Result<()> {
        let source = self.root.join(branch).join(artifact);
        if !source.is_dir() {
            return Err(Self::unavailable(
                branch,
                artifact,
                format!("no artifact at {}", source.display()),
            ));
        }
        self.check_age(&source, branch, artifact)?;

        // The artifact replaces the local history instead of merging into it
        let removed = ResultHistory::new(target).clear()?;
        if removed > 0 {
            debug!("Removed {} stale entries from {}", removed, target.display());
        }

        fs::create_dir_all(target).map_err(|e| MetricsError::storage(target, e))?;
        let read_dir = fs::read_dir(&source).map_err(|e| MetricsError::storage(&source, e))?;
        let mut copied = 0;
        for entry in read_dir {
            let path = entry.map_err(|e| MetricsError::storage(&source, e))?.path();
            let Some(file_name) = path.file_name().filter(|_| path.is_file()) else {
                continue;
            };
            let destination = target.join(file_name);
            debug!("Copying {} to {}", path.display(), destination.display());
            fs::copy(&path, &destination).map_err(|e| MetricsError::storage(&destination, e))?;
            copied += 1;
        }
        info!("Extracted {} files of '{}' into {}", copied, artifact, target.display());
        Ok(())
    }
}

/// No artifact store configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArtifacts;

impl ArtifactSource for NoArtifacts {
    fn fetch(&self, branch: &str, artifact: &str, _target: &Path) -> Result<()> {
        Err(MetricsError::ArtifactUnavailable {
            branch: branch.to_string(),
            artifact: artifact.to_string(),
            reason: "no artifact source configured".to_string(),
        })
    }
}

/// Fetch `artifact` of `branch` into `dir` and open the history there
///
/// Fetch failures are logged; the history is returned either way and is
/// simply empty when nothing was fetched before.
#[instrument(skip(source, dir), fields(dir = %dir.display()))]
pub fn fetch_history(source: &dyn ArtifactSource, branch: &str, artifact: &str, dir: &Path) -> ResultHistory {
    match source.fetch(branch, artifact, dir) {
        Ok(()) => info!("Fetched previous results of branch '{}'", branch),
        Err(e @ MetricsError::ArtifactUnavailable { .. }) => info!("{} - continuing without it", e),
        Err(e) => warn!("{} - continuing without previous results", e),
    }
    ResultHistory::new(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn publish(root: &Path, branch: &str, artifact: &str, files: &[&str]) {
        let dir = root.join(branch).join(artifact);
        fs::create_dir_all(&dir).unwrap();
        for file in files {
            fs::write(dir.join(file), "startup_time.0=100\n").unwrap();
        }
    }

    #[test]
    fn test_fetch_copies_files() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        publish(store.path(), "main", "results", &["1-result.properties", "2-result.properties"]);

        let target = work.path().join("out/baseline-results");
        DirectoryArtifacts::new(store.path())
            .fetch("main", "results", &target)
            .unwrap();

        assert!(target.join("1-result.properties").is_file());
        assert!(target.join("2-result.properties").is_file());
    }

    #[test]
    fn test_fetch_replaces_existing_entries() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        publish(store.path(), "main", "results", &["1-m1-result.properties"]);

        let target = work.path().join("results");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("1-r1-result.properties"), "").unwrap();
        fs::write(target.join("2-m1-result.properties"), "").unwrap();
        fs::write(target.join("README"), "").unwrap();

        DirectoryArtifacts::new(store.path())
            .fetch("main", "results", &target)
            .unwrap();

        let mut names: Vec<String> = fs::read_dir(&target)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["1-m1-result.properties", "README"]);
    }

    #[test]
    fn test_unavailable_artifact_keeps_local_history() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        fs::write(work.path().join("1-r1-result.properties"), "").unwrap();

        DirectoryArtifacts::new(store.path())
            .fetch("main", "results", work.path())
            .unwrap_err();
        assert!(work.path().join("1-r1-result.properties").is_file());
    }

    #[test]
    fn test_nested_branch_names() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        publish(store.path(), "feature/login", "results", &["1-abc-result.properties"]);

        DirectoryArtifacts::new(store.path())
            .fetch("feature/login", "results", work.path())
            .unwrap();
        assert!(work.path().join("1-abc-result.properties").is_file());
    }

    #[test]
    fn test_missing_artifact() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        publish(store.path(), "main", "other", &["1-result.properties"]);

        let err = DirectoryArtifacts::new(store.path())
            .fetch("main", "results", work.path())
            .unwrap_err();
        assert!(matches!(err, MetricsError::ArtifactUnavailable { .. }));
    }

    #[test]
    fn test_expired_artifact() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        publish(store.path(), "main", "results", &["1-result.properties"]);
        std::thread::sleep(Duration::from_millis(20));

        let err = DirectoryArtifacts::new(store.path())
            .with_max_age(Duration::from_millis(1))
            .fetch("main", "results", &work.path().join("target"))
            .unwrap_err();
        assert!(err.to_string().contains("expired"));
        assert!(!work.path().join("target").exists());

        DirectoryArtifacts::new(store.path())
            .with_max_age(Duration::from_secs(3600))
            .fetch("main", "results", &work.path().join("target"))
            .unwrap();
    }

    #[test]
    fn test_fetch_history_never_fails() {
        let work = tempfile::tempdir().unwrap();
        let dir = work.path().join("results");

        let history = fetch_history(&NoArtifacts, "main", "results", &dir);
        assert_eq!(history.count().unwrap(), 0);
        assert_eq!(history.directory(), dir.as_path());
    }

    #[test]
    fn test_fetch_history_reads_fetched_entries() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        publish(store.path(), "main", "results", &["1-aaa-result.properties", "notes.txt"]);

        let source = DirectoryArtifacts::new(store.path());
        let history = fetch_history(&source, "main", "results", &work.path().join("results"));

        let items = history.items(10).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label.as_deref(), Some("aaa"));
        assert_eq!(items[0].record.get_i64("startup_time", "0"), 100);
    }
}
