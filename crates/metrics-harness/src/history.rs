//! Result history: archived result records in one directory
//!
//! Files are named `<index>-[<label>-]result.<ext>`. Index 1 is always the
//! most recently archived record and indices grow going back in time.
//!
//! ```text
//! out/results/
//! ├── 1-5be0c1a-result.properties   <- newest
//! ├── 2-41d77e2-result.properties
//! └── 3-result.properties           <- oldest, archived without a label
//! ```

use std::cmp::Reverse;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::error::{MetricsError, Result};
use crate::record::ResultRecord;

const DELIMITER: char = '-';
const SUFFIX: &str = "result";
const DEFAULT_EXTENSION: &str = "properties";

/// One archived record
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Position in the history, 1 being the newest
    pub index: u32,
    /// Label given when the record was archived (e.g. a revision)
    pub label: Option<String>,
    pub record: ResultRecord,
}

impl HistoryEntry {
    /// The label, or `#<index>` for unlabeled entries
    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("#{}", self.index))
    }
}

/// A parsed history file name
#[derive(Debug, Clone, PartialEq, Eq)]
struct EntryName {
    index: u32,
    label: Option<String>,
    extension: String,
}

impl EntryName {
    fn parse(file_name: &str) -> Option<Self> {
        let (index, rest) = file_name.split_once(DELIMITER)?;
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index: u32 = index.parse().ok().filter(|i| *i > 0)?;

        let (stem, extension) = rest.rsplit_once('.')?;
        let label = if stem == SUFFIX {
            None
        } else {
            let label = stem.strip_suffix(SUFFIX)?.strip_suffix(DELIMITER)?;
            if label.is_empty() {
                return None;
            }
            Some(label.to_string())
        };

        Some(EntryName {
            index,
            label,
            extension: extension.to_string(),
        })
    }

    fn file_name(&self) -> String {
        match &self.label {
            Some(label) => format!(
                "{}{}{}{}{}.{}",
                self.index, DELIMITER, label, DELIMITER, SUFFIX, self.extension
            ),
            None => format!("{}{}{}.{}", self.index, DELIMITER, SUFFIX, self.extension),
        }
    }
}

/// Directory-backed, newest-first collection of result records.
///
/// Every call re-reads the directory; nothing is cached.
#[derive(Debug, Clone)]
pub struct ResultHistory {
    directory: PathBuf,
}

impl ResultHistory {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Archive a copy of `file` as the newest entry.
    ///
    /// Existing entries move one index back, highest index first, so no two
    /// files ever claim the same index even if the process dies midway.
    ///
    /// # Errors
    ///
    /// * [`MetricsError::InvalidLabel`] if the label contains a path separator
    /// * [`MetricsError::HistoryCorrupted`] if two entries share an index or an index
    ///   is already at its maximum (nothing is renamed)
    /// * [`MetricsError::StorageUnavailable`] on any filesystem failure
    #[instrument(skip(self, file), fields(dir = %self.directory.display()))]
    pub fn add(&self, file: &Path, label: Option<&str>) -> Result<()> {
        let label = normalize_label(label)?;
        info!("Adding {} to {}", file.display(), self.directory.display());

        let mut entries = self.scan()?;
        entries.sort_by_key(|(name, _)| Reverse(name.index));

        let mut seen = HashSet::new();
        let mut moves = Vec::with_capacity(entries.len());
        for (name, path) in &entries {
            let corrupted = |reason| MetricsError::HistoryCorrupted {
                dir: self.directory.clone(),
                index: name.index,
                reason,
            };
            if !seen.insert(name.index) {
                return Err(corrupted("duplicate index"));
            }
            let index = name.index.checked_add(1).ok_or_else(|| corrupted("index can't be incremented"))?;
            let moved = EntryName {
                index,
                ..name.clone()
            };
            moves.push((path, self.directory.join(moved.file_name())));
        }

        fs::create_dir_all(&self.directory)
            .map_err(|e| MetricsError::storage(&self.directory, e))?;

        // Stage the copy first so a missing source leaves the history untouched
        let mut staged = tempfile::NamedTempFile::new_in(&self.directory)
            .map_err(|e| MetricsError::storage(&self.directory, e))?;
        let mut source = fs::File::open(file).map_err(|e| MetricsError::storage(file, e))?;
        io::copy(&mut source, &mut staged).map_err(|e| MetricsError::storage(file, e))?;

        for (path, target) in moves {
            debug!("Renaming {} to {}", path.display(), target.display());
            fs::rename(path, &target).map_err(|e| MetricsError::storage(path, e))?;
        }

        let newest = EntryName {
            index: 1,
            label,
            extension: file
                .extension()
                .and_then(|e| e.to_str())
                .filter(|e| !e.is_empty())
                .unwrap_or(DEFAULT_EXTENSION)
                .to_string(),
        };
        let target = self.directory.join(newest.file_name());
        info!("Archiving {} as {}", file.display(), target.display());
        staged
            .persist(&target)
            .map_err(|e| MetricsError::storage(&target, e.error))?;
        Ok(())
    }

    /// Up to `limit` entries, newest first.
    ///
    /// Records are not read until accessed.
    pub fn items(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.scan()?;
        entries.sort_by_key(|(name, _)| name.index);
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|(name, path)| HistoryEntry {
                index: name.index,
                label: name.label,
                record: ResultRecord::existing(path),
            })
            .collect())
    }

    /// Delete every entry, leaving other files in the directory alone.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&self) -> Result<usize> {
        let entries = self.scan()?;
        for (_, path) in &entries {
            debug!("Removing {}", path.display());
            fs::remove_file(path).map_err(|e| MetricsError::storage(path, e))?;
        }
        Ok(entries.len())
    }

    /// Number of archived entries
    pub fn count(&self) -> Result<usize> {
        Ok(self.scan()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    fn scan(&self) -> Result<Vec<(EntryName, PathBuf)>> {
        let read_dir = match fs::read_dir(&self.directory) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MetricsError::storage(&self.directory, e)),
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| MetricsError::storage(&self.directory, e))?;
            let path = dir_entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match EntryName::parse(file_name) {
                Some(name) => entries.push((name, path)),
                None => debug!("Ignoring {} - not a history entry", path.display()),
            }
        }
        Ok(entries)
    }
}

fn normalize_label(label: Option<&str>) -> Result<Option<String>> {
    let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) else {
        return Ok(None);
    };
    if label.contains(['/', '\\']) || label == "." || label == ".." {
        return Err(MetricsError::InvalidLabel(label.to_string()));
    }
    Ok(Some(label.to_string()))
}
