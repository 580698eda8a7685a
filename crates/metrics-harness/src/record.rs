//! Result records: one run's metrics in a flat `key=value` file
//!
//! Keys are always `<scope>.<name>`, e.g. `startup_time.0` or `app_size.diff`.
//! The file is the only source of truth: every read loads it and every write
//! replaces it, so nothing is cached between calls.
//!
//! ```text
//! # written by app-metrics
//! startup_time.0=412.25
//! startup_time.1=436.5
//! startup_time.diff=24.25
//! app_size.0=4194304
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::bytesize;
use crate::error::{MetricsError, Result};

/// Separator between scope and name in a key
pub const KEY_SEPARATOR: char = '.';

/// Default location of the record produced by a measurement run
pub const DEFAULT_LATEST_PATH: &str = "out/latest-result.properties";

/// A value stored in a result record.
///
/// Always written in its textual form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(v.to_string()))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// One line of a record file
#[derive(Debug, Clone, PartialEq)]
enum Line {
    Entry { key: String, value: String },
    Other(String),
}

/// A result record backed by a single properties file.
#[derive(Debug, Clone)]
pub struct ResultRecord {
    path: PathBuf,
}

impl ResultRecord {
    /// Open the record at `path`, creating the file (and its parent
    /// directories) when it doesn't exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::StorageUnavailable`] if the file can't be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| MetricsError::storage(parent, e))?;
            }
            fs::File::create(&path).map_err(|e| MetricsError::storage(&path, e))?;
            debug!("Created result file {}", path.display());
        }
        Ok(Self { path })
    }

    /// Refer to an existing record without creating anything.
    ///
    /// Reads from a missing file behave like reads from an empty one.
    pub fn existing(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Store `value` under `scope.name` and persist the file.
    ///
    /// # Errors
    ///
    /// * [`MetricsError::InvalidKey`] if scope or name contains a reserved character
    /// * [`MetricsError::StorageUnavailable`] if the file can't be read or replaced
    pub fn set(&self, scope: &str, name: &str, value: impl Into<Value>) -> Result<()> {
        let key = full_key(scope, name)?;
        let value = value.into().to_string();

        let mut lines = self.load()?;
        let existing = lines.iter_mut().find_map(|line| match line {
            Line::Entry { key: k, value: v } if *k == key => Some(v),
            _ => None,
        });
        match existing {
            Some(v) => *v = value,
            None => lines.push(Line::Entry { key, value }),
        }
        self.store(&lines)
    }

    /// Raw value of `scope.name`, or an empty string when absent.
    pub fn get(&self, scope: &str, name: &str) -> String {
        let Ok(key) = full_key(scope, name) else {
            return String::new();
        };
        let lines = match self.load() {
            Ok(lines) => lines,
            Err(e) => {
                warn!("{}", e);
                return String::new();
            }
        };
        lines
            .into_iter()
            .find_map(|line| match line {
                Line::Entry { key: k, value } if k == key => Some(value),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Value as a float, `0.0` when absent or unparsable
    pub fn get_f64(&self, scope: &str, name: &str) -> f64 {
        self.get(scope, name).trim().parse().unwrap_or(0.0)
    }

    /// Value as an integer, `0` when absent or unparsable.
    ///
    /// Integral floats such as `1024.0` are accepted.
    pub fn get_i64(&self, scope: &str, name: &str) -> i64 {
        let raw = self.get(scope, name);
        let raw = raw.trim();
        raw.parse::<i64>()
            .ok()
            .or_else(|| {
                raw.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite() && v.fract() == 0.0)
                    .map(|v| v as i64)
            })
            .unwrap_or(0)
    }

    /// Float value with exactly two decimals
    pub fn get_decimal(&self, scope: &str, name: &str) -> String {
        format!("{:.2}", self.get_f64(scope, name))
    }

    /// Integer value as a human-readable byte size
    pub fn get_bytes(&self, scope: &str, name: &str) -> String {
        bytesize::format(self.get_i64(scope, name))
    }

    /// All `(key, value)` entries in file order
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .load()?
            .into_iter()
            .filter_map(|line| match line {
                Line::Entry { key, value } => Some((key, value)),
                Line::Other(_) => None,
            })
            .collect())
    }

    fn load(&self) -> Result<Vec<Line>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MetricsError::storage(&self.path, e)),
        };
        Ok(content.lines().map(parse_line).collect())
    }

    fn store(&self, lines: &[Line]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| MetricsError::storage(&dir, e))?;

        let mut file = tempfile::NamedTempFile::new_in(&dir).map_err(|e| MetricsError::storage(&dir, e))?;
        for line in lines {
            let written = match line {
                Line::Entry { key, value } => writeln!(file, "{}={}", key, escape(value)),
                Line::Other(text) => writeln!(file, "{}", text),
            };
            written.map_err(|e| MetricsError::storage(&self.path, e))?;
        }
        file.as_file()
            .sync_all()
            .map_err(|e| MetricsError::storage(&self.path, e))?;
        file.persist(&self.path)
            .map_err(|e| MetricsError::storage(&self.path, e.error))?;
        Ok(())
    }
}

/// Compose `scope.name`, rejecting parts that would make keys ambiguous.
pub fn full_key(scope: &str, name: &str) -> Result<String> {
    for part in [scope, name] {
        let reserved = part.is_empty()
            || part.starts_with(['#', '!'])
            || part.contains([KEY_SEPARATOR, '=', '\n', '\r']);
        if reserved {
            return Err(MetricsError::InvalidKey(part.to_string()));
        }
    }
    Ok(format!("{}{}{}", scope, KEY_SEPARATOR, name))
}

fn parse_line(raw: &str) -> Line {
    let trimmed = raw.trim_start();
    if trimmed.is_empty() || trimmed.starts_with(['#', '!']) {
        return Line::Other(raw.to_string());
    }
    match trimmed.split_once('=') {
        Some((key, value)) => Line::Entry {
            key: key.trim().to_string(),
            value: unescape(value.trim()),
        },
        None => Line::Other(raw.to_string()),
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record_in(dir: &tempfile::TempDir) -> ResultRecord {
        ResultRecord::open(dir.path().join("out/latest-result.properties")).unwrap()
    }

    #[test]
    fn test_open_creates_file_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let record = record_in(&dir);
        assert!(record.exists());
        assert_eq!(fs::read_to_string(record.path()).unwrap(), "");
    }

    #[test]
    fn test_set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let record = record_in(&dir);

        record.set("startup_time", "0", 123.4).unwrap();
        assert_eq!(record.get("startup_time", "0"), "123.4");
        assert_eq!(record.get_f64("startup_time", "0"), 123.4);
        assert_eq!(record.get_decimal("startup_time", "0"), "123.40");
    }

    #[test]
    fn test_missing_keys_default() {
        let dir = tempfile::tempdir().unwrap();
        let record = record_in(&dir);

        assert_eq!(record.get("missing", "x"), "");
        assert_eq!(record.get_f64("missing", "x"), 0.0);
        assert_eq!(record.get_i64("missing", "x"), 0);
        assert_eq!(record.get_decimal("missing", "x"), "0.00");
        assert_eq!(record.get_bytes("missing", "x"), "0 B");
    }

    #[test]
    fn test_unparsable_values_default() {
        let dir = tempfile::tempdir().unwrap();
        let record = record_in(&dir);
        record.set("app_size", "0", "not a number").unwrap();

        assert_eq!(record.get_i64("app_size", "0"), 0);
        assert_eq!(record.get_f64("app_size", "0"), 0.0);
    }

    #[test]
    fn test_upsert_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let record = record_in(&dir);

        record.set("app_size", "0", 100_i64).unwrap();
        record.set("app_size", "1", 250_i64).unwrap();
        record.set("app_size", "0", 120_i64).unwrap();

        let content = fs::read_to_string(record.path()).unwrap();
        assert_eq!(content, "app_size.0=120\napp_size.1=250\n");
    }

    #[test]
    fn test_reads_see_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let record = record_in(&dir);
        record.set("startup_time", "diff", 12.5).unwrap();

        fs::write(
            record.path(),
            "# edited by hand\nstartup_time.diff = 20.25\n\napp_size.diff=2048\n",
        )
        .unwrap();

        assert_eq!(record.get_f64("startup_time", "diff"), 20.25);
        assert_eq!(record.get_bytes("app_size", "diff"), "2.00 KiB");

        record.set("app_size", "diff", 4096_i64).unwrap();
        let content = fs::read_to_string(record.path()).unwrap();
        assert!(content.starts_with("# edited by hand\n"));
        assert!(content.contains("app_size.diff=4096"));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.properties");
        ResultRecord::open(&path)
            .unwrap()
            .set("startup_time", "1", 433.0)
            .unwrap();

        let reopened = ResultRecord::open(&path).unwrap();
        assert_eq!(reopened.get("startup_time", "1"), "433");
    }

    #[test]
    fn test_text_values_are_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let record = record_in(&dir);
        record.set("notes", "0", "line one\nline two \\ end").unwrap();

        assert_eq!(record.get("notes", "0"), "line one\nline two \\ end");
        let content = fs::read_to_string(record.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_integral_float_as_integer() {
        let dir = tempfile::tempdir().unwrap();
        let record = record_in(&dir);
        record.set("app_size", "diff", 1024.0).unwrap();
        assert_eq!(record.get_i64("app_size", "diff"), 1024);
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let record = record_in(&dir);

        for (scope, name) in [("startup.time", "0"), ("startup_time", "a.b"), ("", "0"), ("a=b", "0"), ("#x", "0")] {
            let result = record.set(scope, name, 1_i64);
            assert!(matches!(result, Err(MetricsError::InvalidKey(_))), "{}.{}", scope, name);
        }
        assert_eq!(record.get("startup.time", "0"), "");
    }

    #[test]
    fn test_entries() {
        let dir = tempfile::tempdir().unwrap();
        let record = record_in(&dir);
        record.set("startup_time", "0", 1_i64).unwrap();
        record.set("startup_time", "1", 2_i64).unwrap();

        assert_eq!(
            record.entries().unwrap(),
            vec![
                ("startup_time.0".to_string(), "1".to_string()),
                ("startup_time.1".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_open_under_regular_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("out");
        fs::write(&blocker, "not a directory").unwrap();

        let err = ResultRecord::open(blocker.join("latest-result.properties")).unwrap_err();
        assert!(matches!(err, MetricsError::StorageUnavailable { .. }));
    }

    #[test]
    fn test_set_on_unavailable_storage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("out");
        fs::write(&blocker, "not a directory").unwrap();

        let record = ResultRecord::existing(blocker.join("latest-result.properties"));
        let err = record.set("startup_time", "0", 412.5).unwrap_err();
        assert!(matches!(err, MetricsError::StorageUnavailable { .. }));
        // reads still fall back to defaults
        assert_eq!(record.get_f64("startup_time", "0"), 0.0);
        assert_eq!(fs::read_to_string(&blocker).unwrap(), "not a directory");
    }

    #[test]
    fn test_existing_does_not_create() {
        let dir = tempfile::tempdir().unwrap();
        let record = ResultRecord::existing(dir.path().join("nope.properties"));
        assert!(!record.exists());
        assert_eq!(record.get("a", "b"), "");
        assert!(!record.exists());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::from(123.4).to_string(), "123.4");
        assert_eq!(Value::from(433.0).to_string(), "433");
        assert_eq!(Value::from(-7_i64).to_string(), "-7");
        assert_eq!(Value::from("abc").to_string(), "abc");
        assert_eq!(Value::from(u64::MAX).to_string(), u64::MAX.to_string());
    }
}
