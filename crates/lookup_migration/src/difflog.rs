//! Divergence log written by bulk migrations and read back by fixup runs.
//!
//! ```text
//! Doc "0fb6c422115145c0a651bb9a34ca09c4" has differences:
//!   tag: legacy value "cost" != relational value "price"
//! Relational row "cddc3a035aab444a8ead069c942d7472" is missing in legacy store
//! ```

use crate::error::{MigrationError, MigrationResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const DIFF_PREFIX: &str = "Doc ";
const DIFF_SUFFIX: &str = " has differences:";
const MISSING_PREFIX: &str = "Relational row ";
const MISSING_SUFFIX: &str = " is missing in legacy store";

/// One actionable line of a diff log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A legacy document whose relational record differs.
    Divergent(String),
    /// A relational record without a legacy document.
    MissingInLegacy(String),
}

impl LogEntry {
    /// The document id the entry refers to.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Divergent(id) | Self::MissingInLegacy(id) => id,
        }
    }
}

/// Sink for divergences found during a migration.
///
/// Lines are always kept in memory; a file-backed log also writes each
/// line as it is recorded.
#[derive(Debug, Default)]
pub struct DiffLog {
    file: Option<BufWriter<File>>,
    path: Option<PathBuf>,
    lines: Vec<String>,
}

impl DiffLog {
    /// Creates a log that is only kept in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates a log file. An existing file is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::LogExists`] if the path is taken, or an I/O
    /// error if the file cannot be created.
    pub fn create(path: impl Into<PathBuf>) -> MigrationResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => MigrationError::LogExists { path: path.clone() },
                _ => MigrationError::Io(e),
            })?;
        Ok(Self {
            file: Some(BufWriter::new(file)),
            path: Some(path),
            lines: Vec::new(),
        })
    }

    /// Path of the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Every line recorded so far.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Records the differences of one legacy document.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be written.
    pub fn record_diff(&mut self, doc_id: &str, diffs: &[String]) -> io::Result<()> {
        self.push(format!("{DIFF_PREFIX}{}{DIFF_SUFFIX}", quote(doc_id)))?;
        for diff in diffs {
            self.push(format!("  {diff}"))?;
        }
        Ok(())
    }

    /// Records a relational record with no legacy document.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be written.
    pub fn record_missing_in_legacy(&mut self, id: &str) -> io::Result<()> {
        self.push(format!("{MISSING_PREFIX}{}{MISSING_SUFFIX}", quote(id)))
    }

    /// Records a free-form action line.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be written.
    pub fn record_action(&mut self, line: impl Into<String>) -> io::Result<()> {
        self.push(line.into())
    }

    /// Flushes the backing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be written.
    pub fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }

    fn push(&mut self, line: String) -> io::Result<()> {
        if let Some(file) = &mut self.file {
            writeln!(file, "{line}")?;
        }
        self.lines.push(line);
        Ok(())
    }
}

impl Drop for DiffLog {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

fn quote(id: &str) -> String {
    serde_json::Value::String(id.to_string()).to_string()
}

fn unquote(text: &str) -> Option<String> {
    serde_json::from_str(text).ok()
}

/// Parses log lines into actionable entries, in order.
///
/// Diff detail lines and action lines are skipped.
#[must_use]
pub fn parse_entries<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<LogEntry> {
    lines
        .into_iter()
        .filter_map(|line| {
            if let Some(id) = line
                .strip_prefix(DIFF_PREFIX)
                .and_then(|rest| rest.strip_suffix(DIFF_SUFFIX))
            {
                return unquote(id).map(LogEntry::Divergent);
            }
            line.strip_prefix(MISSING_PREFIX)
                .and_then(|rest| rest.strip_suffix(MISSING_SUFFIX))
                .and_then(unquote)
                .map(LogEntry::MissingInLegacy)
        })
        .collect()
}

/// Reads the actionable entries of a log file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_entries(path: &Path) -> MigrationResult<Vec<LogEntry>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_entries(text.lines()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn written_entries_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("diffs.log");
        {
            let mut log = DiffLog::create(&path).unwrap();
            log.record_action("Updated table abc").unwrap();
            log.record_diff("abc", &["tag: legacy value \"a\" != relational value \"b\"".into()])
                .unwrap();
            log.record_missing_in_legacy("def").unwrap();
        }
        let entries = read_entries(&path).unwrap();
        assert_eq!(
            entries,
            vec![
                LogEntry::Divergent("abc".into()),
                LogEntry::MissingInLegacy("def".into()),
            ]
        );
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Doc \"abc\" has differences:\n  tag:"));
    }

    #[test]
    fn existing_log_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("diffs.log");
        fs::write(&path, "keep me").unwrap();
        let err = DiffLog::create(&path).unwrap_err();
        assert!(matches!(err, MigrationError::LogExists { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn in_memory_log_keeps_lines() {
        let mut log = DiffLog::in_memory();
        log.record_diff("x", &[]).unwrap();
        assert!(log.path().is_none());
        assert_eq!(log.lines(), ["Doc \"x\" has differences:"]);
        assert_eq!(parse_entries(log.lines().iter().map(String::as_str))[0].id(), "x");
    }

    #[test]
    fn malformed_headers_are_skipped() {
        let entries = parse_entries(["Doc abc has differences:", "  Doc \"x\" has differences:"]);
        assert!(entries.is_empty());
    }
}
