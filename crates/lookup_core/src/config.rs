//! Import and migration configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default number of relational records written per transaction.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default minimum time between progress updates.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for a bulk import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    /// Delete rows the snapshot does not mention, and rebuild tables whose
    /// definition changed.
    pub replace: bool,

    /// Relational records written per transaction.
    pub chunk_size: usize,

    /// Minimum time between progress updates.
    pub progress_interval: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            replace: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl ImportConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets replace mode.
    #[must_use]
    pub const fn replace(mut self, value: bool) -> Self {
        self.replace = value;
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub const fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the progress interval.
    #[must_use]
    pub const fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// Configuration for a bulk migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Relational records written per transaction.
    pub chunk_size: usize,

    /// File the diff log is appended to.
    pub log_path: Option<PathBuf>,

    /// Diff log to re-sync from instead of scanning everything.
    pub fixup_log: Option<PathBuf>,

    /// Minimum time between progress log lines.
    pub progress_interval: Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_path: None,
            fixup_log: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl MigrationConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chunk size.
    #[must_use]
    pub const fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the diff log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Re-syncs only the documents listed in a diff log.
    #[must_use]
    pub fn fixup_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.fixup_log = Some(path.into());
        self
    }

    /// Sets the progress interval.
    #[must_use]
    pub const fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ImportConfig::default();
        assert!(!config.replace);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.progress_interval, Duration::from_secs(1));

        let config = MigrationConfig::default();
        assert_eq!(config.chunk_size, 1000);
        assert!(config.log_path.is_none());
        assert!(config.fixup_log.is_none());
    }

    #[test]
    fn builder_pattern() {
        let config = ImportConfig::new()
            .replace(true)
            .chunk_size(10)
            .progress_interval(Duration::ZERO);
        assert!(config.replace);
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.progress_interval, Duration::ZERO);

        let config = MigrationConfig::new().chunk_size(5).log_path("diffs.log");
        assert_eq!(config.chunk_size, 5);
        assert_eq!(config.log_path, Some(PathBuf::from("diffs.log")));
    }
}
