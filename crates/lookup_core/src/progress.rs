//! Progress reporting for long-running operations.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Position of a bulk import within its snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Tables fully processed.
    pub tables_done: usize,
    /// Rows processed in the current table.
    pub rows_done: usize,
    /// Rows in the current table.
    pub rows_in_table: usize,
    /// Tables in the snapshot.
    pub total_tables: usize,
}

impl Progress {
    /// Returns the completed fraction in `0.0..=1.0`.
    ///
    /// Computed as `(tables_done + rows_done / rows_in_table) / total_tables`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total_tables == 0 {
            return 1.0;
        }
        let partial = if self.rows_in_table == 0 {
            0.0
        } else {
            self.rows_done as f64 / self.rows_in_table as f64
        };
        ((self.tables_done as f64 + partial) / self.total_tables as f64).clamp(0.0, 1.0)
    }

    /// Returns the fraction as a whole percentage.
    #[must_use]
    pub fn percent(&self) -> u8 {
        (self.fraction() * 100.0).floor() as u8
    }
}

/// Receives progress updates.
pub trait ProgressSink: Send + Sync {
    /// Reports the current position.
    fn report(&self, progress: Progress);
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: Progress) {}
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn report(&self, progress: Progress) {
        self(progress);
    }
}

/// Forwards at most one update per interval.
///
/// The first update always passes. The last one of an operation may be
/// dropped; callers report completion separately.
pub struct RateLimitedProgress<S> {
    inner: S,
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for RateLimitedProgress<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedProgress")
            .field("inner", &self.inner)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl<S: ProgressSink> RateLimitedProgress<S> {
    /// Wraps a sink.
    pub fn new(inner: S, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            last: Mutex::new(None),
        }
    }

    /// Returns the wrapped sink.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ProgressSink> ProgressSink for RateLimitedProgress<S> {
    fn report(&self, progress: Progress) {
        let now = Instant::now();
        {
            let mut last = self.last.lock();
            if last.is_some_and(|at| now.duration_since(at) < self.interval) {
                return;
            }
            *last = Some(now);
        }
        self.inner.report(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fraction_formula() {
        let p = Progress {
            tables_done: 1,
            rows_done: 5,
            rows_in_table: 10,
            total_tables: 2,
        };
        assert!((p.fraction() - 0.75).abs() < f64::EPSILON);
        assert_eq!(p.percent(), 75);
        assert!((Progress::default().fraction() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_table_counts_as_not_started() {
        let p = Progress {
            tables_done: 0,
            rows_done: 0,
            rows_in_table: 0,
            total_tables: 4,
        };
        assert_eq!(p.percent(), 0);
    }

    #[test]
    fn rate_limit_drops_bursts() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            move |p: Progress| seen.lock().push(p.rows_done)
        };
        let limited = RateLimitedProgress::new(sink, Duration::from_secs(3600));
        for i in 0..10 {
            limited.report(Progress {
                rows_done: i,
                rows_in_table: 10,
                total_tables: 1,
                ..Progress::default()
            });
        }
        assert_eq!(*seen.lock(), vec![0]);

        let unlimited = RateLimitedProgress::new(NoProgress, Duration::ZERO);
        unlimited.report(Progress::default());
        unlimited.report(Progress::default());
    }
}
