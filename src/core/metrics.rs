//! Pipeline counters
//!
//! Cheap relaxed atomics updated on the hot path and by the consumer. They
//! describe the pipeline's own health, not the application being logged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters for one [`LoggingContext`](crate::core::LoggingContext).
///
/// # Example
///
/// ```
/// use linelog::core::PipelineMetrics;
///
/// let metrics = PipelineMetrics::new();
/// metrics.record_committed();
/// metrics.record_sync_processed();
///
/// assert_eq!(metrics.committed(), 1);
/// assert_eq!(metrics.total_accepted(), 2);
/// ```
#[derive(Debug)]
pub struct PipelineMetrics {
    /// Records handed to the consumer through the queue
    committed: AtomicU64,

    /// Records processed on the calling thread
    sync_processed: AtomicU64,

    /// Records every appender accepted without an error
    records_written: AtomicU64,

    /// Appender errors and panics redirected to the fatal sink
    appender_failures: AtomicU64,

    /// Completed flush requests
    flushes: AtomicU64,

    /// Time the consumer spent formatting and writing
    consumer_busy_nanos: AtomicU64,
}

impl PipelineMetrics {
    pub const fn new() -> Self {
        Self {
            committed: AtomicU64::new(0),
            sync_processed: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            appender_failures: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            consumer_busy_nanos: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sync_processed(&self) -> u64 {
        self.sync_processed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn appender_failures(&self) -> u64 {
        self.appender_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Work moved off the calling threads
    pub fn consumer_busy_time(&self) -> Duration {
        Duration::from_nanos(self.consumer_busy_nanos.load(Ordering::Relaxed))
    }

    /// Records accepted through either path
    pub fn total_accepted(&self) -> u64 {
        self.committed() + self.sync_processed()
    }

    #[inline]
    pub fn record_committed(&self) -> u64 {
        self.committed.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_sync_processed(&self) -> u64 {
        self.sync_processed.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_written(&self) -> u64 {
        self.records_written.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_appender_failure(&self) -> u64 {
        self.appender_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_flush(&self) -> u64 {
        self.flushes.fetch_add(1, Ordering::Relaxed)
    }

    pub fn record_consumer_busy(&self, busy: Duration) {
        let nanos = u64::try_from(busy.as_nanos()).unwrap_or(u64::MAX);
        self.consumer_busy_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Share of accepted records that went through the synchronous path,
    /// as a percentage (0.0 - 100.0)
    pub fn sync_rate(&self) -> f64 {
        let total = self.total_accepted() as f64;
        if total == 0.0 {
            0.0
        } else {
            (self.sync_processed() as f64 / total) * 100.0
        }
    }

    pub fn reset(&self) {
        self.committed.store(0, Ordering::Relaxed);
        self.sync_processed.store(0, Ordering::Relaxed);
        self.records_written.store(0, Ordering::Relaxed);
        self.appender_failures.store(0, Ordering::Relaxed);
        self.flushes.store(0, Ordering::Relaxed);
        self.consumer_busy_nanos.store(0, Ordering::Relaxed);
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PipelineMetrics {
    /// Snapshot of the current values
    fn clone(&self) -> Self {
        Self {
            committed: AtomicU64::new(self.committed()),
            sync_processed: AtomicU64::new(self.sync_processed()),
            records_written: AtomicU64::new(self.records_written()),
            appender_failures: AtomicU64::new(self.appender_failures()),
            flushes: AtomicU64::new(self.flushes()),
            consumer_busy_nanos: AtomicU64::new(self.consumer_busy_nanos.load(Ordering::Relaxed)),
        }
    }
}
