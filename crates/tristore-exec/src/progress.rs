//! Scan progress reporting.
//!
//! Index-scan join inputs report after every block they hand to the join.
//! The first report of a scan is always delivered, later ones only when the
//! sink considers them due, so a scan over thousands of small blocks does
//! not flood whatever sits behind the sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tristore_core::config::EngineConfig;
use tristore_index::ScanProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPriority {
    Always,
    IfDue,
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &ScanProgress, priority: SendPriority);
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: &ScanProgress, _priority: SendPriority) {}
}

/// Delivers `IfDue` reports at most once per interval and logs them.
pub struct ThrottledProgress {
    label: String,
    interval: Duration,
    last_sent: Mutex<Option<Instant>>,
    latest: Mutex<ScanProgress>,
    sent: AtomicU64,
}

impl ThrottledProgress {
    pub fn new(label: impl Into<String>, interval: Duration) -> Self {
        Self {
            label: label.into(),
            interval,
            last_sent: Mutex::new(None),
            latest: Mutex::new(ScanProgress::default()),
            sent: AtomicU64::new(0),
        }
    }

    pub fn from_config(label: impl Into<String>, cfg: &EngineConfig) -> Self {
        Self::new(label, Duration::from_millis(cfg.progress_interval_ms))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Reports that got through the throttle.
    pub fn reports_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Last delivered progress.
    pub fn latest(&self) -> ScanProgress {
        *self.latest.lock()
    }
}

impl ProgressSink for ThrottledProgress {
    fn report(&self, progress: &ScanProgress, priority: SendPriority) {
        let now = Instant::now();
        {
            let mut last = self.last_sent.lock();
            let due = last.map_or(true, |t| now.duration_since(t) >= self.interval);
            if priority == SendPriority::IfDue && !due {
                return;
            }
            *last = Some(now);
        }
        *self.latest.lock() = *progress;
        self.sent.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            scan = %self.label,
            blocks_read = progress.blocks_read,
            blocks_total = progress.blocks_total,
            rows_read = progress.rows_read,
            "scan progress"
        );
    }
}
