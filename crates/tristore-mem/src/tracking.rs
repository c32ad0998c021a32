//! Peak tracking for buffered bytes or values.
//!
//! The sorter records its in-memory footprint here so tests and logs can
//! check that runs really stayed within the configured buffer size.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PeakTracker {
    peak: AtomicUsize,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a current level; keeps the maximum seen so far.
    pub fn record(&self, level: usize) {
        let prev = self.peak.fetch_max(level, Ordering::AcqRel);
        if level > prev {
            #[cfg(feature = "tracing")]
            tracing::trace!(level, "new peak");
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.peak.store(0, Ordering::Release);
    }
}
