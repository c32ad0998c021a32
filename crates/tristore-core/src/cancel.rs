//! Cooperative cancellation.
//!
//! A handle is cloned into every long-running loop; the loops call
//! [`CancellationHandle::check`] at block/chunk boundaries. Nothing is ever
//! interrupted preemptively.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that also trips once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(Cancelled)` naming `context` if the handle has tripped.
    pub fn check(&self, context: &str) -> Result<()> {
        if self.is_cancelled() {
            let reason = if self.flag.load(Ordering::Acquire) {
                "cancelled"
            } else {
                "timed out"
            };
            return Err(Error::Cancelled {
                context: format!("{reason} during {context}"),
            });
        }
        Ok(())
    }
}
