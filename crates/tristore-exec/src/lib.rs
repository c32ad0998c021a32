#![forbid(unsafe_code)]
//! tristore-exec: runs merge joins over materialized tables, arbitrary block
//! streams and permutation scans, either eagerly on the calling thread or
//! lazily on a worker that hands out bounded chunks.

pub mod error;
pub mod failpoints;
pub mod lazy_join;
pub mod progress;

pub use error::{ExecError, Result};
pub use lazy_join::{JoinInput, JoinOutput, JoinRequest, LazyJoinOrchestrator, LazyJoinResult, OutputMode};
pub use progress::{NoProgress, ProgressSink, SendPriority, ThrottledProgress};
