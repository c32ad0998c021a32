use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("memory budget exceeded for tag '{tag}': requested {requested} bytes, capacity {capacity}, used {used}")]
    BudgetExceeded {
        tag: &'static str,
        requested: usize,
        capacity: usize,
        used: usize,
    },

    #[error("{side} column index {column} out of range (input has {num_columns} columns)")]
    ColumnOutOfRange {
        side: &'static str,
        column: usize,
        num_columns: usize,
    },

    #[error("operation cancelled: {context}")]
    Cancelled { context: String },

    // Core does no I/O itself; sinks and sources map their failures here.
    #[error("I/O error: {0}")]
    Io(String),

    #[error("corrupt index data: {0}")]
    Corrupt(String),

    #[error("internal invariant failed: {0}")]
    Invariant(String),
}

impl Error {
    /// `true` for cooperative aborts, as opposed to real failures.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// Budget and configuration failures are fatal and never retried.
    pub fn is_fatal_config(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::BudgetExceeded { .. } | Error::ColumnOutOfRange { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Corrupt(format!("json: {e}"))
    }
}
