use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Core(#[from] tristore_core::Error),

    #[error(transparent)]
    Operator(#[from] tristore_operators::OpError),

    #[error(transparent)]
    Index(#[from] tristore_index::IndexError),

    #[error("join worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("join worker: {0}")]
    Worker(String),
}

impl ExecError {
    /// The join was aborted through its cancellation handle rather than
    /// failing.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ExecError::Core(e) => e.is_cancelled(),
            ExecError::Operator(e) => e.is_cancelled(),
            ExecError::Index(e) => e.is_cancelled(),
            ExecError::WorkerPanicked(_) | ExecError::Worker(_) => false,
        }
    }
}
