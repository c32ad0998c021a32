use thiserror::Error;

pub type Result<T> = std::result::Result<T, OpError>;

#[derive(Debug, Error)]
pub enum OpError {
    #[error(transparent)]
    Core(#[from] tristore_core::Error),

    #[error(transparent)]
    Mem(#[from] tristore_mem::error::Error),

    #[error("execution error: {0}")]
    Exec(String),
}

impl OpError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OpError::Core(e) if e.is_cancelled())
    }
}

impl From<OpError> for tristore_core::Error {
    fn from(e: OpError) -> Self {
        match e {
            OpError::Core(e) => e,
            OpError::Mem(e) => e.into(),
            OpError::Exec(msg) => tristore_core::Error::Invariant(msg),
        }
    }
}
