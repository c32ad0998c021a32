use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Core(#[from] tristore_core::Error),

    #[error(transparent)]
    Mem(#[from] tristore_mem::error::Error),

    #[error(transparent)]
    Operator(#[from] tristore_operators::OpError),
}

impl IndexError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            IndexError::Core(e) => e.is_cancelled(),
            IndexError::Operator(e) => e.is_cancelled(),
            IndexError::Mem(_) => false,
        }
    }
}

impl From<IndexError> for tristore_core::Error {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Core(e) => e,
            IndexError::Mem(e) => e.into(),
            IndexError::Operator(e) => e.into(),
        }
    }
}
