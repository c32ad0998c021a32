use thiserror::Error;

/// Result type local to tristore-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("memory budget exceeded for tag '{tag}': requested {requested} bytes, capacity {capacity}, used {used}")]
    BudgetExceeded {
        tag: &'static str,
        requested: usize,
        capacity: usize,
        used: usize,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("unsupported codec: {0}")]
    CodecUnsupported(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("checksum mismatch for {0}")]
    ChecksumMismatch(String),

    #[error("bad segment: {0}")]
    Segment(String),
}

impl From<tristore_core::Error> for Error {
    fn from(e: tristore_core::Error) -> Self {
        match e {
            tristore_core::Error::BudgetExceeded {
                tag,
                requested,
                capacity,
                used,
            } => Error::BudgetExceeded {
                tag,
                requested,
                capacity,
                used,
            },
            other => Error::Storage(other.to_string()),
        }
    }
}

// Sinks and sources report through core errors; keep the taxonomy intact.
impl From<Error> for tristore_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::BudgetExceeded {
                tag,
                requested,
                capacity,
                used,
            } => tristore_core::Error::BudgetExceeded {
                tag,
                requested,
                capacity,
                used,
            },
            Error::Storage(msg) => tristore_core::Error::Io(msg),
            Error::CodecUnsupported(codec) => {
                tristore_core::Error::Config(format!("codec '{codec}' not compiled in"))
            }
            e @ (Error::Codec(_) | Error::ChecksumMismatch(_) | Error::Segment(_)) => {
                tristore_core::Error::Corrupt(e.to_string())
            }
        }
    }
}
