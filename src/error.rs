use nfd_worker::WorkerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NfdError {
    #[error("invalid duration {0:?}, use e.g. 500ms, 30s, 1m30s or 1h")]
    InvalidDuration(String),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

pub type Result<T> = std::result::Result<T, NfdError>;
