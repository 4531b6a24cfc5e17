use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("unknown lease token: {0}")]
    UnknownLease(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
