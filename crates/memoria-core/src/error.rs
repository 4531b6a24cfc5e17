use thiserror::Error;

/// Errors produced by the core data model and configuration layer.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid index name: {0}")]
    InvalidIndexName(String),

    #[error("invalid tag key: {0}")]
    InvalidTagKey(String),

    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error("document has no files")]
    NoFiles,

    #[error("unsupported pipeline state schema version: {0}")]
    UnsupportedSchemaVersion(u32),

    #[error("state record corrupted: {0}")]
    Corrupted(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
