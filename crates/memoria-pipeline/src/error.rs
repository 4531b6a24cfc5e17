use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error("no extractor registered for file: {0}")]
    NoExtractor(String),

    #[error("store error: {0}")]
    Store(#[from] memoria_store::StoreError),

    #[error("index error: {0}")]
    Index(#[from] memoria_index::IndexError),

    #[error("core error: {0}")]
    Core(#[from] memoria_core::CoreError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
