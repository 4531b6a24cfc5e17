use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("document not found: {index}/{document_id}")]
    DocumentNotFound { index: String, document_id: String },

    #[error("document {index}/{document_id} is already being ingested")]
    AlreadyInFlight { index: String, document_id: String },

    #[error("document has no files to ingest")]
    NoFiles,

    #[error("queue error: {0}")]
    Queue(#[from] memoria_queue::QueueError),

    #[error("store error: {0}")]
    Store(#[from] memoria_store::StoreError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] memoria_pipeline::PipelineError),

    #[error("index error: {0}")]
    Index(#[from] memoria_index::IndexError),

    #[error("core error: {0}")]
    Core(#[from] memoria_core::CoreError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
