//! Shared application state threaded into every HTTP handler.

use std::sync::Arc;

use memoria_index::RetrievalIndex;
use memoria_orchestrator::{DocumentIngress, OrchestratorStats, StatusReporter};
use memoria_pipeline::EmbeddingProvider;

use crate::synthesis::AnswerSynthesizer;

#[derive(Clone)]
pub struct AppState {
    pub ingress: DocumentIngress,
    pub status_reporter: StatusReporter,
    pub index: Arc<dyn RetrievalIndex>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub synthesizer: Arc<dyn AnswerSynthesizer>,
    pub stats: Arc<OrchestratorStats>,
    pub default_index_name: String,
}

impl AppState {
    pub fn new(
        ingress: DocumentIngress,
        status_reporter: StatusReporter,
        index: Arc<dyn RetrievalIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        synthesizer: Arc<dyn AnswerSynthesizer>,
        stats: Arc<OrchestratorStats>,
        default_index_name: impl Into<String>,
    ) -> Self {
        Self {
            ingress,
            status_reporter,
            index,
            embedder,
            synthesizer,
            stats,
            default_index_name: default_index_name.into(),
        }
    }
}
