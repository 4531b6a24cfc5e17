use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use memoria_core::PipelineState;
use memoria_index::RetrievalIndex;
use memoria_store::ArtifactStore;
use tokio_util::sync::CancellationToken;

use crate::chunking::ChunkingConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::{PipelineError, Result};
use crate::extractors::ExtractorRegistry;

/// What a handler's invocation decided.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// The step is done; the orchestrator should pop it into
    /// `steps_completed` and move on.
    Advance,
    /// A transient condition prevented progress; retry after `delay`.
    RetryLater(Duration),
    /// The input cannot be processed by this step; the document fails.
    Fatal(String),
}

/// Backends and cross-cutting concerns threaded into every handler
/// invocation.
#[derive(Clone)]
pub struct HandlerContext {
    pub artifact_store: Arc<dyn ArtifactStore>,
    pub index: Arc<dyn RetrievalIndex>,
    pub extractors: Arc<ExtractorRegistry>,
    pub chunking_config: ChunkingConfig,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub cancellation: CancellationToken,
}

/// A single named stage in the ingestion pipeline.
/// Implementations must be idempotent: re-invoking with the same state
/// after a crash must either detect prior work via stable artifact keys
/// and return `Advance` quickly, or safely overwrite.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;
    async fn invoke(&self, state: &mut PipelineState, ctx: &HandlerContext) -> HandlerOutcome;
}

/// Process-wide, immutable-after-startup mapping from step name to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, step: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(step).cloned()
    }

    /// Fail fast if any requested step has no registered handler.
    pub fn validate_steps(&self, steps: &[String]) -> Result<()> {
        for step in steps {
            if !self.handlers.contains_key(step) {
                return Err(PipelineError::UnknownStep(step.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        fn name(&self) -> &str {
            "noop"
        }

        async fn invoke(&self, _state: &mut PipelineState, _ctx: &HandlerContext) -> HandlerOutcome {
            HandlerOutcome::Advance
        }
    }

    #[test]
    fn test_registry_get_and_validate() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(NoopHandler));

        assert!(registry.get("noop").is_some());
        assert!(registry.validate_steps(&["noop".to_string()]).is_ok());
    }

    #[test]
    fn test_registry_fails_fast_on_unknown_step() {
        let registry = HandlerRegistry::new();
        let err = registry
            .validate_steps(&["nonexistent".to_string()])
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownStep(_)));
    }
}
