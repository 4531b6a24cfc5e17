//! Application state and initialization: builds the concrete backends
//! named by `AppConfig`, wires the orchestrator, and starts the worker
//! pool plus HTTP server.

use std::sync::Arc;

use anyhow::{Context, Result};
use memoria_core::config::{StorageBackend, StorageConfig};
use memoria_core::AppConfig;
use memoria_index::{InMemoryIndex, RetrievalIndex};
use memoria_orchestrator::{DocumentIngress, OrchestratorStats, StatusReporter, Worker};
use memoria_pipeline::{
    ChunkingConfig, EmbeddingProvider, ExtractorRegistry, HandlerContext, HandlerRegistry,
    HashEmbedder,
};
use memoria_queue::retry::{RetryConfig, RetryPolicy};
use memoria_queue::{InMemoryQueue, Queue};
use memoria_store::{
    ArtifactStore, FilesystemArtifactStore, FilesystemStateStore, InMemoryArtifactStore,
    InMemoryStateStore, StateStore,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::Args;
use crate::server::Server;

fn build_artifact_store(config: &StorageConfig) -> Arc<dyn ArtifactStore> {
    match config.backend {
        StorageBackend::Memory => Arc::new(InMemoryArtifactStore::new()),
        StorageBackend::Filesystem => {
            Arc::new(FilesystemArtifactStore::new(config.root_path.clone()))
        }
    }
}

fn build_state_store(config: &StorageConfig) -> Arc<dyn StateStore> {
    match config.backend {
        StorageBackend::Memory => Arc::new(InMemoryStateStore::new()),
        StorageBackend::Filesystem => {
            Arc::new(FilesystemStateStore::new(config.root_path.clone()))
        }
    }
}

/// Everything the worker pool and the HTTP router share.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub queue: Arc<dyn Queue>,
    pub state_store: Arc<dyn StateStore>,
    pub index: Arc<dyn RetrievalIndex>,
    pub handlers: Arc<HandlerRegistry>,
    pub handler_ctx: HandlerContext,
    pub retry_policy: RetryPolicy,
    pub stats: Arc<OrchestratorStats>,
    pub ingress: DocumentIngress,
    pub status_reporter: StatusReporter,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("initializing application components");

        let artifact_store = build_artifact_store(&config.storage);
        let state_store = build_state_store(&config.storage);
        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(
            config.queue.visibility_timeout(),
            config.queue.max_attempts,
        ));
        let index: Arc<dyn RetrievalIndex> = Arc::new(InMemoryIndex::new());
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::default());
        let stats = Arc::new(OrchestratorStats::new());

        let mut handlers = HandlerRegistry::new();
        memoria_pipeline::register_default_handlers(&mut handlers);
        let handlers = Arc::new(handlers);

        let ingress = DocumentIngress::new(
            artifact_store.clone(),
            state_store.clone(),
            queue.clone(),
            handlers.clone(),
            config.index.default_index_name.clone(),
            stats.clone(),
        );
        let status_reporter = StatusReporter::new(state_store.clone());

        let retry_policy = RetryPolicy::new(
            RetryConfig::new(config.queue.max_attempts)
                .with_initial_delay(config.queue.retry_base())
                .with_max_delay(config.queue.retry_cap())
                .with_jitter_factor(config.queue.retry_jitter_factor),
        );

        let handler_ctx = HandlerContext {
            artifact_store,
            index: index.clone(),
            extractors: Arc::new(ExtractorRegistry::with_defaults()),
            chunking_config: ChunkingConfig::default(),
            embedder: embedder.clone(),
            cancellation: CancellationToken::new(),
        };

        Ok(Self {
            config,
            queue,
            state_store,
            index,
            handlers,
            handler_ctx,
            retry_policy,
            stats,
            ingress,
            status_reporter,
            embedder,
        })
    }

    pub fn api_state(&self) -> memoria_api::AppState {
        memoria_api::AppState::new(
            self.ingress.clone(),
            self.status_reporter.clone(),
            self.index.clone(),
            self.embedder.clone(),
            Arc::new(memoria_api::TemplateSynthesizer),
            self.stats.clone(),
            self.config.index.default_index_name.clone(),
        )
    }
}

/// Top-level application: CLI args plus wired state.
pub struct App {
    args: Args,
    state: AppState,
}

impl App {
    pub async fn build(args: Args) -> Result<Self> {
        args.validate().context("invalid command line arguments")?;

        let config = AppConfig::load_from_env("MEMORIA")
            .context("failed to load application configuration")?;
        let state = AppState::new(config)?;

        Ok(Self { args, state })
    }

    /// Run the worker pool and HTTP server until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        info!("starting server");
        info!("HTTP port: {}", self.args.port);

        let cancellation = self.state.handler_ctx.cancellation.clone();
        let worker_count = self.args.workers.max(self.state.config.server.workers);
        let mut worker_handles = Vec::with_capacity(worker_count);

        for id in 0..worker_count {
            let worker = Worker::new(
                self.state.queue.clone(),
                self.state.state_store.clone(),
                self.state.index.clone(),
                self.state.handlers.clone(),
                self.state.handler_ctx.clone(),
                self.state.retry_policy.clone(),
                self.state.stats.clone(),
                cancellation.clone(),
            );
            info!(worker_id = id, "spawning orchestrator worker");
            worker_handles.push(tokio::spawn(async move { worker.run().await }));
        }

        let server = Server::new(self.args, self.state.api_state())?;
        let server_result = server.run(cancellation.clone()).await;

        cancellation.cancel();
        for handle in worker_handles {
            let _ = handle.await;
        }

        server_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_builds_from_default_config() {
        let config = AppConfig::load_from_env("MEMORIA_TEST_UNSET_PREFIX").unwrap();
        let state = AppState::new(config);
        assert!(state.is_ok());
    }
}
