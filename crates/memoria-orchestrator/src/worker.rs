//! The orchestrator worker loop: dequeue, load, dispatch
//! to the Handler Registry, interpret the outcome, persist, ack/nack.
//! A strictly linear per-document step sequence: no DAG, no parallel-step
//! fan-out.

use std::sync::Arc;
use std::time::Duration;

use memoria_core::{FailureReason, PipelineState, PipelineStatus};
use memoria_index::RetrievalIndex;
use memoria_pipeline::{HandlerContext, HandlerOutcome, HandlerRegistry};
use memoria_queue::{Message, NackOutcome, Queue};
use memoria_queue::retry::RetryPolicy;
use memoria_store::StateStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::stats::OrchestratorStats;

/// How long a worker sleeps after finding the queue empty, before polling
/// again.
const EMPTY_QUEUE_BACKOFF: Duration = Duration::from_millis(200);

/// One pass of the worker loop's body, run repeatedly by `Worker::run`.
/// Exposed standalone so tests can drive a single iteration deterministically.
pub struct Worker {
    queue: Arc<dyn Queue>,
    state_store: Arc<dyn StateStore>,
    #[allow(dead_code)]
    index: Arc<dyn RetrievalIndex>,
    handlers: Arc<HandlerRegistry>,
    handler_ctx: HandlerContext,
    retry_policy: RetryPolicy,
    stats: Arc<OrchestratorStats>,
    cancellation: CancellationToken,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn Queue>,
        state_store: Arc<dyn StateStore>,
        index: Arc<dyn RetrievalIndex>,
        handlers: Arc<HandlerRegistry>,
        handler_ctx: HandlerContext,
        retry_policy: RetryPolicy,
        stats: Arc<OrchestratorStats>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            queue,
            state_store,
            index,
            handlers,
            handler_ctx,
            retry_policy,
            stats,
            cancellation,
        }
    }

    /// Runs until `cancellation` fires, draining by finishing the in-flight
    /// handler invocation before returning.
    pub async fn run(&self) {
        loop {
            if self.cancellation.is_cancelled() {
                info!("worker draining and shutting down");
                return;
            }

            match self.tick().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await,
                Err(e) => {
                    error!(error = %e, "worker tick failed, backing off");
                    tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await;
                }
            }
        }
    }

    /// Processes at most one message. Returns `Ok(false)` when the queue was
    /// empty, `Ok(true)` otherwise.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<bool> {
        let Some((message, lease)) = self.queue.dequeue().await? else {
            return Ok(false);
        };

        let Some(mut state) = self
            .state_store
            .load(&message.index, &message.document_id)
            .await?
        else {
            debug!(document_id = %message.document_id, "state missing, acking (deleted mid-flight)");
            self.queue.ack(&lease).await?;
            return Ok(true);
        };

        if state.status.is_terminal() || state.steps_to_execute.is_empty() {
            debug!(document_id = %message.document_id, status = %state.status, "already terminal, acking");
            self.queue.ack(&lease).await?;
            return Ok(true);
        }

        state.status = PipelineStatus::Processing;
        state.touch();
        if self.state_store.save(&state).await.is_err() {
            // Infrastructure errors release the lease without counting an
            // attempt: the document itself is not at fault.
            let _ = self.queue.release(&lease).await;
            return Ok(true);
        }

        let Some(step_name) = state.steps_to_execute.first().cloned() else {
            self.queue.ack(&lease).await?;
            return Ok(true);
        };

        let outcome = self.invoke_step(&step_name, &mut state).await;
        self.apply_outcome(message, lease, step_name, state, outcome)
            .await
    }

    async fn invoke_step(&self, step_name: &str, state: &mut PipelineState) -> HandlerOutcome {
        if self.handler_ctx.cancellation.is_cancelled() {
            return HandlerOutcome::RetryLater(Duration::ZERO);
        }

        let Some(handler) = self.handlers.get(step_name) else {
            return HandlerOutcome::Fatal(format!("no handler registered for step {}", step_name));
        };

        handler.invoke(state, &self.handler_ctx).await
    }

    async fn apply_outcome(
        &self,
        message: Message,
        lease: memoria_queue::LeaseToken,
        step_name: String,
        mut state: PipelineState,
        outcome: HandlerOutcome,
    ) -> Result<bool> {
        match outcome {
            HandlerOutcome::Advance => {
                state.steps_to_execute.retain(|s| s != &step_name);
                state.steps_completed.push(step_name);
                state.touch();

                if state.steps_to_execute.is_empty() {
                    state.status = PipelineStatus::Complete;
                    self.state_store.save(&state).await?;
                    self.queue.ack(&lease).await?;
                } else {
                    self.state_store.save(&state).await?;
                    self.queue
                        .enqueue(Message::new(message.index, message.document_id))
                        .await?;
                    self.queue.ack(&lease).await?;
                }
                self.stats.record_step_executed();
            }
            HandlerOutcome::RetryLater(delay) => {
                self.state_store.save(&state).await?;
                let delay = if delay.is_zero() {
                    self.retry_policy
                        .delay_for_attempt(message.attempt_count + 1)
                } else {
                    delay
                };

                match self.queue.nack(&lease, delay).await? {
                    NackOutcome::Requeued => {}
                    NackOutcome::Poisoned => {
                        state.status = PipelineStatus::Failed;
                        state.failure_reason = Some(FailureReason::poisoned(
                            Some(step_name),
                            "max retry attempts exceeded",
                        ));
                        state.touch();
                        self.state_store.save(&state).await?;
                        self.stats.record_poisoned();
                        warn!(document_id = %message.document_id, "document poisoned after exceeding max attempts");
                    }
                }
            }
            HandlerOutcome::Fatal(reason) => {
                state.status = PipelineStatus::Failed;
                state.failure_reason = Some(FailureReason::new(Some(step_name), reason));
                state.touch();
                self.state_store.save(&state).await?;
                self.queue.ack(&lease).await?;
                self.stats.record_failed();
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::{DocumentId, FileRef, TagCollection};
    use memoria_index::InMemoryIndex;
    use memoria_pipeline::{ChunkingConfig, ExtractorRegistry, HashEmbedder};
    use memoria_queue::{InMemoryQueue, RetryConfig};
    use memoria_store::{artifact_key, InMemoryArtifactStore, InMemoryStateStore};

    fn test_worker(
        queue: Arc<dyn Queue>,
        state_store: Arc<dyn StateStore>,
        artifact_store: Arc<dyn ArtifactStoreAlias>,
        index: Arc<dyn RetrievalIndex>,
        handlers: Arc<HandlerRegistry>,
    ) -> Worker {
        let handler_ctx = HandlerContext {
            artifact_store,
            index: index.clone(),
            extractors: Arc::new(ExtractorRegistry::with_defaults()),
            chunking_config: ChunkingConfig::default(),
            embedder: Arc::new(HashEmbedder::default()),
            cancellation: CancellationToken::new(),
        };

        Worker::new(
            queue,
            state_store,
            index,
            handlers,
            handler_ctx,
            RetryPolicy::new(RetryConfig::new(20)),
            Arc::new(OrchestratorStats::new()),
            CancellationToken::new(),
        )
    }

    // Alias purely to keep the helper signature legible.
    use memoria_store::ArtifactStore as ArtifactStoreAlias;

    async fn seed(
        artifact_store: &dyn ArtifactStoreAlias,
        state_store: &dyn StateStore,
        queue: &dyn Queue,
        steps: Vec<String>,
    ) -> DocumentId {
        let document_id = DocumentId::new("doc-1");
        let key = artifact_key("idx", document_id.as_str(), "source.0.txt");
        artifact_store.put(&key, b"hello world".to_vec()).await.unwrap();

        let state = PipelineState::new(
            "idx",
            document_id.clone(),
            TagCollection::new(),
            vec![FileRef::new("f1", "a.txt", key, "text/plain", 11)],
            steps,
        );
        state_store.save(&state).await.unwrap();
        queue.enqueue(Message::new("idx", document_id.to_string())).await.unwrap();
        document_id
    }

    #[tokio::test]
    async fn test_tick_on_empty_queue_returns_false() {
        let worker = test_worker(
            Arc::new(InMemoryQueue::new(Duration::from_secs(30), 20)),
            Arc::new(InMemoryStateStore::new()),
            Arc::new(InMemoryArtifactStore::new()),
            Arc::new(InMemoryIndex::new()),
            Arc::new(HandlerRegistry::new()),
        );

        assert!(!worker.tick().await.unwrap());
    }

    #[tokio::test]
    async fn test_tick_advances_through_full_step_sequence() {
        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30), 20));
        let state_store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let artifact_store: Arc<dyn ArtifactStoreAlias> = Arc::new(InMemoryArtifactStore::new());
        let index: Arc<dyn RetrievalIndex> = Arc::new(InMemoryIndex::new());

        let mut registry = HandlerRegistry::new();
        memoria_pipeline::register_default_handlers(&mut registry);
        let registry = Arc::new(registry);

        let steps: Vec<String> = memoria_core::DEFAULT_STEP_SEQUENCE
            .iter()
            .map(|s| s.to_string())
            .collect();
        seed(&*artifact_store, &*state_store, &*queue, steps).await;

        let worker = test_worker(
            queue.clone(),
            state_store.clone(),
            artifact_store,
            index,
            registry,
        );

        for _ in 0..memoria_core::DEFAULT_STEP_SEQUENCE.len() {
            assert!(worker.tick().await.unwrap());
        }

        let state = state_store.load("idx", "doc-1").await.unwrap().unwrap();
        assert_eq!(state.status, PipelineStatus::Complete);
        assert!(state.steps_to_execute.is_empty());
        assert_eq!(state.steps_completed.len(), memoria_core::DEFAULT_STEP_SEQUENCE.len());
    }

    #[tokio::test]
    async fn test_tick_acks_and_skips_terminal_state() {
        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30), 20));
        let state_store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let artifact_store: Arc<dyn ArtifactStoreAlias> = Arc::new(InMemoryArtifactStore::new());

        let document_id = seed(&*artifact_store, &*state_store, &*queue, vec!["extract_text".to_string()]).await;
        let mut state = state_store.load("idx", document_id.as_str()).await.unwrap().unwrap();
        state.status = PipelineStatus::Cancelled;
        state_store.save(&state).await.unwrap();

        let worker = test_worker(
            queue.clone(),
            state_store,
            artifact_store,
            Arc::new(InMemoryIndex::new()),
            Arc::new(HandlerRegistry::new()),
        );

        assert!(worker.tick().await.unwrap());
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tick_acks_when_state_missing() {
        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30), 20));
        queue.enqueue(Message::new("idx", "ghost")).await.unwrap();

        let worker = test_worker(
            queue.clone(),
            Arc::new(InMemoryStateStore::new()),
            Arc::new(InMemoryArtifactStore::new()),
            Arc::new(InMemoryIndex::new()),
            Arc::new(HandlerRegistry::new()),
        );

        assert!(worker.tick().await.unwrap());
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tick_fatal_on_unregistered_step_fails_document() {
        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30), 20));
        let state_store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let artifact_store: Arc<dyn ArtifactStoreAlias> = Arc::new(InMemoryArtifactStore::new());

        seed(&*artifact_store, &*state_store, &*queue, vec!["nonexistent_step".to_string()]).await;

        let worker = test_worker(
            queue.clone(),
            state_store.clone(),
            artifact_store,
            Arc::new(InMemoryIndex::new()),
            Arc::new(HandlerRegistry::new()),
        );

        assert!(worker.tick().await.unwrap());
        let state = state_store.load("idx", "doc-1").await.unwrap().unwrap();
        assert_eq!(state.status, PipelineStatus::Failed);
        assert!(state.failure_reason.is_some());
    }
}
