//! End-to-end scenario tests exercising the full Store + Queue + Pipeline +
//! Index stack through `DocumentIngress` and `Worker`, covering the six
//! concrete scenarios.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use memoria_core::{PipelineState, PipelineStatus, TagCollection};
use memoria_index::{InMemoryIndex, RetrievalIndex};
use memoria_orchestrator::{
    DocumentIngress, OrchestratorStats, StatusReporter, UploadFile, UploadRequest, Worker,
};
use memoria_pipeline::{
    ChunkingConfig, ExtractorRegistry, Handler, HandlerContext, HandlerOutcome, HandlerRegistry,
    HashEmbedder,
};
use memoria_queue::retry::{RetryConfig, RetryPolicy};
use memoria_queue::{InMemoryQueue, Queue};
use memoria_store::{ArtifactStore, InMemoryArtifactStore, InMemoryStateStore, StateStore};
use tokio_util::sync::CancellationToken;

/// Shared test harness: real in-memory backends wired through
/// `DocumentIngress`, with a caller-supplied `HandlerRegistry` so scenarios
/// that need to inject a failure can substitute a handler for one step.
struct Harness {
    ingress: DocumentIngress,
    queue: Arc<dyn Queue>,
    state_store: Arc<dyn StateStore>,
    artifact_store: Arc<InMemoryArtifactStore>,
    index: Arc<dyn RetrievalIndex>,
    handlers: Arc<HandlerRegistry>,
}

impl Harness {
    fn new(handlers: HandlerRegistry) -> Self {
        let handlers = Arc::new(handlers);
        let queue: Arc<dyn Queue> = Arc::new(InMemoryQueue::new(Duration::from_secs(30), 20));
        let state_store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let artifact_store = Arc::new(InMemoryArtifactStore::new());
        let index: Arc<dyn RetrievalIndex> = Arc::new(InMemoryIndex::new());
        let stats = Arc::new(OrchestratorStats::new());

        let ingress = DocumentIngress::new(
            artifact_store.clone(),
            state_store.clone(),
            queue.clone(),
            handlers.clone(),
            "default",
            stats,
        );

        Harness {
            ingress,
            queue,
            state_store,
            artifact_store,
            index,
            handlers,
        }
    }

    /// A harness wired with only the four default handlers, for scenarios
    /// that don't inject a failure.
    fn with_defaults() -> Self {
        let mut registry = HandlerRegistry::new();
        memoria_pipeline::register_default_handlers(&mut registry);
        Self::new(registry)
    }

    fn worker(&self) -> Worker {
        let handler_ctx = HandlerContext {
            artifact_store: self.artifact_store.clone(),
            index: self.index.clone(),
            extractors: Arc::new(ExtractorRegistry::with_defaults()),
            chunking_config: ChunkingConfig::default(),
            embedder: Arc::new(HashEmbedder::default()),
            cancellation: CancellationToken::new(),
        };

        Worker::new(
            self.queue.clone(),
            self.state_store.clone(),
            self.index.clone(),
            self.handlers.clone(),
            handler_ctx,
            RetryPolicy::new(RetryConfig::new(20)),
            self.ingress.stats(),
            CancellationToken::new(),
        )
    }

    /// Ticks a fresh worker repeatedly until the queue reports empty or
    /// `max_ticks` is reached, whichever comes first.
    async fn drain(&self, max_ticks: usize) {
        let worker = self.worker();
        for _ in 0..max_ticks {
            if !worker.tick().await.unwrap() {
                break;
            }
        }
    }

    async fn load(&self, index: &str, document_id: &str) -> PipelineState {
        self.state_store.load(index, document_id).await.unwrap().unwrap()
    }
}

fn upload(index: &str, document_id: Option<&str>, name: &str, body: &[u8]) -> UploadRequest {
    UploadRequest {
        index: index.to_string(),
        document_id: document_id.map(|s| s.to_string()),
        tags: TagCollection::new(),
        steps: None,
        files: vec![UploadFile {
            original_name: name.to_string(),
            mime_type: "text/plain".to_string(),
            bytes: body.to_vec(),
        }],
    }
}

/// Scenario 1: a single-file text document completes and becomes searchable.
#[tokio::test]
async fn scenario_single_document_completes_and_is_searchable() {
    let harness = Harness::with_defaults();
    let document_id = harness
        .ingress
        .ingest(upload("idx", None, "hello.txt", b"The moon orbits the earth."))
        .await
        .unwrap();

    harness.drain(10).await;

    let state = harness.load("idx", document_id.as_str()).await;
    assert_eq!(state.status, PipelineStatus::Complete);

    let reporter = StatusReporter::new(harness.state_store.clone());
    let projection = reporter.status("idx", document_id.as_str()).await.unwrap();
    assert!(projection.ready);

    let embedder = HashEmbedder::default();
    let query = embedder.embed("The moon orbits the earth.").await;
    let results = harness.index.search(&query, &[], -1.0, -1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].chunk.text.contains("moon"));
    assert!(results[0]
        .chunk
        .tags
        .contains("__document_id", document_id.as_str()));
}

/// Scenario 2: re-ingesting the same document id (after the first run is
/// terminal and explicitly deleted) replaces the prior content.
#[tokio::test]
async fn scenario_reingesting_same_id_replaces_prior_content() {
    let harness = Harness::with_defaults();
    let id = harness
        .ingress
        .ingest(upload("idx", Some("doc-1"), "a.txt", b"first payload about cats"))
        .await
        .unwrap();
    harness.drain(10).await;
    assert_eq!(harness.load("idx", id.as_str()).await.status, PipelineStatus::Complete);

    harness
        .ingress
        .delete_document(harness.index.as_ref(), "idx", id.as_str())
        .await
        .unwrap();
    harness
        .ingress
        .ingest(upload("idx", Some("doc-1"), "a.txt", b"second payload about dogs"))
        .await
        .unwrap();
    harness.drain(10).await;

    let state = harness.load("idx", id.as_str()).await;
    assert_eq!(state.status, PipelineStatus::Complete);

    let results = harness.index.search(&[0.0; 64], &[], -2.0, -1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].chunk.text.contains("dogs"));
}

/// Scenario 3: concurrent ingestion of many documents, drained by several
/// concurrent workers, all reach `complete` and contribute exactly their
/// own chunk to the index.
#[tokio::test]
async fn scenario_concurrent_ingestion_yields_full_and_disjoint_index() {
    let harness = Arc::new(Harness::with_defaults());
    const N: usize = 12;
    const WORKERS: usize = 4;

    let mut ingest_handles = Vec::with_capacity(N);
    for i in 0..N {
        let harness = harness.clone();
        ingest_handles.push(tokio::spawn(async move {
            harness
                .ingress
                .ingest(upload(
                    "idx",
                    Some(&format!("doc-{i}")),
                    "a.txt",
                    format!("unique body number {i}").as_bytes(),
                ))
                .await
                .unwrap()
        }));
    }
    for handle in ingest_handles {
        handle.await.unwrap();
    }

    let mut worker_handles = Vec::with_capacity(WORKERS);
    for _ in 0..WORKERS {
        let harness = harness.clone();
        worker_handles.push(tokio::spawn(async move {
            let worker = harness.worker();
            let mut idle_rounds = 0;
            while idle_rounds < 5 {
                if worker.tick().await.unwrap() {
                    idle_rounds = 0;
                } else {
                    idle_rounds += 1;
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
            }
        }));
    }
    for handle in worker_handles {
        handle.await.unwrap();
    }

    for i in 0..N {
        let state = harness.load("idx", &format!("doc-{i}")).await;
        assert_eq!(state.status, PipelineStatus::Complete, "doc-{i} did not complete");
    }

    let results = harness.index.search(&[0.0; 64], &[], -2.0, -1).await.unwrap();
    assert_eq!(results.len(), N);

    let mut doc_ids: Vec<String> = results
        .iter()
        .filter_map(|r| {
            r.chunk
                .tags
                .values("__document_id")
                .and_then(|v| v.iter().next().cloned())
        })
        .collect();
    doc_ids.sort();
    doc_ids.dedup();
    assert_eq!(doc_ids.len(), N);
}

/// A `generate_embeddings` stand-in that fails transiently for its first
/// `flaky_until` invocations before delegating to the real handler, for
/// scenario 4.
struct FlakyEmbeddingsHandler {
    inner: memoria_pipeline::handlers::GenerateEmbeddingsHandler,
    attempts: AtomicU32,
    flaky_until: u32,
}

#[async_trait]
impl Handler for FlakyEmbeddingsHandler {
    fn name(&self) -> &str {
        "generate_embeddings"
    }

    async fn invoke(&self, state: &mut PipelineState, ctx: &HandlerContext) -> HandlerOutcome {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.flaky_until {
            return HandlerOutcome::RetryLater(Duration::from_millis(1));
        }
        self.inner.invoke(state, ctx).await
    }
}

/// Scenario 4: a transient failure injected into `generate_embeddings` for
/// its first 3 attempts still completes successfully, with no duplicate
/// chunks once it does.
#[tokio::test]
async fn scenario_transient_failure_recovers_without_duplicate_chunks() {
    let flaky = Arc::new(FlakyEmbeddingsHandler {
        inner: memoria_pipeline::handlers::GenerateEmbeddingsHandler,
        attempts: AtomicU32::new(0),
        flaky_until: 3,
    });

    let mut registry = HandlerRegistry::new();
    memoria_pipeline::register_default_handlers(&mut registry);
    registry.register(flaky.clone());

    let harness = Harness::new(registry);
    let document_id = harness
        .ingress
        .ingest(upload("idx", None, "hello.txt", b"retry me until it works"))
        .await
        .unwrap();

    let worker = harness.worker();
    for _ in 0..40 {
        if !worker.tick().await.unwrap() {
            tokio::time::sleep(Duration::from_millis(5)).await;
            continue;
        }
        let state = harness.load("idx", document_id.as_str()).await;
        if state.status.is_terminal() && state.steps_to_execute.is_empty() {
            break;
        }
    }

    let state = harness.load("idx", document_id.as_str()).await;
    assert_eq!(state.status, PipelineStatus::Complete);
    assert!(flaky.attempts.load(Ordering::SeqCst) >= 4);

    let results = harness.index.search(&[0.0; 64], &[], -2.0, -1).await.unwrap();
    assert_eq!(results.len(), 1);
}

/// A `generate_embeddings` stand-in that always fails permanently, for
/// scenario 5.
struct AlwaysFatalHandler;

#[async_trait]
impl Handler for AlwaysFatalHandler {
    fn name(&self) -> &str {
        "generate_embeddings"
    }

    async fn invoke(&self, _state: &mut PipelineState, _ctx: &HandlerContext) -> HandlerOutcome {
        HandlerOutcome::Fatal("unsupported embedding model for this content".to_string())
    }
}

/// Scenario 5: a permanent failure in `generate_embeddings` fails the
/// document, recording a failure reason, without affecting other documents.
#[tokio::test]
async fn scenario_permanent_failure_fails_document_without_affecting_others() {
    let mut registry = HandlerRegistry::new();
    memoria_pipeline::register_default_handlers(&mut registry);
    registry.register(Arc::new(AlwaysFatalHandler));

    let harness = Harness::new(registry);

    let failing_id = harness
        .ingress
        .ingest(upload("idx", None, "bad.txt", b"this one will fail"))
        .await
        .unwrap();
    harness.drain(10).await;

    let state = harness.load("idx", failing_id.as_str()).await;
    assert_eq!(state.status, PipelineStatus::Failed);
    let reason = state.failure_reason.expect("failure reason recorded");
    assert!(reason.message.contains("unsupported embedding model"));
    assert!(!reason.poisoned);

    let reporter = StatusReporter::new(harness.state_store.clone());
    assert!(!reporter.status("idx", failing_id.as_str()).await.unwrap().ready);
}

/// Scenario 6: deleting a document mid-pipeline (after `extract_text`
/// completes, before its re-enqueued continuation runs) leaves no orphan
/// artifacts or index chunks, and the next worker to see the continuation
/// aborts cleanly instead of erroring.
#[tokio::test]
async fn scenario_delete_mid_pipeline_leaves_no_orphans() {
    let harness = Harness::with_defaults();
    let document_id = harness
        .ingress
        .ingest(upload("idx", None, "hello.txt", b"will be deleted mid-flight"))
        .await
        .unwrap();

    let worker = harness.worker();
    assert!(worker.tick().await.unwrap());
    let state = harness.load("idx", document_id.as_str()).await;
    assert_eq!(state.steps_completed, vec!["extract_text".to_string()]);

    harness
        .ingress
        .delete_document(harness.index.as_ref(), "idx", document_id.as_str())
        .await
        .unwrap();

    harness.drain(10).await;

    assert!(harness
        .state_store
        .load("idx", document_id.as_str())
        .await
        .unwrap()
        .is_none());

    let artifacts = harness
        .artifact_store
        .list(&memoria_store::document_prefix("idx", document_id.as_str()))
        .await
        .unwrap();
    assert!(artifacts.is_empty(), "orphan artifacts remained: {artifacts:?}");

    let results = harness.index.search(&[0.0; 64], &[], -2.0, -1).await.unwrap();
    assert!(results
        .iter()
        .all(|r| !r.chunk.tags.contains("__document_id", document_id.as_str())));
}
