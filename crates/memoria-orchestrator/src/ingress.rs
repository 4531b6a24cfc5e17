//! Document ingress/deletion entry points: the boundary where an external
//! caller's request becomes a `PipelineState` plus stored source files plus
//! a queued message.

use std::collections::HashSet;
use std::sync::Arc;

use memoria_core::{
    canonicalize_index_name, DocumentId, FileRef, MemoryFilter, PipelineState, TagCollection,
};
use memoria_queue::{Message, Queue};
use memoria_store::{artifact_key, ArtifactStore, StateStore};
use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::stats::OrchestratorStats;

/// One uploaded source file, prior to being written to the Artifact Store.
pub struct UploadFile {
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A caller's upload request.
pub struct UploadRequest {
    pub index: String,
    pub document_id: Option<String>,
    pub tags: TagCollection,
    pub steps: Option<Vec<String>>,
    pub files: Vec<UploadFile>,
}

/// Owns the Store/Queue/Handler-Registry wiring needed to accept, delete,
/// and cancel documents. Shared across the HTTP layer and the worker loop.
#[derive(Clone)]
pub struct DocumentIngress {
    artifact_store: Arc<dyn ArtifactStore>,
    state_store: Arc<dyn StateStore>,
    queue: Arc<dyn Queue>,
    handlers: Arc<memoria_pipeline::HandlerRegistry>,
    default_index_name: String,
    known_indexes: Arc<RwLock<HashSet<String>>>,
    stats: Arc<OrchestratorStats>,
}

impl DocumentIngress {
    pub fn new(
        artifact_store: Arc<dyn ArtifactStore>,
        state_store: Arc<dyn StateStore>,
        queue: Arc<dyn Queue>,
        handlers: Arc<memoria_pipeline::HandlerRegistry>,
        default_index_name: impl Into<String>,
        stats: Arc<OrchestratorStats>,
    ) -> Self {
        Self {
            artifact_store,
            state_store,
            queue,
            handlers,
            default_index_name: default_index_name.into(),
            known_indexes: Arc::new(RwLock::new(HashSet::new())),
            stats,
        }
    }

    /// Accept a new document: validate, write source files, create and
    /// persist `PipelineState`, and enqueue the first step.
    #[instrument(skip(self, request), fields(index = %request.index))]
    pub async fn ingest(&self, request: UploadRequest) -> Result<DocumentId> {
        if request.files.is_empty() {
            return Err(OrchestratorError::NoFiles);
        }

        let index = canonicalize_index_name(&request.index, &self.default_index_name)?;
        let document_id = request
            .document_id
            .map(DocumentId::new)
            .unwrap_or_else(DocumentId::generate);

        if let Some(existing) = self.state_store.load(&index, document_id.as_str()).await? {
            if !existing.status.is_terminal() {
                return Err(OrchestratorError::AlreadyInFlight {
                    index,
                    document_id: document_id.to_string(),
                });
            }
        }

        let steps = request
            .steps
            .unwrap_or_else(|| {
                memoria_core::DEFAULT_STEP_SEQUENCE
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });
        self.handlers.validate_steps(&steps)?;

        let mut files = Vec::with_capacity(request.files.len());
        for (part, upload) in request.files.into_iter().enumerate() {
            let file_id = Uuid::new_v4().to_string();
            let ext = upload
                .original_name
                .rsplit('.')
                .next()
                .unwrap_or("bin")
                .to_string();
            let artifact_name = format!("source.{}.{}", part, ext);
            let key = artifact_key(&index, document_id.as_str(), &artifact_name);
            let size = upload.bytes.len() as u64;

            self.artifact_store.put(&key, upload.bytes).await?;
            files.push(FileRef::new(
                file_id,
                upload.original_name,
                key,
                upload.mime_type,
                size,
            ));
        }

        let state = PipelineState::new(index.clone(), document_id.clone(), request.tags, files, steps);
        self.state_store.save(&state).await?;
        self.queue
            .enqueue(Message::new(index.clone(), document_id.to_string()))
            .await?;

        {
            let mut known = self.known_indexes.write().await;
            known.insert(index.clone());
        }
        self.stats.record_ingested();

        info!(index = %index, document_id = %document_id, "document ingested");
        Ok(document_id)
    }

    /// Idempotent: deletes the state record, its artifacts, and any chunks
    /// tagged with this document id. An in-flight worker detects the
    /// missing record on its next `save` and aborts.
    #[instrument(skip(self, index_obj))]
    pub async fn delete_document(
        &self,
        index_obj: &dyn memoria_index::RetrievalIndex,
        index: &str,
        document_id: &str,
    ) -> Result<()> {
        let index = canonicalize_index_name(index, &self.default_index_name)?;
        self.state_store.delete(&index, document_id).await?;
        self.artifact_store
            .delete(&memoria_store::document_prefix(&index, document_id))
            .await?;
        index_obj
            .delete_by_filter(
                &MemoryFilter::new()
                    .with("__document_id", document_id)
                    .with("__index", index.clone()),
            )
            .await?;
        Ok(())
    }

    /// Removes every document, artifact, and chunk under `index`.
    #[instrument(skip(self, index_obj))]
    pub async fn delete_index(
        &self,
        index_obj: &dyn memoria_index::RetrievalIndex,
        index: &str,
    ) -> Result<()> {
        let index = canonicalize_index_name(index, &self.default_index_name)?;
        let documents = self.state_store.list(&index).await?;
        for document in documents {
            index_obj
                .delete_by_filter(
                    &MemoryFilter::new()
                        .with("__document_id", document.document_id.as_str())
                        .with("__index", index.clone()),
                )
                .await?;
            self.state_store
                .delete(&index, document.document_id.as_str())
                .await?;
        }
        index_obj
            .delete_by_filter(&MemoryFilter::new().with("__index", index.clone()))
            .await?;
        self.artifact_store
            .delete(&memoria_store::index_prefix(&index))
            .await?;

        let mut known = self.known_indexes.write().await;
        known.remove(&index);
        Ok(())
    }

    /// Marks a document cancelled. The next worker to pick up its message
    /// observes this at load time and acks without further work.
    #[instrument(skip(self))]
    pub async fn cancel(&self, index: &str, document_id: &str) -> Result<()> {
        let index = canonicalize_index_name(index, &self.default_index_name)?;
        let Some(mut state) = self.state_store.load(&index, document_id).await? else {
            return Err(OrchestratorError::DocumentNotFound {
                index,
                document_id: document_id.to_string(),
            });
        };

        if !state.status.is_terminal() {
            state.status = memoria_core::PipelineStatus::Cancelled;
            state.touch();
            self.state_store.save(&state).await?;
        }
        Ok(())
    }

    pub async fn list_indexes(&self) -> Vec<String> {
        self.known_indexes.read().await.iter().cloned().collect()
    }

    pub fn queue(&self) -> Arc<dyn Queue> {
        self.queue.clone()
    }

    pub fn state_store(&self) -> Arc<dyn StateStore> {
        self.state_store.clone()
    }

    pub fn artifact_store(&self) -> Arc<dyn ArtifactStore> {
        self.artifact_store.clone()
    }

    pub fn handlers(&self) -> Arc<memoria_pipeline::HandlerRegistry> {
        self.handlers.clone()
    }

    pub fn stats(&self) -> Arc<OrchestratorStats> {
        self.stats.clone()
    }
}
