use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use memoria_core::PipelineState;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::{Result, StoreError};

/// Persistent mapping `(index, document_id) -> Pipeline State`
///. `save` is atomic per key; concurrent `save` races
/// for the same key are tolerated as last-writer-wins because the Queue
/// guarantees a single in-flight worker per document.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, index: &str, document_id: &str) -> Result<Option<PipelineState>>;
    async fn save(&self, state: &PipelineState) -> Result<()>;
    async fn delete(&self, index: &str, document_id: &str) -> Result<()>;
    async fn list(&self, index: &str) -> Result<Vec<PipelineState>>;
}

fn state_key(index: &str, document_id: &str) -> String {
    format!("{}\u{0}{}", index, document_id)
}

/// In-memory state store, backed by a `RwLock`-guarded map.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    states: Arc<RwLock<HashMap<String, PipelineState>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, index: &str, document_id: &str) -> Result<Option<PipelineState>> {
        let states = self.states.read().await;
        Ok(states.get(&state_key(index, document_id)).cloned())
    }

    #[instrument(skip(self, state))]
    async fn save(&self, state: &PipelineState) -> Result<()> {
        let mut states = self.states.write().await;
        states.insert(
            state_key(&state.index, state.document_id.as_str()),
            state.clone(),
        );
        Ok(())
    }

    async fn delete(&self, index: &str, document_id: &str) -> Result<()> {
        let mut states = self.states.write().await;
        states.remove(&state_key(index, document_id));
        Ok(())
    }

    async fn list(&self, index: &str) -> Result<Vec<PipelineState>> {
        let states = self.states.read().await;
        Ok(states
            .values()
            .filter(|s| s.index == index)
            .cloned()
            .collect())
    }
}

/// Filesystem-backed state store. Each document's state is one JSON file
/// under `root/<index>/<document_id>.json`, written via temp-then-rename.
#[derive(Clone)]
pub struct FilesystemStateStore {
    root: PathBuf,
}

impl FilesystemStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, index: &str, document_id: &str) -> PathBuf {
        self.root.join(index).join(format!("{}.json", document_id))
    }
}

#[async_trait]
impl StateStore for FilesystemStateStore {
    async fn load(&self, index: &str, document_id: &str) -> Result<Option<PipelineState>> {
        let path = self.path_for(index, document_id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(PipelineState::from_json(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    #[instrument(skip(self, state))]
    async fn save(&self, state: &PipelineState) -> Result<()> {
        let path = self.path_for(&state.index, state.document_id.as_str());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        let bytes = state.to_json()?;
        fs::write(&tmp_path, &bytes).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn delete(&self, index: &str, document_id: &str) -> Result<()> {
        let path = self.path_for(index, document_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn list(&self, index: &str) -> Result<Vec<PipelineState>> {
        let dir = self.root.join(index);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                let bytes = fs::read(&path).await?;
                out.push(PipelineState::from_json(&bytes)?);
            }
        }
        Ok(out)
    }
}
