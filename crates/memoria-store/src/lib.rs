//! Artifact storage and Pipeline State persistence.

pub mod artifact;
pub mod error;
pub mod state;

pub use artifact::{ArtifactStore, FilesystemArtifactStore, InMemoryArtifactStore};
pub use error::{Result, StoreError};
pub use state::{FilesystemStateStore, InMemoryStateStore, StateStore};

/// Build a hierarchical artifact key `<index>/<document_id>/<artifact_name>`.
pub fn artifact_key(index: &str, document_id: &str, artifact_name: &str) -> String {
    format!("{}/{}/{}", index, document_id, artifact_name)
}

/// Build the prefix under which every artifact for a document lives.
pub fn document_prefix(index: &str, document_id: &str) -> String {
    format!("{}/{}/", index, document_id)
}

/// Build the prefix under which every artifact for an index lives.
pub fn index_prefix(index: &str) -> String {
    format!("{}/", index)
}

/// The reserved artifact name under which the Pipeline State record itself
/// is stored when the artifact store doubles as the state store's backing.
pub const PIPELINE_STATE_ARTIFACT_NAME: &str = "pipeline.state";
