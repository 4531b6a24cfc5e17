//! Read-only projection of `PipelineState` for external callers.

use chrono::{DateTime, Utc};
use memoria_core::FailureReason;
use memoria_store::StateStore;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{OrchestratorError, Result};

/// What `GET /upload-status` returns.
#[derive(Debug, Clone, Serialize)]
pub struct StatusProjection {
    pub index: String,
    pub document_id: String,
    pub status: String,
    pub steps_completed: Vec<String>,
    pub steps_remaining: Vec<String>,
    pub creation_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    pub failure_reason: Option<FailureReason>,
    /// True iff `status == complete` and every step of the original plan
    /// appears in `steps_completed`. False while processing or on failure.
    pub ready: bool,
}

/// Read-only view over the Pipeline State Store.
#[derive(Clone)]
pub struct StatusReporter {
    state_store: Arc<dyn StateStore>,
}

impl StatusReporter {
    pub fn new(state_store: Arc<dyn StateStore>) -> Self {
        Self { state_store }
    }

    pub async fn status(&self, index: &str, document_id: &str) -> Result<StatusProjection> {
        let state = self
            .state_store
            .load(index, document_id)
            .await?
            .ok_or_else(|| OrchestratorError::DocumentNotFound {
                index: index.to_string(),
                document_id: document_id.to_string(),
            })?;

        Ok(StatusProjection {
            index: state.index.clone(),
            document_id: state.document_id.to_string(),
            status: state.status.to_string(),
            steps_completed: state.steps_completed.clone(),
            steps_remaining: state.steps_to_execute.clone(),
            creation_time: state.creation_time,
            last_update_time: state.last_update_time,
            failure_reason: state.failure_reason.clone(),
            ready: state.is_ready(),
        })
    }

    pub async fn dead_letters(&self, queue: &dyn memoria_queue::Queue, index: &str) -> Result<Vec<memoria_queue::Message>> {
        Ok(queue.dead_letters(index).await?)
    }
}
