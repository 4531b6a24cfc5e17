//! Ties the Store, Queue, Pipeline, and Retrieval Index crates together: the
//! worker loop, document ingress/deletion/cancellation, and a read-only
//! status projection.

pub mod error;
pub mod ingress;
pub mod stats;
pub mod status;
pub mod worker;

pub use error::{OrchestratorError, Result};
pub use ingress::{DocumentIngress, UploadFile, UploadRequest};
pub use stats::{OrchestratorStats, StatsSnapshot};
pub use status::{StatusProjection, StatusReporter};
pub use worker::Worker;
