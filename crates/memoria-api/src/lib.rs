//! HTTP ingress: request/response types, handlers, and router assembly over
//! the orchestrator/index/pipeline crates.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
pub mod synthesis;

pub use error::{ApiError, Result};
pub use router::create_router;
pub use state::AppState;
pub use synthesis::{AnswerSynthesizer, Answer, Citation, TemplateSynthesizer};
