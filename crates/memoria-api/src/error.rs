use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("document not found")]
    NotFound,

    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] memoria_orchestrator::OrchestratorError),

    #[error("index error: {0}")]
    Index(#[from] memoria_index::IndexError),

    #[error("core error: {0}")]
    Core(#[from] memoria_core::CoreError),

    #[error("multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Orchestrator(memoria_orchestrator::OrchestratorError::DocumentNotFound {
                ..
            }) => StatusCode::NOT_FOUND,
            ApiError::Orchestrator(memoria_orchestrator::OrchestratorError::AlreadyInFlight {
                ..
            }) => StatusCode::CONFLICT,
            ApiError::Orchestrator(memoria_orchestrator::OrchestratorError::NoFiles) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Orchestrator(memoria_orchestrator::OrchestratorError::Core(_)) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
