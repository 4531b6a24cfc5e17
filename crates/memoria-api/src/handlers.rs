//! Axum handlers for the `/api/v1/*` ingress surface plus the unprefixed
//! `/health` and `/version` routes.

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use memoria_core::TagCollection;
use memoria_orchestrator::UploadFile;
use tracing::instrument;

use crate::dto::{
    AskRequest, AskResponse, CitationResponse, DocumentQuery, HealthResponse, IndexQuery,
    IndexesResponse, ScoredChunkResponse, SearchRequest, SearchResponse, StatusQuery,
    UploadMetadata, UploadResponse, VersionResponse,
};
use crate::error::{ApiError, Result};
use crate::state::AppState;

/// `POST /api/v1/upload`: a multipart body with one or more file parts and a
/// single `metadata` part carrying the JSON envelope from [`UploadMetadata`].
#[instrument(skip(state, multipart))]
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut metadata: Option<UploadMetadata> = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();

        if name == "metadata" {
            let bytes = field.bytes().await?;
            metadata = Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| ApiError::Validation(format!("invalid metadata: {e}")))?,
            );
            continue;
        }

        let original_name = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| name.clone());
        let mime_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = field.bytes().await?;

        files.push(UploadFile {
            original_name,
            mime_type,
            bytes: bytes.to_vec(),
        });
    }

    let metadata = metadata.unwrap_or_default();
    if files.is_empty() {
        return Err(ApiError::Validation("no files in upload".to_string()));
    }

    let tags = TagCollection::from_map(metadata.tags)?;
    let request = memoria_orchestrator::UploadRequest {
        index: metadata.index,
        document_id: metadata.document_id,
        tags,
        steps: metadata.steps,
        files,
    };

    let document_id = state.ingress.ingest(request).await?;
    Ok(Json(UploadResponse {
        document_id: document_id.to_string(),
    }))
}

/// `GET /api/v1/upload-status?index=...&documentId=...`
#[instrument(skip(state))]
pub async fn upload_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<memoria_orchestrator::StatusProjection>> {
    let projection = state
        .status_reporter
        .status(&query.index, &query.document_id)
        .await?;
    Ok(Json(projection))
}

/// `DELETE /api/v1/documents?index=...&documentId=...`
#[instrument(skip(state))]
pub async fn delete_document(
    State(state): State<AppState>,
    Query(query): Query<DocumentQuery>,
) -> Result<StatusCode> {
    state
        .ingress
        .delete_document(state.index.as_ref(), &query.index, &query.document_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/indexes`
#[instrument(skip(state))]
pub async fn list_indexes(State(state): State<AppState>) -> Json<IndexesResponse> {
    Json(IndexesResponse {
        indexes: state.ingress.list_indexes().await,
    })
}

/// `DELETE /api/v1/indexes?index=...`
#[instrument(skip(state))]
pub async fn delete_index(
    State(state): State<AppState>,
    Query(query): Query<IndexQuery>,
) -> Result<StatusCode> {
    state
        .ingress
        .delete_index(state.index.as_ref(), &query.index)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/search`
#[instrument(skip(state, request), fields(index = %request.index))]
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    if request.query.trim().is_empty() {
        return Ok(Json(SearchResponse { results: Vec::new() }));
    }

    let index = memoria_core::canonicalize_index_name(&request.index, &state.default_index_name)?;
    let embedding = state.embedder.embed(&request.query).await;
    let filters = memoria_core::scope_filters_to_index(&request.filters, &index);

    let results = state
        .index
        .search(&embedding, &filters, request.min_relevance, request.limit)
        .await?;

    Ok(Json(SearchResponse {
        results: results.into_iter().map(to_scored_response).collect(),
    }))
}

/// `POST /api/v1/ask`
#[instrument(skip(state, request), fields(index = %request.index))]
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>> {
    if request.question.trim().is_empty() {
        let answer = state.synthesizer.synthesize(&request.question, &[]).await;
        return Ok(Json(AskResponse {
            answer: answer.text,
            citations: Vec::new(),
        }));
    }

    let index = memoria_core::canonicalize_index_name(&request.index, &state.default_index_name)?;
    let embedding = state.embedder.embed(&request.question).await;
    let filters = memoria_core::scope_filters_to_index(&request.filters, &index);

    let chunks = state
        .index
        .search(&embedding, &filters, request.min_relevance, -1)
        .await?;

    let answer = state.synthesizer.synthesize(&request.question, &chunks).await;
    Ok(Json(AskResponse {
        answer: answer.text,
        citations: answer
            .citations
            .into_iter()
            .map(|c| CitationResponse {
                chunk_id: c.chunk_id,
                score: c.score,
                excerpt: c.excerpt,
            })
            .collect(),
    }))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.stats.snapshot();
    Json(HealthResponse {
        status: "ok".to_string(),
        documents_ingested: snapshot.documents_ingested,
        steps_executed: snapshot.steps_executed,
        documents_failed: snapshot.documents_failed,
        documents_poisoned: snapshot.documents_poisoned,
    })
}

/// `GET /version`
pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: "memoria".to_string(),
    })
}

fn to_scored_response(scored: memoria_index::ScoredChunk) -> ScoredChunkResponse {
    let mut tags = std::collections::HashMap::new();
    for (key, values) in scored.chunk.tags.entries() {
        tags.insert(key.clone(), values.iter().cloned().collect());
    }

    ScoredChunkResponse {
        id: scored.chunk.id,
        text: scored.chunk.text,
        score: scored.score,
        tags,
    }
}
