//! Request/response bodies for the ingress HTTP surface.

use memoria_core::MemoryFilter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The JSON metadata part of a `POST /api/v1/upload` multipart body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadMetadata {
    #[serde(default)]
    pub index: String,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub steps: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub document_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusQuery {
    pub index: String,
    #[serde(rename = "documentId")]
    pub document_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentQuery {
    pub index: String,
    #[serde(rename = "documentId")]
    pub document_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexQuery {
    pub index: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexesResponse {
    pub indexes: Vec<String>,
}

/// `POST /api/v1/search` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub index: String,
    pub query: String,
    #[serde(default)]
    pub filters: Vec<MemoryFilter>,
    #[serde(default, rename = "minRelevance")]
    pub min_relevance: f32,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    -1
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunkResponse {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub tags: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredChunkResponse>,
}

/// `POST /api/v1/ask` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub index: String,
    pub question: String,
    #[serde(default)]
    pub filters: Vec<MemoryFilter>,
    #[serde(default, rename = "minRelevance")]
    pub min_relevance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CitationResponse {
    pub chunk_id: String,
    pub score: f32,
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub citations: Vec<CitationResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub documents_ingested: u64,
    pub steps_executed: u64,
    pub documents_failed: u64,
    pub documents_poisoned: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub name: String,
}
