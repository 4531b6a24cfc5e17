//! Wire types for the Memoria ingress API, mirroring `memoria-api`'s `dto`
//! module on the client side: the client keeps its own copy of the
//! server's request/response shapes rather than sharing a crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadMetadata {
    #[serde(default)]
    pub index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub document_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusProjection {
    pub index: String,
    pub document_id: String,
    pub status: String,
    pub steps_completed: Vec<String>,
    pub steps_remaining: Vec<String>,
    pub ready: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexesResponse {
    pub indexes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryFilter(pub HashMap<String, String>);

#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub index: String,
    pub query: String,
    #[serde(default)]
    pub filters: Vec<MemoryFilter>,
    #[serde(rename = "minRelevance", default)]
    pub min_relevance: f32,
    pub limit: i64,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            index: String::new(),
            query: String::new(),
            filters: Vec::new(),
            min_relevance: 0.0,
            limit: -1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub tags: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredChunk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskRequest {
    #[serde(default)]
    pub index: String,
    pub question: String,
    #[serde(default)]
    pub filters: Vec<MemoryFilter>,
    #[serde(rename = "minRelevance", default)]
    pub min_relevance: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub score: f32,
    pub excerpt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub documents_ingested: u64,
    pub steps_executed: u64,
    pub documents_failed: u64,
    pub documents_poisoned: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub name: String,
}
