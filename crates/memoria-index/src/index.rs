use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use memoria_core::{matches_any, MemoryFilter, TagCollection};
use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::Result;

/// The unit of retrieval: a small text fragment with an embedding vector and
/// tags. The automatic tags `__document_id`, `__file_id`, `__file_part`
/// are ordinary entries in `tags`, not distinct fields, so they participate
/// in filtering the same way caller-supplied tags do.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic identifier so re-upserting the same logical chunk
    /// overwrites rather than duplicates.
    pub id: String,
    pub text: String,
    pub tags: TagCollection,
    pub vector: Vec<f32>,
}

/// A chunk annotated with its cosine similarity score against a query vector.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Capability set: `upsert`, `delete_by_filter`, `search`
///. `search` orders by cosine similarity descending,
/// applies `min_score` as a lower bound, and returns at most `limit`
/// (`limit == 0` yields nothing, `limit < 0` is unbounded).
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    async fn upsert(&self, chunks: Vec<Chunk>) -> Result<()>;
    async fn delete_by_filter(&self, filter: &MemoryFilter) -> Result<()>;
    async fn search(
        &self,
        embedding: &[f32],
        filters: &[MemoryFilter],
        min_score: f32,
        limit: i64,
    ) -> Result<Vec<ScoredChunk>>;
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// In-memory cosine-similarity index, the sole implementation shipped in
/// this revision.
#[derive(Clone, Default)]
pub struct InMemoryIndex {
    chunks: Arc<RwLock<HashMap<String, Chunk>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetrievalIndex for InMemoryIndex {
    #[instrument(skip(self, chunks))]
    async fn upsert(&self, chunks: Vec<Chunk>) -> Result<()> {
        let mut store = self.chunks.write().await;
        for chunk in chunks {
            store.insert(chunk.id.clone(), chunk);
        }
        Ok(())
    }

    #[instrument(skip(self, filter))]
    async fn delete_by_filter(&self, filter: &MemoryFilter) -> Result<()> {
        let mut store = self.chunks.write().await;
        store.retain(|_, chunk| !filter.matches(&chunk.tags));
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        filters: &[MemoryFilter],
        min_score: f32,
        limit: i64,
    ) -> Result<Vec<ScoredChunk>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let store = self.chunks.read().await;
        let mut scored: Vec<ScoredChunk> = store
            .values()
            .filter(|chunk| matches_any(filters, &chunk.tags))
            .map(|chunk| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(embedding, &chunk.vector),
            })
            .filter(|scored| scored.score >= min_score)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        if limit > 0 {
            scored.truncate(limit as usize);
        }

        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, vector: Vec<f32>, doc_id: &str) -> Chunk {
        let mut tags = TagCollection::new();
        tags.insert_value("__document_id", doc_id).unwrap();
        Chunk {
            id: id.to_string(),
            text: format!("chunk {}", id),
            tags,
            vector,
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_cosine_similarity_descending() {
        let index = InMemoryIndex::new();
        index
            .upsert(vec![
                chunk("a", vec![1.0, 0.0], "doc-1"),
                chunk("b", vec![0.0, 1.0], "doc-1"),
                chunk("c", vec![0.9, 0.1], "doc-1"),
            ])
            .await
            .unwrap();

        let results = index.search(&[1.0, 0.0], &[], 0.0, -1).await.unwrap();
        assert_eq!(results[0].chunk.id, "a");
        assert_eq!(results[1].chunk.id, "c");
        assert_eq!(results[2].chunk.id, "b");
    }

    #[tokio::test]
    async fn test_limit_zero_returns_empty() {
        let index = InMemoryIndex::new();
        index.upsert(vec![chunk("a", vec![1.0, 0.0], "doc-1")]).await.unwrap();

        let results = index.search(&[1.0, 0.0], &[], 0.0, 0).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_negative_limit_is_unbounded() {
        let index = InMemoryIndex::new();
        for i in 0..10 {
            index
                .upsert(vec![chunk(&format!("c{}", i), vec![1.0, 0.0], "doc-1")])
                .await
                .unwrap();
        }

        let results = index.search(&[1.0, 0.0], &[], 0.0, -1).await.unwrap();
        assert_eq!(results.len(), 10);
    }

    #[tokio::test]
    async fn test_min_score_lower_bound() {
        let index = InMemoryIndex::new();
        index
            .upsert(vec![
                chunk("a", vec![1.0, 0.0], "doc-1"),
                chunk("b", vec![0.0, 1.0], "doc-1"),
            ])
            .await
            .unwrap();

        let results = index.search(&[1.0, 0.0], &[], 0.5, -1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "a");
    }

    #[tokio::test]
    async fn test_filters_are_dnf() {
        let index = InMemoryIndex::new();
        index
            .upsert(vec![
                chunk("a", vec![1.0, 0.0], "doc-1"),
                chunk("b", vec![1.0, 0.0], "doc-2"),
            ])
            .await
            .unwrap();

        let filters = vec![MemoryFilter::new().with("__document_id", "doc-2")];
        let results = index.search(&[1.0, 0.0], &filters, 0.0, -1).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "b");
    }

    #[tokio::test]
    async fn test_delete_by_filter_removes_matching_chunks_only() {
        let index = InMemoryIndex::new();
        index
            .upsert(vec![
                chunk("a", vec![1.0, 0.0], "doc-1"),
                chunk("b", vec![1.0, 0.0], "doc-2"),
            ])
            .await
            .unwrap();

        index
            .delete_by_filter(&MemoryFilter::new().with("__document_id", "doc-1"))
            .await
            .unwrap();

        let results = index.search(&[1.0, 0.0], &[], 0.0, -1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "b");
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let index = InMemoryIndex::new();
        index.upsert(vec![chunk("a", vec![1.0, 0.0], "doc-1")]).await.unwrap();
        index.upsert(vec![chunk("a", vec![0.0, 1.0], "doc-1")]).await.unwrap();

        let results = index.search(&[0.0, 1.0], &[], 0.0, -1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }
}
