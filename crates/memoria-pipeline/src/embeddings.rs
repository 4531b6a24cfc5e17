//! Embedding generation. Ships one deterministic, dependency-free default
//! so the pipeline is runnable end-to-end without an external model;
//! real adapters plug in behind the same trait.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// A pluggable embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimensions(&self) -> usize;
    async fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministically derives a unit vector from repeated SHA-256 hashing of
/// the input text. Not semantically meaningful, but stable: the same text
/// always produces the same vector, which is what handler idempotence and
/// the round-trip test (`search` for a known phrase) actually require.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.dimensions);
        let mut seed = text.as_bytes().to_vec();

        while values.len() < self.dimensions {
            let digest = Sha256::digest(&seed);
            for byte in digest.iter() {
                if values.len() == self.dimensions {
                    break;
                }
                // map [0, 255] -> [-1.0, 1.0]
                values.push((*byte as f32 / 127.5) - 1.0);
            }
            seed = digest.to_vec();
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut values {
                *value /= norm;
            }
        }

        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embedding_is_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("the moon orbits the earth").await;
        let b = embedder.embed("the moon orbits the earth").await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_embedding_has_configured_dimensions() {
        let embedder = HashEmbedder::new(16);
        let vector = embedder.embed("hello").await;
        assert_eq!(vector.len(), 16);
    }

    #[tokio::test]
    async fn test_different_text_produces_different_vector() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("alpha").await;
        let b = embedder.embed("beta").await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_embedding_is_unit_length() {
        let embedder = HashEmbedder::default();
        let vector = embedder.embed("some text").await;
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }
}
