//! The `/ask` endpoint's answer-synthesis seam. The
//! prompting strategy itself is an out-of-scope external collaborator; this
//! crate only wires retrieval to a pluggable `AnswerSynthesizer` trait and
//! ships a template-based default that stitches together the top retrieved
//! chunks without calling out to any model.

use async_trait::async_trait;
use memoria_index::ScoredChunk;

/// A synthesised answer plus the chunks it was grounded on.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
}

/// A single grounding reference for a synthesised answer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Citation {
    pub chunk_id: String,
    pub score: f32,
    pub excerpt: String,
}

/// Turns a question and its retrieved chunks into an `Answer`. Swappable so
/// a downstream deployment can plug in an LLM-backed implementation without
/// touching the ingestion pipeline.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(&self, question: &str, chunks: &[ScoredChunk]) -> Answer;
}

/// Stitches the top retrieved chunks into a single passage, citing each one.
/// No LLM call is implemented in this revision.
#[derive(Default)]
pub struct TemplateSynthesizer;

#[async_trait]
impl AnswerSynthesizer for TemplateSynthesizer {
    async fn synthesize(&self, question: &str, chunks: &[ScoredChunk]) -> Answer {
        if chunks.is_empty() {
            return Answer {
                text: format!(
                    "No relevant passages were found to answer: \"{}\"",
                    question
                ),
                citations: Vec::new(),
            };
        }

        let mut text = String::new();
        let mut citations = Vec::with_capacity(chunks.len());

        for scored in chunks {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(scored.chunk.text.trim());

            citations.push(Citation {
                chunk_id: scored.chunk.id.clone(),
                score: scored.score,
                excerpt: excerpt(&scored.chunk.text),
            });
        }

        Answer { text, citations }
    }
}

fn excerpt(text: &str) -> String {
    const MAX_CHARS: usize = 200;
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        trimmed.to_string()
    } else {
        let truncated: String = trimmed.chars().take(MAX_CHARS).collect();
        format!("{}...", truncated)
    }
}
