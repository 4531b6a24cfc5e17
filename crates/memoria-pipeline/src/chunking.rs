//! Text partitioning into chunks for the `partition_text` handler.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;

/// The encoding used to estimate token counts for partitioned chunks.
/// Built lazily once per process since `cl100k_base()` parses a ranks file.
static TOKENIZER: Lazy<CoreBPE> =
    Lazy::new(|| tiktoken_rs::cl100k_base().expect("bundled cl100k_base ranks are well-formed"));

/// How `TextChunker` should split a document's extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkingStrategy {
    /// Fixed-size windows over the text, measured in characters, with a
    /// configurable overlap between consecutive windows.
    FixedSize,
    /// Split on paragraph boundaries (blank lines), merging short
    /// paragraphs up to `chunk_size`.
    Paragraph,
    /// Split on sentence boundaries (`.`, `!`, `?` followed by whitespace),
    /// merging short sentences up to `chunk_size`.
    Sentence,
}

/// Chunking parameters, validated before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub strategy: ChunkingStrategy,
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than zero".to_string());
        }
        if self.overlap >= self.chunk_size {
            return Err("overlap must be smaller than chunk_size".to_string());
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::FixedSize,
            chunk_size: 800,
            overlap: 100,
        }
    }
}

/// A single partition of a document's text, with its position in the
/// original for traceability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub part: usize,
    pub estimated_tokens: usize,
}

fn estimate_tokens(text: &str) -> usize {
    TOKENIZER.encode_with_special_tokens(text).len()
}

/// Splits extracted text into `Chunk`s per a `ChunkingConfig`.
pub struct TextChunker;

impl TextChunker {
    pub fn chunk(text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>, String> {
        config.validate()?;

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let raw_parts = match config.strategy {
            ChunkingStrategy::FixedSize => Self::chunk_fixed_size(text, config),
            ChunkingStrategy::Paragraph => Self::chunk_by_paragraphs(text, config),
            ChunkingStrategy::Sentence => Self::chunk_by_sentences(text, config),
        };

        Ok(raw_parts
            .into_iter()
            .enumerate()
            .map(|(part, text)| {
                let estimated_tokens = estimate_tokens(&text);
                Chunk {
                    text,
                    part,
                    estimated_tokens,
                }
            })
            .collect())
    }

    fn chunk_fixed_size(text: &str, config: &ChunkingConfig) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let stride = config.chunk_size - config.overlap;
        let mut parts = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + config.chunk_size).min(chars.len());
            let slice: String = chars[start..end].iter().collect();
            if !slice.trim().is_empty() {
                parts.push(slice);
            }
            if end == chars.len() {
                break;
            }
            start += stride;
        }

        parts
    }

    fn chunk_by_paragraphs(text: &str, config: &ChunkingConfig) -> Vec<String> {
        let paragraphs: Vec<&str> = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        Self::merge_units(&paragraphs, config.chunk_size)
    }

    fn chunk_by_sentences(text: &str, config: &ChunkingConfig) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut current = String::new();

        for ch in text.chars() {
            current.push(ch);
            if matches!(ch, '.' | '!' | '?') {
                sentences.push(current.trim().to_string());
                current = String::new();
            }
        }
        if !current.trim().is_empty() {
            sentences.push(current.trim().to_string());
        }

        let refs: Vec<&str> = sentences.iter().map(String::as_str).collect();
        Self::merge_units(&refs, config.chunk_size)
    }

    /// Greedily packs units (paragraphs/sentences) into chunks no larger
    /// than `chunk_size` characters, never splitting a unit across chunks.
    fn merge_units(units: &[&str], chunk_size: usize) -> Vec<String> {
        let mut parts = Vec::new();
        let mut current = String::new();

        for unit in units {
            if !current.is_empty() && current.len() + unit.len() + 1 > chunk_size {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(unit);
        }
        if !current.trim().is_empty() {
            parts.push(current.trim().to_string());
        }

        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_size_chunking_with_overlap() {
        let config = ChunkingConfig {
            strategy: ChunkingStrategy::FixedSize,
            chunk_size: 10,
            overlap: 2,
        };
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = TextChunker::chunk(text, &config).unwrap();

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].text, "abcdefghij");
        // overlap means the second chunk starts 2 characters before the first ends.
        assert!(chunks[1].text.starts_with("ij"));
    }

    #[test]
    fn test_paragraph_chunking_merges_short_paragraphs() {
        let config = ChunkingConfig {
            strategy: ChunkingStrategy::Paragraph,
            chunk_size: 100,
            overlap: 0,
        };
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = TextChunker::chunk(text, &config).unwrap();

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First"));
        assert!(chunks[0].text.contains("Third"));
    }

    #[test]
    fn test_sentence_chunking_splits_on_boundaries() {
        let config = ChunkingConfig {
            strategy: ChunkingStrategy::Sentence,
            chunk_size: 15,
            overlap: 0,
        };
        let text = "The moon orbits the earth. The sun is a star.";
        let chunks = TextChunker::chunk(text, &config).unwrap();

        assert!(chunks.iter().any(|c| c.text.contains("moon orbits")));
    }

    #[test]
    fn test_empty_text_produces_no_chunks() {
        let chunks = TextChunker::chunk("   ", &ChunkingConfig::default()).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ChunkingConfig {
            strategy: ChunkingStrategy::FixedSize,
            chunk_size: 10,
            overlap: 10,
        };
        assert!(TextChunker::chunk("hello", &config).is_err());
    }

    #[test]
    fn test_chunks_are_numbered_in_order() {
        let config = ChunkingConfig {
            strategy: ChunkingStrategy::FixedSize,
            chunk_size: 5,
            overlap: 0,
        };
        let chunks = TextChunker::chunk("abcdefghijklmno", &config).unwrap();
        let parts: Vec<usize> = chunks.iter().map(|c| c.part).collect();
        assert_eq!(parts, (0..chunks.len()).collect::<Vec<_>>());
    }
}
