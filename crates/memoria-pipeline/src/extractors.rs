//! Text extraction: turns a raw source file into plain text.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{PipelineError, Result};

/// The output of a successful extraction, plus any non-fatal warnings
/// encountered along the way (e.g. a best-effort encoding fallback).
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub text: String,
    pub warnings: Vec<String>,
}

impl ExtractionResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// A pluggable extractor: given raw bytes, produce plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Lowercase file extensions this extractor claims (without the dot).
    fn extensions(&self) -> &[&str];
    async fn extract(&self, bytes: &[u8]) -> Result<ExtractionResult>;
}

/// Decodes bytes as UTF-8, falling back to a lossy decode with a warning.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn extensions(&self) -> &[&str] {
        &["txt", "text", "log", "csv"]
    }

    async fn extract(&self, bytes: &[u8]) -> Result<ExtractionResult> {
        Ok(decode_lossy(bytes))
    }
}

/// Extracts markdown as plain text verbatim (no stripping of formatting
/// markers; downstream chunking treats it as ordinary text).
pub struct MarkdownExtractor;

#[async_trait]
impl TextExtractor for MarkdownExtractor {
    fn extensions(&self) -> &[&str] {
        &["md", "markdown"]
    }

    async fn extract(&self, bytes: &[u8]) -> Result<ExtractionResult> {
        Ok(decode_lossy(bytes))
    }
}

/// Pretty-prints JSON documents into readable text.
pub struct JsonExtractor;

#[async_trait]
impl TextExtractor for JsonExtractor {
    fn extensions(&self) -> &[&str] {
        &["json"]
    }

    async fn extract(&self, bytes: &[u8]) -> Result<ExtractionResult> {
        let raw = decode_lossy(bytes);
        match serde_json::from_str::<serde_json::Value>(&raw.text) {
            Ok(value) => Ok(ExtractionResult::new(
                serde_json::to_string_pretty(&value).unwrap_or(raw.text),
            )),
            Err(_) => Ok(raw.with_warning("content is not valid JSON, extracted verbatim")),
        }
    }
}

fn decode_lossy(bytes: &[u8]) -> ExtractionResult {
    match std::str::from_utf8(bytes) {
        Ok(text) => ExtractionResult::new(text),
        Err(_) => {
            let (text, _, had_errors) = encoding_rs::UTF_8.decode(bytes);
            let mut result = ExtractionResult::new(text.into_owned());
            if had_errors {
                result = result.with_warning("input was not valid UTF-8, decoded lossily");
            }
            result
        }
    }
}

/// A process-wide set of extractors, dispatched on filename extension.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PlainTextExtractor));
        registry.register(Arc::new(MarkdownExtractor));
        registry.register(Arc::new(JsonExtractor));
        registry
    }

    pub fn register(&mut self, extractor: Arc<dyn TextExtractor>) {
        self.extractors.push(extractor);
    }

    pub fn get_by_filename(&self, filename: &str) -> Option<Arc<dyn TextExtractor>> {
        let ext = filename.rsplit('.').next()?.to_lowercase();
        self.extractors
            .iter()
            .find(|extractor| extractor.extensions().contains(&ext.as_str()))
            .cloned()
    }

    pub async fn extract(&self, filename: &str, bytes: &[u8]) -> Result<ExtractionResult> {
        let extractor = self
            .get_by_filename(filename)
            .ok_or_else(|| PipelineError::NoExtractor(filename.to_string()))?;
        extractor.extract(bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_text_roundtrip() {
        let registry = ExtractorRegistry::with_defaults();
        let result = registry.extract("notes.txt", b"hello world").await.unwrap();
        assert_eq!(result.text, "hello world");
    }

    #[tokio::test]
    async fn test_markdown_is_passed_through() {
        let registry = ExtractorRegistry::with_defaults();
        let result = registry
            .extract("readme.md", b"# Title\n\nBody text.")
            .await
            .unwrap();
        assert!(result.text.contains("Title"));
    }

    #[tokio::test]
    async fn test_json_is_pretty_printed() {
        let registry = ExtractorRegistry::with_defaults();
        let result = registry
            .extract("data.json", br#"{"a":1}"#)
            .await
            .unwrap();
        assert!(result.text.contains("\"a\""));
    }

    #[tokio::test]
    async fn test_unknown_extension_errors() {
        let registry = ExtractorRegistry::with_defaults();
        let err = registry.extract("photo.png", b"\x89PNG").await.unwrap_err();
        assert!(matches!(err, PipelineError::NoExtractor(_)));
    }
}
