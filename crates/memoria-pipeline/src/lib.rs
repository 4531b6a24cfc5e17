//! The ingestion pipeline: text extraction, chunking, embedding, and
//! retrieval-record assembly, wired together behind a named-step `Handler`
//! contract.

pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractors;
pub mod handler;
pub mod handlers;

pub use chunking::{ChunkingConfig, ChunkingStrategy, TextChunker};
pub use embeddings::{EmbeddingProvider, HashEmbedder};
pub use error::{PipelineError, Result};
pub use extractors::{ExtractionResult, ExtractorRegistry, TextExtractor};
pub use handler::{Handler, HandlerContext, HandlerOutcome, HandlerRegistry};
pub use handlers::register_default_handlers;
