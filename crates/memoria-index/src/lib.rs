//! The Retrieval Index: vector + metadata store populated by the final
//! pipeline step.

pub mod error;
pub mod index;

pub use error::{IndexError, Result};
pub use index::{Chunk, InMemoryIndex, RetrievalIndex, ScoredChunk};
