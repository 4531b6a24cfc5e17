//! The four default pipeline steps. Each handler is idempotent: it checks for evidence of prior
//! work (a descendant artifact already recorded on the `FileRef`) before
//! redoing it, so resuming after a crash never duplicates output.

use async_trait::async_trait;
use memoria_core::{DocumentId, GeneratedArtifact, PipelineState, TagCollection};
use memoria_index::Chunk as IndexChunk;
use memoria_store::artifact_key;
use tracing::{instrument, warn};

use crate::chunking::TextChunker;
use crate::handler::{Handler, HandlerContext, HandlerOutcome};

const STEP_EXTRACT_TEXT: &str = "extract_text";
const STEP_PARTITION_TEXT: &str = "partition_text";
const STEP_GENERATE_EMBEDDINGS: &str = "generate_embeddings";
const STEP_SAVE_RECORDS: &str = "save_records";

/// Reads each source file's bytes and produces a plain-text artifact.
pub struct ExtractTextHandler;

#[async_trait]
impl Handler for ExtractTextHandler {
    fn name(&self) -> &str {
        STEP_EXTRACT_TEXT
    }

    #[instrument(skip(self, state, ctx))]
    async fn invoke(&self, state: &mut PipelineState, ctx: &HandlerContext) -> HandlerOutcome {
        for idx in 0..state.files.len() {
            let file_id = state.files[idx].file_id.clone();
            if state.files[idx]
                .descendants_from_step(STEP_EXTRACT_TEXT)
                .next()
                .is_some()
            {
                continue;
            }

            let source_key = state.files[idx].artifact_key.clone();
            let bytes = match ctx.artifact_store.get(&source_key).await {
                Ok(bytes) => bytes,
                Err(e) => return HandlerOutcome::RetryLater(retry_delay(&e.to_string())),
            };

            let original_name = state.files[idx].original_name.clone();
            let extracted = match ctx.extractors.extract(&original_name, &bytes).await {
                Ok(extracted) => extracted,
                Err(e) => return HandlerOutcome::Fatal(e.to_string()),
            };

            for warning in &extracted.warnings {
                warn!(file_id = %file_id, warning, "extraction warning");
            }

            let artifact_name = format!("{}.{}.txt", STEP_EXTRACT_TEXT, file_id);
            let key = artifact_key(&state.index, state.document_id.as_str(), &artifact_name);
            if let Err(e) = ctx
                .artifact_store
                .put(&key, extracted.text.into_bytes())
                .await
            {
                return HandlerOutcome::RetryLater(retry_delay(&e.to_string()));
            }

            state.files[idx].add_descendant(GeneratedArtifact {
                source_file_id: file_id,
                producing_step: STEP_EXTRACT_TEXT.to_string(),
                artifact_key: key,
                content_type: "text/plain".to_string(),
            });
        }

        HandlerOutcome::Advance
    }
}

/// Splits each file's extracted text into chunks, per `ctx.chunking_config`.
pub struct PartitionTextHandler;

#[async_trait]
impl Handler for PartitionTextHandler {
    fn name(&self) -> &str {
        STEP_PARTITION_TEXT
    }

    #[instrument(skip(self, state, ctx))]
    async fn invoke(&self, state: &mut PipelineState, ctx: &HandlerContext) -> HandlerOutcome {
        for idx in 0..state.files.len() {
            if state.files[idx]
                .descendants_from_step(STEP_PARTITION_TEXT)
                .next()
                .is_some()
            {
                continue;
            }

            let file_id = state.files[idx].file_id.clone();
            let extracted_key = match state.files[idx]
                .descendants_from_step(STEP_EXTRACT_TEXT)
                .next()
            {
                Some(artifact) => artifact.artifact_key.clone(),
                None => return HandlerOutcome::Fatal(format!("no extracted text for file {}", file_id)),
            };

            let bytes = match ctx.artifact_store.get(&extracted_key).await {
                Ok(bytes) => bytes,
                Err(e) => return HandlerOutcome::RetryLater(retry_delay(&e.to_string())),
            };
            let text = String::from_utf8_lossy(&bytes).into_owned();

            let chunks = match TextChunker::chunk(&text, &ctx.chunking_config) {
                Ok(chunks) => chunks,
                Err(e) => return HandlerOutcome::Fatal(e),
            };

            for chunk in chunks {
                let artifact_name = format!("{}.{}.{}.txt", STEP_PARTITION_TEXT, file_id, chunk.part);
                let key = artifact_key(&state.index, state.document_id.as_str(), &artifact_name);
                if let Err(e) = ctx.artifact_store.put(&key, chunk.text.into_bytes()).await {
                    return HandlerOutcome::RetryLater(retry_delay(&e.to_string()));
                }

                state.files[idx].add_descendant(GeneratedArtifact {
                    source_file_id: file_id.clone(),
                    producing_step: STEP_PARTITION_TEXT.to_string(),
                    artifact_key: key,
                    content_type: "text/plain".to_string(),
                });
            }
        }

        HandlerOutcome::Advance
    }
}

/// Embeds every partitioned chunk with `ctx.embedder`, storing each vector
/// as its own artifact alongside the partition it was derived from.
pub struct GenerateEmbeddingsHandler;

#[async_trait]
impl Handler for GenerateEmbeddingsHandler {
    fn name(&self) -> &str {
        STEP_GENERATE_EMBEDDINGS
    }

    #[instrument(skip(self, state, ctx))]
    async fn invoke(&self, state: &mut PipelineState, ctx: &HandlerContext) -> HandlerOutcome {
        for idx in 0..state.files.len() {
            let file_id = state.files[idx].file_id.clone();
            let partitions: Vec<_> = state.files[idx]
                .descendants_from_step(STEP_PARTITION_TEXT)
                .cloned()
                .collect();

            let already_embedded: std::collections::HashSet<String> = state.files[idx]
                .descendants_from_step(STEP_GENERATE_EMBEDDINGS)
                .map(|a| a.artifact_key.clone())
                .collect();

            for partition in partitions {
                let part_index = partition
                    .artifact_key
                    .rsplit('.')
                    .nth(1)
                    .unwrap_or("0")
                    .to_string();
                let artifact_name = format!("{}.{}.{}.vec", STEP_GENERATE_EMBEDDINGS, file_id, part_index);
                let key = artifact_key(&state.index, state.document_id.as_str(), &artifact_name);

                if already_embedded.contains(&key) {
                    continue;
                }

                let bytes = match ctx.artifact_store.get(&partition.artifact_key).await {
                    Ok(bytes) => bytes,
                    Err(e) => return HandlerOutcome::RetryLater(retry_delay(&e.to_string())),
                };
                let text = String::from_utf8_lossy(&bytes).into_owned();

                let vector = ctx.embedder.embed(&text).await;
                let encoded = encode_vector(&vector);

                if let Err(e) = ctx.artifact_store.put(&key, encoded).await {
                    return HandlerOutcome::RetryLater(retry_delay(&e.to_string()));
                }

                state.files[idx].add_descendant(GeneratedArtifact {
                    source_file_id: file_id.clone(),
                    producing_step: STEP_GENERATE_EMBEDDINGS.to_string(),
                    artifact_key: key,
                    content_type: "application/octet-stream".to_string(),
                });
            }
        }

        HandlerOutcome::Advance
    }
}

/// Assembles chunk text, vector, and tags into `RetrievalIndex` records and
/// upserts them, keyed deterministically so re-running this step overwrites
/// rather than duplicates.
pub struct SaveRecordsHandler;

#[async_trait]
impl Handler for SaveRecordsHandler {
    fn name(&self) -> &str {
        STEP_SAVE_RECORDS
    }

    #[instrument(skip(self, state, ctx))]
    async fn invoke(&self, state: &mut PipelineState, ctx: &HandlerContext) -> HandlerOutcome {
        let mut records = Vec::new();

        for file in &state.files {
            let partitions: Vec<_> = file.descendants_from_step(STEP_PARTITION_TEXT).collect();
            let embeddings: Vec<_> = file.descendants_from_step(STEP_GENERATE_EMBEDDINGS).collect();

            for partition in partitions {
                let part_index = part_index_of(&partition.artifact_key);

                let embedding_artifact = embeddings
                    .iter()
                    .find(|a| part_index_of(&a.artifact_key) == part_index);

                let embedding_artifact = match embedding_artifact {
                    Some(a) => a,
                    None => {
                        return HandlerOutcome::Fatal(format!(
                            "missing embedding for file {} part {}",
                            file.file_id, part_index
                        ))
                    }
                };

                let text_bytes = match ctx.artifact_store.get(&partition.artifact_key).await {
                    Ok(bytes) => bytes,
                    Err(e) => return HandlerOutcome::RetryLater(retry_delay(&e.to_string())),
                };
                let vector_bytes = match ctx.artifact_store.get(&embedding_artifact.artifact_key).await {
                    Ok(bytes) => bytes,
                    Err(e) => return HandlerOutcome::RetryLater(retry_delay(&e.to_string())),
                };

                let mut tags = state.tags.clone();
                if let Err(e) = tags.insert_value(memoria_core::TAG_INDEX, state.index.clone()) {
                    return HandlerOutcome::Fatal(e.to_string());
                }
                if let Err(e) = tags.insert_value(memoria_core::TAG_DOCUMENT_ID, state.document_id.as_str()) {
                    return HandlerOutcome::Fatal(e.to_string());
                }
                if let Err(e) = tags.insert_value(memoria_core::TAG_FILE_ID, file.file_id.clone()) {
                    return HandlerOutcome::Fatal(e.to_string());
                }
                if let Err(e) = tags.insert_value(memoria_core::TAG_FILE_PART, part_index.to_string()) {
                    return HandlerOutcome::Fatal(e.to_string());
                }

                records.push(IndexChunk {
                    id: chunk_id(&state.document_id, &file.file_id, part_index),
                    text: String::from_utf8_lossy(&text_bytes).into_owned(),
                    tags,
                    vector: decode_vector(&vector_bytes),
                });
            }
        }

        if let Err(e) = ctx.index.upsert(records).await {
            return HandlerOutcome::RetryLater(retry_delay(&e.to_string()));
        }

        HandlerOutcome::Advance
    }
}

fn part_index_of(artifact_key: &str) -> usize {
    artifact_key
        .rsplit('.')
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// A chunk's identity is fully determined by where it came from, so
/// re-running `save_records` overwrites the same record instead of adding
/// a duplicate.
fn chunk_id(document_id: &DocumentId, file_id: &str, part: usize) -> String {
    format!("{}:{}:{}", document_id.as_str(), file_id, part)
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn retry_delay(_reason: &str) -> std::time::Duration {
    std::time::Duration::from_secs(1)
}

/// Registers `extract_text`, `partition_text`, `generate_embeddings`, and
/// `save_records` — the default step sequence — into `registry`.
pub fn register_default_handlers(registry: &mut crate::handler::HandlerRegistry) {
    use std::sync::Arc;

    registry.register(Arc::new(ExtractTextHandler));
    registry.register(Arc::new(PartitionTextHandler));
    registry.register(Arc::new(GenerateEmbeddingsHandler));
    registry.register(Arc::new(SaveRecordsHandler));
}
