use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Matches runs of characters that are neither alphanumeric nor a hyphen, so
/// `canonicalize_index_name` can collapse each run to a single hyphen in one
/// pass instead of hand-walking the string.
static NON_CANONICAL_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9-]+").unwrap());

/// Schema version prefix for persisted Pipeline State records. Readers must
/// reject records carrying an unknown major version rather than guess at a
/// migration.
pub const PIPELINE_STATE_SCHEMA_VERSION: u32 = 1;

/// Automatic tags attached to every chunk written to the Retrieval Index.
pub const TAG_DOCUMENT_ID: &str = "__document_id";
pub const TAG_FILE_ID: &str = "__file_id";
pub const TAG_FILE_PART: &str = "__file_part";

/// The Retrieval Index is a single shared store across every namespace; this
/// tag is how a document's own index (Glossary: "a named namespace of
/// documents and their derived chunks") is attached to each of its chunks so
/// that search, ask, and delete can scope to one namespace at a time.
/// Distinct from the automatic tags attached to every chunk
/// (`__document_id`, `__file_id`, `__file_part`) in that it is consumed
/// internally by query scoping rather than exposed as a filter callers are
/// expected to set themselves.
pub const TAG_INDEX: &str = "__index";

/// The default per-document step sequence used when a caller omits `steps`.
pub const DEFAULT_STEP_SEQUENCE: &[&str] = &[
    "extract_text",
    "partition_text",
    "generate_embeddings",
    "save_records",
];

/// A client-supplied or generated document identifier, stable across retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, random document id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Canonicalise a caller-supplied index name: lowercase, trim, collapse
/// non-alphanumeric-or-hyphen runs to a single hyphen, reject empty results.
pub fn canonicalize_index_name(raw: &str, default_index_name: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return canonicalize_index_name(default_index_name, default_index_name);
    }

    let lowered = trimmed.to_lowercase();
    let canonical = NON_CANONICAL_RUN
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string();
    if canonical.is_empty() {
        return Err(CoreError::InvalidIndexName(raw.to_string()));
    }

    Ok(canonical)
}

/// A mapping from tag-key to a set of tag-values. An empty value set means
/// "key present with no value". Tags propagate verbatim to every chunk
/// derived from the document they're attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCollection(HashMap<String, HashSet<String>>);

impl TagCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag key with no values, if not already present.
    pub fn with_key(mut self, key: impl Into<String>) -> Result<Self> {
        self.insert_key(key)?;
        Ok(self)
    }

    /// Insert a tag (key, value) pair.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        self.insert_value(key, value)?;
        Ok(self)
    }

    pub fn insert_key(&mut self, key: impl Into<String>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(CoreError::InvalidTagKey(key));
        }
        self.0.entry(key).or_default();
        Ok(())
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(CoreError::InvalidTagKey(key));
        }
        self.0.entry(key).or_default().insert(value.into());
        Ok(())
    }

    pub fn values(&self, key: &str) -> Option<&HashSet<String>> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.0
            .get(key)
            .map(|values| values.contains(value))
            .unwrap_or(false)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &HashSet<String>)> {
        self.0.iter()
    }

    /// Build a `TagCollection` from a caller-supplied key -> values mapping
    /// (e.g. decoded from upload request JSON).
    pub fn from_map(map: HashMap<String, Vec<String>>) -> Result<Self> {
        let mut collection = Self::new();
        for (key, values) in map {
            if values.is_empty() {
                collection.insert_key(key)?;
            } else {
                for value in values {
                    collection.insert_value(key.clone(), value)?;
                }
            }
        }
        Ok(collection)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Merge another collection's tags into this one, union-ing value sets.
    pub fn merge(&mut self, other: &TagCollection) {
        for (key, values) in &other.0 {
            let entry = self.0.entry(key.clone()).or_default();
            entry.extend(values.iter().cloned());
        }
    }
}

/// A conjunction of (tag-key, tag-value) equality predicates. The empty
/// filter matches everything. A `Vec<MemoryFilter>` is a disjunction of
/// conjunctions (DNF).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFilter(HashMap<String, String>);

impl MemoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if every predicate in this conjunction is satisfied by `tags`.
    pub fn matches(&self, tags: &TagCollection) -> bool {
        self.0
            .iter()
            .all(|(key, value)| tags.contains(key, value))
    }
}

/// Evaluate a DNF filter list against a tag collection. An empty list
/// matches everything (vacuous disjunction over a universal predicate).
pub fn matches_any(filters: &[MemoryFilter], tags: &TagCollection) -> bool {
    filters.is_empty() || filters.iter().any(|f| f.matches(tags))
}

/// Conjoin `__index = index` onto every disjunct of a caller-supplied DNF
/// filter list, so a query against one namespace can never see another
/// namespace's chunks even though the Retrieval Index is a single shared
/// store. An empty caller list (matches everything) becomes a single filter
/// scoped to just this index.
pub fn scope_filters_to_index(filters: &[MemoryFilter], index: &str) -> Vec<MemoryFilter> {
    if filters.is_empty() {
        return vec![MemoryFilter::new().with(TAG_INDEX, index)];
    }

    filters
        .iter()
        .map(|f| f.clone().with(TAG_INDEX, index))
        .collect()
}

/// An artifact produced by a pipeline step from a source file: a partition,
/// an embedding, or any other derived byte blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Back-pointer to the `FileRef.file_id` this artifact derives from.
    pub source_file_id: String,
    pub producing_step: String,
    pub artifact_key: String,
    pub content_type: String,
}

/// A single source file attached to a document, plus every artifact
/// derived from it so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: String,
    pub original_name: String,
    pub artifact_key: String,
    pub mime_type: String,
    pub size: u64,
    pub descendants: Vec<GeneratedArtifact>,
}

impl FileRef {
    pub fn new(
        file_id: impl Into<String>,
        original_name: impl Into<String>,
        artifact_key: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            original_name: original_name.into(),
            artifact_key: artifact_key.into(),
            mime_type: mime_type.into(),
            size,
            descendants: Vec::new(),
        }
    }

    pub fn add_descendant(&mut self, descendant: GeneratedArtifact) {
        self.descendants.push(descendant);
    }

    pub fn descendants_from_step(&self, step: &str) -> impl Iterator<Item = &GeneratedArtifact> {
        self.descendants
            .iter()
            .filter(move |d| d.producing_step == step)
    }
}

/// The status of a document's pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Pending,
    Processing,
    Complete,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Complete | PipelineStatus::Failed | PipelineStatus::Cancelled
        )
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStatus::Pending => "pending",
            PipelineStatus::Processing => "processing",
            PipelineStatus::Complete => "complete",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A structured record of why a document failed, kept distinct from a
/// generic error string so `Status Reporter` can surface it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub step: Option<String>,
    pub message: String,
    pub poisoned: bool,
}

impl FailureReason {
    pub fn new(step: Option<String>, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
            poisoned: false,
        }
    }

    pub fn poisoned(step: Option<String>, last_error: impl fmt::Display) -> Self {
        Self {
            step,
            message: format!("poisoned: {}", last_error),
            poisoned: true,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// The persistent record of a document's progress through the pipeline.
/// One record exists per (index, document_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub schema_version: u32,
    pub index: String,
    pub document_id: DocumentId,
    pub creation_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    pub tags: TagCollection,
    pub files: Vec<FileRef>,
    pub steps_to_execute: Vec<String>,
    pub steps_completed: Vec<String>,
    pub status: PipelineStatus,
    pub failure_reason: Option<FailureReason>,
}

impl PipelineState {
    /// Create a freshly-ingested, not-yet-started state record.
    pub fn new(
        index: impl Into<String>,
        document_id: DocumentId,
        tags: TagCollection,
        files: Vec<FileRef>,
        steps: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            schema_version: PIPELINE_STATE_SCHEMA_VERSION,
            index: index.into(),
            document_id,
            creation_time: now,
            last_update_time: now,
            tags,
            files,
            steps_to_execute: steps,
            steps_completed: Vec::new(),
            status: PipelineStatus::Pending,
            failure_reason: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_update_time = Utc::now();
    }

    /// True iff the document completed every step of its originally
    /// requested plan without failure (Status Reporter's `ready`).
    pub fn is_ready(&self) -> bool {
        self.status == PipelineStatus::Complete && self.steps_to_execute.is_empty()
    }

    pub fn find_file(&self, file_id: &str) -> Option<&FileRef> {
        self.files.iter().find(|f| f.file_id == file_id)
    }

    pub fn find_file_mut(&mut self, file_id: &str) -> Option<&mut FileRef> {
        self.files.iter_mut().find(|f| f.file_id == file_id)
    }

    /// Serialize to the self-describing persisted form (schema-versioned JSON).
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Deserialize from the persisted form, rejecting unknown major versions.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let state: PipelineState = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::Corrupted(e.to_string()))?;
        if state.schema_version > PIPELINE_STATE_SCHEMA_VERSION {
            return Err(CoreError::UnsupportedSchemaVersion(state.schema_version));
        }
        Ok(state)
    }
}
