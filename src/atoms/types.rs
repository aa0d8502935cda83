// ── Phantom State Atoms: Data Model ────────────────────────────────────────
// Typed records for every entity plus engine configuration.
// These are pure data types (no logic beyond string conversions, no DB
// access, no I/O). Structs live here; behavior lives in engine/.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;

use crate::atoms::constants::*;
use crate::atoms::error::EngineError;

// ═══════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

/// Which embedding backend the engine loads on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingBackendKind {
    /// In-process static-embedding model. First use may incur cold-start.
    Local,
    /// Hosted embedding service over HTTP.
    RemoteApi,
    /// Deterministic feature-hash vectors. Development and tests only.
    Hash,
}

impl EmbeddingBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::RemoteApi => "remote-api",
            Self::Hash => "hash",
        }
    }
}

impl FromStr for EmbeddingBackendKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "remote-api" => Ok(Self::RemoteApi),
            "hash" => Ok(Self::Hash),
            other => Err(EngineError::invalid_enum("embedding_backend", other)),
        }
    }
}

/// How `load_document` splits text into corpus chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkGranularity {
    Sentence,
    Paragraph,
    Page,
    /// No splitting — the whole text becomes one chunk.
    Manual,
}

impl ChunkGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sentence => "sentence",
            Self::Paragraph => "paragraph",
            Self::Page => "page",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for ChunkGranularity {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sentence" => Ok(Self::Sentence),
            "paragraph" => Ok(Self::Paragraph),
            "page" => Ok(Self::Page),
            "manual" => Ok(Self::Manual),
            other => Err(EngineError::invalid_enum("chunk_granularity", other)),
        }
    }
}

/// Process-wide configuration, fixed at engine open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Which embedding backend to load.
    pub embedding_backend: EmbeddingBackendKind,
    /// Directory holding the local static-embedding model files.
    pub local_model_path: String,
    /// Model identifier for the remote embedding API.
    pub remote_model: String,
    /// Base URL of the remote embedding API.
    pub remote_base_url: String,
    /// Default chunk granularity for `load_document`.
    pub chunk_granularity: ChunkGranularity,
    /// Embedding width. Must match the backend and any pre-existing
    /// vector tables in the database.
    pub vector_dimensions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            db_path: PathBuf::from("narrative.db"),
            embedding_backend: EmbeddingBackendKind::Local,
            local_model_path: DEFAULT_LOCAL_MODEL_PATH.into(),
            remote_model: DEFAULT_REMOTE_MODEL.into(),
            remote_base_url: DEFAULT_REMOTE_BASE_URL.into(),
            chunk_granularity: ChunkGranularity::Paragraph,
            vector_dimensions: DEFAULT_VECTOR_DIMENSIONS,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Takes
// ═══════════════════════════════════════════════════════════════════════════

/// Lifecycle status of a take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TakeStatus {
    Active,
    Archived,
    Trunk,
}

impl TakeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Trunk => "trunk",
        }
    }
}

impl FromStr for TakeStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            "trunk" => Ok(Self::Trunk),
            other => Err(EngineError::invalid_enum("status", other)),
        }
    }
}

/// A branch of narrative state. Takes form a forest; a take with no parent
/// is a root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Take {
    pub id: i64,
    pub parent_take_id: Option<i64>,
    /// Moment id where this take diverged from its parent. Informational
    /// only — gating uses ancestry and sequence.
    pub branch_point: Option<String>,
    pub created_at: String,
    pub status: TakeStatus,
    pub notes: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Moments & Characters
// ═══════════════════════════════════════════════════════════════════════════

/// A sequenced temporal marker. Sequence is the sole ordering authority;
/// wall-clock times are never used for gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Moment {
    pub id: String,
    pub sequence: i64,
    pub label: Option<String>,
    pub metadata: Option<Value>,
}

/// A persistent agent with free-form trait and voice bags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub traits: Value,
    pub voice: Value,
}

// ═══════════════════════════════════════════════════════════════════════════
// Facts & Knowledge
// ═══════════════════════════════════════════════════════════════════════════

/// How a character came to know a fact. The named variants cover the
/// common cases; `Custom` admits caller-defined tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeSource {
    Witnessed,
    Told,
    Inferred,
    Discovered,
    #[serde(untagged)]
    Custom(String),
}

impl KnowledgeSource {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Witnessed => "witnessed",
            Self::Told => "told",
            Self::Inferred => "inferred",
            Self::Discovered => "discovered",
            Self::Custom(s) => s,
        }
    }
}

impl FromStr for KnowledgeSource {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "witnessed" => Ok(Self::Witnessed),
            "told" => Ok(Self::Told),
            "inferred" => Ok(Self::Inferred),
            "discovered" => Ok(Self::Discovered),
            "" => Err(EngineError::invalid_enum("source", "")),
            other => Ok(Self::Custom(other.to_string())),
        }
    }
}

/// A fact as seen from a character's point of view: world truth joined
/// with how and when that character learned it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: i64,
    pub content: String,
    pub category: String,
    /// How the character learned it (from the knowledge event).
    pub source: Option<String>,
    /// When the character learned it (from the knowledge event).
    pub moment_id: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Experiential Memories
// ═══════════════════════════════════════════════════════════════════════════

/// The role an experiential memory played for its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Said,
    Heard,
    Internal,
    Perceived,
    Action,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Said => "said",
            Self::Heard => "heard",
            Self::Internal => "internal",
            Self::Perceived => "perceived",
            Self::Action => "action",
        }
    }
}

impl FromStr for ChunkType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "said" => Ok(Self::Said),
            "heard" => Ok(Self::Heard),
            "internal" => Ok(Self::Internal),
            "perceived" => Ok(Self::Perceived),
            "action" => Ok(Self::Action),
            other => Err(EngineError::invalid_enum("chunk_type", other)),
        }
    }
}

/// A retrievable chunk private to one character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: i64,
    pub chunk: String,
    pub chunk_type: ChunkType,
    pub tags: Value,
    pub moment_id: String,
    /// Distance from the query vector when retrieved by similarity.
    /// `None` for chronological reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Corpus
// ═══════════════════════════════════════════════════════════════════════════

/// Shared, ungated reference text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusChunk {
    pub id: i64,
    pub content: String,
    pub source: String,
    pub section: Option<String>,
    pub category: Option<String>,
    pub version: Option<String>,
    pub created_at: String,
    pub metadata: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// Optional predicates for corpus reads. Corpus is ungated: these are the
/// only filters that ever apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusFilter {
    pub source: Option<String>,
    pub category: Option<String>,
    pub version: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Query & Result Shapes
// ═══════════════════════════════════════════════════════════════════════════

/// Parameters for `query_state`. Build with `StateQuery::new` and adjust
/// fields as needed; limits default from `atoms::constants`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateQuery {
    pub character_id: String,
    pub moment_id: String,
    pub take_id: i64,
    /// If present, memories and corpus are retrieved by similarity to this
    /// text instead of chronologically / by recency.
    pub query_text: Option<String>,
    pub fact_limit: usize,
    pub memory_limit: usize,
    pub include_corpus: bool,
    pub corpus_limit: usize,
    pub corpus_category: Option<String>,
    pub corpus_version: Option<String>,
}

impl StateQuery {
    pub fn new(
        character_id: impl Into<String>,
        moment_id: impl Into<String>,
        take_id: i64,
    ) -> Self {
        StateQuery {
            character_id: character_id.into(),
            moment_id: moment_id.into(),
            take_id,
            query_text: None,
            fact_limit: DEFAULT_FACT_LIMIT,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            include_corpus: true,
            corpus_limit: DEFAULT_CORPUS_LIMIT,
            corpus_category: None,
            corpus_version: None,
        }
    }

    pub fn with_query_text(mut self, text: impl Into<String>) -> Self {
        self.query_text = Some(text.into());
        self
    }
}

/// Everything a character knows and has experienced up to a moment, in one
/// take lineage, plus the ungated corpus slice requested alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterState {
    pub character_id: String,
    pub moment_id: String,
    pub take_id: i64,
    pub facts: Vec<Fact>,
    pub memories: Vec<Memory>,
    pub corpus: Vec<CorpusChunk>,
    pub traits: Value,
    pub voice: Value,
}

/// Result of the atomic dialogue fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueResult {
    pub speaker_memory_id: i64,
    pub listener_memory_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_type_round_trip() {
        for s in ["said", "heard", "internal", "perceived", "action"] {
            assert_eq!(s.parse::<ChunkType>().unwrap().as_str(), s);
        }
        assert!("whispered".parse::<ChunkType>().is_err());
    }

    #[test]
    fn take_status_rejects_unknown() {
        assert!("active".parse::<TakeStatus>().is_ok());
        let err = "paused".parse::<TakeStatus>().unwrap_err();
        assert_eq!(err.kind(), "InvalidEnum");
    }

    #[test]
    fn knowledge_source_admits_custom_tags() {
        assert_eq!(
            "overheard".parse::<KnowledgeSource>().unwrap(),
            KnowledgeSource::Custom("overheard".into())
        );
        assert!("".parse::<KnowledgeSource>().is_err());
    }

    #[test]
    fn backend_kind_parses_kebab_case() {
        assert_eq!(
            "remote-api".parse::<EmbeddingBackendKind>().unwrap(),
            EmbeddingBackendKind::RemoteApi
        );
        assert!("openai".parse::<EmbeddingBackendKind>().is_err());
    }

    #[test]
    fn state_query_defaults() {
        let q = StateQuery::new("alice", "m1", 1);
        assert_eq!(q.fact_limit, DEFAULT_FACT_LIMIT);
        assert_eq!(q.memory_limit, DEFAULT_MEMORY_LIMIT);
        assert!(q.include_corpus);
        assert!(q.query_text.is_none());
    }
}
