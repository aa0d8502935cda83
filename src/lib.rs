// Phantom State — Narrative state engine with bounded character knowledge
//
// Guarantees, by construction, that a consumer (typically an LLM playing a
// character) can retrieve only the knowledge that character is entitled to
// at a given point in a story. Suppression by prompt is unreliable; this
// engine enforces structural absence: if information is not admitted by the
// temporal, branch, and ownership gates, it is not in the retrieval view.
//
// Layering:
//   atoms/     — pure types, constants, errors (no I/O)
//   engine/    — the engine, its SQLite store, and the document chunker
//   embedding/ — text → fixed-width vector backends

pub mod atoms;
pub mod embedding;
pub mod engine;

// ── Re-exports (public API surface) ────────────────────────────────────────

pub use atoms::constants;
pub use atoms::error::{EngineError, EngineResult};
pub use atoms::types::{
    Character, CharacterState, ChunkGranularity, ChunkType, CorpusChunk, CorpusFilter,
    DialogueResult, EmbeddingBackendKind, EngineConfig, Fact, KnowledgeSource, Memory, Moment,
    StateQuery, Take, TakeStatus,
};
pub use embedding::EmbeddingClient;
pub use engine::store::StateStore;
pub use engine::NarrativeStateEngine;
