// Phantom State — Narrative State Engine
//
// The engine owns the open store and the loaded embedding backend, and is
// the only write path. Every operation validates referential existence
// before touching rows, embeds before opening a transaction, and commits
// atomically. Reads compose take ancestry, the temporal cutoff, and the
// per-character ownership predicate — if information is not admitted by
// those gates, it is structurally absent from the result.
//
// Module layout:
//   store/     — SQLite substrate, schema, gated queries, vector indexes
//   chunker    — document splitting for corpus loading
//   mod.rs     — NarrativeStateEngine: the public operation set

pub mod chunker;
pub mod store;

use log::info;
use serde_json::Value;
use std::path::Path;

use crate::atoms::error::EngineResult;
use crate::atoms::types::{
    Character, CharacterState, ChunkGranularity, ChunkType, CorpusChunk, CorpusFilter,
    DialogueResult, EngineConfig, KnowledgeSource, Moment, StateQuery, Take, TakeStatus,
};
use crate::embedding::EmbeddingClient;
use store::StateStore;

/// Engine for managing narrative state with bounded character knowledge.
///
/// A library handle, not a singleton: open as many engines as you have
/// databases. The store handle and embedding backend are shared by all
/// callers of one instance; dropping the engine releases both.
pub struct NarrativeStateEngine {
    store: StateStore,
    embedding: EmbeddingClient,
    config: EngineConfig,
}

impl NarrativeStateEngine {
    /// Open the database, apply the schema, pin the vector dimension, and
    /// load the embedding backend.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        let store = StateStore::open(&config.db_path, config.vector_dimensions)?;
        let embedding = EmbeddingClient::from_config(&config)?;
        info!(
            "[engine] Open: db={:?} backend={} dims={}",
            config.db_path,
            config.embedding_backend.as_str(),
            config.vector_dimensions
        );
        Ok(NarrativeStateEngine { store, embedding, config })
    }

    /// Close the engine, releasing the store handle and any model weights.
    /// Consuming self makes a double close unrepresentable.
    pub fn close(self) {
        info!("[engine] Closed");
    }

    fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        self.embedding.embed(text, self.config.vector_dimensions)
    }

    // ── Moment operations ──────────────────────────────────────────────

    /// Create a temporal marker. Sequence numbers are globally unique and
    /// are the only ordering authority for gating.
    pub fn create_moment(
        &self,
        id: &str,
        sequence: i64,
        label: Option<&str>,
        metadata: Option<&Value>,
    ) -> EngineResult<String> {
        self.store.create_moment(id, sequence, label, metadata)?;
        Ok(id.to_string())
    }

    pub fn get_moment(&self, moment_id: &str) -> EngineResult<Moment> {
        self.store.get_moment(moment_id)
    }

    /// Sequence number for a moment.
    pub fn moment_sequence(&self, moment_id: &str) -> EngineResult<i64> {
        self.store.moment_sequence(moment_id)
    }

    // ── Take operations ────────────────────────────────────────────────

    pub fn create_take(
        &self,
        parent_take_id: Option<i64>,
        branch_point: Option<&str>,
        notes: Option<&str>,
    ) -> EngineResult<i64> {
        let id = self.store.create_take(parent_take_id, branch_point, notes)?;
        info!("[engine] Created take {} (parent: {:?})", id, parent_take_id);
        Ok(id)
    }

    /// Branch from a parent take at a moment. Purely additive: nothing in
    /// the parent lineage is touched.
    pub fn branch(
        &self,
        parent_take_id: i64,
        branch_point: &str,
        notes: Option<&str>,
    ) -> EngineResult<i64> {
        self.create_take(Some(parent_take_id), Some(branch_point), notes)
    }

    pub fn set_take_status(&self, take_id: i64, status: TakeStatus) -> EngineResult<()> {
        self.store.set_take_status(take_id, status)
    }

    /// Full lineage of take ids, root first.
    pub fn get_ancestry(&self, take_id: i64) -> EngineResult<Vec<i64>> {
        self.store.get_ancestry(take_id)
    }

    pub fn list_takes(
        &self,
        status: Option<TakeStatus>,
        branch_point: Option<&str>,
    ) -> EngineResult<Vec<Take>> {
        self.store.list_takes(status, branch_point)
    }

    // ── Character operations ───────────────────────────────────────────

    /// Register a character and provision their private memory store.
    /// Create-only unless `upsert` is set.
    pub fn register_character(
        &self,
        id: &str,
        name: &str,
        traits: Option<&Value>,
        voice: Option<&Value>,
        upsert: bool,
    ) -> EngineResult<String> {
        self.store.register_character(id, name, traits, voice, upsert)?;
        Ok(id.to_string())
    }

    pub fn get_character(&self, character_id: &str) -> EngineResult<Character> {
        self.store.get_character(character_id)
    }

    // ── Fact & knowledge operations ────────────────────────────────────

    /// Record a world truth. Facts never belong to a character.
    pub fn log_fact(&self, content: &str, category: &str, moment_id: &str) -> EngineResult<i64> {
        self.store.log_fact(content, category, moment_id)
    }

    /// Record that a character learned a fact. Idempotent on
    /// (character, fact, take): repeats return the existing event id.
    pub fn log_knowledge(
        &self,
        character_id: &str,
        fact_id: i64,
        moment_id: &str,
        take_id: i64,
        source: Option<&KnowledgeSource>,
    ) -> EngineResult<i64> {
        self.store
            .log_knowledge(character_id, fact_id, moment_id, take_id, source)
    }

    // ── Memory operations ──────────────────────────────────────────────

    /// Store an experiential memory for a character. Embeds first, so a
    /// failing provider aborts the write with no partial state.
    pub fn embed_memory(
        &self,
        character_id: &str,
        chunk: &str,
        moment_id: &str,
        take_id: i64,
        chunk_type: ChunkType,
        tags: Option<&Value>,
    ) -> EngineResult<i64> {
        self.store.require_character(character_id)?;
        self.store.require_moment(moment_id)?;
        self.store.require_take(take_id)?;

        let embedding = self.embed(chunk)?;
        self.store
            .insert_memory(character_id, chunk, moment_id, take_id, chunk_type, tags, &embedding)
    }

    /// Atomic dialogue fan-out: the speaker receives a `said` memory, each
    /// listener a `heard` memory with identical content, moment, and take.
    /// All inserts commit together or none do. Duplicate listeners are
    /// dropped, keeping the first occurrence.
    pub fn dialogue(
        &self,
        speaker: &str,
        content: &str,
        moment_id: &str,
        take_id: i64,
        listeners: &[&str],
        speaker_tags: Option<&Value>,
        listener_tags: Option<&Value>,
    ) -> EngineResult<DialogueResult> {
        self.store.require_character(speaker)?;
        self.store.require_moment(moment_id)?;
        self.store.require_take(take_id)?;

        let mut unique: Vec<String> = Vec::with_capacity(listeners.len());
        for listener in listeners {
            if !unique.iter().any(|l| l == listener) {
                self.store.require_character(listener)?;
                unique.push((*listener).to_string());
            }
        }

        // One utterance, one vector: the content is identical for every
        // participant, so it is embedded once, before the transaction.
        let embedding = self.embed(content)?;
        let (speaker_memory_id, listener_memory_ids) = self.store.insert_dialogue(
            speaker,
            &unique,
            content,
            moment_id,
            take_id,
            speaker_tags,
            listener_tags,
            &embedding,
        )?;

        info!(
            "[engine] Dialogue at {}: '{}' spoke to {} listener(s)",
            moment_id,
            speaker,
            listener_memory_ids.len()
        );
        Ok(DialogueResult { speaker_memory_id, listener_memory_ids })
    }

    // ── Corpus operations ──────────────────────────────────────────────

    /// Load one chunk of shared reference text into the corpus.
    pub fn load_corpus_chunk(
        &self,
        content: &str,
        source: &str,
        section: Option<&str>,
        category: Option<&str>,
        version: Option<&str>,
        metadata: Option<&Value>,
    ) -> EngineResult<i64> {
        let embedding = self.embed(content)?;
        self.store
            .insert_corpus_chunk(content, source, section, category, version, metadata, &embedding)
    }

    /// Read a document from disk, split it, embed every chunk, and insert
    /// the batch atomically. Returns the new corpus ids in document order.
    pub fn load_document(
        &self,
        path: impl AsRef<Path>,
        source: &str,
        category: &str,
        version: Option<&str>,
        chunker: Option<ChunkGranularity>,
        metadata: Option<&Value>,
    ) -> EngineResult<Vec<i64>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;

        let granularity = chunker.unwrap_or(self.config.chunk_granularity);
        let chunks = chunker::split(&text, granularity);
        if chunks.is_empty() {
            info!("[corpus] Document {:?} produced no chunks", path);
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let embeddings = self
            .embedding
            .embed_batch(&texts, self.config.vector_dimensions)?;

        let pairs: Vec<(String, Vec<f32>)> = chunks.into_iter().zip(embeddings).collect();
        let ids = self
            .store
            .insert_corpus_batch(&pairs, source, Some(category), version, metadata)?;

        info!(
            "[corpus] Loaded {:?} as '{}': {} chunk(s) ({})",
            path,
            source,
            ids.len(),
            granularity.as_str()
        );
        Ok(ids)
    }

    /// Remove every corpus chunk of one source/version pair.
    pub fn delete_corpus_version(&self, source: &str, version: &str) -> EngineResult<usize> {
        let removed = self.store.delete_corpus_version(source, version)?;
        info!("[corpus] Deleted {} chunk(s) of {}@{}", removed, source, version);
        Ok(removed)
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Everything a character knows and has experienced up to a moment, in
    /// one take lineage. With query text, memories and corpus come back by
    /// similarity; without, memories are chronological and corpus is
    /// most-recent. Corpus is ungated — only the explicit category/version
    /// predicates apply to it.
    pub fn query_state(&self, query: &StateQuery) -> EngineResult<CharacterState> {
        let character = self.store.get_character(&query.character_id)?;
        self.store.require_moment(&query.moment_id)?;
        self.store.require_take(query.take_id)?;

        let query_vector = match query.query_text.as_deref() {
            Some(text) => Some(self.embed(text)?),
            None => None,
        };

        let facts = self.store.query_facts(
            &query.character_id,
            &query.moment_id,
            query.take_id,
            query.fact_limit,
        )?;

        let memories = match query_vector.as_deref() {
            Some(vector) => self.store.query_memories_similarity(
                &query.character_id,
                &query.moment_id,
                query.take_id,
                vector,
                query.memory_limit,
            )?,
            None => self.store.query_memories_chronological(
                &query.character_id,
                &query.moment_id,
                query.take_id,
                query.memory_limit,
            )?,
        };

        let corpus = if query.include_corpus {
            let filter = CorpusFilter {
                source: None,
                category: query.corpus_category.clone(),
                version: query.corpus_version.clone(),
            };
            match query_vector.as_deref() {
                Some(vector) => {
                    self.store
                        .query_corpus_similarity(vector, &filter, query.corpus_limit)?
                }
                None => self.store.query_corpus_recent(&filter, query.corpus_limit)?,
            }
        } else {
            Vec::new()
        };

        Ok(CharacterState {
            character_id: query.character_id.clone(),
            moment_id: query.moment_id.clone(),
            take_id: query.take_id,
            facts,
            memories,
            corpus,
            traits: character.traits,
            voice: character.voice,
        })
    }

    /// Similarity search over the shared corpus. Results depend only on the
    /// query text and the explicit filters — never on character, moment, or
    /// take.
    pub fn query_corpus(
        &self,
        query_text: &str,
        filter: &CorpusFilter,
        limit: usize,
    ) -> EngineResult<Vec<CorpusChunk>> {
        let vector = self.embed(query_text)?;
        self.store.query_corpus_similarity(&vector, filter, limit)
    }
}
