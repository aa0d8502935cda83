// Experiential memories. Each row has a metadata half (memory_metadata) and
// a vector half (the owner's private vec0 table, addressed only through the
// handle stored in characters.vec_table). Both halves commit in one
// transaction. The caller embeds before the transaction, so a failing
// provider aborts the logical write with no partial state.

use rusqlite::params;
use serde_json::Value;

use crate::atoms::error::EngineResult;
use crate::atoms::types::{ChunkType, Memory};

use super::vectors::{ensure_width, f32_vec_to_bytes};
use super::StateStore;

/// Row shape before the tags bag is decoded. Decoding happens outside the
/// row mapper so a corrupt bag raises `CorruptRecord` instead of vanishing.
fn memory_from_row(
    row: &rusqlite::Row<'_>,
    distance: Option<f64>,
) -> rusqlite::Result<(Memory, Option<String>)> {
    let chunk_type: String = row.get(2)?;
    let tags_raw: Option<String> = row.get(3)?;
    Ok((
        Memory {
            id: row.get(0)?,
            chunk: row.get(1)?,
            chunk_type: chunk_type.parse().unwrap_or(ChunkType::Perceived),
            tags: Value::Object(Default::default()),
            moment_id: row.get(4)?,
            distance,
        },
        tags_raw,
    ))
}

fn decode_tags(rows: Vec<(Memory, Option<String>)>) -> EngineResult<Vec<Memory>> {
    let mut memories = Vec::with_capacity(rows.len());
    for (mut memory, raw) in rows {
        if let Some(raw) = raw {
            memory.tags = serde_json::from_str(&raw)?;
        }
        memories.push(memory);
    }
    Ok(memories)
}

impl StateStore {
    /// Insert one memory row plus its embedding. The embedding must already
    /// be computed; its width is checked against the pinned dimensionality
    /// before anything touches the database.
    pub fn insert_memory(
        &self,
        character_id: &str,
        chunk: &str,
        moment_id: &str,
        take_id: i64,
        chunk_type: ChunkType,
        tags: Option<&Value>,
        embedding: &[f32],
    ) -> EngineResult<i64> {
        ensure_width(embedding, self.dimensions)?;
        let vec_table = self.vec_table_for(character_id)?;
        self.require_moment(moment_id)?;
        self.require_take(take_id)?;

        let tags_json = tags.map(|t| t.to_string());

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO memory_metadata (character_id, chunk, moment_id, take_id, chunk_type, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![character_id, chunk, moment_id, take_id, chunk_type.as_str(), tags_json],
        )?;
        let memory_id = tx.last_insert_rowid();
        tx.execute(
            &format!("INSERT INTO {vec_table} (rowid, embedding) VALUES (?1, ?2)"),
            params![memory_id, f32_vec_to_bytes(embedding)],
        )?;
        tx.commit()?;
        Ok(memory_id)
    }

    /// Fan one utterance out to the speaker and each listener atomically.
    /// All rows share content, moment, and take; either every memory lands
    /// or none do. Listeners must already be de-duplicated and validated.
    pub fn insert_dialogue(
        &self,
        speaker: &str,
        listeners: &[String],
        content: &str,
        moment_id: &str,
        take_id: i64,
        speaker_tags: Option<&Value>,
        listener_tags: Option<&Value>,
        embedding: &[f32],
    ) -> EngineResult<(i64, Vec<i64>)> {
        ensure_width(embedding, self.dimensions)?;
        self.require_moment(moment_id)?;
        self.require_take(take_id)?;

        let speaker_table = self.vec_table_for(speaker)?;
        let mut listener_tables = Vec::with_capacity(listeners.len());
        for listener in listeners {
            listener_tables.push(self.vec_table_for(listener)?);
        }

        let blob = f32_vec_to_bytes(embedding);
        let speaker_tags_json = speaker_tags.map(|t| t.to_string());
        let listener_tags_json = listener_tags.map(|t| t.to_string());

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let fan_out = |character_id: &str,
                       vec_table: &str,
                       chunk_type: ChunkType,
                       tags_json: &Option<String>|
         -> EngineResult<i64> {
            tx.execute(
                "INSERT INTO memory_metadata (character_id, chunk, moment_id, take_id, chunk_type, tags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![character_id, content, moment_id, take_id, chunk_type.as_str(), tags_json],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                &format!("INSERT INTO {vec_table} (rowid, embedding) VALUES (?1, ?2)"),
                params![id, blob],
            )?;
            Ok(id)
        };

        let speaker_memory_id =
            fan_out(speaker, &speaker_table, ChunkType::Said, &speaker_tags_json)?;
        let mut listener_memory_ids = Vec::with_capacity(listeners.len());
        for (listener, table) in listeners.iter().zip(&listener_tables) {
            listener_memory_ids.push(fan_out(
                listener,
                table,
                ChunkType::Heard,
                &listener_tags_json,
            )?);
        }

        tx.commit()?;
        Ok((speaker_memory_id, listener_memory_ids))
    }

    /// Memories owned by a character at a moment within a take lineage,
    /// chronological on (sequence, memory id).
    pub fn query_memories_chronological(
        &self,
        character_id: &str,
        moment_id: &str,
        take_id: i64,
        limit: usize,
    ) -> EngineResult<Vec<Memory>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "WITH RECURSIVE ancestry(id) AS (
                SELECT ?1
                UNION ALL
                SELECT t.parent_take_id
                FROM takes t
                JOIN ancestry a ON t.id = a.id
                WHERE t.parent_take_id IS NOT NULL
            )
            SELECT mm.id, mm.chunk, mm.chunk_type, mm.tags, mm.moment_id
            FROM memory_metadata mm
            JOIN moments mo ON mo.id = mm.moment_id
            WHERE mm.character_id = ?2
              AND mm.take_id IN (SELECT id FROM ancestry)
              AND mo.sequence <= (SELECT sequence FROM moments WHERE id = ?3)
            ORDER BY mo.sequence, mm.id
            LIMIT ?4",
        )?;

        let rows = stmt
            .query_map(
                params![take_id, character_id, moment_id, limit as i64],
                |row| memory_from_row(row, None),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        decode_tags(rows)
    }

    /// Top-k memories by distance from the query vector, gated by the same
    /// ancestry and temporal predicates. Stable on (distance, memory id).
    pub fn query_memories_similarity(
        &self,
        character_id: &str,
        moment_id: &str,
        take_id: i64,
        query_vector: &[f32],
        limit: usize,
    ) -> EngineResult<Vec<Memory>> {
        ensure_width(query_vector, self.dimensions)?;
        let vec_table = self.vec_table_for(character_id)?;

        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "WITH RECURSIVE ancestry(id) AS (
                SELECT ?1
                UNION ALL
                SELECT t.parent_take_id
                FROM takes t
                JOIN ancestry a ON t.id = a.id
                WHERE t.parent_take_id IS NOT NULL
            )
            SELECT mm.id, mm.chunk, mm.chunk_type, mm.tags, mm.moment_id, mv.distance
            FROM {vec_table} mv
            JOIN memory_metadata mm ON mm.id = mv.rowid
            JOIN moments mo ON mo.id = mm.moment_id
            WHERE mv.embedding MATCH ?2
              AND k = ?3
              AND mm.character_id = ?4
              AND mm.take_id IN (SELECT id FROM ancestry)
              AND mo.sequence <= (SELECT sequence FROM moments WHERE id = ?5)
            ORDER BY mv.distance, mm.id"
        ))?;

        let rows = stmt
            .query_map(
                params![
                    take_id,
                    f32_vec_to_bytes(query_vector),
                    limit as i64,
                    character_id,
                    moment_id
                ],
                |row| {
                    let distance: f64 = row.get(5)?;
                    memory_from_row(row, Some(distance))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        decode_tags(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dim];
        v[hot] = 1.0;
        v
    }

    fn seeded() -> (StateStore, i64) {
        let store = StateStore::open_in_memory(4).unwrap();
        store.register_character("alice", "Alice", None, None, false).unwrap();
        store.register_character("bob", "Bob", None, None, false).unwrap();
        store.create_moment("m1", 1, None, None).unwrap();
        store.create_moment("m2", 2, None, None).unwrap();
        store.create_moment("m3", 3, None, None).unwrap();
        let take = store.create_take(None, None, None).unwrap();
        (store, take)
    }

    #[test]
    fn insert_memory_writes_both_halves() {
        let (store, take) = seeded();
        let id = store
            .insert_memory(
                "alice",
                "I saw something strange in the garden.",
                "m1",
                take,
                ChunkType::Perceived,
                Some(&serde_json::json!({"location": "garden"})),
                &unit(4, 0),
            )
            .unwrap();

        let conn = store.lock();
        let chunk: String = conn
            .query_row("SELECT chunk FROM memory_metadata WHERE id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(chunk, "I saw something strange in the garden.");

        let vec_row: i64 = conn
            .query_row("SELECT rowid FROM alice_vec WHERE rowid = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(vec_row, id);
    }

    #[test]
    fn insert_memory_rejects_wrong_width() {
        let (store, take) = seeded();
        let err = store
            .insert_memory("alice", "x", "m1", take, ChunkType::Internal, None, &unit(8, 0))
            .unwrap_err();
        assert_eq!(err.kind(), "DimensionMismatch");

        // No metadata row leaked.
        let conn = store.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM memory_metadata", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn chronological_query_gates_by_moment() {
        let (store, take) = seeded();
        for (chunk, moment) in [("First thing", "m1"), ("Second thing", "m2"), ("Third thing", "m3")] {
            store
                .insert_memory("alice", chunk, moment, take, ChunkType::Perceived, None, &unit(4, 1))
                .unwrap();
        }

        let at_m2 = store
            .query_memories_chronological("alice", "m2", take, 20)
            .unwrap();
        let chunks: Vec<&str> = at_m2.iter().map(|m| m.chunk.as_str()).collect();
        assert_eq!(chunks, vec!["First thing", "Second thing"]);
    }

    #[test]
    fn memories_are_not_shared_between_characters() {
        let (store, take) = seeded();
        store
            .insert_memory("alice", "A secret door opens", "m1", take, ChunkType::Perceived, None, &unit(4, 0))
            .unwrap();

        let alice = store.query_memories_chronological("alice", "m1", take, 20).unwrap();
        let bob = store.query_memories_chronological("bob", "m1", take, 20).unwrap();
        assert_eq!(alice.len(), 1);
        assert!(bob.is_empty());
    }

    #[test]
    fn similarity_query_orders_by_distance() {
        let (store, take) = seeded();
        let near = store
            .insert_memory("alice", "red apple", "m1", take, ChunkType::Perceived, None, &unit(4, 0))
            .unwrap();
        let far = store
            .insert_memory("alice", "weather", "m1", take, ChunkType::Perceived, None, &unit(4, 3))
            .unwrap();

        let results = store
            .query_memories_similarity("alice", "m2", take, &unit(4, 0), 10)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, near);
        assert_eq!(results[1].id, far);
        assert!(results[0].distance.unwrap() < results[1].distance.unwrap());
    }

    #[test]
    fn corrupt_tags_surface_as_corrupt_record() {
        let (store, take) = seeded();
        let id = store
            .insert_memory("alice", "x", "m1", take, ChunkType::Internal, None, &unit(4, 0))
            .unwrap();

        {
            let conn = store.lock();
            conn.execute(
                "UPDATE memory_metadata SET tags = '{not json' WHERE id = ?1",
                [id],
            )
            .unwrap();
        }

        let err = store
            .query_memories_chronological("alice", "m1", take, 20)
            .unwrap_err();
        assert_eq!(err.kind(), "CorruptRecord");
    }

    #[test]
    fn similarity_query_still_gated_by_take() {
        let (store, root) = seeded();
        let sibling = store.create_take(None, None, None).unwrap();
        store
            .insert_memory("alice", "only in sibling", "m1", sibling, ChunkType::Perceived, None, &unit(4, 0))
            .unwrap();

        let from_root = store
            .query_memories_similarity("alice", "m3", root, &unit(4, 0), 10)
            .unwrap();
        assert!(from_root.is_empty());
    }
}
