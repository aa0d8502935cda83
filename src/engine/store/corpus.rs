// Shared corpus. Corpus chunks are ungated reference text: no character,
// moment, or take predicate ever applies — only the caller's explicit
// source/category/version filters. Rows pair with the shared corpus_vec
// index and commit together.

use rusqlite::params;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::atoms::error::EngineResult;
use crate::atoms::types::{CorpusChunk, CorpusFilter};

use super::vectors::{ensure_width, f32_vec_to_bytes};
use super::StateStore;

/// Row shape before the metadata bag is decoded. Decoding happens outside
/// the row mapper so a corrupt bag raises `CorruptRecord` instead of
/// vanishing.
fn chunk_from_row(
    row: &rusqlite::Row<'_>,
    distance: Option<f64>,
) -> rusqlite::Result<(CorpusChunk, Option<String>)> {
    let metadata_raw: Option<String> = row.get(7)?;
    Ok((
        CorpusChunk {
            id: row.get(0)?,
            content: row.get(1)?,
            source: row.get(2)?,
            section: row.get(3)?,
            category: row.get(4)?,
            version: row.get(5)?,
            created_at: row.get(6)?,
            metadata: Value::Object(Default::default()),
            distance,
        },
        metadata_raw,
    ))
}

fn decode_metadata(rows: Vec<(CorpusChunk, Option<String>)>) -> EngineResult<Vec<CorpusChunk>> {
    let mut chunks = Vec::with_capacity(rows.len());
    for (mut chunk, raw) in rows {
        if let Some(raw) = raw {
            chunk.metadata = serde_json::from_str(&raw)?;
        }
        chunks.push(chunk);
    }
    Ok(chunks)
}

const CHUNK_COLUMNS: &str = "c.id, c.content, c.source, c.section, c.category, c.version, c.created_at, c.metadata";

/// Append optional corpus filters to a WHERE clause under construction.
fn push_filters(sql: &mut String, sql_params: &mut Vec<SqlValue>, filter: &CorpusFilter) {
    if let Some(ref source) = filter.source {
        sql.push_str(" AND c.source = ?");
        sql_params.push(SqlValue::from(source.clone()));
    }
    if let Some(ref category) = filter.category {
        sql.push_str(" AND c.category = ?");
        sql_params.push(SqlValue::from(category.clone()));
    }
    if let Some(ref version) = filter.version {
        sql.push_str(" AND c.version = ?");
        sql_params.push(SqlValue::from(version.clone()));
    }
}

impl StateStore {
    /// Insert one corpus chunk plus its embedding in one transaction.
    pub fn insert_corpus_chunk(
        &self,
        content: &str,
        source: &str,
        section: Option<&str>,
        category: Option<&str>,
        version: Option<&str>,
        metadata: Option<&Value>,
        embedding: &[f32],
    ) -> EngineResult<i64> {
        ensure_width(embedding, self.dimensions)?;
        let metadata_json = metadata.map(|m| m.to_string());

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO corpus (content, source, section, category, version, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![content, source, section, category, version, metadata_json],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO corpus_vec (rowid, embedding) VALUES (?1, ?2)",
            params![id, f32_vec_to_bytes(embedding)],
        )?;
        tx.commit()?;
        Ok(id)
    }

    /// Insert a batch of chunks sharing one provenance, atomically.
    /// `chunks` pairs each text with its embedding.
    pub fn insert_corpus_batch(
        &self,
        chunks: &[(String, Vec<f32>)],
        source: &str,
        category: Option<&str>,
        version: Option<&str>,
        metadata: Option<&Value>,
    ) -> EngineResult<Vec<i64>> {
        for (_, embedding) in chunks {
            ensure_width(embedding, self.dimensions)?;
        }
        let metadata_json = metadata.map(|m| m.to_string());

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(chunks.len());
        for (index, (content, embedding)) in chunks.iter().enumerate() {
            let section = format!("chunk-{}", index + 1);
            tx.execute(
                "INSERT INTO corpus (content, source, section, category, version, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![content, source, section, category, version, metadata_json],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO corpus_vec (rowid, embedding) VALUES (?1, ?2)",
                params![id, f32_vec_to_bytes(embedding)],
            )?;
            ids.push(id);
        }
        tx.commit()?;
        Ok(ids)
    }

    /// Remove every chunk of one source/version pair. Returns the count.
    pub fn delete_corpus_version(&self, source: &str, version: &str) -> EngineResult<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM corpus_vec WHERE rowid IN
             (SELECT id FROM corpus WHERE source = ?1 AND version = ?2)",
            params![source, version],
        )?;
        let removed = tx.execute(
            "DELETE FROM corpus WHERE source = ?1 AND version = ?2",
            params![source, version],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    /// Most-recent chunks matching the filters, newest first.
    pub fn query_corpus_recent(
        &self,
        filter: &CorpusFilter,
        limit: usize,
    ) -> EngineResult<Vec<CorpusChunk>> {
        let mut sql = format!("SELECT {CHUNK_COLUMNS} FROM corpus c WHERE 1=1");
        let mut sql_params: Vec<SqlValue> = Vec::new();
        push_filters(&mut sql, &mut sql_params, filter);
        sql.push_str(" ORDER BY c.created_at DESC, c.id DESC LIMIT ?");
        sql_params.push(SqlValue::from(limit as i64));

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(sql_params), |row| {
                chunk_from_row(row, None)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        decode_metadata(rows)
    }

    /// Top-k chunks by distance from the query vector, filtered only by the
    /// explicit predicates. Stable on (distance, chunk id).
    pub fn query_corpus_similarity(
        &self,
        query_vector: &[f32],
        filter: &CorpusFilter,
        limit: usize,
    ) -> EngineResult<Vec<CorpusChunk>> {
        ensure_width(query_vector, self.dimensions)?;

        let mut sql = format!(
            "SELECT {CHUNK_COLUMNS}, v.distance
             FROM corpus_vec v
             JOIN corpus c ON c.id = v.rowid
             WHERE v.embedding MATCH ? AND k = ?"
        );
        let mut sql_params: Vec<SqlValue> = vec![
            SqlValue::from(f32_vec_to_bytes(query_vector)),
            SqlValue::from(limit as i64),
        ];
        push_filters(&mut sql, &mut sql_params, filter);
        sql.push_str(" ORDER BY v.distance, c.id");

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(sql_params), |row| {
                let distance: f64 = row.get(8)?;
                chunk_from_row(row, Some(distance))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        decode_metadata(rows)
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

    fn store() -> StateStore {
        StateStore::open_in_memory(4).unwrap()
    }

    #[test]
    fn insert_and_read_recent() {
        let store = store();
        store
            .insert_corpus_chunk(
                "The dragon sleeps.",
                "bestiary",
                Some("ch1"),
                Some("lore"),
                Some("v1"),
                None,
                &unit(4, 0),
            )
            .unwrap();
        store
            .insert_corpus_chunk("The dragon wakes.", "bestiary", Some("ch2"), Some("lore"), Some("v1"), None, &unit(4, 1))
            .unwrap();

        let recent = store.query_corpus_recent(&CorpusFilter::default(), 10).unwrap();
        assert_eq!(recent.len(), 2);
        // Same timestamp second — id descending breaks the tie.
        assert_eq!(recent[0].content, "The dragon wakes.");
    }

    #[test]
    fn filters_compose() {
        let store = store();
        store
            .insert_corpus_chunk("a", "guide", None, Some("rules"), Some("v1"), None, &unit(4, 0))
            .unwrap();
        store
            .insert_corpus_chunk("b", "guide", None, Some("rules"), Some("v2"), None, &unit(4, 1))
            .unwrap();
        store
            .insert_corpus_chunk("c", "notes", None, Some("rules"), Some("v1"), None, &unit(4, 2))
            .unwrap();

        let filter = CorpusFilter {
            source: Some("guide".into()),
            category: Some("rules".into()),
            version: Some("v1".into()),
        };
        let hits = store.query_corpus_recent(&filter, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "a");
    }

    #[test]
    fn similarity_respects_filters_and_order() {
        let store = store();
        let near = store
            .insert_corpus_chunk("near", "guide", None, None, Some("v1"), None, &unit(4, 0))
            .unwrap();
        store
            .insert_corpus_chunk("far", "guide", None, None, Some("v1"), None, &unit(4, 3))
            .unwrap();
        store
            .insert_corpus_chunk("nearest but wrong version", "guide", None, None, Some("v2"), None, &unit(4, 0))
            .unwrap();

        let filter = CorpusFilter { version: Some("v1".into()), ..Default::default() };
        let hits = store.query_corpus_similarity(&unit(4, 0), &filter, 10).unwrap();
        assert_eq!(hits[0].id, near);
        assert!(hits.iter().all(|c| c.version.as_deref() == Some("v1")));
    }

    #[test]
    fn delete_corpus_version_counts_and_removes() {
        let store = store();
        for i in 0..3 {
            store
                .insert_corpus_chunk(&format!("c{i}"), "guide", None, None, Some("v1"), None, &unit(4, 0))
                .unwrap();
        }
        store
            .insert_corpus_chunk("keep", "guide", None, None, Some("v2"), None, &unit(4, 1))
            .unwrap();

        let removed = store.delete_corpus_version("guide", "v1").unwrap();
        assert_eq!(removed, 3);

        let left = store.query_corpus_recent(&CorpusFilter::default(), 10).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].content, "keep");

        // Vector rows went with them.
        let conn = store.lock();
        let vec_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM corpus_vec", [], |r| r.get(0))
            .unwrap();
        assert_eq!(vec_count, 1);
    }

    #[test]
    fn batch_insert_is_atomic_and_ordered() {
        let store = store();
        let chunks = vec![
            ("one".to_string(), unit(4, 0)),
            ("two".to_string(), unit(4, 1)),
        ];
        let ids = store
            .insert_corpus_batch(&chunks, "doc", Some("lore"), Some("v1"), None)
            .unwrap();
        assert_eq!(ids.len(), 2);

        let all = store.query_corpus_recent(&CorpusFilter::default(), 10).unwrap();
        let sections: Vec<Option<&str>> = all.iter().rev().map(|c| c.section.as_deref()).collect();
        assert_eq!(sections, vec![Some("chunk-1"), Some("chunk-2")]);
    }

    #[test]
    fn batch_insert_rejects_bad_width_before_writing() {
        let store = store();
        let chunks = vec![
            ("ok".to_string(), unit(4, 0)),
            ("bad".to_string(), unit(8, 0)),
        ];
        let err = store
            .insert_corpus_batch(&chunks, "doc", None, None, None)
            .unwrap_err();
        assert_eq!(err.kind(), "DimensionMismatch");

        assert!(store.query_corpus_recent(&CorpusFilter::default(), 10).unwrap().is_empty());
    }
}
