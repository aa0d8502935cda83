// Facts and knowledge events. Facts are world truths independent of
// observers; a knowledge event records that one character came to know one
// fact in one take at one moment. The gated fact query composes take
// ancestry, the temporal cutoff, and the ownership predicate.

use rusqlite::params;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{Fact, KnowledgeSource};

use super::StateStore;

impl StateStore {
    pub fn log_fact(&self, content: &str, category: &str, moment_id: &str) -> EngineResult<i64> {
        self.require_moment(moment_id)?;

        let conn = self.lock();
        conn.execute(
            "INSERT INTO facts (content, category, created_at) VALUES (?1, ?2, ?3)",
            params![content, category, moment_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Record that a character learned a fact. At most one learning event
    /// exists per (character, fact, take): repeat calls return the existing
    /// event id unchanged, even when source or moment differ.
    pub fn log_knowledge(
        &self,
        character_id: &str,
        fact_id: i64,
        moment_id: &str,
        take_id: i64,
        source: Option<&KnowledgeSource>,
    ) -> EngineResult<i64> {
        self.require_character(character_id)?;
        self.require_fact(fact_id)?;
        self.require_moment(moment_id)?;
        self.require_take(take_id)?;

        let conn = self.lock();

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM knowledge_events
                 WHERE character_id = ?1 AND fact_id = ?2 AND take_id = ?3",
                params![character_id, fact_id, take_id],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        if let Some(id) = existing {
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO knowledge_events (character_id, fact_id, moment_id, take_id, source)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![character_id, fact_id, moment_id, take_id, source.map(|s| s.as_str())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Facts known by a character at a moment, within a take lineage.
    /// Chronological on (sequence, fact id).
    pub fn query_facts(
        &self,
        character_id: &str,
        moment_id: &str,
        take_id: i64,
        limit: usize,
    ) -> EngineResult<Vec<Fact>> {
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
            SELECT f.id, f.content, f.category, ke.source, ke.moment_id
            FROM facts f
            JOIN knowledge_events ke ON ke.fact_id = f.id
            JOIN moments m ON m.id = ke.moment_id
            WHERE ke.character_id = ?2
              AND ke.take_id IN (SELECT id FROM ancestry)
              AND m.sequence <= (SELECT sequence FROM moments WHERE id = ?3)
            ORDER BY m.sequence, f.id
            LIMIT ?4",
        )?;

        let facts = stmt
            .query_map(
                params![take_id, character_id, moment_id, limit as i64],
                |row| {
                    Ok(Fact {
                        id: row.get(0)?,
                        content: row.get(1)?,
                        category: row.get(2)?,
                        source: row.get(3)?,
                        moment_id: row.get(4)?,
                    })
                },
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(facts)
    }

    /// Validate that a fact exists, with a typed error.
    pub(crate) fn require_fact(&self, fact_id: i64) -> EngineResult<()> {
        let conn = self.lock();
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM facts WHERE id = ?1",
            [fact_id],
            |r| r.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(EngineError::UnknownFact(fact_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (StateStore, i64) {
        let store = StateStore::open_in_memory(4).unwrap();
        store.register_character("alice", "Alice", None, None, false).unwrap();
        store.create_moment("m1", 1, None, None).unwrap();
        store.create_moment("m2", 2, None, None).unwrap();
        let take = store.create_take(None, None, None).unwrap();
        (store, take)
    }

    #[test]
    fn log_fact_requires_moment() {
        let (store, _) = seeded();
        let err = store.log_fact("x", "info", "missing").unwrap_err();
        assert_eq!(err.kind(), "UnknownMoment");
    }

    #[test]
    fn log_knowledge_is_idempotent_per_take() {
        let (store, take) = seeded();
        let fid = store.log_fact("Secret info", "secret", "m1").unwrap();

        let e1 = store
            .log_knowledge("alice", fid, "m1", take, Some(&KnowledgeSource::Discovered))
            .unwrap();
        let e2 = store
            .log_knowledge("alice", fid, "m2", take, Some(&KnowledgeSource::Told))
            .unwrap();
        assert_eq!(e1, e2, "first write wins; repeat returns existing id");

        // A different take lineage gets its own event.
        let other = store.create_take(None, None, None).unwrap();
        let e3 = store
            .log_knowledge("alice", fid, "m1", other, Some(&KnowledgeSource::Told))
            .unwrap();
        assert_ne!(e1, e3);
    }

    #[test]
    fn log_knowledge_validates_references() {
        let (store, take) = seeded();
        let fid = store.log_fact("f", "info", "m1").unwrap();

        assert_eq!(
            store.log_knowledge("ghost", fid, "m1", take, None).unwrap_err().kind(),
            "UnknownCharacter"
        );
        assert_eq!(
            store.log_knowledge("alice", 999, "m1", take, None).unwrap_err().kind(),
            "UnknownFact"
        );
        assert_eq!(
            store.log_knowledge("alice", fid, "mx", take, None).unwrap_err().kind(),
            "UnknownMoment"
        );
        assert_eq!(
            store.log_knowledge("alice", fid, "m1", 77, None).unwrap_err().kind(),
            "UnknownTake"
        );
    }

    #[test]
    fn query_facts_respects_temporal_cutoff() {
        let (store, take) = seeded();
        store.create_moment("m3", 3, None, None).unwrap();

        let f1 = store.log_fact("Early fact", "info", "m1").unwrap();
        let f2 = store.log_fact("Middle fact", "info", "m2").unwrap();
        let f3 = store.log_fact("Late fact", "info", "m3").unwrap();
        store.log_knowledge("alice", f1, "m1", take, None).unwrap();
        store.log_knowledge("alice", f2, "m2", take, None).unwrap();
        store.log_knowledge("alice", f3, "m3", take, None).unwrap();

        let at_m2 = store.query_facts("alice", "m2", take, 50).unwrap();
        let ids: Vec<i64> = at_m2.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![f1, f2]);
    }

    #[test]
    fn query_facts_includes_ancestor_takes_only() {
        let (store, root) = seeded();

        let root_fact = store.log_fact("Root knowledge", "info", "m1").unwrap();
        store.log_knowledge("alice", root_fact, "m1", root, None).unwrap();

        let branch = store.create_take(Some(root), Some("m2"), None).unwrap();
        let branch_fact = store.log_fact("Branch knowledge", "info", "m2").unwrap();
        store.log_knowledge("alice", branch_fact, "m2", branch, None).unwrap();

        let from_branch = store.query_facts("alice", "m2", branch, 50).unwrap();
        let contents: Vec<&str> = from_branch.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(contents, vec!["Root knowledge", "Branch knowledge"]);

        let from_root = store.query_facts("alice", "m2", root, 50).unwrap();
        let contents: Vec<&str> = from_root.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(contents, vec!["Root knowledge"]);
    }
}
