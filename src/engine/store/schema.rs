// Database schema and migrations for the narrative store.
// Called once at open by StateStore::init() after WAL is enabled.
// Adding a new table or column: append an idempotent CREATE TABLE IF NOT
// EXISTS or ALTER TABLE … ADD COLUMN at the end of run_migrations() — never
// modify existing SQL to keep upgrade paths clean.

use log::info;
use rusqlite::Connection;

use crate::atoms::constants::DIMENSIONS_CONFIG_KEY;
use crate::atoms::error::{EngineError, EngineResult};

use super::vectors::vec_table_ddl;

pub(crate) fn run_migrations(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS moments (
            id TEXT PRIMARY KEY,
            sequence INTEGER NOT NULL UNIQUE,
            label TEXT,
            metadata TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_moments_sequence ON moments(sequence);

        CREATE TABLE IF NOT EXISTS takes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_take_id INTEGER,
            branch_point TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            status TEXT NOT NULL DEFAULT 'active',
            notes TEXT,
            FOREIGN KEY (parent_take_id) REFERENCES takes(id),
            FOREIGN KEY (branch_point) REFERENCES moments(id)
        );

        CREATE INDEX IF NOT EXISTS idx_takes_parent ON takes(parent_take_id);
        CREATE INDEX IF NOT EXISTS idx_takes_status ON takes(status);

        CREATE TABLE IF NOT EXISTS characters (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            traits TEXT,
            voice TEXT,
            vec_table TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS facts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content TEXT NOT NULL,
            category TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (created_at) REFERENCES moments(id)
        );

        CREATE TABLE IF NOT EXISTS knowledge_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            character_id TEXT NOT NULL,
            fact_id INTEGER NOT NULL,
            moment_id TEXT NOT NULL,
            take_id INTEGER NOT NULL,
            source TEXT,
            UNIQUE (character_id, fact_id, take_id),
            FOREIGN KEY (character_id) REFERENCES characters(id),
            FOREIGN KEY (fact_id) REFERENCES facts(id),
            FOREIGN KEY (moment_id) REFERENCES moments(id),
            FOREIGN KEY (take_id) REFERENCES takes(id)
        );

        CREATE INDEX IF NOT EXISTS idx_knowledge_character
            ON knowledge_events(character_id);
        CREATE INDEX IF NOT EXISTS idx_knowledge_take
            ON knowledge_events(take_id);

        CREATE TABLE IF NOT EXISTS memory_metadata (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            character_id TEXT NOT NULL,
            chunk TEXT NOT NULL,
            moment_id TEXT NOT NULL,
            take_id INTEGER NOT NULL,
            chunk_type TEXT NOT NULL,
            tags TEXT,
            FOREIGN KEY (character_id) REFERENCES characters(id),
            FOREIGN KEY (moment_id) REFERENCES moments(id),
            FOREIGN KEY (take_id) REFERENCES takes(id)
        );

        CREATE INDEX IF NOT EXISTS idx_memory_lookup
            ON memory_metadata(character_id, moment_id, take_id, chunk_type);

        CREATE TABLE IF NOT EXISTS corpus (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content TEXT NOT NULL,
            source TEXT NOT NULL,
            section TEXT,
            category TEXT,
            version TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            metadata TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_corpus_source
            ON corpus(source, category, version);

        CREATE TABLE IF NOT EXISTS engine_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;

    Ok(())
}

/// Record the vector width on first open; fail loudly on a mismatch with
/// an existing database. Creates the shared corpus vector index once the
/// width is settled.
pub(crate) fn pin_dimensions(conn: &Connection, dimensions: usize) -> EngineResult<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM engine_config WHERE key = ?1",
            [DIMENSIONS_CONFIG_KEY],
            |r| r.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    match stored {
        Some(value) => {
            let existing: usize = value
                .parse()
                .map_err(|_| EngineError::CorruptRecord(format!(
                    "stored vector_dimensions is not an integer: {value}"
                )))?;
            if existing != dimensions {
                return Err(EngineError::DimensionMismatch {
                    expected: dimensions,
                    actual: existing,
                });
            }
        }
        None => {
            conn.execute(
                "INSERT INTO engine_config (key, value) VALUES (?1, ?2)",
                rusqlite::params![DIMENSIONS_CONFIG_KEY, dimensions.to_string()],
            )?;
            info!("[store] Pinned vector dimensions to {}", dimensions);
        }
    }

    conn.execute_batch(&vec_table_ddl("corpus_vec", dimensions))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn in_memory_db() -> Connection {
        crate::engine::store::register_vec_extension();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn migrations_run_cleanly() {
        let conn = in_memory_db();
        let result = run_migrations(&conn);
        assert!(result.is_ok(), "First migration run failed: {:?}", result);
    }

    #[test]
    fn migrations_idempotent() {
        let conn = in_memory_db();
        run_migrations(&conn).unwrap();
        let result = run_migrations(&conn);
        assert!(result.is_ok(), "Second migration run failed: {:?}", result);
    }

    #[test]
    fn core_tables_created() {
        let conn = in_memory_db();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for expected in [
            "moments",
            "takes",
            "characters",
            "facts",
            "knowledge_events",
            "memory_metadata",
            "corpus",
            "engine_config",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn pin_dimensions_detects_mismatch() {
        let conn = in_memory_db();
        run_migrations(&conn).unwrap();

        pin_dimensions(&conn, 384).unwrap();
        pin_dimensions(&conn, 384).unwrap();

        let err = pin_dimensions(&conn, 1536).unwrap_err();
        assert_eq!(err.kind(), "DimensionMismatch");
    }
}
