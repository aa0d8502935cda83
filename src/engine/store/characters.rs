// Character registration and lookup. Registration provisions the private
// vector store in the same transaction as the characters-row insert, so a
// character either fully exists or not at all.

use log::info;
use rusqlite::params;
use serde_json::Value;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::Character;

use super::vectors::{surrogate_table_name, vec_table_ddl};
use super::StateStore;

/// Decode an optional JSON bag column; absent bags become `{}`.
fn decode_bag(raw: Option<String>) -> EngineResult<Value> {
    match raw {
        Some(text) => Ok(serde_json::from_str(&text)?),
        None => Ok(Value::Object(Default::default())),
    }
}

impl StateStore {
    /// Register a character and create their private vector table.
    ///
    /// Default is create-only: a second registration with the same id fails
    /// `DuplicateId`. With `upsert` the name and attribute bags are replaced
    /// in place and the existing memory store is kept.
    pub fn register_character(
        &self,
        id: &str,
        name: &str,
        traits: Option<&Value>,
        voice: Option<&Value>,
        upsert: bool,
    ) -> EngineResult<()> {
        let traits_json = traits.map(|v| v.to_string());
        let voice_json = voice.map(|v| v.to_string());

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM characters WHERE id = ?1",
            [id],
            |r| r.get(0),
        )?;

        if exists {
            if !upsert {
                return Err(EngineError::DuplicateId(id.to_string()));
            }
            tx.execute(
                "UPDATE characters SET name = ?2, traits = ?3, voice = ?4 WHERE id = ?1",
                params![id, name, traits_json, voice_json],
            )?;
            tx.commit()?;
            info!("[store] Re-registered character '{}' (attributes replaced)", id);
            return Ok(());
        }

        // Pick a surrogate table name, suffixing on sanitization collisions.
        let base = surrogate_table_name(id);
        let mut vec_table = base.clone();
        let mut suffix = 2;
        loop {
            let taken: bool = tx.query_row(
                "SELECT COUNT(*) > 0 FROM characters WHERE vec_table = ?1",
                [&vec_table],
                |r| r.get(0),
            )?;
            if !taken {
                break;
            }
            vec_table = format!("{base}{suffix}");
            suffix += 1;
        }

        tx.execute(
            "INSERT INTO characters (id, name, traits, voice, vec_table)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, name, traits_json, voice_json, vec_table],
        )?;
        tx.execute_batch(&vec_table_ddl(&vec_table, self.dimensions))?;
        tx.commit()?;

        info!("[store] Registered character '{}' (memory store: {})", id, vec_table);
        Ok(())
    }

    pub fn get_character(&self, character_id: &str) -> EngineResult<Character> {
        let conn = self.lock();
        let (id, name, traits_raw, voice_raw) = conn
            .query_row(
                "SELECT id, name, traits, voice FROM characters WHERE id = ?1",
                [character_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    EngineError::UnknownCharacter(character_id.to_string())
                }
                other => other.into(),
            })?;

        Ok(Character {
            id,
            name,
            traits: decode_bag(traits_raw)?,
            voice: decode_bag(voice_raw)?,
        })
    }

    /// The vector-table handle for a character's private memory store.
    /// Every memory read and write resolves the table through this column.
    pub(crate) fn vec_table_for(&self, character_id: &str) -> EngineResult<String> {
        let conn = self.lock();
        conn.query_row(
            "SELECT vec_table FROM characters WHERE id = ?1",
            [character_id],
            |r| r.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                EngineError::UnknownCharacter(character_id.to_string())
            }
            other => other.into(),
        })
    }

    /// Validate that a character exists, with a typed error.
    pub(crate) fn require_character(&self, character_id: &str) -> EngineResult<()> {
        self.vec_table_for(character_id).map(|_| ())
    }
}
