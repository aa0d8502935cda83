// Moment operations. Moments are immutable after creation and their
// sequence numbers are the only ordering authority for gating.

use rusqlite::params;
use serde_json::Value;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::Moment;

use super::StateStore;

impl Moment {
    /// Map a row with columns (id, sequence, label, metadata) → Moment.
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Self, Option<String>)> {
        let raw_metadata: Option<String> = row.get(3)?;
        Ok((
            Moment {
                id: row.get(0)?,
                sequence: row.get(1)?,
                label: row.get(2)?,
                metadata: None,
            },
            raw_metadata,
        ))
    }
}

impl StateStore {
    pub fn create_moment(
        &self,
        id: &str,
        sequence: i64,
        label: Option<&str>,
        metadata: Option<&Value>,
    ) -> EngineResult<()> {
        let conn = self.lock();

        let id_taken: bool = conn
            .query_row("SELECT COUNT(*) > 0 FROM moments WHERE id = ?1", [id], |r| r.get(0))?;
        if id_taken {
            return Err(EngineError::DuplicateId(id.to_string()));
        }

        let sequence_taken: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM moments WHERE sequence = ?1",
            [sequence],
            |r| r.get(0),
        )?;
        if sequence_taken {
            return Err(EngineError::DuplicateSequence(sequence));
        }

        let metadata_json = metadata.map(|m| m.to_string());
        conn.execute(
            "INSERT INTO moments (id, sequence, label, metadata) VALUES (?1, ?2, ?3, ?4)",
            params![id, sequence, label, metadata_json],
        )?;
        Ok(())
    }

    pub fn get_moment(&self, moment_id: &str) -> EngineResult<Moment> {
        let conn = self.lock();
        let (mut moment, raw_metadata) = conn
            .query_row(
                "SELECT id, sequence, label, metadata FROM moments WHERE id = ?1",
                [moment_id],
                Moment::from_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    EngineError::UnknownMoment(moment_id.to_string())
                }
                other => other.into(),
            })?;

        if let Some(raw) = raw_metadata {
            moment.metadata = Some(serde_json::from_str(&raw)?);
        }
        Ok(moment)
    }

    /// Sequence number for a moment, `UnknownMoment` if the id is missing.
    pub fn moment_sequence(&self, moment_id: &str) -> EngineResult<i64> {
        let conn = self.lock();
        conn.query_row(
            "SELECT sequence FROM moments WHERE id = ?1",
            [moment_id],
            |r| r.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                EngineError::UnknownMoment(moment_id.to_string())
            }
            other => other.into(),
        })
    }

    /// Validate that a moment exists, with a typed error.
    pub(crate) fn require_moment(&self, moment_id: &str) -> EngineResult<()> {
        self.moment_sequence(moment_id).map(|_| ())
    }
}
