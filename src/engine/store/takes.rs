// Take operations. Takes form a forest; ancestry is the take plus its
// transitive parent chain and is the unit of branch gating.

use rusqlite::params;
use rusqlite::types::Value as SqlValue;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{Take, TakeStatus};

use super::StateStore;

impl Take {
    /// Map a row with columns (id, parent_take_id, branch_point, created_at,
    /// status, notes) → Take.
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(4)?;
        Ok(Take {
            id: row.get(0)?,
            parent_take_id: row.get(1)?,
            branch_point: row.get(2)?,
            created_at: row.get(3)?,
            status: status.parse().unwrap_or(TakeStatus::Active),
            notes: row.get(5)?,
        })
    }
}

impl StateStore {
    pub fn create_take(
        &self,
        parent_take_id: Option<i64>,
        branch_point: Option<&str>,
        notes: Option<&str>,
    ) -> EngineResult<i64> {
        if let Some(parent) = parent_take_id {
            self.require_take(parent)?;
        }
        if let Some(moment) = branch_point {
            self.require_moment(moment)?;
        }

        let conn = self.lock();
        conn.execute(
            "INSERT INTO takes (parent_take_id, branch_point, notes) VALUES (?1, ?2, ?3)",
            params![parent_take_id, branch_point, notes],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_take(&self, take_id: i64) -> EngineResult<Take> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, parent_take_id, branch_point, created_at, status, notes
             FROM takes WHERE id = ?1",
            [take_id],
            Take::from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => EngineError::UnknownTake(take_id),
            other => other.into(),
        })
    }

    pub fn set_take_status(&self, take_id: i64, status: TakeStatus) -> EngineResult<()> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE takes SET status = ?2 WHERE id = ?1",
            params![take_id, status.as_str()],
        )?;
        if updated == 0 {
            return Err(EngineError::UnknownTake(take_id));
        }
        Ok(())
    }

    /// Full lineage of take ids, root first, ending with the given take.
    pub fn get_ancestry(&self, take_id: i64) -> EngineResult<Vec<i64>> {
        self.require_take(take_id)?;

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
            SELECT id FROM ancestry",
        )?;

        // The CTE walks child → root; reverse for a root-first list.
        let mut ids: Vec<i64> = stmt
            .query_map([take_id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        ids.reverse();
        Ok(ids)
    }

    pub fn list_takes(
        &self,
        status: Option<TakeStatus>,
        branch_point: Option<&str>,
    ) -> EngineResult<Vec<Take>> {
        let mut sql = String::from(
            "SELECT id, parent_take_id, branch_point, created_at, status, notes
             FROM takes WHERE 1=1",
        );
        let mut sql_params: Vec<SqlValue> = Vec::new();

        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            sql_params.push(SqlValue::from(status.as_str().to_string()));
        }
        if let Some(moment) = branch_point {
            sql.push_str(" AND branch_point = ?");
            sql_params.push(SqlValue::from(moment.to_string()));
        }
        sql.push_str(" ORDER BY id");

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let takes = stmt
            .query_map(rusqlite::params_from_iter(sql_params), Take::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(takes)
    }

    /// Validate that a take exists, with a typed error.
    pub(crate) fn require_take(&self, take_id: i64) -> EngineResult<()> {
        let conn = self.lock();
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM takes WHERE id = ?1",
            [take_id],
            |r| r.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(EngineError::UnknownTake(take_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StateStore {
        StateStore::open_in_memory(4).unwrap()
    }

    #[test]
    fn create_take_defaults_to_active() {
        let store = store();
        let id = store.create_take(None, None, Some("first take")).unwrap();

        let take = store.get_take(id).unwrap();
        assert_eq!(take.status, TakeStatus::Active);
        assert_eq!(take.notes.as_deref(), Some("first take"));
        assert!(take.parent_take_id.is_none());
    }

    #[test]
    fn create_take_validates_parent_and_branch_point() {
        let store = store();
        assert_eq!(
            store.create_take(Some(99), None, None).unwrap_err().kind(),
            "UnknownTake"
        );
        let root = store.create_take(None, None, None).unwrap();
        assert_eq!(
            store
                .create_take(Some(root), Some("missing"), None)
                .unwrap_err()
                .kind(),
            "UnknownMoment"
        );
    }

    #[test]
    fn ancestry_single_take() {
        let store = store();
        let id = store.create_take(None, None, None).unwrap();
        assert_eq!(store.get_ancestry(id).unwrap(), vec![id]);
    }

    #[test]
    fn ancestry_chain_is_root_first() {
        let store = store();
        store.create_moment("m1", 1, None, None).unwrap();
        store.create_moment("m2", 2, None, None).unwrap();

        let root = store.create_take(None, None, None).unwrap();
        let child = store.create_take(Some(root), Some("m1"), None).unwrap();
        let grandchild = store.create_take(Some(child), Some("m2"), None).unwrap();

        assert_eq!(store.get_ancestry(grandchild).unwrap(), vec![root, child, grandchild]);
    }

    #[test]
    fn list_takes_by_status_and_branch_point() {
        let store = store();
        store.create_moment("m1", 1, None, None).unwrap();

        let t1 = store.create_take(None, None, None).unwrap();
        let t2 = store.create_take(Some(t1), Some("m1"), None).unwrap();
        store.set_take_status(t2, TakeStatus::Archived).unwrap();

        let active = store.list_takes(Some(TakeStatus::Active), None).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, t1);

        let at_m1 = store.list_takes(None, Some("m1")).unwrap();
        assert_eq!(at_m1.len(), 1);
        assert_eq!(at_m1[0].id, t2);
        assert_eq!(at_m1[0].status, TakeStatus::Archived);
    }

    #[test]
    fn set_status_on_unknown_take_fails() {
        let store = store();
        let err = store.set_take_status(42, TakeStatus::Trunk).unwrap_err();
        assert_eq!(err.kind(), "UnknownTake");
    }
}
