// Phantom State — Storage Substrate
// SQLite via rusqlite with the sqlite-vec extension registered at open,
// so every vector index lives in the same transactional store as the
// relational tables.
//
// Module layout:
//   schema     — idempotent migrations + vector dimension pinning
//   vectors    — f32⇄BLOB codec, vec0 DDL, surrogate table names
//   moments    — temporal markers
//   takes      — branches, ancestry, status
//   characters — registration + private vector store provisioning
//   facts      — facts, knowledge events, gated fact query
//   memories   — experiential memories, gated chronological/KNN queries
//   corpus     — shared ungated reference chunks

use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Once;

use crate::atoms::error::EngineResult;

mod characters;
mod corpus;
mod facts;
mod memories;
mod moments;
mod schema;
mod takes;
pub(crate) mod vectors;

pub use vectors::{bytes_to_f32_vec, f32_vec_to_bytes};

static VEC_EXTENSION: Once = Once::new();

/// Register sqlite-vec as an auto extension so every connection opened by
/// this process (including in-memory test databases) gets the `vec0` module.
fn register_vec_extension() {
    VEC_EXTENSION.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// Thread-safe database wrapper. Writes are serialized by the mutex;
/// SQLite provides the transactional boundary.
#[derive(Debug)]
pub struct StateStore {
    conn: Mutex<Connection>,
    dimensions: usize,
}

impl StateStore {
    /// Open (or create) the database, apply the schema, and pin the vector
    /// dimension. Fails `DimensionMismatch` when the database was created
    /// with a different width.
    pub fn open(path: impl AsRef<Path>, dimensions: usize) -> EngineResult<Self> {
        register_vec_extension();

        let path = path.as_ref();
        info!("[store] Opening narrative store at {:?}", path);

        let conn = Connection::open(path)?;
        Self::init(conn, dimensions)
    }

    /// In-memory store with the full schema. Used by tests.
    pub fn open_in_memory(dimensions: usize) -> EngineResult<Self> {
        register_vec_extension();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> EngineResult<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        schema::run_migrations(&conn)?;
        schema::pin_dimensions(&conn, dimensions)?;

        Ok(StateStore { conn: Mutex::new(conn), dimensions })
    }

    /// The vector width this store was opened with.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Lock the underlying connection. Internal helper for the domain
    /// modules; all public access goes through typed operations.
    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}
