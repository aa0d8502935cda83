// ── Vector codec and index DDL ─────────────────────────────────────────────
// Vectors cross the storage boundary as little-endian f32 BLOBs, the layout
// sqlite-vec consumes directly. Width mismatches are rejected here, at the
// codec boundary, never left for the index to discover.

use crate::atoms::error::{EngineError, EngineResult};

/// Convert a Vec<f32> to bytes for a vec0 column.
pub fn f32_vec_to_bytes(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a byte slice (from a SQLite BLOB) back to a Vec<f32>.
pub fn bytes_to_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Reject a vector whose width differs from the pinned dimensionality.
pub(crate) fn ensure_width(vec: &[f32], expected: usize) -> EngineResult<()> {
    if vec.len() != expected {
        return Err(EngineError::DimensionMismatch { expected, actual: vec.len() });
    }
    Ok(())
}

/// DDL for a vec0 virtual table holding `dimensions`-wide embeddings.
pub(crate) fn vec_table_ddl(table: &str, dimensions: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {table} USING vec0(embedding float[{dimensions}]);"
    )
}

/// Derive a surrogate vector-table name from a character id.
///
/// Only alphanumerics and underscores survive; anything else becomes `_`.
/// A leading digit gets an `m_` guard so the result is always a valid
/// identifier. The caller must still resolve collisions — the chosen name
/// is persisted in `characters.vec_table` and all later access goes through
/// that column, never through re-derivation.
pub(crate) fn surrogate_table_name(character_id: &str) -> String {
    let sanitized: String = character_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    let base = if sanitized.is_empty() || sanitized.chars().next().unwrap().is_ascii_digit() {
        format!("m_{sanitized}")
    } else {
        sanitized
    };

    format!("{base}_vec")
}
