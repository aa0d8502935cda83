// ── Phantom State Atoms: Error Types ───────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • One variant per failure kind in the public taxonomy; adapters read the
//     stable kind string via `kind()` and never match on variants.
//   • The `#[from]` attribute wires substrate error conversions automatically.
//   • Every message names the offending id or value.
//   • No variant carries secret material (API keys) in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced moment id does not exist.
    #[error("Unknown moment: {0}")]
    UnknownMoment(String),

    /// A referenced take id does not exist.
    #[error("Unknown take: {0}")]
    UnknownTake(i64),

    /// A referenced character id does not exist.
    #[error("Unknown character: {0}")]
    UnknownCharacter(String),

    /// A referenced fact id does not exist.
    #[error("Unknown fact: {0}")]
    UnknownFact(i64),

    /// An id supplied on create is already taken.
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    /// A moment sequence number is already taken.
    #[error("Duplicate sequence: {0}")]
    DuplicateSequence(i64),

    /// An enumerated field received a value outside its allowed set.
    #[error("Invalid {field} value: {value}")]
    InvalidEnum { field: &'static str, value: String },

    /// Vector width from a backend or stored table does not match the
    /// configured dimensionality.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding backend failed (model load failure, API error).
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// SQLite / rusqlite substrate failure.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem I/O failure (document loading, database files).
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored JSON attribute bag or vector blob failed to decode.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    /// Create an `InvalidEnum` error for a named field.
    pub fn invalid_enum(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidEnum { field, value: value.into() }
    }

    /// Create an `EmbeddingUnavailable` error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable(message.into())
    }

    /// The short, stable kind string for this error. Adapters that expose
    /// the engine over a wire protocol report `{ kind, message }` built from
    /// this and `to_string()`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownMoment(_) => "UnknownMoment",
            Self::UnknownTake(_) => "UnknownTake",
            Self::UnknownCharacter(_) => "UnknownCharacter",
            Self::UnknownFact(_) => "UnknownFact",
            Self::DuplicateId(_) => "DuplicateId",
            Self::DuplicateSequence(_) => "DuplicateSequence",
            Self::InvalidEnum { .. } => "InvalidEnum",
            Self::DimensionMismatch { .. } => "DimensionMismatch",
            Self::EmbeddingUnavailable(_) => "EmbeddingUnavailable",
            Self::Storage(_) | Self::Io(_) => "StorageError",
            Self::CorruptRecord(_) => "CorruptRecord",
        }
    }
}

// ── JSON decode failures are corrupt records ───────────────────────────────

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::CorruptRecord(e.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations return this type.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(EngineError::UnknownMoment("m9".into()).kind(), "UnknownMoment");
        assert_eq!(EngineError::DuplicateSequence(3).kind(), "DuplicateSequence");
        assert_eq!(
            EngineError::DimensionMismatch { expected: 384, actual: 1536 }.kind(),
            "DimensionMismatch"
        );
        let io: EngineError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(io.kind(), "StorageError");
    }

    #[test]
    fn messages_carry_offending_values() {
        let e = EngineError::invalid_enum("chunk_type", "whispered");
        assert!(e.to_string().contains("chunk_type"));
        assert!(e.to_string().contains("whispered"));
    }
}
