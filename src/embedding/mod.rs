// Phantom State — Embedding Pipeline
//
// Turns text into fixed-width f32 vectors. Three interchangeable backends:
//   local.rs  — in-process static-embedding model (cold-start on open)
//   remote.rs — OpenAI-compatible HTTP embedding API
//   hash.rs   — deterministic feature hashing (development and tests)
//
// The contract is width-stable: every vector a client returns has exactly
// `vector_dimensions` elements, checked here so no caller ever inserts a
// mis-sized vector.

pub mod hash;
pub mod local;
pub mod remote;

pub use hash::HashEmbedding;
pub use local::LocalEmbedding;
pub use remote::RemoteEmbedding;

use log::info;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{EmbeddingBackendKind, EngineConfig};

/// Embedding client — dispatches to the backend selected at engine open.
pub enum EmbeddingClient {
    Local(LocalEmbedding),
    Remote(RemoteEmbedding),
    Hash(HashEmbedding),
}

impl EmbeddingClient {
    /// Build the configured backend. Local models load eagerly so the
    /// cold-start cost lands at open, not on the first write.
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let client = match config.embedding_backend {
            EmbeddingBackendKind::Local => {
                EmbeddingClient::Local(LocalEmbedding::load(&config.local_model_path)?)
            }
            EmbeddingBackendKind::RemoteApi => EmbeddingClient::Remote(RemoteEmbedding::new(
                &config.remote_base_url,
                &config.remote_model,
            )),
            EmbeddingBackendKind::Hash => {
                EmbeddingClient::Hash(HashEmbedding::new(config.vector_dimensions))
            }
        };
        info!(
            "[embedding] Backend ready: {}",
            config.embedding_backend.as_str()
        );
        Ok(client)
    }

    /// Embed a single text, enforcing the configured width.
    pub fn embed(&self, text: &str, dimensions: usize) -> EngineResult<Vec<f32>> {
        let vector = match self {
            Self::Local(backend) => backend.embed(text)?,
            Self::Remote(backend) => backend.embed(text)?,
            Self::Hash(backend) => backend.embed(text),
        };
        check_width(&vector, dimensions)?;
        Ok(vector)
    }

    /// Embed a batch of texts, enforcing the configured width on each.
    pub fn embed_batch(&self, texts: &[&str], dimensions: usize) -> EngineResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = match self {
            Self::Local(backend) => backend.embed_batch(texts)?,
            Self::Remote(backend) => backend.embed_batch(texts)?,
            Self::Hash(backend) => texts.iter().map(|t| backend.embed(t)).collect(),
        };
        for vector in &vectors {
            check_width(vector, dimensions)?;
        }
        Ok(vectors)
    }
}

fn check_width(vector: &[f32], expected: usize) -> EngineResult<()> {
    if vector.len() != expected {
        return Err(EngineError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_client_respects_width() {
        let client = EmbeddingClient::Hash(HashEmbedding::new(16));
        let v = client.embed("hello world", 16).unwrap();
        assert_eq!(v.len(), 16);
    }

    #[test]
    fn width_mismatch_is_rejected_before_storage() {
        // A backend wired for 16 dims against a store pinned at 8.
        let client = EmbeddingClient::Hash(HashEmbedding::new(16));
        let err = client.embed("hello", 8).unwrap_err();
        assert_eq!(err.kind(), "DimensionMismatch");
    }

    #[test]
    fn empty_batch_short_circuits() {
        let client = EmbeddingClient::Hash(HashEmbedding::new(8));
        assert!(client.embed_batch(&[], 8).unwrap().is_empty());
    }
}
