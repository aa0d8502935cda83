// Local embedding backend — in-process static-embedding model (Model2Vec).
// Loading the weights is the cold-start cost; encoding afterwards is a
// static table lookup, fast enough for interactive use on short chunks.

use log::info;
use std::path::Path;

use crate::atoms::error::{EngineError, EngineResult};

/// In-process sentence-embedding model.
///
/// Expects a model directory containing `model.safetensors`,
/// `tokenizer.json`, and `config.json`.
pub struct LocalEmbedding {
    model: model2vec::Model2Vec,
    dimensions: usize,
}

impl std::fmt::Debug for LocalEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedding")
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl LocalEmbedding {
    pub fn load(model_path: impl AsRef<Path>) -> EngineResult<Self> {
        let model_path = model_path.as_ref();

        let safetensors = model_path.join("model.safetensors");
        if !safetensors.exists() {
            return Err(EngineError::embedding(format!(
                "local model not found at: {}",
                safetensors.display()
            )));
        }

        let path_str = model_path
            .to_str()
            .ok_or_else(|| EngineError::embedding("invalid UTF-8 in model path"))?;

        info!("[embedding] Loading local model from {}", model_path.display());

        let model = model2vec::Model2Vec::from_pretrained(path_str, Some(true), None)
            .map_err(|e| EngineError::embedding(format!("failed to load local model: {e}")))?;

        // Probe the width by encoding a test string once.
        let probe = model
            .encode(["probe"])
            .map_err(|e| EngineError::embedding(format!("failed to encode probe text: {e}")))?;
        let dimensions = probe.shape()[1];

        info!("[embedding] Local model ready ({}d)", dimensions);

        Ok(LocalEmbedding { model, dimensions })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        let embeddings = self
            .model
            .encode([text])
            .map_err(|e| EngineError::embedding(format!("failed to encode text: {e}")))?;
        Ok(embeddings.row(0).to_vec())
    }

    pub fn embed_batch(&self, texts: &[&str]) -> EngineResult<Vec<Vec<f32>>> {
        let embeddings = self
            .model
            .encode(texts)
            .map_err(|e| EngineError::embedding(format!("failed to encode texts: {e}")))?;
        Ok(embeddings
            .rows()
            .into_iter()
            .map(|row| row.to_vec())
            .collect())
    }
}
