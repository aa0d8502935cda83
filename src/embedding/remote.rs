// Remote embedding backend — OpenAI-compatible /v1/embeddings endpoint.
// Synchronous: blocking HTTP on the caller's thread, no engine-side retries.
// Every failure surfaces as EmbeddingUnavailable; the caller decides policy.

use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::atoms::constants::REMOTE_API_KEY_ENV;
use crate::atoms::error::{EngineError, EngineResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a hosted embedding service.
pub struct RemoteEmbedding {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl RemoteEmbedding {
    /// The API key is read from the environment, never from configuration
    /// files, and never appears in logs or error messages.
    pub fn new(base_url: &str, model: &str) -> Self {
        RemoteEmbedding {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: std::env::var(REMOTE_API_KEY_ENV).ok(),
        }
    }

    pub fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        let mut vectors = self.request(json!(text))?;
        vectors
            .pop()
            .ok_or_else(|| EngineError::embedding("empty embedding response"))
    }

    pub fn embed_batch(&self, texts: &[&str]) -> EngineResult<Vec<Vec<f32>>> {
        let vectors = self.request(json!(texts))?;
        if vectors.len() != texts.len() {
            return Err(EngineError::embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    /// POST /v1/embeddings { model, input } → { data: [{ embedding }, …] }
    fn request(&self, input: Value) -> EngineResult<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": input,
        });

        let mut request = self.client.post(&url).json(&body).timeout(REQUEST_TIMEOUT);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .map_err(|e| EngineError::embedding(format!("request to {url} failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            return Err(EngineError::embedding(format!(
                "embedding API returned {status} — {text}"
            )));
        }

        let v: Value = resp
            .json()
            .map_err(|e| EngineError::embedding(format!("malformed embedding response: {e}")))?;

        let data = v["data"]
            .as_array()
            .ok_or_else(|| EngineError::embedding("no 'data' array in embedding response"))?;

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let embedding = item["embedding"]
                .as_array()
                .ok_or_else(|| EngineError::embedding("no 'embedding' array in response item"))?;
            let vector: Vec<f32> = embedding
                .iter()
                .filter_map(|n| n.as_f64().map(|f| f as f32))
                .collect();
            if vector.is_empty() {
                return Err(EngineError::embedding("empty embedding vector in response"));
            }
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let backend = RemoteEmbedding::new("http://localhost:8080/", "test-model");
        assert_eq!(backend.base_url, "http://localhost:8080");
    }

    #[test]
    fn unreachable_host_surfaces_as_embedding_unavailable() {
        // Loopback port 9 (discard) is refused immediately on any sane host.
        let backend = RemoteEmbedding::new("http://127.0.0.1:9", "test-model");
        let err = backend.embed("hello").unwrap_err();
        assert_eq!(err.kind(), "EmbeddingUnavailable");
    }
}
