// Embedding generation through an external provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{DeskError, Result};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, preserving order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}

/// HTTP embedder speaking the OpenAI-compatible /embeddings wire format.
#[derive(Debug)]
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if self.api_key.is_empty() {
            return Err(DeskError::Embedding("missing embedding API key".into()));
        }

        let request = OpenAiEmbeddingRequest {
            input: texts,
            model: &self.model,
        };
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| DeskError::Embedding(format!("embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DeskError::Embedding(format!(
                "embedding request failed with {status}: {detail}"
            )));
        }

        let parsed: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| DeskError::Embedding(format!("invalid embedding response: {e}")))?;
        if parsed.data.len() != texts.len() {
            return Err(DeskError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Deterministic character-bag embedder for tests and dev mode. Similar texts
/// map to similar vectors, identical texts to identical vectors.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(2),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dimensions];
                for (i, c) in text.to_lowercase().chars().enumerate() {
                    let slot = (c as usize).wrapping_mul(31).wrapping_add(i / 7) % self.dimensions;
                    vector[slot] += 1.0;
                }
                vector
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(16);
        let a = embedder.embed(&["alpha".to_string()]).await.unwrap();
        let b = embedder.embed(&["alpha".to_string()]).await.unwrap();
        assert_eq!(a, b);

        let c = embedder.embed(&["completely different".to_string()]).await.unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let embedder = HashingEmbedder::default();
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
    }
}
