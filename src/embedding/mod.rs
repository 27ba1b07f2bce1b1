//! Embedding client: turns text into the vectors stored by the
//! relational+vector store and queried by RAG/Graph-RAG retrieval.

use crate::clients::HttpClientPool;
use crate::error::{PlatformError, PlatformResult};
use async_trait::async_trait;
use serde_json::{json, Value};

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> PlatformResult<Vec<f32>> {
        Ok(self.embed_batch(&[text.to_string()]).await?.into_iter().next().unwrap_or_default())
    }

    /// Batches requests to respect provider rate limits.
    async fn embed_batch(&self, texts: &[String]) -> PlatformResult<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;
}

pub struct OpenAIEmbeddingClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// Provider request cap; batches larger than this are split and issued
    /// sequentially to stay within the upstream per-request item limit.
    max_batch_size: usize,
}

impl OpenAIEmbeddingClient {
    pub fn new(pool: &HttpClientPool, api_key: &str, base_url: &str, model: &str) -> Self {
        Self {
            http: pool.get(base_url),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions: 1536,
            max_batch_size: 96,
        }
    }

    async fn embed_chunk(&self, texts: &[String]) -> PlatformResult<Vec<Vec<f32>>> {
        let body = json!({ "model": self.model, "input": texts });
        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(PlatformError::UpstreamUnavailable(format!("embeddings request failed: {status}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| PlatformError::UpstreamUnavailable(e.to_string()))?;
        let data = payload
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| PlatformError::UpstreamUnavailable("embeddings response missing data".into()))?;

        data.iter()
            .map(|item| {
                item.get("embedding")
                    .and_then(|e| e.as_array())
                    .map(|arr| arr.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
                    .ok_or_else(|| PlatformError::UpstreamUnavailable("embeddings response missing vector".into()))
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingClient for OpenAIEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> PlatformResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.max_batch_size) {
            out.extend(self.embed_chunk(chunk).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Deterministic zero-vector client for tests that don't exercise
/// embedding content, only the plumbing around it.
pub mod tests_support {
    use super::*;

    pub struct NullEmbeddingClient;

    #[async_trait]
    impl EmbeddingClient for NullEmbeddingClient {
        async fn embed_batch(&self, texts: &[String]) -> PlatformResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 8]).collect())
        }

        fn dimensions(&self) -> usize {
            8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEmbeddingClient;

    #[async_trait]
    impl EmbeddingClient for FakeEmbeddingClient {
        async fn embed_batch(&self, texts: &[String]) -> PlatformResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn embed_delegates_to_embed_batch() {
        let client = FakeEmbeddingClient;
        let vector = client.embed("hello").await.unwrap();
        assert_eq!(vector, vec![5.0, 0.0]);
    }
}
