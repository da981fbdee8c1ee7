//! OpenAI-compatible embeddings client (§4.G). Talks to any server that
//! implements the `POST /embeddings` contract: Ollama, LM Studio, OpenAI
//! itself. Grounded on the teacher's async collaborator style (see
//! `codegraph-orchestration/src/stages/vector_stage.rs`) rather than on
//! any particular HTTP client the teacher happened to use, since the
//! teacher has no network-bound stage of its own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::EmbeddingConfig;
use crate::errors::{CoreError, Result};

use super::EmbeddingClient;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

/// An `EmbeddingClient` backed by an OpenAI-compatible HTTP endpoint.
pub struct OpenAiEmbeddingClient {
    config: EmbeddingConfig,
    http: reqwest::Client,
}

impl OpenAiEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CoreError::embedding(format!("failed to build http client: {e}")))?;
        Ok(Self { config, http })
    }

    /// Sends one probe embedding and checks the returned dimensionality
    /// against the configured one. Call once at startup (§4.G: "the
    /// client validates its configured dimensionality against the
    /// provider on first use").
    pub async fn initialize(&self) -> Result<()> {
        let probe = self.embed_texts(&["test".to_string()]).await?;
        let actual = probe.first().map(|v| v.len()).unwrap_or(0);
        if actual != self.config.dimensions {
            error!("embedding service initialization failed: dimension mismatch");
            return Err(CoreError::dimension_mismatch(self.config.dimensions, actual));
        }
        info!(model = %self.config.model, "embedding service ready");
        Ok(())
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.api_url.trim_end_matches('/'));
        let request = EmbeddingRequest { model: &self.config.model, input: batch };

        let mut builder = self.http.post(&url).json(&request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder.send().await.map_err(|e| {
            warn!("embedding request failed: {e}");
            CoreError::embedding(format!("request to {url} failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::embedding(format!("provider returned {status}: {body}")));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CoreError::embedding(format!("failed to parse embedding response: {e}")))?;

        // Provider may not preserve request order; sort by index to match input order (§4.G).
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            let embeddings = self.embed_batch(batch).await?;
            all.extend(embeddings);
        }
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_config_at_construction() {
        let mut config = EmbeddingConfig::default();
        config.dimensions = 0;
        assert!(OpenAiEmbeddingClient::new(config).is_err());
    }

    #[test]
    fn builds_with_default_config() {
        let config = EmbeddingConfig::default();
        assert!(OpenAiEmbeddingClient::new(config).is_ok());
    }
}
