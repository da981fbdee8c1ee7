//! Embedding client (§4.G): batches texts through an OpenAI-compatible
//! `/embeddings` endpoint (Ollama, LM Studio, or the real thing),
//! preserving input order regardless of what order the provider answers
//! in. Grounded on `original_source/mrcis/src/mrcis/services/embedder.py`,
//! rebuilt against `reqwest`/`async_trait` the way the teacher's pipeline
//! stages call out to async collaborators.

mod openai;

pub use openai::OpenAiEmbeddingClient;

use async_trait::async_trait;

use crate::errors::Result;

/// A provider of text embeddings. One implementation per wire protocol;
/// `OpenAiEmbeddingClient` is the only one the mandatory scope requires.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embeds `texts` in `batch_size`-sized chunks, returning one vector
    /// per input text in the same order as `texts`.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single query string (e.g. for `search_code`).
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_texts(std::slice::from_ref(&query.to_string())).await?;
        Ok(results.remove(0))
    }

    /// The dimensionality this client's model produces.
    fn dimensions(&self) -> usize;
}
