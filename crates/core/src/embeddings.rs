use crate::cohere::{CohereClient, PROVIDER};
use crate::error::QueryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QueryError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, QueryError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| QueryError::ProviderResponse {
            provider: self.model_name().to_string(),
            details: "no embedding returned for query".to_string(),
        })
    }
}

/// Deterministic character-trigram embedder that needs no network access.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashingEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buf = [0u8; 4];
                for byte in ch.encode_utf8(&mut buf).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-trigram"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QueryError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    input_type: &'a str,
    truncate: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct CohereEmbedder {
    client: CohereClient,
    model: String,
    input_type: String,
    batch_size: usize,
}

impl CohereEmbedder {
    pub fn new(
        client: CohereClient,
        model: impl Into<String>,
        input_type: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            input_type: input_type.into(),
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl Embedder for CohereEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QueryError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let request = EmbedRequest {
                texts: batch,
                model: &self.model,
                input_type: &self.input_type,
                truncate: "END",
            };
            let response: EmbedResponse = self.client.post("v1/embed", &request).await?.json().await?;

            if response.embeddings.len() != batch.len() {
                return Err(QueryError::ProviderResponse {
                    provider: PROVIDER.to_string(),
                    details: format!(
                        "embedding count {} doesn't match text count {}",
                        response.embeddings.len(),
                        batch.len()
                    ),
                });
            }
            vectors.extend(response.embeddings);
        }

        tracing::debug!(model = %self.model, count = vectors.len(), "embedded texts");
        Ok(vectors)
    }
}
