use crate::error::QueryError;
use crate::models::{NodeWithScore, TextNode};
use async_trait::async_trait;

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(&self, nodes: &[TextNode], embeddings: &[Vec<f32>]) -> Result<(), QueryError>;

    async fn query(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<NodeWithScore>, QueryError>;

    async fn len(&self) -> usize;
}
