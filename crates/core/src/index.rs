use crate::chunking::build_nodes;
use crate::embeddings::Embedder;
use crate::engine::{QueryEngine, QueryEngineOptions};
use crate::error::{IngestError, QueryError};
use crate::llm::LanguageModel;
use crate::models::{ChunkingOptions, Document, NodeWithScore, TextNode};
use crate::traits::VectorStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-process store ranking nodes by cosine similarity.
#[derive(Default)]
pub struct SimpleVectorStore {
    entries: RwLock<Vec<(TextNode, Vec<f32>)>>,
}

#[async_trait]
impl VectorStore for SimpleVectorStore {
    async fn add(&self, nodes: &[TextNode], embeddings: &[Vec<f32>]) -> Result<(), QueryError> {
        if nodes.len() != embeddings.len() {
            return Err(QueryError::Request(format!(
                "embedding count {} doesn't match node count {}",
                embeddings.len(),
                nodes.len()
            )));
        }

        let mut entries = self.entries.write().await;
        entries.extend(nodes.iter().cloned().zip(embeddings.iter().cloned()));
        Ok(())
    }

    async fn query(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<NodeWithScore>, QueryError> {
        let entries = self.entries.read().await;

        let mut scored = Vec::with_capacity(entries.len());
        for (node, vector) in entries.iter() {
            if vector.len() != query_vector.len() {
                return Err(QueryError::Request(format!(
                    "query vector dim {} is not {}",
                    query_vector.len(),
                    vector.len()
                )));
            }
            scored.push(NodeWithScore {
                node: node.clone(),
                score: cosine_similarity(query_vector, vector),
            });
        }

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let dot = left
        .iter()
        .zip(right)
        .map(|(a, b)| f64::from(*a) * f64::from(*b))
        .sum::<f64>();
    let left_norm = left.iter().map(|a| f64::from(*a).powi(2)).sum::<f64>().sqrt();
    let right_norm = right.iter().map(|b| f64::from(*b).powi(2)).sum::<f64>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

pub struct VectorStoreIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl VectorStoreIndex {
    pub async fn from_documents(
        documents: &[Document],
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingOptions,
    ) -> Result<Self, IngestError> {
        Self::with_store(Arc::new(SimpleVectorStore::default()), documents, embedder, chunking).await
    }

    pub async fn with_store(
        store: Arc<dyn VectorStore>,
        documents: &[Document],
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingOptions,
    ) -> Result<Self, IngestError> {
        let nodes = build_nodes(documents, chunking)?;
        if nodes.is_empty() {
            return Err(QueryError::EmptyIndex("documents produced no text nodes".to_string()).into());
        }

        tracing::info!(
            documents = documents.len(),
            nodes = nodes.len(),
            model = embedder.model_name(),
            "generating embeddings"
        );

        let texts: Vec<String> = nodes
            .iter()
            .map(|node| format!("{}\n\n{}", node.metadata.render(), node.text))
            .collect();
        let embeddings = embedder.embed_documents(&texts).await?;
        store.add(&nodes, &embeddings).await?;

        Ok(Self { store, embedder })
    }

    pub async fn node_count(&self) -> usize {
        self.store.len().await
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<NodeWithScore>, QueryError> {
        let query_vector = self.embedder.embed_query(query).await?;
        self.store.query(&query_vector, top_k).await
    }

    pub fn as_query_engine(
        self,
        llm: Arc<dyn LanguageModel>,
        options: QueryEngineOptions,
    ) -> QueryEngine {
        QueryEngine::new(Arc::new(self), llm, options)
    }
}
