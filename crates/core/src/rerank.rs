use crate::cohere::{CohereClient, PROVIDER};
use crate::error::QueryError;
use crate::models::NodeWithScore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stage that reorders or filters retrieved nodes before synthesis.
#[async_trait]
pub trait NodePostprocessor: Send + Sync {
    async fn postprocess(
        &self,
        nodes: Vec<NodeWithScore>,
        query: &str,
    ) -> Result<Vec<NodeWithScore>, QueryError>;
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

#[derive(Debug, Clone)]
pub struct CohereRerank {
    client: CohereClient,
    model: String,
    top_n: usize,
}

impl CohereRerank {
    pub fn new(client: CohereClient, model: impl Into<String>, top_n: usize) -> Self {
        Self {
            client,
            model: model.into(),
            top_n,
        }
    }
}

#[async_trait]
impl NodePostprocessor for CohereRerank {
    async fn postprocess(
        &self,
        nodes: Vec<NodeWithScore>,
        query: &str,
    ) -> Result<Vec<NodeWithScore>, QueryError> {
        if nodes.is_empty() {
            return Ok(nodes);
        }

        let request = RerankRequest {
            model: &self.model,
            query,
            documents: nodes.iter().map(|hit| hit.node.text.as_str()).collect(),
            top_n: self.top_n.min(nodes.len()),
        };
        let response: RerankResponse = self.client.post("v1/rerank", &request).await?.json().await?;

        let reranked = apply_rerank(nodes, &response.results)?;
        tracing::debug!(model = %self.model, kept = reranked.len(), "reranked nodes");
        Ok(reranked)
    }
}

fn apply_rerank(
    nodes: Vec<NodeWithScore>,
    results: &[RerankResult],
) -> Result<Vec<NodeWithScore>, QueryError> {
    let mut slots: Vec<Option<NodeWithScore>> = nodes.into_iter().map(Some).collect();
    let mut reranked = Vec::with_capacity(results.len());

    for result in results {
        let mut hit = slots
            .get_mut(result.index)
            .and_then(Option::take)
            .ok_or_else(|| QueryError::ProviderResponse {
                provider: PROVIDER.to_string(),
                details: format!("rerank result index {} is out of range or repeated", result.index),
            })?;
        hit.score = result.relevance_score;
        reranked.push(hit);
    }

    Ok(reranked)
}

#[cfg(test)]
mod tests {
    use super::{apply_rerank, RerankResult};
    use crate::models::{DocumentMetadata, NodeWithScore, TextNode};

    fn hit(id: &str, score: f64) -> NodeWithScore {
        NodeWithScore {
            node: TextNode {
                node_id: id.to_string(),
                doc_id: "doc".to_string(),
                text: format!("text of {id}"),
                metadata: DocumentMetadata {
                    file_name: "doc.pdf".to_string(),
                    file_path: "/tmp/doc.pdf".to_string(),
                    page_label: "1".to_string(),
                },
            },
            score,
        }
    }

    #[test]
    fn results_reorder_and_rescore_nodes() {
        let nodes = vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7)];
        let results = vec![
            RerankResult {
                index: 2,
                relevance_score: 0.99,
            },
            RerankResult {
                index: 0,
                relevance_score: 0.42,
            },
        ];

        let reranked = apply_rerank(nodes, &results).unwrap();
        let ids: Vec<&str> = reranked.iter().map(|hit| hit.node.node_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(reranked[0].score, 0.99);
    }

    #[test]
    fn repeated_index_is_rejected() {
        let nodes = vec![hit("a", 0.9)];
        let results = vec![
            RerankResult {
                index: 0,
                relevance_score: 0.5,
            },
            RerankResult {
                index: 0,
                relevance_score: 0.4,
            },
        ];
        assert!(apply_rerank(nodes, &results).is_err());
    }
}
