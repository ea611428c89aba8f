use crate::cohere::CohereClient;
use crate::embeddings::CohereEmbedder;
use crate::error::{IngestError, QueryError};
use crate::index::VectorStoreIndex;
use crate::llm::{fragments_stream, CohereLlm, LanguageModel, TokenStream};
use crate::models::{Document, EngineSettings, NodeWithScore};
use crate::prompt::{render_context, PromptTemplate};
use crate::rerank::{CohereRerank, NodePostprocessor};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

#[derive(Clone)]
pub struct QueryEngineOptions {
    pub streaming: bool,
    pub similarity_top_k: usize,
    pub node_postprocessors: Vec<Arc<dyn NodePostprocessor>>,
}

impl Default for QueryEngineOptions {
    fn default() -> Self {
        Self {
            streaming: false,
            similarity_top_k: 2,
            node_postprocessors: Vec::new(),
        }
    }
}

pub struct StreamingResponse {
    pub response_gen: TokenStream,
    pub source_nodes: Vec<NodeWithScore>,
}

impl StreamingResponse {
    pub async fn collect_text(mut self) -> Result<String, QueryError> {
        let mut text = String::new();
        while let Some(fragment) = self.response_gen.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

/// Retrieval, postprocessing and answer synthesis bound to one document set.
pub struct QueryEngine {
    index: Arc<VectorStoreIndex>,
    llm: Arc<dyn LanguageModel>,
    options: QueryEngineOptions,
    qa_template: PromptTemplate,
}

impl QueryEngine {
    pub fn new(
        index: Arc<VectorStoreIndex>,
        llm: Arc<dyn LanguageModel>,
        options: QueryEngineOptions,
    ) -> Self {
        Self {
            index,
            llm,
            options,
            qa_template: PromptTemplate::default(),
        }
    }

    pub fn update_qa_template(&mut self, template: PromptTemplate) {
        self.qa_template = template;
    }

    pub fn qa_template(&self) -> &PromptTemplate {
        &self.qa_template
    }

    pub fn is_streaming(&self) -> bool {
        self.options.streaming
    }

    pub async fn retrieve(&self, prompt: &str) -> Result<Vec<NodeWithScore>, QueryError> {
        let mut nodes = self
            .index
            .retrieve(prompt, self.options.similarity_top_k)
            .await?;

        for postprocessor in &self.options.node_postprocessors {
            nodes = postprocessor.postprocess(nodes, prompt).await?;
        }

        Ok(nodes)
    }

    pub async fn query(&self, prompt: &str) -> Result<StreamingResponse, QueryError> {
        if prompt.trim().is_empty() {
            return Err(QueryError::Request("query is empty".to_string()));
        }

        let source_nodes = self.retrieve(prompt).await?;
        let full_prompt = self.qa_template.format(&render_context(&source_nodes), prompt);
        tracing::debug!(
            nodes = source_nodes.len(),
            model = self.llm.model_name(),
            "synthesizing answer"
        );

        let stream = self.llm.stream_complete(&full_prompt).await?;
        let response_gen = if self.options.streaming {
            stream
        } else {
            let text = StreamingResponse {
                response_gen: stream,
                source_nodes: Vec::new(),
            }
            .collect_text()
            .await?;
            fragments_stream(vec![text])
        };

        Ok(StreamingResponse {
            response_gen,
            source_nodes,
        })
    }
}

/// Turns loaded documents into a ready query engine.
#[async_trait]
pub trait EngineBuilder: Send + Sync {
    async fn build(
        &self,
        documents: Vec<Document>,
        credential: &str,
    ) -> Result<Arc<QueryEngine>, IngestError>;
}

pub struct CohereEngineBuilder {
    settings: EngineSettings,
    http: reqwest::Client,
}

impl CohereEngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

#[async_trait]
impl EngineBuilder for CohereEngineBuilder {
    async fn build(
        &self,
        documents: Vec<Document>,
        credential: &str,
    ) -> Result<Arc<QueryEngine>, IngestError> {
        let settings = &self.settings;
        let client = CohereClient::new(self.http.clone(), &settings.api_base, credential)?;

        let llm = CohereLlm::new(client.clone(), &settings.llm_model);
        let embedder = CohereEmbedder::new(
            client.clone(),
            &settings.embed_model,
            &settings.embed_input_type,
            settings.embed_batch_size,
        );

        let index =
            VectorStoreIndex::from_documents(&documents, Arc::new(embedder), settings.chunking)
                .await?;

        let rerank = CohereRerank::new(client, &settings.rerank_model, settings.rerank_top_n);
        let mut engine = index.as_query_engine(
            Arc::new(llm),
            QueryEngineOptions {
                streaming: true,
                similarity_top_k: settings.similarity_top_k,
                node_postprocessors: vec![Arc::new(rerank)],
            },
        );
        engine.update_qa_template(PromptTemplate::qa());

        tracing::info!(
            documents = documents.len(),
            llm = %settings.llm_model,
            embed = %settings.embed_model,
            "query engine ready"
        );
        Ok(Arc::new(engine))
    }
}
