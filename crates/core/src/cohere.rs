use crate::error::QueryError;
use reqwest::{Client, Response};
use serde::Serialize;
use url::Url;

pub const PROVIDER: &str = "cohere";

/// Authenticated handle on the Cohere REST API shared by the embedder, LLM and reranker.
#[derive(Clone)]
pub struct CohereClient {
    http: Client,
    base: Url,
    api_key: String,
}

impl std::fmt::Debug for CohereClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CohereClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl CohereClient {
    pub fn new(http: Client, api_base: &str, api_key: impl Into<String>) -> Result<Self, QueryError> {
        let mut base = Url::parse(api_base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            http,
            base,
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, QueryError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, QueryError> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(QueryError::ProviderResponse {
                provider: PROVIDER.to_string(),
                details: format!("{path} returned {status}: {}", details.trim()),
            });
        }

        Ok(response)
    }
}
