//! Tavily web search client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::WebSearchProvider;
use crate::sources::{SearchResponse, SourceRecord};
use crate::{ResearchError, SecretValue};

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RESULTS: usize = 1;

pub struct TavilyClient {
    api_key: SecretValue,
    client: Client,
    endpoint: String,
    max_results: usize,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    raw_content: Option<String>,
}

impl TavilyClient {
    pub fn new(api_key: SecretValue) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            api_key,
            client,
            endpoint: TAVILY_ENDPOINT.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    #[cfg(test)]
    fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl WebSearchProvider for TavilyClient {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(
        &self,
        query: &str,
        _loop_index: u32,
    ) -> Result<SearchResponse, ResearchError> {
        debug!(%query, max_results = self.max_results, "tavily search");

        let payload = json!({
            "api_key": self.api_key.expose(),
            "query": query,
            "max_results": self.max_results,
            "include_raw_content": true,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ResearchError::source_unavailable("tavily", err.to_string()))?;

        if !response.status().is_success() {
            return Err(ResearchError::source_unavailable(
                "tavily",
                format!("search endpoint returned {}", response.status()),
            ));
        }

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|err| ResearchError::source_unavailable("tavily", err.to_string()))?;

        let results = body
            .results
            .into_iter()
            .map(|result| SourceRecord {
                title: result.title,
                url: result.url,
                content: result.content,
                raw_content: result.raw_content,
            })
            .collect();

        Ok(SearchResponse { results })
    }
}
