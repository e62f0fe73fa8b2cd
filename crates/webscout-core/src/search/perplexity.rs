//! Perplexity web search client.
//!
//! Perplexity answers a query with one synthesized body of text plus a list
//! of citations. The first citation carries the full content; the remaining
//! citations become reference-only records so the aggregator can cite them
//! without duplicating the text.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::WebSearchProvider;
use crate::sources::{SearchResponse, SourceRecord};
use crate::{ResearchError, SecretValue};

const PERPLEXITY_ENDPOINT: &str = "https://api.perplexity.ai/chat/completions";
const PERPLEXITY_MODEL: &str = "sonar-pro";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const FALLBACK_CITATION: &str = "https://perplexity.ai";

pub struct PerplexityClient {
    api_key: SecretValue,
    client: Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct PerplexityResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl PerplexityClient {
    pub fn new(api_key: SecretValue) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            api_key,
            client,
            endpoint: PERPLEXITY_ENDPOINT.to_string(),
        }
    }

    #[cfg(test)]
    fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl WebSearchProvider for PerplexityClient {
    fn name(&self) -> &'static str {
        "perplexity"
    }

    fn include_raw_content(&self) -> bool {
        false
    }

    async fn search(&self, query: &str, loop_index: u32) -> Result<SearchResponse, ResearchError> {
        debug!(%query, loop_index, "perplexity search");

        let payload = json!({
            "model": PERPLEXITY_MODEL,
            "messages": [
                { "role": "system",
                  "content": "Search the web and provide factual information with sources." },
                { "role": "user", "content": query },
            ],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|err| ResearchError::source_unavailable("perplexity", err.to_string()))?;

        if !response.status().is_success() {
            return Err(ResearchError::source_unavailable(
                "perplexity",
                format!("chat endpoint returned {}", response.status()),
            ));
        }

        let body: PerplexityResponse = response
            .json()
            .await
            .map_err(|err| ResearchError::source_unavailable("perplexity", err.to_string()))?;

        let content = body
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                ResearchError::source_unavailable("perplexity", "response carried no choices")
            })?;

        let citations = if body.citations.is_empty() {
            vec![FALLBACK_CITATION.to_string()]
        } else {
            body.citations
        };

        let search_label = loop_index + 1;
        let mut results = vec![SourceRecord {
            title: format!("Perplexity Search {search_label}, Source 1"),
            url: citations[0].clone(),
            content: content.clone(),
            raw_content: Some(content),
        }];

        for (i, citation) in citations.iter().enumerate().skip(1) {
            results.push(SourceRecord {
                title: format!("Perplexity Search {search_label}, Source {}", i + 1),
                url: citation.clone(),
                content: "See above for full content".to_string(),
                raw_content: None,
            });
        }

        Ok(SearchResponse { results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::require_env;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_key() -> SecretValue {
        unsafe { std::env::set_var("PERPLEXITY_TEST_KEY", "pplx-test"); }
        require_env("PERPLEXITY_TEST_KEY").unwrap()
    }

    #[tokio::test]
    async fn citations_fan_out_into_reference_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer pplx-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [ { "message": { "content": "the facts" } } ],
                "citations": ["https://a.example", "https://b.example", "https://c.example"]
            })))
            .mount(&server)
            .await;

        let client = PerplexityClient::new(test_key())
            .with_endpoint(format!("{}/chat/completions", server.uri()));
        let response = client.search("what is graphene", 1).await.unwrap();

        assert_eq!(response.results.len(), 3);
        assert_eq!(response.results[0].title, "Perplexity Search 2, Source 1");
        assert_eq!(response.results[0].raw_content.as_deref(), Some("the facts"));
        assert_eq!(response.results[2].url, "https://c.example");
        assert_eq!(response.results[2].content, "See above for full content");
        assert!(response.results[2].raw_content.is_none());
    }

    #[tokio::test]
    async fn missing_citations_fall_back_to_site_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [ { "message": { "content": "uncited facts" } } ]
            })))
            .mount(&server)
            .await;

        let client = PerplexityClient::new(test_key())
            .with_endpoint(format!("{}/chat/completions", server.uri()));
        let response = client.search("q", 0).await.unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].url, FALLBACK_CITATION);
    }
}
