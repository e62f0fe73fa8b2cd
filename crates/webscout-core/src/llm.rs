//! Language-model capability boundary.
//!
//! The research loop never talks to a concrete inference backend directly; it
//! goes through [`LanguageModel`], which offers a free-text completion and a
//! JSON-constrained completion. [`OllamaClient`] is the default
//! implementation, speaking the Ollama `/api/chat` protocol (which OpenAI
//! compatible local servers also expose).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::ResearchError;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Opaque model capability: structured (JSON) and free-text completions.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-text completion for the given system and user instructions.
    async fn complete_text(&self, system: &str, user: &str) -> Result<String, ResearchError>;

    /// JSON-constrained completion. Implementations must either return a
    /// parsed JSON value or [`ResearchError::MalformedModelOutput`].
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value, ResearchError>;
}

/// Ollama chat client with temperature pinned to zero for reproducible runs.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self::with_timeout(config, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(config: &LlmConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        json_mode: bool,
    ) -> Result<String, ResearchError> {
        let mut payload = json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": 0.0 },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        if json_mode {
            payload["format"] = json!("json");
        }

        debug!(model = %self.model, json_mode, "issuing chat completion");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|err| ResearchError::ModelUnavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ResearchError::ModelUnavailable(format!(
                "chat endpoint returned {}",
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|err| ResearchError::ModelUnavailable(err.to_string()))?;

        Ok(body.message.content)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete_text(&self, system: &str, user: &str) -> Result<String, ResearchError> {
        self.chat(system, user, false).await
    }

    async fn complete_json(&self, system: &str, user: &str) -> Result<Value, ResearchError> {
        let raw = self.chat(system, user, true).await?;
        serde_json::from_str(&raw).map_err(|err| {
            ResearchError::MalformedModelOutput(format!("{err}: {}", preview(&raw)))
        })
    }
}

/// First 120 chars of a model response, for error messages.
fn preview(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(120) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
