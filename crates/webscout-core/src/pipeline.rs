//! The individual stages of the research loop.
//!
//! Each method mutates the [`ResearchState`] it is handed and nothing else;
//! the loop controller in `workflow` decides sequencing and failure policy.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::ResearchConfig;
use crate::llm::LanguageModel;
use crate::prompts::{
    build_summary_prompt, format_instructions, QUERY_WRITER_INSTRUCTIONS, REFLECTION_INSTRUCTIONS,
    SUMMARIZER_INSTRUCTIONS,
};
use crate::search::{VideoSearchProvider, WebSearchProvider};
use crate::sources::{deduplicate_and_format_sources, format_citations};
use crate::state::ResearchState;
use crate::ResearchError;

pub struct ResearchPipeline {
    llm: Arc<dyn LanguageModel>,
    web: Arc<dyn WebSearchProvider>,
    video: Option<Arc<dyn VideoSearchProvider>>,
    tuning: ResearchConfig,
}

impl ResearchPipeline {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        web: Arc<dyn WebSearchProvider>,
        video: Option<Arc<dyn VideoSearchProvider>>,
        tuning: ResearchConfig,
    ) -> Self {
        Self {
            llm,
            web,
            video,
            tuning,
        }
    }

    /// Produce the initial search query from the topic. Malformed model
    /// output here is fatal: everything downstream needs a query.
    #[instrument(name = "stage.generate_query", skip(self, state))]
    pub async fn generate_query(&self, state: &mut ResearchState) -> Result<(), ResearchError> {
        let instructions = format_instructions(QUERY_WRITER_INSTRUCTIONS, &state.topic);
        let response = self
            .llm
            .complete_json(&instructions, "Generate a query for web search:")
            .await?;

        let query = response
            .get("query")
            .and_then(|value| value.as_str())
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .ok_or_else(|| {
                ResearchError::MalformedModelOutput(
                    "query generation response lacked a non-empty `query` field".into(),
                )
            })?;

        info!(%query, "generated initial search query");
        state.current_query = query.to_string();
        Ok(())
    }

    /// Mandatory web gathering step. Appends one evidence block and one
    /// citation entry, then bumps the loop counter.
    #[instrument(name = "stage.web_research", skip(self, state), fields(query = %state.current_query))]
    pub async fn web_research(&self, state: &mut ResearchState) -> Result<(), ResearchError> {
        let response = self.web.search(&state.current_query, state.loop_count).await?;

        let block = deduplicate_and_format_sources(
            &response.results,
            self.tuning.max_tokens_per_source,
            self.web.include_raw_content(),
        );
        let citations = format_citations(&response.results);

        info!(
            provider = self.web.name(),
            result_count = response.results.len(),
            loop_count = state.loop_count + 1,
            "web research complete"
        );
        state.record_web_evidence(block, citations);
        Ok(())
    }

    /// Optional video enrichment. Provider errors are logged and skipped;
    /// no provider configured means the stage is a no-op.
    #[instrument(name = "stage.video_research", skip(self, state), fields(query = %state.current_query))]
    pub async fn video_research(&self, state: &mut ResearchState) {
        let Some(video) = &self.video else {
            debug!("no video provider configured; skipping");
            return;
        };

        match video.search(&state.current_query).await {
            Ok(response) => {
                let block = deduplicate_and_format_sources(
                    &response.results,
                    self.tuning.video_tokens_per_source,
                    true,
                );
                let citations = format_citations(&response.results);
                info!(result_count = response.results.len(), "video research complete");
                state.record_video_evidence(block, citations);
            }
            Err(err) => {
                warn!(error = %err, "video research failed; continuing without it");
            }
        }
    }

    /// Fold the newest evidence into the running summary. Model failure here
    /// is fatal: the summary drives both reflection and the final artifact.
    #[instrument(name = "stage.summarize", skip(self, state))]
    pub async fn summarize(&self, state: &mut ResearchState) -> Result<(), ResearchError> {
        let prompt = build_summary_prompt(
            &state.topic,
            state.summary.as_deref(),
            state.latest_web_evidence(),
            &state.joined_video_evidence(),
        );

        let raw = self
            .llm
            .complete_text(SUMMARIZER_INSTRUCTIONS, &prompt)
            .await?;
        let summary = strip_think_tags(&raw);

        info!(summary_chars = summary.chars().count(), "summary updated");
        state.summary = Some(summary);
        Ok(())
    }

    /// Critique the summary and pick the next query. Never fails: any
    /// problem falls back to a generic follow-up on the topic.
    #[instrument(name = "stage.reflect", skip(self, state))]
    pub async fn reflect(&self, state: &mut ResearchState) {
        let instructions = format_instructions(REFLECTION_INSTRUCTIONS, &state.topic);
        let prompt = format!(
            "Identify a knowledge gap and generate a follow-up web search query based on our existing knowledge: {}",
            state.summary.as_deref().unwrap_or("")
        );

        let follow_up = match self.llm.complete_json(&instructions, &prompt).await {
            Ok(response) => response
                .get("follow_up_query")
                .and_then(|value| value.as_str())
                .map(str::trim)
                .filter(|query| !query.is_empty())
                .map(str::to_string),
            Err(err) => {
                warn!(error = %err, "reflection call failed; using fallback query");
                None
            }
        };

        state.current_query =
            follow_up.unwrap_or_else(|| format!("Tell me more about {}", state.topic));
        debug!(next_query = %state.current_query, "reflection chose next query");
    }
}

/// Rewrite the summary into its final presentation form: header, body, and
/// the full citation list in collection order (duplicates included).
pub fn finalize_summary(state: &mut ResearchState) -> String {
    let body = state.summary.take().unwrap_or_default();
    let finalized = format!(
        "## Summary\n\n{body}\n\n### Sources:\n{}",
        state.all_citations()
    );
    state.summary = Some(finalized.clone());
    finalized
}

/// Remove every balanced `<think>...</think>` span from model output,
/// repeating until none remain, then drop any dangling marker so the result
/// never carries an unterminated span.
pub fn strip_think_tags(text: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut output = text.to_string();
    while let Some(start) = output.find(OPEN) {
        match output[start..].find(CLOSE) {
            Some(relative_end) => {
                let end = start + relative_end + CLOSE.len();
                output.replace_range(start..end, "");
            }
            None => {
                // Unterminated reasoning span: everything after the opener is
                // internal, not user-facing.
                output.truncate(start);
                break;
            }
        }
    }
    output.replace(CLOSE, "")
}
