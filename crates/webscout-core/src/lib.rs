//! WebScout core: a bounded, iterative research loop over web and video
//! evidence, driven by a local LLM.
//!
//! The loop is an explicit state machine (`workflow`): generate a query,
//! gather web then video evidence, fold it into a running summary, reflect
//! for knowledge gaps, and repeat until the configured loop ceiling forces
//! finalization and email delivery.

mod config;
mod deliver;
mod error;
mod llm;
mod pipeline;
mod prompts;
mod runlog;
mod search;
mod secrets;
mod sources;
mod state;
mod telemetry;
mod workflow;

pub use config::{
    Config, ConfigLoader, EmailConfig, LlmConfig, LoggingConfig, ResearchConfig, SearchApi,
    SearchConfig, YoutubeConfig,
};
pub use deliver::{EmailMessage, Mailer, SmtpMailer};
pub use error::ResearchError;
pub use llm::{LanguageModel, OllamaClient};
pub use pipeline::{finalize_summary, strip_think_tags, ResearchPipeline};
pub use runlog::{log_run_completion, RunLogInput};
pub use search::{
    PerplexityClient, TavilyClient, TimedTextFetcher, TranscriptFetcher, VideoSearchProvider,
    WebSearchProvider, YoutubeSearcher,
};
pub use secrets::{optional_env, require_env, SecretValue};
pub use sources::{
    deduplicate_and_format_sources, format_citations, SearchResponse, SourceRecord,
};
pub use state::ResearchState;
pub use telemetry::init_telemetry;
pub use workflow::{route, run_research, Route, RunOptions, RunOutcome, Stage, StageEvent};
