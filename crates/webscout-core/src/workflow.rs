//! The loop controller: an explicit finite-state machine over the pipeline
//! stages, plus the public entry point that wires components from config.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Config, ConfigLoader};
use crate::deliver::{EmailMessage, Mailer, SmtpMailer};
use crate::llm::{LanguageModel, OllamaClient};
use crate::pipeline::{finalize_summary, ResearchPipeline};
use crate::runlog::{log_run_completion, RunLogInput};
use crate::search::{
    video_provider_from_config, web_provider_from_config, VideoSearchProvider, WebSearchProvider,
};
use crate::state::ResearchState;
use crate::ResearchError;

/// States of the research loop. `Reflect` ends with a routing decision;
/// everything after `Finalize` is the terminal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    GenerateQuery,
    WebResearch,
    VideoResearch,
    Summarize,
    Reflect,
    Finalize,
    Deliver,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::GenerateQuery => "generate_query",
            Stage::WebResearch => "web_research",
            Stage::VideoResearch => "video_research",
            Stage::Summarize => "summarize",
            Stage::Reflect => "reflect",
            Stage::Finalize => "finalize",
            Stage::Deliver => "deliver",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing decision taken after every reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Continue,
    Finalize,
}

/// The comparison is inclusive: with `loop_count` starting at 0 and
/// incrementing after each web step, `max_loops = N` yields `N + 1` web
/// research iterations.
pub fn route(loop_count: u32, max_loops: u32) -> Route {
    if loop_count <= max_loops {
        Route::Continue
    } else {
        Route::Finalize
    }
}

/// One visited stage, recorded in visit order for the run outcome.
#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    pub stage: &'static str,
    pub at: DateTime<Utc>,
}

impl StageEvent {
    fn now(stage: Stage) -> Self {
        Self {
            stage: stage.as_str(),
            at: Utc::now(),
        }
    }
}

/// Options for one research run. Component setters exist so tests (and
/// embedders) can substitute any collaborator; unset components are built
/// from config.
pub struct RunOptions {
    pub topic: String,
    pub config: Config,
    deliver: bool,
    language_model: Option<Arc<dyn LanguageModel>>,
    web_provider: Option<Arc<dyn WebSearchProvider>>,
    video_provider: Option<Arc<dyn VideoSearchProvider>>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl RunOptions {
    pub fn new(topic: impl Into<String>, config: Config) -> Self {
        Self {
            topic: topic.into(),
            config,
            deliver: true,
            language_model: None,
            web_provider: None,
            video_provider: None,
            mailer: None,
        }
    }

    /// Run the full loop but print-only: skip the Deliver side effect.
    pub fn without_delivery(mut self) -> Self {
        self.deliver = false;
        self
    }

    pub fn with_language_model(mut self, llm: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(llm);
        self
    }

    pub fn with_web_provider(mut self, provider: Arc<dyn WebSearchProvider>) -> Self {
        self.web_provider = Some(provider);
        self
    }

    pub fn with_video_provider(mut self, provider: Arc<dyn VideoSearchProvider>) -> Self {
        self.video_provider = Some(provider);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub summary: String,
    pub loops_completed: u32,
    pub delivered: bool,
    pub stages: Vec<StageEvent>,
}

/// Run the research loop end-to-end for a topic.
///
/// Fatal errors carry the stage that raised them. Delivery preconditions are
/// checked before the first model call so a misconfigured recipient never
/// wastes a full research run.
pub async fn run_research(options: RunOptions) -> Result<RunOutcome, ResearchError> {
    if options.topic.trim().is_empty() {
        return Err(ResearchError::InvalidConfiguration(
            "research topic must not be empty".into(),
        ));
    }
    ConfigLoader::validate(&options.config)?;

    let recipient = options
        .config
        .email
        .as_ref()
        .map(|email| email.recipient.clone());
    if options.deliver && recipient.is_none() {
        return Err(ResearchError::InvalidConfiguration(
            "delivery requested but [email] is not configured".into(),
        ));
    }

    let llm: Arc<dyn LanguageModel> = match options.language_model {
        Some(llm) => llm,
        None => Arc::new(OllamaClient::new(&options.config.llm)),
    };
    let web = match options.web_provider {
        Some(provider) => provider,
        None => web_provider_from_config(&options.config)?,
    };
    let video = options
        .video_provider
        .or_else(|| video_provider_from_config(&options.config));
    let mailer: Option<Arc<dyn Mailer>> = if options.deliver {
        match options.mailer {
            Some(mailer) => Some(mailer),
            None => {
                let email = options.config.email.as_ref().ok_or_else(|| {
                    ResearchError::InvalidConfiguration("[email] is not configured".into())
                })?;
                Some(Arc::new(SmtpMailer::from_config(email)?))
            }
        }
    } else {
        None
    };

    let max_loops = options.config.research.max_loops;
    let pipeline = ResearchPipeline::new(llm, web, video, options.config.research.clone());
    let mut state = ResearchState::new(options.topic);
    let mut stages = Vec::new();
    let mut stage = Stage::GenerateQuery;

    info!(run_id = %state.run_id, topic = %state.topic, max_loops, "starting research run");

    loop {
        stages.push(StageEvent::now(stage));
        stage = match stage {
            Stage::GenerateQuery => {
                pipeline
                    .generate_query(&mut state)
                    .await
                    .map_err(|err| err.at_stage(Stage::GenerateQuery.as_str()))?;
                Stage::WebResearch
            }
            Stage::WebResearch => {
                pipeline
                    .web_research(&mut state)
                    .await
                    .map_err(|err| err.at_stage(Stage::WebResearch.as_str()))?;
                Stage::VideoResearch
            }
            Stage::VideoResearch => {
                pipeline.video_research(&mut state).await;
                Stage::Summarize
            }
            Stage::Summarize => {
                pipeline
                    .summarize(&mut state)
                    .await
                    .map_err(|err| err.at_stage(Stage::Summarize.as_str()))?;
                Stage::Reflect
            }
            Stage::Reflect => {
                pipeline.reflect(&mut state).await;
                match route(state.loop_count, max_loops) {
                    Route::Continue => Stage::WebResearch,
                    Route::Finalize => Stage::Finalize,
                }
            }
            Stage::Finalize => {
                finalize_summary(&mut state);
                Stage::Deliver
            }
            Stage::Deliver => {
                match (&mailer, &recipient) {
                    (Some(mailer), Some(recipient)) => {
                        let message = EmailMessage {
                            to: recipient.clone(),
                            subject: format!("Research Summary: {}", state.topic),
                            body: state.summary.clone().unwrap_or_default(),
                        };
                        mailer
                            .send(&message)
                            .await
                            .map_err(|err| err.at_stage(Stage::Deliver.as_str()))?;
                        state.delivered = true;
                    }
                    _ => info!("delivery disabled; skipping email"),
                }
                break;
            }
        };
    }

    let summary = state.summary.clone().unwrap_or_default();
    info!(
        run_id = %state.run_id,
        loops = state.loop_count,
        delivered = state.delivered,
        "research run complete"
    );

    if let Err(err) = log_run_completion(RunLogInput {
        run_id: state.run_id.clone(),
        topic: state.topic.clone(),
        loop_count: state.loop_count,
        summary: summary.clone(),
        citations: state.citations.clone(),
        delivered: state.delivered,
    }) {
        warn!(error = %err, "failed to append run log");
    }

    Ok(RunOutcome {
        run_id: state.run_id,
        summary,
        loops_completed: state.loop_count,
        delivered: state.delivered,
        stages,
    })
}
