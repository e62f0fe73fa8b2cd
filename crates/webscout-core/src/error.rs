use std::path::PathBuf;

use thiserror::Error;

/// Core error type for WebScout.
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A structured model call returned something that is not the JSON we asked for.
    #[error("malformed model output: {0}")]
    MalformedModelOutput(String),
    /// The language model endpoint could not be reached or returned a bad status.
    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),
    /// A search provider failed outright (network error, bad status).
    #[error("{provider} search unavailable: {reason}")]
    SourceUnavailable { provider: String, reason: String },
    #[error("email delivery failed: {0}")]
    DeliveryFailed(String),
    /// Wraps a fatal error with the stage of the research loop that raised it.
    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: &'static str,
        #[source]
        source: Box<ResearchError>,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ResearchError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn source_unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn at_stage(self, stage: &'static str) -> Self {
        Self::StageFailed {
            stage,
            source: Box::new(self),
        }
    }

    /// Name of the failing stage, if this error was raised inside the loop.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Self::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
