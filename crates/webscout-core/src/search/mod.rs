//! Evidence gathering: web search providers and the YouTube video path.
//!
//! Every provider normalizes its wire format into [`SearchResponse`] so the
//! aggregator and the loop controller never see provider-specific shapes.
//! Adding a web provider means adding one [`WebSearchProvider`] impl.

mod perplexity;
mod tavily;
mod youtube;

pub use perplexity::PerplexityClient;
pub use tavily::TavilyClient;
pub use youtube::{TimedTextFetcher, TranscriptFetcher, YoutubeSearcher};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{Config, SearchApi};
use crate::sources::SearchResponse;
use crate::ResearchError;

/// A web evidence source. Exactly one implementation is active per run,
/// selected by configuration.
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this provider's raw content should be rendered into evidence
    /// blocks. Perplexity already returns synthesized text as the snippet,
    /// so repeating it as raw content adds nothing.
    fn include_raw_content(&self) -> bool {
        true
    }

    /// Execute one search call. `loop_index` is the zero-based research loop
    /// counter; providers that synthesize result titles use it.
    async fn search(&self, query: &str, loop_index: u32)
        -> Result<SearchResponse, ResearchError>;
}

/// Optional video evidence source. Failures on this path are skippable.
#[async_trait]
pub trait VideoSearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResponse, ResearchError>;
}

/// Build the configured web provider, reading its API key from the
/// environment. An unsupported provider never reaches this point: the config
/// deserializer rejects it.
pub fn web_provider_from_config(
    config: &Config,
) -> Result<Arc<dyn WebSearchProvider>, ResearchError> {
    let api_key = config.search_api_key()?;
    let provider: Arc<dyn WebSearchProvider> = match config.search.provider {
        SearchApi::Tavily => Arc::new(
            TavilyClient::new(api_key).with_max_results(config.search.max_web_results),
        ),
        SearchApi::Perplexity => Arc::new(PerplexityClient::new(api_key)),
    };
    Ok(provider)
}

/// Build the video searcher when a YouTube API key is configured and present.
///
/// Missing `[youtube]` config or a missing key skips video research entirely
/// rather than failing the run.
pub fn video_provider_from_config(config: &Config) -> Option<Arc<dyn VideoSearchProvider>> {
    let youtube = config.youtube.as_ref()?;
    match crate::optional_env(&youtube.api_key_env) {
        Some(api_key) => Some(Arc::new(YoutubeSearcher::new(api_key, youtube))),
        None => {
            warn!(
                var = %youtube.api_key_env,
                "YouTube API key not set; skipping video research"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::YoutubeConfig;

    fn config_with_youtube(api_key_env: &str) -> Config {
        let mut config = Config::default();
        config.youtube = Some(YoutubeConfig {
            api_key_env: api_key_env.to_string(),
            max_results: 3,
            transcript_timeout_secs: 10,
        });
        config
    }

    #[test]
    fn video_provider_requires_youtube_section() {
        assert!(video_provider_from_config(&Config::default()).is_none());
    }

    #[test]
    fn video_provider_skipped_when_key_is_unset() {
        unsafe { std::env::remove_var("WEBSCOUT_TEST_YT_KEY_MISSING"); }
        let config = config_with_youtube("WEBSCOUT_TEST_YT_KEY_MISSING");
        assert!(video_provider_from_config(&config).is_none());
    }

    #[test]
    fn video_provider_built_when_key_is_set() {
        unsafe { std::env::set_var("WEBSCOUT_TEST_YT_KEY_SET", "yt-test"); }
        let config = config_with_youtube("WEBSCOUT_TEST_YT_KEY_SET");
        assert!(video_provider_from_config(&config).is_some());
    }
}
