//! YouTube video search with transcript enrichment.
//!
//! Searches the YouTube Data API for matching videos, then fetches each
//! transcript as a spawned task under a deadline. A hung fetch is aborted at
//! the deadline and the run proceeds with a sentinel string; transcript
//! problems never fail a record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::VideoSearchProvider;
use crate::config::YoutubeConfig;
use crate::sources::{SearchResponse, SourceRecord};
use crate::{ResearchError, SecretValue};

const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";
const TIMEDTEXT_ENDPOINT: &str = "https://video.google.com/timedtext";
const SEARCH_TIMEOUT_SECS: u64 = 10;
const SNIPPET_CHARS: usize = 200;

pub const TRANSCRIPT_TIMED_OUT: &str = "Transcript retrieval timed out.";
pub const TRANSCRIPT_UNAVAILABLE: &str = "Transcript not available.";

/// Fetches the transcript text for a video id. Abstracted so tests can
/// substitute hung or failing fetchers.
#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    async fn fetch(&self, video_id: &str) -> anyhow::Result<String>;
}

pub struct YoutubeSearcher {
    api_key: SecretValue,
    client: Client,
    endpoint: String,
    max_results: usize,
    transcript_timeout: Duration,
    transcripts: Arc<dyn TranscriptFetcher>,
}

#[derive(Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: VideoId,
    snippet: VideoSnippet,
}

#[derive(Deserialize)]
struct VideoId {
    #[serde(rename = "videoId")]
    video_id: String,
}

#[derive(Deserialize)]
struct VideoSnippet {
    title: String,
}

impl YoutubeSearcher {
    pub fn new(api_key: SecretValue, config: &YoutubeConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            api_key,
            client: client.clone(),
            endpoint: SEARCH_ENDPOINT.to_string(),
            max_results: config.max_results,
            transcript_timeout: Duration::from_secs(config.transcript_timeout_secs),
            transcripts: Arc::new(TimedTextFetcher::new(client)),
        }
    }

    pub fn with_transcript_fetcher(mut self, fetcher: Arc<dyn TranscriptFetcher>) -> Self {
        self.transcripts = fetcher;
        self
    }

    pub fn with_transcript_timeout(mut self, timeout: Duration) -> Self {
        self.transcript_timeout = timeout;
        self
    }

    #[cfg(test)]
    fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Fetch a transcript on a side task with a deadline. The task is
    /// aborted on expiry so an unresponsive fetch cannot leak past the run.
    async fn transcript_with_timeout(&self, video_id: &str) -> String {
        let fetcher = Arc::clone(&self.transcripts);
        let id = video_id.to_string();
        let handle = tokio::spawn(async move { fetcher.fetch(&id).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.transcript_timeout, handle).await {
            Ok(Ok(Ok(transcript))) => transcript,
            Ok(Ok(Err(err))) => {
                warn!(video_id, error = %err, "transcript fetch failed");
                TRANSCRIPT_UNAVAILABLE.to_string()
            }
            Ok(Err(join_err)) => {
                warn!(video_id, error = %join_err, "transcript task panicked");
                TRANSCRIPT_UNAVAILABLE.to_string()
            }
            Err(_) => {
                abort.abort();
                warn!(video_id, timeout = ?self.transcript_timeout, "transcript fetch timed out");
                TRANSCRIPT_TIMED_OUT.to_string()
            }
        }
    }
}

#[async_trait]
impl VideoSearchProvider for YoutubeSearcher {
    async fn search(&self, query: &str) -> Result<SearchResponse, ResearchError> {
        debug!(%query, max_results = self.max_results, "youtube search");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("type", "video"),
                ("maxResults", &self.max_results.to_string()),
                ("key", self.api_key.expose()),
            ])
            .send()
            .await
            .map_err(|err| ResearchError::source_unavailable("youtube", err.to_string()))?;

        if !response.status().is_success() {
            return Err(ResearchError::source_unavailable(
                "youtube",
                format!("search endpoint returned {}", response.status()),
            ));
        }

        let body: SearchListResponse = response
            .json()
            .await
            .map_err(|err| ResearchError::source_unavailable("youtube", err.to_string()))?;

        let mut results = Vec::with_capacity(body.items.len());
        for item in body.items {
            let video_id = item.id.video_id;
            let transcript = self.transcript_with_timeout(&video_id).await;
            results.push(SourceRecord {
                title: item.snippet.title,
                url: format!("https://www.youtube.com/watch?v={video_id}"),
                content: snippet_of(&transcript),
                raw_content: Some(transcript),
            });
        }

        Ok(SearchResponse { results })
    }
}

/// First 200 chars of the transcript, with an ellipsis when cut.
fn snippet_of(transcript: &str) -> String {
    match transcript.char_indices().nth(SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}...", &transcript[..idx]),
        None => transcript.to_string(),
    }
}

static TIMEDTEXT_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<text[^>]*>(.*?)</text>").expect("invalid timedtext regex"));

/// Default transcript source: the public timedtext caption endpoint.
pub struct TimedTextFetcher {
    client: Client,
    endpoint: String,
}

impl TimedTextFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            endpoint: TIMEDTEXT_ENDPOINT.to_string(),
        }
    }

    fn parse_segments(xml: &str) -> Option<String> {
        let segments: Vec<String> = TIMEDTEXT_SEGMENT
            .captures_iter(xml)
            .map(|cap| unescape_entities(cap[1].trim()))
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.is_empty() {
            None
        } else {
            Some(segments.join(" "))
        }
    }
}

#[async_trait]
impl TranscriptFetcher for TimedTextFetcher {
    async fn fetch(&self, video_id: &str) -> anyhow::Result<String> {
        let body = self
            .client
            .get(&self.endpoint)
            .query(&[("lang", "en"), ("v", video_id)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Self::parse_segments(&body)
            .ok_or_else(|| anyhow::anyhow!("no caption track for video {video_id}"))
    }
}

fn unescape_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}
