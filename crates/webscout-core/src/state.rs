//! Mutable state threaded through one research run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The single record the loop controller mutates. Owned exclusively by one
/// run; the evidence and citation sequences only ever grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    pub run_id: String,
    pub topic: String,
    pub current_query: String,
    /// Number of completed web-gathering steps. Incremented exactly once per
    /// web research step, never decremented.
    pub loop_count: u32,
    pub web_evidence: Vec<String>,
    pub video_evidence: Vec<String>,
    /// One entry per gathering call (web and video each contribute one), in
    /// call order. Never deduplicated across calls.
    pub citations: Vec<String>,
    pub summary: Option<String>,
    pub delivered: bool,
    pub started_at: DateTime<Utc>,
}

impl ResearchState {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            topic: topic.into(),
            current_query: String::new(),
            loop_count: 0,
            web_evidence: Vec::new(),
            video_evidence: Vec::new(),
            citations: Vec::new(),
            summary: None,
            delivered: false,
            started_at: Utc::now(),
        }
    }

    pub fn record_web_evidence(&mut self, block: String, citations: String) {
        self.web_evidence.push(block);
        self.citations.push(citations);
        self.loop_count += 1;
    }

    pub fn record_video_evidence(&mut self, block: String, citations: String) {
        self.video_evidence.push(block);
        self.citations.push(citations);
    }

    pub fn latest_web_evidence(&self) -> &str {
        self.web_evidence.last().map(String::as_str).unwrap_or("")
    }

    pub fn joined_video_evidence(&self) -> String {
        self.video_evidence.join("\n")
    }

    pub fn all_citations(&self) -> String {
        self.citations.join("\n")
    }
}
