//! End-to-end runs of the research loop against scripted collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use serde_json::{json, Value};
use webscout_core::{
    run_research, Config, EmailConfig, EmailMessage, LanguageModel, Mailer, ResearchError,
    RunOptions, SearchResponse, SourceRecord, VideoSearchProvider, WebSearchProvider,
};

static LOG_DIR: Once = Once::new();

fn isolate_run_logs() {
    LOG_DIR.call_once(|| {
        let dir = std::env::temp_dir().join("webscout-test-logs");
        unsafe { std::env::set_var("WEBSCOUT_LOG_DIR", &dir) };
    });
}

fn record(title: &str, url: &str) -> SourceRecord {
    SourceRecord {
        title: title.to_string(),
        url: url.to_string(),
        content: format!("snippet for {title}"),
        raw_content: Some(format!("raw content for {title}")),
    }
}

/// Scripted model: a fixed initial query, configurable reflection output,
/// and think-marker-laden summaries.
struct ScriptedModel {
    text_calls: AtomicUsize,
    json_calls: AtomicUsize,
    follow_up: Option<String>,
}

impl ScriptedModel {
    fn new(follow_up: Option<&str>) -> Self {
        Self {
            text_calls: AtomicUsize::new(0),
            json_calls: AtomicUsize::new(0),
            follow_up: follow_up.map(str::to_string),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete_text(&self, _system: &str, _user: &str) -> Result<String, ResearchError> {
        let call = self.text_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!(
            "<think>internal reasoning</think>summary after call {call}"
        ))
    }

    async fn complete_json(&self, system: &str, _user: &str) -> Result<Value, ResearchError> {
        self.json_calls.fetch_add(1, Ordering::SeqCst);
        if system.contains("targeted web search query") {
            Ok(json!({ "query": "initial scripted query" }))
        } else {
            match &self.follow_up {
                Some(query) => Ok(json!({ "follow_up_query": query })),
                None => Ok(json!({ "knowledge_gap": "unspecified" })),
            }
        }
    }
}

/// Web provider that serves pre-baked result sets, one per call, and
/// records the queries it saw.
struct ScriptedWeb {
    batches: Mutex<Vec<Vec<SourceRecord>>>,
    queries: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedWeb {
    fn new(batches: Vec<Vec<SourceRecord>>) -> Self {
        Self {
            batches: Mutex::new(batches),
            queries: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WebSearchProvider for ScriptedWeb {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn search(
        &self,
        query: &str,
        _loop_index: u32,
    ) -> Result<SearchResponse, ResearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        let mut batches = self.batches.lock().unwrap();
        if batches.is_empty() {
            return Err(ResearchError::source_unavailable("scripted", "exhausted"));
        }
        Ok(SearchResponse {
            results: batches.remove(0),
        })
    }
}

struct ScriptedVideo {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl VideoSearchProvider for ScriptedVideo {
    async fn search(&self, _query: &str) -> Result<SearchResponse, ResearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ResearchError::source_unavailable("video", "quota exceeded"));
        }
        Ok(SearchResponse {
            results: vec![SourceRecord {
                title: "Some talk".to_string(),
                url: "https://www.youtube.com/watch?v=vid1".to_string(),
                content: "transcript snippet".to_string(),
                raw_content: Some("full transcript".to_string()),
            }],
        })
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), ResearchError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

fn config_with_max_loops(max_loops: u32) -> Config {
    let mut config = Config::default();
    config.research.max_loops = max_loops;
    config
}

#[tokio::test]
async fn zero_ceiling_runs_exactly_one_iteration() {
    isolate_run_logs();

    let llm = Arc::new(ScriptedModel::new(Some("follow up")));
    let web = Arc::new(ScriptedWeb::new(vec![
        vec![record("A", "https://a.example")],
        vec![record("unused", "https://unused.example")],
    ]));
    let video = Arc::new(ScriptedVideo {
        calls: AtomicUsize::new(0),
        fail: false,
    });

    let outcome = run_research(
        RunOptions::new("solid-state batteries", config_with_max_loops(0))
            .without_delivery()
            .with_language_model(llm.clone())
            .with_web_provider(web.clone())
            .with_video_provider(video.clone()),
    )
    .await
    .expect("run succeeds");

    assert_eq!(web.calls.load(Ordering::SeqCst), 1);
    assert_eq!(video.calls.load(Ordering::SeqCst), 1);
    assert_eq!(llm.text_calls.load(Ordering::SeqCst), 1);
    // one query generation + one (discarded) reflection
    assert_eq!(llm.json_calls.load(Ordering::SeqCst), 2);

    assert_eq!(outcome.loops_completed, 1);
    assert!(outcome.summary.starts_with("## Summary\n\n"));
    let (_, sources) = outcome.summary.split_once("### Sources:\n").unwrap();
    assert!(!sources.trim().is_empty());
    // think markers never survive into the artifact
    assert!(!outcome.summary.contains("<think>"));
}

#[tokio::test]
async fn citations_accumulate_across_iterations_without_dedup() {
    isolate_run_logs();

    let llm = Arc::new(ScriptedModel::new(Some("second query")));
    let web = Arc::new(ScriptedWeb::new(vec![
        vec![record("A", "https://a.example"), record("B", "https://b.example")],
        vec![
            record("C", "https://c.example"),
            record("D", "https://d.example"),
            record("A", "https://a.example"),
        ],
    ]));

    let outcome = run_research(
        RunOptions::new("battery recycling", config_with_max_loops(1))
            .without_delivery()
            .with_language_model(llm)
            .with_web_provider(web.clone()),
    )
    .await
    .expect("run succeeds");

    assert_eq!(outcome.loops_completed, 2);
    let (_, sources) = outcome.summary.split_once("### Sources:\n").unwrap();
    assert_eq!(sources.lines().count(), 5);
    // the repeated URL stays duplicated in the citation list
    assert_eq!(
        sources
            .lines()
            .filter(|line| line.contains("https://a.example"))
            .count(),
        2
    );
}

#[tokio::test]
async fn reflection_fallback_drives_next_query() {
    isolate_run_logs();

    let llm = Arc::new(ScriptedModel::new(None));
    let web = Arc::new(ScriptedWeb::new(vec![
        vec![record("A", "https://a.example")],
        vec![record("B", "https://b.example")],
    ]));

    run_research(
        RunOptions::new("quantum dots", config_with_max_loops(1))
            .without_delivery()
            .with_language_model(llm)
            .with_web_provider(web.clone()),
    )
    .await
    .expect("run succeeds");

    let queries = web.queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[1], "Tell me more about quantum dots");
}

#[tokio::test]
async fn video_failures_do_not_abort_the_run() {
    isolate_run_logs();

    let llm = Arc::new(ScriptedModel::new(Some("next")));
    let web = Arc::new(ScriptedWeb::new(vec![vec![record("A", "https://a.example")]]));
    let video = Arc::new(ScriptedVideo {
        calls: AtomicUsize::new(0),
        fail: true,
    });

    let outcome = run_research(
        RunOptions::new("fusion startups", config_with_max_loops(0))
            .without_delivery()
            .with_language_model(llm)
            .with_web_provider(web)
            .with_video_provider(video.clone()),
    )
    .await
    .expect("run succeeds despite video failure");

    assert_eq!(video.calls.load(Ordering::SeqCst), 1);
    assert!(outcome.summary.starts_with("## Summary"));
}

#[tokio::test]
async fn web_failure_aborts_and_names_the_stage() {
    isolate_run_logs();

    let llm = Arc::new(ScriptedModel::new(Some("next")));
    let web = Arc::new(ScriptedWeb::new(Vec::new()));

    let err = run_research(
        RunOptions::new("geothermal drilling", config_with_max_loops(0))
            .without_delivery()
            .with_language_model(llm)
            .with_web_provider(web),
    )
    .await
    .unwrap_err();

    assert_eq!(err.stage(), Some("web_research"));
    assert!(err.to_string().contains("web_research stage failed"));
}

#[tokio::test]
async fn delivery_sends_subject_and_finalized_body() {
    isolate_run_logs();

    let llm = Arc::new(ScriptedModel::new(Some("next")));
    let web = Arc::new(ScriptedWeb::new(vec![vec![record("A", "https://a.example")]]));
    let mailer = Arc::new(RecordingMailer::default());

    let mut config = config_with_max_loops(0);
    config.email = Some(EmailConfig {
        recipient: "reader@example.org".to_string(),
        smtp_server: "smtp.example.org".to_string(),
        smtp_port: 587,
        username_env: "UNUSED".to_string(),
        password_env: "UNUSED".to_string(),
    });

    let outcome = run_research(
        RunOptions::new("perovskite solar cells", config)
            .with_language_model(llm)
            .with_web_provider(web)
            .with_mailer(mailer.clone()),
    )
    .await
    .expect("run succeeds");

    assert!(outcome.delivered);
    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "reader@example.org");
    assert_eq!(sent[0].subject, "Research Summary: perovskite solar cells");
    assert_eq!(sent[0].body, outcome.summary);
}

#[tokio::test]
async fn stage_trace_covers_the_terminal_path() {
    isolate_run_logs();

    let llm = Arc::new(ScriptedModel::new(Some("next")));
    let web = Arc::new(ScriptedWeb::new(vec![vec![record("A", "https://a.example")]]));

    let outcome = run_research(
        RunOptions::new("grid storage", config_with_max_loops(0))
            .without_delivery()
            .with_language_model(llm)
            .with_web_provider(web),
    )
    .await
    .expect("run succeeds");

    let visited: Vec<&str> = outcome.stages.iter().map(|event| event.stage).collect();
    assert_eq!(
        visited,
        vec![
            "generate_query",
            "web_research",
            "video_research",
            "summarize",
            "reflect",
            "finalize",
            "deliver"
        ]
    );
}
