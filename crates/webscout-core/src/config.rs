use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{require_env, ResearchError, SecretValue};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "WEBSCOUT_CONFIG";

/// Top-level configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub research: ResearchConfig,
    /// Optional; when absent, video research is skipped entirely.
    #[serde(default)]
    pub youtube: Option<YoutubeConfig>,
    /// Optional; required when the run delivers its result by email.
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve the configured search-provider secret value (from environment only).
    pub fn search_api_key(&self) -> Result<SecretValue, ResearchError> {
        require_env(self.search.api_key_env())
    }
}

/// Helper to load configuration with best-practice guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `WEBSCOUT_CONFIG` environment variable.
    /// 3. `config.toml` in the current working directory.
    pub fn load(path: Option<PathBuf>) -> Result<Config, ResearchError> {
        let candidate = resolve_path(path);
        let raw = fs::read_to_string(&candidate)
            .map_err(|err| ResearchError::config_io(candidate.clone(), err))?;
        let config: Config = toml::from_str(&raw)
            .map_err(|err| ResearchError::InvalidConfiguration(err.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ResearchError> {
        if config.llm.model.trim().is_empty() {
            return Err(ResearchError::InvalidConfiguration(
                "llm.model must not be empty".into(),
            ));
        }

        if config.search.max_web_results == 0 {
            return Err(ResearchError::InvalidConfiguration(
                "search.max_web_results must be at least 1".into(),
            ));
        }

        if let Some(email) = &config.email {
            if email.recipient.trim().is_empty() {
                return Err(ResearchError::InvalidConfiguration(
                    "email.recipient must not be empty".into(),
                ));
            }
        }

        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = path {
        return path;
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return PathBuf::from(from_env);
        }
    }

    Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "LlmConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "LlmConfig::default_model")]
    pub model: String,
}

impl LlmConfig {
    fn default_base_url() -> String {
        "http://localhost:11434".to_string()
    }

    fn default_model() -> String {
        "llama3.2".to_string()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            model: Self::default_model(),
        }
    }
}

/// Which web evidence source to query. Exactly one is active per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchApi {
    #[default]
    Tavily,
    Perplexity,
}

impl SearchApi {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchApi::Tavily => "tavily",
            SearchApi::Perplexity => "perplexity",
        }
    }

    fn default_api_key_env(&self) -> &'static str {
        match self {
            SearchApi::Tavily => "TAVILY_API_KEY",
            SearchApi::Perplexity => "PERPLEXITY_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub provider: SearchApi,
    /// Environment variable holding the provider API key. Defaults to the
    /// provider's conventional variable name.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "SearchConfig::default_max_web_results")]
    pub max_web_results: usize,
}

impl SearchConfig {
    fn default_max_web_results() -> usize {
        1
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchApi::default(),
            api_key_env: None,
            max_web_results: Self::default_max_web_results(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchConfig {
    /// Loop ceiling: the router continues while `loop_count <= max_loops`.
    #[serde(default = "ResearchConfig::default_max_loops")]
    pub max_loops: u32,
    #[serde(default = "ResearchConfig::default_max_tokens_per_source")]
    pub max_tokens_per_source: usize,
    #[serde(default = "ResearchConfig::default_video_tokens_per_source")]
    pub video_tokens_per_source: usize,
}

impl ResearchConfig {
    const fn default_max_loops() -> u32 {
        3
    }

    const fn default_max_tokens_per_source() -> usize {
        1000
    }

    const fn default_video_tokens_per_source() -> usize {
        500
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_loops: Self::default_max_loops(),
            max_tokens_per_source: Self::default_max_tokens_per_source(),
            video_tokens_per_source: Self::default_video_tokens_per_source(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct YoutubeConfig {
    #[serde(default = "YoutubeConfig::default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "YoutubeConfig::default_max_results")]
    pub max_results: usize,
    #[serde(default = "YoutubeConfig::default_transcript_timeout_secs")]
    pub transcript_timeout_secs: u64,
}

impl YoutubeConfig {
    fn default_api_key_env() -> String {
        "YOUTUBE_API_KEY".to_string()
    }

    const fn default_max_results() -> usize {
        3
    }

    const fn default_transcript_timeout_secs() -> u64 {
        10
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub recipient: String,
    #[serde(default = "EmailConfig::default_smtp_server")]
    pub smtp_server: String,
    #[serde(default = "EmailConfig::default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default = "EmailConfig::default_username_env")]
    pub username_env: String,
    #[serde(default = "EmailConfig::default_password_env")]
    pub password_env: String,
}

impl EmailConfig {
    fn default_smtp_server() -> String {
        "smtp.gmail.com".to_string()
    }

    const fn default_smtp_port() -> u16 {
        587
    }

    fn default_username_env() -> String {
        "WEBSCOUT_SMTP_USERNAME".to_string()
    }

    fn default_password_env() -> String {
        "WEBSCOUT_SMTP_PASSWORD".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn minimal_config_uses_defaults() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "[search]\nprovider = \"tavily\"").unwrap();

        let config = ConfigLoader::load(Some(file.path().to_path_buf())).expect("config loads");
        assert_eq!(config.search.provider, SearchApi::Tavily);
        assert_eq!(config.search.api_key_env(), "TAVILY_API_KEY");
        assert_eq!(config.research.max_loops, 3);
        assert_eq!(config.research.max_tokens_per_source, 1000);
        assert!(config.youtube.is_none());
        assert!(config.email.is_none());
    }

    #[test]
    fn perplexity_provider_switches_key_env() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "[search]\nprovider = \"perplexity\"").unwrap();

        let config = ConfigLoader::load(Some(file.path().to_path_buf())).expect("config loads");
        assert_eq!(config.search.provider, SearchApi::Perplexity);
        assert_eq!(config.search.api_key_env(), "PERPLEXITY_API_KEY");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "[search]\nprovider = \"duckduckgo\"").unwrap();

        let err = ConfigLoader::load(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ResearchError::InvalidConfiguration(_)));
    }

    #[test]
    fn empty_recipient_is_rejected() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "[email]\nrecipient = \"  \"").unwrap();

        let err = ConfigLoader::load(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ResearchError::InvalidConfiguration(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ConfigLoader::load(Some(PathBuf::from("/nonexistent/webscout.toml"))).unwrap_err();
        assert!(matches!(err, ResearchError::ConfigIo { .. }));
    }
}
