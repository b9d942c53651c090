//! Configuration file parser for `config.yaml`.
//!
//! The file is optional; a missing or empty file yields `Config::default()`.
//! Every section and key has a default, so any subset may be written.
//! Secrets are normally supplied through the environment (see [`crate::cli`])
//! and override whatever the file contains.

use crate::analysis::Schedule;
use crate::feeds::DEFAULT_FETCH_TIMEOUT;
use crate::publish::{MAX_BATCH_SIZE, PublishError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML in config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feeds: Vec<FeedSource>,
    pub fetch: FetchConfig,
    pub analysis: AnalysisConfig,
    pub publish: PublishConfig,
    pub store: StoreConfig,
}

/// A subscribed feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    /// Display name, stored as the article's source.
    pub name: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl FeedSource {
    /// An ad-hoc subscription named after the URL's host.
    pub fn from_url(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw).map_err(|e| ConfigError::Invalid(format!("feed URL {raw:?}: {e}")))?;
        let name = url
            .host_str()
            .map(|h| h.trim_start_matches("www.").to_string())
            .ok_or_else(|| ConfigError::Invalid(format!("feed URL {raw:?} has no host")))?;
        Ok(Self {
            name,
            url: url.to_string(),
            active: true,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-feed request budget covering connect, headers and body.
    pub timeout_secs: u64,
    /// Feeds fetched at the same time.
    pub concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            concurrency: 4,
        }
    }
}

/// LLM provider and scheduling settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`.
    pub base_url: String,
    pub model: String,
    /// Usually taken from `ANALYSIS_API_KEY`.
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Retries on transient provider failures; 0 disables retrying.
    pub max_retries: usize,
    pub min_content_chars: usize,
    pub max_prompt_chars: usize,
    /// Provider calls in flight at once.
    pub concurrency: usize,
    /// Pending articles taken per `analyze` run.
    pub limit: usize,
    pub schedule: Schedule,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            max_tokens: 2000,
            temperature: 0.3,
            timeout_secs: 120,
            max_retries: 3,
            min_content_chars: 100,
            max_prompt_chars: 15_000,
            concurrency: 3,
            limit: 20,
            schedule: Schedule::Chunked,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("concurrency", &self.concurrency)
            .field("limit", &self.limit)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

/// Table sink settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// When false, analysed articles stay unpushed.
    pub enabled: bool,
    pub base_url: String,
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub app_token: Option<String>,
    pub table_id: Option<String>,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://open.feishu.cn/open-apis".to_string(),
            app_id: None,
            app_secret: None,
            app_token: None,
            table_id: None,
            batch_size: MAX_BATCH_SIZE,
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for PublishConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret.as_ref().map(|_| "[REDACTED]"))
            .field("app_token", &self.app_token)
            .field("table_id", &self.table_id)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl PublishConfig {
    /// Check that every identifier the sink needs is present.
    ///
    /// A disabled sink is always valid.
    pub fn validate(&self) -> Result<(), PublishError> {
        if !self.enabled {
            return Ok(());
        }
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        for (value, name) in [
            (&self.app_id, "TABLE_APP_ID"),
            (&self.app_secret, "TABLE_APP_SECRET"),
            (&self.app_token, "TABLE_APP_TOKEN"),
            (&self.table_id, "TABLE_ID"),
        ] {
            if !present(value) {
                return Err(PublishError::MissingConfig(name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("articles.json"),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid YAML → `Err(ConfigError::Yaml)`
    /// - Bad feed URL → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        info!(
            path = %path.display(),
            feeds = config.feeds.len(),
            model = %config.analysis.model,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for feed in &self.feeds {
            Url::parse(&feed.url)
                .map_err(|e| ConfigError::Invalid(format!("feed {:?}: {e}", feed.name)))?;
        }
        if self.publish.batch_size == 0 || self.publish.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid(format!(
                "publish.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.publish.batch_size
            )));
        }
        Ok(())
    }

    /// Subscriptions that should be polled.
    pub fn active_feeds(&self) -> impl Iterator<Item = &FeedSource> {
        self.feeds.iter().filter(|f| f.active)
    }
}
