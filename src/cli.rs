//! Command-line interface definitions for Feed Digest.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Credentials are normally provided via environment variables and take
//! precedence over the configuration file.

use crate::analysis::Schedule;
use crate::config::{Config, ConfigError, FeedSource};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Feed Digest application.
///
/// # Examples
///
/// ```sh
/// # Fetch new articles from the configured feeds
/// feed_digest fetch
///
/// # Analyse pending articles without publishing them
/// feed_digest analyze --no-push
///
/// # Full run with an extra feed and a dated JSON summary
/// feed_digest -j ./runs run --feed https://example.com/atom.xml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config.yaml
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Optional output directory for the run summary JSON
    #[arg(short, long, global = true)]
    pub json_output_dir: Option<String>,

    /// Path of the article store (overrides config)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    #[command(flatten)]
    pub credentials: Credentials,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch all active feeds and store new articles
    Fetch(FetchArgs),
    /// Analyse pending articles and publish the results
    Analyze(AnalyzeArgs),
    /// Fetch, then analyse and publish
    Run {
        #[command(flatten)]
        fetch: FetchArgs,
        #[command(flatten)]
        analyze: AnalyzeArgs,
    },
    /// Print store statistics
    Stats,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchArgs {
    /// Extra feed URL to poll (repeatable)
    #[arg(long = "feed", value_name = "URL")]
    pub feeds: Vec<String>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzeArgs {
    /// Store analyses without publishing them
    #[arg(long)]
    pub no_push: bool,

    /// Maximum number of provider calls in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Maximum number of pending articles to analyse
    #[arg(long)]
    pub limit: Option<usize>,

    /// How analysis calls are scheduled
    #[arg(long, value_enum)]
    pub schedule: Option<Schedule>,

    /// Rows per bulk-insert call (1-500)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=500))]
    pub batch_size: Option<u16>,
}

/// Secrets, read from the environment unless given explicitly.
#[derive(Args, Clone, Default)]
pub struct Credentials {
    /// API key for the analysis provider
    #[arg(long, env = "ANALYSIS_API_KEY", hide_env_values = true)]
    pub analysis_api_key: Option<String>,

    /// App id for the table sink
    #[arg(long, env = "TABLE_APP_ID")]
    pub table_app_id: Option<String>,

    /// App secret for the table sink
    #[arg(long, env = "TABLE_APP_SECRET", hide_env_values = true)]
    pub table_app_secret: Option<String>,

    /// Token of the table app (base) to write into
    #[arg(long, env = "TABLE_APP_TOKEN")]
    pub table_app_token: Option<String>,

    /// Id of the table to write into
    #[arg(long, env = "TABLE_ID")]
    pub table_id: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Credentials")
            .field("analysis_api_key", &redact(&self.analysis_api_key))
            .field("table_app_id", &self.table_app_id)
            .field("table_app_secret", &redact(&self.table_app_secret))
            .field("table_app_token", &self.table_app_token)
            .field("table_id", &self.table_id)
            .finish()
    }
}

impl Cli {
    /// Layer command-line values and credentials over the file configuration.
    pub fn apply_to(&self, config: &mut Config) -> Result<(), ConfigError> {
        let creds = &self.credentials;
        let overlay = |target: &mut Option<String>, value: &Option<String>| {
            if let Some(v) = value.as_ref().filter(|v| !v.trim().is_empty()) {
                *target = Some(v.clone());
            }
        };
        overlay(&mut config.analysis.api_key, &creds.analysis_api_key);
        overlay(&mut config.publish.app_id, &creds.table_app_id);
        overlay(&mut config.publish.app_secret, &creds.table_app_secret);
        overlay(&mut config.publish.app_token, &creds.table_app_token);
        overlay(&mut config.publish.table_id, &creds.table_id);

        if let Some(store) = &self.store {
            config.store.path = store.clone();
        }

        let (fetch, analyze) = match &self.command {
            Command::Fetch(fetch) => (Some(fetch), None),
            Command::Analyze(analyze) => (None, Some(analyze)),
            Command::Run { fetch, analyze } => (Some(fetch), Some(analyze)),
            Command::Stats => (None, None),
        };

        if let Some(fetch) = fetch {
            for url in &fetch.feeds {
                config.feeds.push(FeedSource::from_url(url)?);
            }
        }
        if let Some(analyze) = analyze {
            if analyze.no_push {
                config.publish.enabled = false;
            }
            if let Some(c) = analyze.concurrency {
                config.analysis.concurrency = c;
            }
            if let Some(l) = analyze.limit {
                config.analysis.limit = l;
            }
            if let Some(s) = analyze.schedule {
                config.analysis.schedule = s;
            }
            if let Some(b) = analyze.batch_size {
                config.publish.batch_size = usize::from(b);
            }
        }
        Ok(())
    }
}
