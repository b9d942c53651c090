//! # Feed Digest
//!
//! A feed-to-table pipeline: polls Atom/RSS subscriptions, stores new
//! articles, has an OpenAI-compatible LLM extract a summary, key insights,
//! quotes and concepts from each one, and bulk-publishes the results to a
//! multi-dimensional table.
//!
//! ## Usage
//!
//! ```sh
//! feed_digest fetch
//! feed_digest analyze --no-push
//! feed_digest -j ./runs run
//! feed_digest stats
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Fetching**: Download every active feed (4 at a time) and store entries
//!    whose link is new
//! 2. **Analysis**: Send pending articles to the LLM with bounded concurrency;
//!    failures become fallback analyses instead of aborting the batch
//! 3. **Publishing**: Insert analysed articles in batches of up to 500 rows
//!    and mark accepted ones as pushed
//! 4. **Output**: Print a JSON run summary and optionally write it to a dated
//!    file

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod analysis;
mod cli;
mod config;
mod feeds;
mod models;
mod outputs;
mod pipeline;
mod publish;
mod store;
mod utils;

use analysis::{ArticleAnalyzer, ChatClient, RetryAsk};
use cli::{Cli, Command};
use config::Config;
use models::RunSummary;
use outputs::json;
use publish::BitableSink;
use store::ArticleStore;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    info!("feed_digest starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.command, config = %args.config.display(), "Parsed CLI arguments");

    let mut config = Config::load(&args.config)?;
    args.apply_to(&mut config)?;
    config.validate()?;

    // Early check: ensure JSON output dir is writable
    if let Some(dir) = &args.json_output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir,
                error = %e,
                "JSON output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let mut store = ArticleStore::open(&config.store.path).await?;
    let mut summary = RunSummary::default();

    match &args.command {
        Command::Fetch(_) => fetch(&config, &mut store, &mut summary).await?,
        Command::Analyze(_) => analyze(&config, &mut store, &mut summary).await?,
        Command::Run { .. } => {
            fetch(&config, &mut store, &mut summary).await?;
            analyze(&config, &mut store, &mut summary).await?;
        }
        Command::Stats => {}
    }

    summary.store = store.stats();
    store.close().await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(dir) = &args.json_output_dir {
        if let Err(e) = json::write_summary(&summary, dir).await {
            error!(error = %e, "Failed to write run summary JSON");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

async fn fetch(
    config: &Config,
    store: &mut ArticleStore,
    summary: &mut RunSummary,
) -> Result<(), Box<dyn Error>> {
    let feeds: Vec<_> = config.active_feeds().cloned().collect();
    if feeds.is_empty() {
        info!("No active feeds configured; add some to config.yaml or pass --feed");
        return Ok(());
    }
    let client = reqwest::Client::builder().build()?;
    pipeline::fetch_new_articles(&client, store, &feeds, &config.fetch, summary).await?;
    Ok(())
}

async fn analyze(
    config: &Config,
    store: &mut ArticleStore,
    summary: &mut RunSummary,
) -> Result<(), Box<dyn Error>> {
    // Fail before spending provider calls on results that cannot be published.
    config.publish.validate()?;

    let client = RetryAsk::new(
        ChatClient::new(&config.analysis)?,
        config.analysis.max_retries,
        Duration::from_secs(1),
    );
    let analyzer = ArticleAnalyzer::new(client).with_limits(
        config.analysis.min_content_chars,
        config.analysis.max_prompt_chars,
    );

    let candidates = pipeline::analyze_pending(store, &analyzer, &config.analysis, summary).await?;

    if !config.publish.enabled {
        info!(analyzed = candidates.len(), "Publishing disabled; leaving articles unpushed");
        return Ok(());
    }
    if candidates.is_empty() {
        return Ok(());
    }

    let sink = BitableSink::new(&config.publish)?;
    pipeline::publish_analyzed(store, &sink, &candidates, config.publish.batch_size, summary).await?;
    Ok(())
}
