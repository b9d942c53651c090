//! Orchestration of the fetch → analyse → publish stages.
//!
//! Each stage reads from and writes to the [`ArticleStore`] and adds its
//! counters to a shared [`RunSummary`]. Stage failures that only affect some
//! items are recorded in the summary; only store I/O aborts a stage.

use crate::analysis::{Analyze, ArticleInput, analyze_all};
use crate::config::{AnalysisConfig, FeedSource, FetchConfig};
use crate::feeds::fetch_and_parse;
use crate::models::{PublishRecord, PublishReport, RunSummary};
use crate::publish::{TableSink, publish_all};
use crate::store::{ArticleStore, ArticleUpdate, NewArticle, StoreError};
use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// An analysed article waiting to be published.
#[derive(Debug, Clone)]
pub struct PublishCandidate {
    pub id: u64,
    pub record: PublishRecord,
}

/// Fetch every feed and insert the items whose link is not stored yet.
///
/// Feeds are fetched concurrently but processed in configuration order. A
/// feed that fails to download contributes nothing.
#[instrument(level = "info", skip_all, fields(feeds = feeds.len()))]
pub async fn fetch_new_articles(
    client: &reqwest::Client,
    store: &mut ArticleStore,
    feeds: &[FeedSource],
    config: &FetchConfig,
    summary: &mut RunSummary,
) -> Result<(), StoreError> {
    let t0 = Instant::now();
    let timeout = Duration::from_secs(config.timeout_secs);

    let mut fetched = stream::iter(feeds)
        .map(|feed| async move { (feed, fetch_and_parse(client, &feed.url, timeout).await) })
        .buffered(config.concurrency.max(1));

    while let Some((feed, items)) = fetched.next().await {
        summary.feeds += 1;
        summary.fetched += items.len();
        let mut new = 0;

        for item in items {
            if store.get_by_link(&item.link).is_some() {
                continue;
            }
            match store.insert(NewArticle {
                title: item.title,
                link: item.link,
                content: item.body_text,
                source: feed.name.clone(),
                published_at: item.published_at,
            }) {
                Ok(_) => new += 1,
                Err(StoreError::DuplicateLink(link)) => debug!(%link, "Skipping duplicate link"),
                Err(e) => return Err(e),
            }
        }

        info!(feed = %feed.name, new, "Feed ingested");
        summary.new += new;
    }

    store.save().await?;
    info!(
        fetched = summary.fetched,
        new = summary.new,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Fetch stage completed"
    );
    Ok(())
}

/// Analyse up to `config.limit` pending articles and store every result,
/// fallbacks included.
///
/// Returns the analysed articles projected for publishing, in the order they
/// were analysed.
#[instrument(level = "info", skip_all, fields(limit = config.limit))]
pub async fn analyze_pending<A: Analyze>(
    store: &mut ArticleStore,
    analyzer: &A,
    config: &AnalysisConfig,
    summary: &mut RunSummary,
) -> Result<Vec<PublishCandidate>, StoreError> {
    let pending = store.pending_analysis(config.limit);
    if pending.is_empty() {
        info!("No articles waiting for analysis");
        return Ok(Vec::new());
    }

    let inputs: Vec<ArticleInput> = pending
        .iter()
        .map(|a| ArticleInput::new(a.title.clone(), a.content.clone().unwrap_or_default()))
        .collect();
    let outcomes = analyze_all(analyzer, &inputs, config.concurrency, config.schedule).await;

    let mut candidates = Vec::with_capacity(pending.len());
    for (article, outcome) in pending.iter().zip(outcomes) {
        if outcome.is_failed() {
            summary.analysis_failed += 1;
        } else {
            summary.analyzed += 1;
        }
        let analysis = outcome.result;
        candidates.push(PublishCandidate {
            id: article.id,
            record: PublishRecord::project(
                &article.title,
                &article.link,
                &article.source,
                article.published_at,
                &analysis,
            ),
        });
        store.update(
            article.id,
            ArticleUpdate {
                analysis: Some(analysis),
                ..Default::default()
            },
        )?;
    }

    store.save().await?;
    Ok(candidates)
}

/// Publish the candidates and mark those in accepted batches as pushed.
///
/// A publish that cannot start (authentication) counts every candidate as
/// failed.
#[instrument(level = "info", skip_all, fields(candidates = candidates.len()))]
pub async fn publish_analyzed<S: TableSink>(
    store: &mut ArticleStore,
    sink: &S,
    candidates: &[PublishCandidate],
    batch_size: usize,
    summary: &mut RunSummary,
) -> Result<PublishReport, StoreError> {
    let records: Vec<PublishRecord> = candidates.iter().map(|c| c.record.clone()).collect();

    let report = match publish_all(sink, &records, batch_size).await {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "Publish aborted");
            PublishReport::all_failed(records.len(), e)
        }
    };

    for index in report.accepted_indices() {
        store.update(
            candidates[index].id,
            ArticleUpdate {
                pushed: Some(true),
                ..Default::default()
            },
        )?;
    }
    store.save().await?;

    summary.published += report.succeeded;
    summary.publish_failed += report.failed;
    summary.errors.extend(report.errors.iter().cloned());
    Ok(report)
}
