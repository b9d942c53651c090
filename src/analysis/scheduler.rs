//! Bounded concurrent analysis of many articles.
//!
//! Every input item yields exactly one [`AnalysisOutcome`], at the same index
//! as the item, no matter in which order the underlying calls finish or
//! whether they fail. A failed item gets a fallback result; it never takes
//! other items down with it.

use crate::analysis::Analyze;
use crate::models::AnalysisResult;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// One article to analyse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleInput {
    pub title: String,
    pub text: String,
}

impl ArticleInput {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }
}

/// How calls are spread over time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    /// Consecutive chunks of `concurrency` items; a chunk starts only after
    /// the previous one has fully settled.
    #[default]
    Chunked,
    /// At most `concurrency` calls in flight at any time; a new call starts
    /// as soon as any running one finishes.
    Pooled,
}

/// The result for one item, plus the reason when it is a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub error: Option<String>,
}

impl AnalysisOutcome {
    fn analyzed(result: AnalysisResult) -> Self {
        Self { result, error: None }
    }

    fn failed(reason: impl std::fmt::Display) -> Self {
        let reason = reason.to_string();
        Self {
            result: AnalysisResult::fallback(&reason),
            error: Some(reason),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Analyse every item with at most `concurrency` calls in flight.
///
/// The returned vector has the same length as `items` and `result[i]`
/// belongs to `items[i]`. A `concurrency` of zero is treated as one.
#[instrument(level = "info", skip_all, fields(total = items.len(), concurrency = concurrency, schedule = ?schedule))]
pub async fn analyze_all<A: Analyze>(
    analyzer: &A,
    items: &[ArticleInput],
    concurrency: usize,
    schedule: Schedule,
) -> Vec<AnalysisOutcome> {
    let t0 = Instant::now();
    let concurrency = concurrency.max(1);

    let outcomes = match schedule {
        Schedule::Chunked => analyze_chunked(analyzer, items, concurrency).await,
        Schedule::Pooled => analyze_pooled(analyzer, items, concurrency).await,
    };

    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    info!(
        total = items.len(),
        successful = items.len() - failed,
        failed,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Completed article analysis"
    );
    outcomes
}

async fn analyze_chunked<A: Analyze>(
    analyzer: &A,
    items: &[ArticleInput],
    concurrency: usize,
) -> Vec<AnalysisOutcome> {
    let mut outcomes = Vec::with_capacity(items.len());

    for (chunk_no, chunk) in items.chunks(concurrency).enumerate() {
        let base = chunk_no * concurrency;
        let mut settled = join_all(
            chunk
                .iter()
                .enumerate()
                .map(|(offset, item)| analyze_contained(analyzer, base + offset, item)),
        )
        .await;

        settled.sort_by_key(|(index, _)| *index);
        outcomes.extend(settled.into_iter().map(|(_, outcome)| outcome));
        debug!(chunk = chunk_no, done = outcomes.len(), total = items.len(), "Chunk settled");
    }

    outcomes
}

async fn analyze_pooled<A: Analyze>(
    analyzer: &A,
    items: &[ArticleInput],
    concurrency: usize,
) -> Vec<AnalysisOutcome> {
    let mut slots: Vec<Option<AnalysisOutcome>> = vec![None; items.len()];

    let mut settled = stream::iter(items.iter().enumerate())
        .map(|(index, item)| analyze_contained(analyzer, index, item))
        .buffer_unordered(concurrency);

    while let Some((index, outcome)) = settled.next().await {
        slots[index] = Some(outcome);
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| AnalysisOutcome::failed("analysis did not complete")))
        .collect()
}

/// Analyse one item, turning any failure into a fallback result.
async fn analyze_contained<A: Analyze>(
    analyzer: &A,
    index: usize,
    item: &ArticleInput,
) -> (usize, AnalysisOutcome) {
    debug!(index, "Analyzing article");
    match analyzer.analyze(&item.title, &item.text).await {
        Ok(result) => {
            debug!(index, "Successfully analyzed article");
            (index, AnalysisOutcome::analyzed(result))
        }
        Err(e) => {
            warn!(index, title = %item.title, error = %e, "Analysis failed; using fallback");
            (index, AnalysisOutcome::failed(e))
        }
    }
}
