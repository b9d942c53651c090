//! Data models for feed entries, their analyses and the published rows.
//!
//! This module defines the value objects passed between the pipeline stages:
//! - [`FeedItem`]: One entry parsed out of a syndication feed
//! - [`AnalysisResult`]: The structured digest produced for an article
//! - [`PublishRecord`]: A flat, spreadsheet-friendly projection of both
//! - [`PublishReport`]: Partial-success accounting for a publish run
//! - [`RunSummary`]: What every command prints when it finishes
//!
//! None of these types carry behaviour beyond construction and projection;
//! they are produced by one stage and consumed by the next.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single entry parsed from a feed document.
///
/// The `link` is the identity key used by the store to decide novelty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Entity-decoded title. Markup inside the title is kept as-is.
    pub title: String,
    /// The `href` of the entry's first `<link>` element.
    pub link: String,
    /// Parsed `<updated>` / `<pubDate>` value, when present and parseable.
    pub published_at: Option<DateTime<Utc>>,
    /// Paragraph-structured plain text of the entry body.
    pub body_text: Option<String>,
}

/// One core argument of an article together with what backs it up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub point: String,
    pub evidence: String,
}

/// A term introduced or leaned on by an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub term: String,
    pub explanation: String,
}

/// The structured digest of one article.
///
/// Field names are camelCase on the wire to match the JSON schema the model
/// is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default)]
    pub quotes: Vec<String>,
    #[serde(default)]
    pub new_concepts: Vec<Concept>,
}

/// Summary prefix of synthetic results. Readers of the table can spot them,
/// but a real summary may start the same way; count failures from the
/// scheduler's outcomes instead.
pub const FALLBACK_SUMMARY_PREFIX: &str = "Analysis failed";

impl AnalysisResult {
    /// Build the stand-in result recorded when analysing an item failed.
    pub fn fallback(reason: impl std::fmt::Display) -> Self {
        let reason = reason.to_string();
        Self {
            summary: format!("{FALLBACK_SUMMARY_PREFIX}: {reason}"),
            insights: vec![Insight {
                point: "Error".to_string(),
                evidence: reason,
            }],
            quotes: Vec::new(),
            new_concepts: Vec::new(),
        }
    }

    /// `1. point\n   evidence`, blocks separated by a blank line.
    pub fn insights_text(&self) -> String {
        self.insights
            .iter()
            .enumerate()
            .map(|(i, insight)| format!("{}. {}\n   {}", i + 1, insight.point, insight.evidence))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// `1. quote`, one per line.
    pub fn quotes_text(&self) -> String {
        self.quotes
            .iter()
            .enumerate()
            .map(|(i, quote)| format!("{}. {}", i + 1, quote))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `1. term: explanation`, one per line.
    pub fn concepts_text(&self) -> String {
        self.new_concepts
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {}: {}", i + 1, c.term, c.explanation))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A flat row for the table sink.
///
/// Multi-valued analysis fields are flattened to numbered text blocks. This
/// projection is lossy and is never parsed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishRecord {
    pub title: String,
    pub link: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary_text: String,
    pub insights_text: String,
    pub quotes_text: String,
    pub concepts_text: String,
}

impl PublishRecord {
    pub fn project(
        title: &str,
        link: &str,
        source: &str,
        published_at: Option<DateTime<Utc>>,
        analysis: &AnalysisResult,
    ) -> Self {
        Self {
            title: title.to_string(),
            link: link.to_string(),
            source: source.to_string(),
            published_at,
            summary_text: analysis.summary.clone(),
            insights_text: analysis.insights_text(),
            quotes_text: analysis.quotes_text(),
            concepts_text: analysis.concepts_text(),
        }
    }
}

/// Outcome of one bulk-insert call, addressed by its position in the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Index of the batch's first record in the input slice.
    pub start: usize,
    pub len: usize,
    pub accepted: bool,
}

/// Partial-success accounting across all batches of one publish call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub batches: Vec<BatchOutcome>,
}

impl PublishReport {
    /// A report in which nothing landed, used when the run could not even
    /// start submitting batches.
    pub fn all_failed(total: usize, error: impl std::fmt::Display) -> Self {
        Self {
            succeeded: 0,
            failed: total,
            errors: vec![error.to_string()],
            batches: Vec::new(),
        }
    }

    pub fn record_accepted(&mut self, start: usize, len: usize) {
        self.succeeded += len;
        self.batches.push(BatchOutcome {
            start,
            len,
            accepted: true,
        });
    }

    pub fn record_rejected(&mut self, start: usize, len: usize, error: String) {
        self.failed += len;
        self.errors.push(error);
        self.batches.push(BatchOutcome {
            start,
            len,
            accepted: false,
        });
    }

    /// Input indices of every record that belongs to an accepted batch.
    pub fn accepted_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.batches
            .iter()
            .filter(|b| b.accepted)
            .flat_map(|b| b.start..b.start + b.len)
    }
}

/// Counters reported by the record store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub analyzed: usize,
    pub unanalyzed: usize,
    pub pushed: usize,
}

/// Structured result of a command, printed as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub feeds: usize,
    pub fetched: usize,
    pub new: usize,
    pub analyzed: usize,
    pub analysis_failed: usize,
    pub published: usize,
    pub publish_failed: usize,
    pub errors: Vec<String>,
    pub store: StoreStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_analysis() -> AnalysisResult {
        AnalysisResult {
            summary: "A short digest".to_string(),
            insights: vec![
                Insight {
                    point: "Teams ship faster with fewer meetings".to_string(),
                    evidence: "Two case studies".to_string(),
                },
                Insight {
                    point: "Focus time matters".to_string(),
                    evidence: "Survey of 300 engineers".to_string(),
                },
            ],
            quotes: vec!["Less is more".to_string(), "Ship it".to_string()],
            new_concepts: vec![Concept {
                term: "Maker time".to_string(),
                explanation: "Uninterrupted blocks of work".to_string(),
            }],
        }
    }

    #[test]
    fn test_analysis_deserializes_camel_case() {
        let json = r#"{
            "summary": "s",
            "insights": [{"point": "p", "evidence": "e"}],
            "quotes": ["q"],
            "newConcepts": [{"term": "t", "explanation": "x"}]
        }"#;
        let parsed: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.new_concepts[0].term, "t");
        assert_eq!(parsed.insights[0].evidence, "e");
    }

    #[test]
    fn test_analysis_missing_lists_default_to_empty() {
        let parsed: AnalysisResult = serde_json::from_str(r#"{"summary": "only"}"#).unwrap();
        assert!(parsed.insights.is_empty());
        assert!(parsed.quotes.is_empty());
        assert!(parsed.new_concepts.is_empty());
    }

    #[test]
    fn test_flattened_text_blocks() {
        let analysis = sample_analysis();
        assert_eq!(
            analysis.insights_text(),
            "1. Teams ship faster with fewer meetings\n   Two case studies\n\n2. Focus time matters\n   Survey of 300 engineers"
        );
        assert_eq!(analysis.quotes_text(), "1. Less is more\n2. Ship it");
        assert_eq!(
            analysis.concepts_text(),
            "1. Maker time: Uninterrupted blocks of work"
        );
    }

    #[test]
    fn test_empty_lists_flatten_to_empty_strings() {
        let analysis = AnalysisResult::fallback("boom");
        assert_eq!(analysis.quotes_text(), "");
        assert_eq!(analysis.concepts_text(), "");
    }

    #[test]
    fn test_fallback_shape() {
        let fallback = AnalysisResult::fallback("provider down");
        assert_eq!(fallback.summary, "Analysis failed: provider down");
        assert_eq!(fallback.insights.len(), 1);
        assert_eq!(fallback.insights[0].point, "Error");
        assert!(fallback.quotes.is_empty());
        assert!(fallback.new_concepts.is_empty());
    }

    #[test]
    fn test_publish_record_projection() {
        let record = PublishRecord::project(
            "Title",
            "https://x/1",
            "Product Thinking",
            None,
            &sample_analysis(),
        );
        assert_eq!(record.summary_text, "A short digest");
        assert!(record.insights_text.starts_with("1. Teams"));
        assert_eq!(record.source, "Product Thinking");
    }

    #[test]
    fn test_report_accepted_indices_skip_rejected_batches() {
        let mut report = PublishReport::default();
        report.record_rejected(0, 2, "nope".to_string());
        report.record_accepted(2, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(report.accepted_indices().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn test_report_all_failed() {
        let report = PublishReport::all_failed(7, "missing table id");
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 7);
        assert_eq!(report.errors, vec!["missing table id".to_string()]);
    }

    #[test]
    fn test_run_summary_serializes_camel_case() {
        let summary = RunSummary {
            publish_failed: 2,
            ..Default::default()
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"publishFailed\":2"));
        assert!(json.contains("\"analysisFailed\":0"));
    }
}
