//! Single-article analysis on top of an [`AskAsync`] transport.

use crate::analysis::client::AskAsync;
use crate::analysis::{AnalysisError, Analyze};
use crate::models::{AnalysisResult, Concept, Insight};
use crate::utils::{looks_truncated, truncate_for_log};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{instrument, warn};

/// Articles shorter than this (in characters) are not worth analysing.
pub const MIN_CONTENT_CHARS: usize = 100;
/// Article text beyond this many characters is cut from the prompt.
pub const MAX_PROMPT_CHARS: usize = 15_000;

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)```json\s*(.*?)\s*```").unwrap());
static ANY_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```\s*(.*?)\s*```").unwrap());
// An answer cut off mid-document never gets its closing fence.
static OPEN_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*)$").unwrap());

/// Validates, prompts and parses; the transport `C` does the talking.
#[derive(Debug)]
pub struct ArticleAnalyzer<C> {
    client: C,
    min_chars: usize,
    max_prompt_chars: usize,
}

impl<C> ArticleAnalyzer<C>
where
    C: AskAsync<Response = String>,
{
    pub fn new(client: C) -> Self {
        Self {
            client,
            min_chars: MIN_CONTENT_CHARS,
            max_prompt_chars: MAX_PROMPT_CHARS,
        }
    }

    pub fn with_limits(mut self, min_chars: usize, max_prompt_chars: usize) -> Self {
        self.min_chars = min_chars;
        self.max_prompt_chars = max_prompt_chars;
        self
    }
}

impl<C> Analyze for ArticleAnalyzer<C>
where
    C: AskAsync<Response = String>,
{
    #[instrument(level = "info", skip_all, fields(title = %truncate_for_log(title, 60)))]
    async fn analyze(&self, title: &str, text: &str) -> Result<AnalysisResult, AnalysisError> {
        let len = text.chars().count();
        if len < self.min_chars {
            return Err(AnalysisError::InsufficientContent {
                len,
                min: self.min_chars,
            });
        }

        let prompt = build_prompt(title, text, self.max_prompt_chars);
        let response = self.client.ask(&prompt).await?;

        match parse_analysis(&response) {
            // A cut-off answer usually parses on a second try.
            Err(AnalysisError::Parse(ref e)) if looks_truncated(e) => {
                warn!(error = %e, "EOF while parsing; re-asking once");
                let retry = self.client.ask(&prompt).await?;
                parse_analysis(&retry)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    response_preview = %truncate_for_log(&response, 300),
                    "Model returned non-conforming JSON"
                );
                Err(e)
            }
            ok => ok,
        }
    }
}

/// The instruction sent for one article.
pub fn build_prompt(title: &str, text: &str, max_chars: usize) -> String {
    let body: String = text.chars().take(max_chars).collect();
    format!(
        r#"Analyze the following article and answer strictly in the JSON format below.

Title: {title}

Content:
{body}

Answer with this JSON and nothing else:
```json
{{
  "summary": "A 100-200 word summary of the article's core content and value",
  "insights": [
    {{
      "point": "One core argument, in one sentence",
      "evidence": "Supporting evidence from the article (50-100 words)"
    }}
  ],
  "quotes": ["verbatim quote 1", "verbatim quote 2"],
  "newConcepts": [
    {{
      "term": "An emerging concept or key term",
      "explanation": "What it means in this article"
    }}
  ]
}}
```

Guidelines:
1. "insights" holds the 3-5 most important arguments, most important first
2. "quotes" holds 3-5 of the most insightful sentences, copied verbatim
3. "newConcepts" holds new, technical or key concepts used by the article
4. If the article is low quality or empty, say so plainly in "summary""#
    )
}

/// Pull the JSON document out of a model answer.
///
/// Tries a ```json fence, then any ``` fence, then a fence that is never
/// closed, then the whole answer.
pub fn extract_json_block(raw: &str) -> &str {
    JSON_FENCE
        .captures(raw)
        .or_else(|| ANY_FENCE.captures(raw))
        .or_else(|| OPEN_FENCE.captures(raw))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
        .trim()
}

/// Parse a model answer into an [`AnalysisResult`], dropping repeated entries.
pub fn parse_analysis(raw: &str) -> Result<AnalysisResult, AnalysisError> {
    let mut analysis: AnalysisResult = serde_json::from_str(extract_json_block(raw))?;

    // dedupe
    analysis.insights = analysis
        .insights
        .into_iter()
        .unique_by(|i| i.point.clone())
        .collect::<Vec<Insight>>();
    analysis.quotes = analysis.quotes.into_iter().unique().collect::<Vec<String>>();
    analysis.new_concepts = analysis
        .new_concepts
        .into_iter()
        .unique_by(|c| c.term.clone())
        .collect::<Vec<Concept>>();

    Ok(analysis)
}
