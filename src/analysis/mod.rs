//! Article analysis through an OpenAI-compatible LLM API.
//!
//! # Architecture
//!
//! - [`client`]: Raw prompt/response transport ([`client::AskAsync`]), the
//!   chat-completions provider and a retry decorator with exponential backoff
//! - [`article`]: Single-article analysis: content validation, prompt
//!   construction and tolerant parsing of the model's JSON answer
//! - [`scheduler`]: Bounded concurrent analysis of many articles with
//!   per-item failure isolation and stable output order
//!
//! The scheduler only depends on the [`Analyze`] capability, so it can be
//! driven by a fake in tests.

pub mod article;
pub mod client;
pub mod scheduler;

use crate::models::AnalysisResult;
use thiserror::Error;

pub use article::ArticleAnalyzer;
pub use client::{ChatClient, RetryAsk};
pub use scheduler::{analyze_all, ArticleInput, Schedule};

/// Errors produced while analysing a single article.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The article text is too short to be worth sending
    #[error("insufficient content: {len} characters, at least {min} required")]
    InsufficientContent { len: usize, min: usize },
    /// Connection, TLS or body decoding failure
    #[error("request failed: {0}")]
    Network(reqwest::Error),
    /// The provider did not answer within the client timeout
    #[error("request timed out")]
    Timeout,
    /// Non-2xx response from the provider
    #[error("provider returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    /// 2xx response without any message content
    #[error("provider returned an empty response")]
    EmptyResponse,
    /// The answer was not the JSON document we asked for
    #[error("could not parse analysis: {0}")]
    Parse(#[from] serde_json::Error),
    /// Provider settings are incomplete
    #[error("analysis provider misconfigured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AnalysisError::Timeout
        } else {
            AnalysisError::Network(e)
        }
    }
}

impl AnalysisError {
    /// Returns true if this error is transient and the request should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::Network(_) | AnalysisError::Timeout => true,
            AnalysisError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            AnalysisError::InsufficientContent { .. }
            | AnalysisError::EmptyResponse
            | AnalysisError::Parse(_)
            | AnalysisError::Config(_) => false,
        }
    }
}

/// The capability of turning one article into an [`AnalysisResult`].
pub trait Analyze {
    async fn analyze(&self, title: &str, text: &str) -> Result<AnalysisResult, AnalysisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AnalysisError::Timeout.is_retryable());
        assert!(
            AnalysisError::HttpStatus {
                status: 429,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            AnalysisError::HttpStatus {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !AnalysisError::HttpStatus {
                status: 401,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!AnalysisError::InsufficientContent { len: 3, min: 100 }.is_retryable());
        assert!(!AnalysisError::EmptyResponse.is_retryable());
    }

    #[test]
    fn test_insufficient_content_message() {
        let e = AnalysisError::InsufficientContent { len: 99, min: 100 };
        assert_eq!(
            e.to_string(),
            "insufficient content: 99 characters, at least 100 required"
        );
    }
}
