//! Batched publishing of analysed articles to a tabular store.
//!
//! This module provides the publish half of the pipeline. A [`TableSink`] is
//! anything that can hand out a bearer credential and accept a batch of rows
//! in one call; [`publish_all`] drives it over an arbitrary number of records
//! and accounts for partial success.
//!
//! # Batch Semantics
//!
//! Each bulk-insert call is treated as atomic: the whole batch is counted as
//! succeeded or failed. Providers that silently accept part of a batch are
//! therefore over-reported on failure and under-reported on success; the
//! per-batch outcomes in [`PublishReport::batches`] let callers act on exactly
//! what the provider acknowledged.
//!
//! # Implementations
//!
//! - [`bitable::BitableSink`]: token + `batch_create` HTTP API

pub mod bitable;

use crate::models::{PublishRecord, PublishReport};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

pub use bitable::BitableSink;

/// Provider-side upper bound on rows per bulk-insert call.
pub const MAX_BATCH_SIZE: usize = 500;

/// Errors raised by a [`TableSink`].
#[derive(Debug, Error)]
pub enum PublishError {
    /// A required identifier or secret is not configured
    #[error("publish target misconfigured: missing {0}")]
    MissingConfig(&'static str),
    /// The provider refused to issue a credential
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Connection, TLS or body decoding failure
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The provider rejected a bulk insert
    #[error("rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },
}

/// Bearer credential obtained once per publish run.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// A destination that accepts rows in bulk.
pub trait TableSink {
    /// Obtain a fresh credential.
    async fn authenticate(&self) -> Result<Credential, PublishError>;

    /// Insert all records of one batch in a single call.
    async fn bulk_insert(
        &self,
        credential: &Credential,
        batch: &[PublishRecord],
    ) -> Result<(), PublishError>;
}

/// Publish `records` in batches of at most `batch_size` rows.
///
/// Authenticates once up front; an authentication or configuration failure
/// aborts the call with an error. After that, every batch is attempted even
/// if earlier ones fail, and `succeeded + failed == records.len()`.
///
/// `batch_size` is clamped to `1..=MAX_BATCH_SIZE`.
#[instrument(level = "info", skip_all, fields(records = records.len(), batch_size = batch_size))]
pub async fn publish_all<S: TableSink>(
    sink: &S,
    records: &[PublishRecord],
    batch_size: usize,
) -> Result<PublishReport, PublishError> {
    let mut report = PublishReport::default();
    if records.is_empty() {
        info!("Nothing to publish");
        return Ok(report);
    }

    let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
    let t0 = Instant::now();

    let credential = sink.authenticate().await.map_err(|e| {
        error!(error = %e, "Authentication failed; aborting publish");
        e
    })?;

    for (batch_no, batch) in records.chunks(batch_size).enumerate() {
        let start = batch_no * batch_size;
        match sink.bulk_insert(&credential, batch).await {
            Ok(()) => {
                info!(batch = batch_no + 1, start, len = batch.len(), "Batch accepted");
                report.record_accepted(start, batch.len());
            }
            Err(e) => {
                warn!(batch = batch_no + 1, start, len = batch.len(), error = %e, "Batch rejected");
                report.record_rejected(
                    start,
                    batch.len(),
                    format!(
                        "batch {} (records {}..{}) failed: {}",
                        batch_no + 1,
                        start,
                        start + batch.len(),
                        e
                    ),
                );
            }
        }
    }

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Publish completed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisResult;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// Records every call; rejects the batches whose 1-based number is listed.
    #[derive(Default)]
    struct FakeSink {
        fail_auth: bool,
        reject_batches: Vec<usize>,
        auth_calls: Mutex<usize>,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl TableSink for FakeSink {
        async fn authenticate(&self) -> Result<Credential, PublishError> {
            *self.auth_calls.lock().unwrap() += 1;
            if self.fail_auth {
                return Err(PublishError::Auth("invalid app secret".to_string()));
            }
            Ok(Credential::new("t-123"))
        }

        async fn bulk_insert(
            &self,
            credential: &Credential,
            batch: &[PublishRecord],
        ) -> Result<(), PublishError> {
            assert_eq!(credential.expose(), "t-123");
            let mut sizes = self.batch_sizes.lock().unwrap();
            sizes.push(batch.len());
            if self.reject_batches.contains(&sizes.len()) {
                return Err(PublishError::Rejected {
                    status: 400,
                    reason: "FieldNameNotFound".to_string(),
                });
            }
            Ok(())
        }
    }

    fn records(n: usize) -> Vec<PublishRecord> {
        let analysis = AnalysisResult::fallback("n/a");
        (0..n)
            .map(|i| PublishRecord::project(&format!("t{i}"), &format!("https://x/{i}"), "src", None, &analysis))
            .collect()
    }

    #[tokio::test]
    async fn test_second_batch_failure() {
        let sink = FakeSink {
            reject_batches: vec![2],
            ..Default::default()
        };
        let report = publish_all(&sink, &records(600), 500).await.unwrap();

        assert_eq!(report.succeeded, 500);
        assert_eq!(report.failed, 100);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("batch 2"));
        assert_eq!(*sink.batch_sizes.lock().unwrap(), vec![500, 100]);
        assert_eq!(*sink.auth_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_later_batches() {
        let sink = FakeSink {
            reject_batches: vec![1],
            ..Default::default()
        };
        let report = publish_all(&sink, &records(5), 2).await.unwrap();

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(report.accepted_indices().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_auth_failure_raises() {
        let sink = FakeSink {
            fail_auth: true,
            ..Default::default()
        };
        let result = publish_all(&sink, &records(3), 500).await;
        assert!(matches!(result, Err(PublishError::Auth(_))));
        assert!(sink.batch_sizes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_size_clamped() {
        let sink = FakeSink::default();
        publish_all(&sink, &records(1001), 10_000).await.unwrap();
        assert_eq!(*sink.batch_sizes.lock().unwrap(), vec![500, 500, 1]);

        let sink = FakeSink::default();
        publish_all(&sink, &records(3), 0).await.unwrap();
        assert_eq!(*sink.batch_sizes.lock().unwrap(), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_empty_input_skips_auth() {
        let sink = FakeSink::default();
        let report = publish_all(&sink, &[], 500).await.unwrap();
        assert_eq!(report, PublishReport::default());
        assert_eq!(*sink.auth_calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_credential_debug_redacted() {
        assert_eq!(format!("{:?}", Credential::new("secret")), "Credential(***)");
    }

    proptest! {
        #[test]
        fn prop_counts_cover_all_records(
            n in 0usize..120,
            batch_size in 1usize..40,
            rejected in prop::collection::vec(1usize..10, 0..5),
        ) {
            let sink = FakeSink { reject_batches: rejected, ..Default::default() };
            let report = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap()
                .block_on(publish_all(&sink, &records(n), batch_size))
                .unwrap();

            prop_assert_eq!(report.succeeded + report.failed, n);
            prop_assert_eq!(report.accepted_indices().count(), report.succeeded);
        }
    }
}
