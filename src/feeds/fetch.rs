//! Feed download with a hard timeout.
//!
//! [`fetch_feed`] returns a typed result; [`fetch_and_parse`] is the
//! containment boundary that turns any failure into an empty item list so one
//! broken feed never stops ingestion of the others.

use crate::feeds::atom::parse_entries;
use crate::models::FeedItem;
use crate::utils::truncate_for_log;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Timeout applied to the whole request, body included.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const ACCEPT: &str = "application/atom+xml,application/xml,text/xml,*/*";

/// Errors that can occur while downloading a feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS or body decoding failure
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Response with a non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The request did not complete within the configured timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Download a feed document.
///
/// The timeout covers sending the request and reading the body; when it
/// elapses the in-flight request is dropped.
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    let request = async {
        let response = client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        Ok::<_, FetchError>(response.text().await?)
    };

    tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| FetchError::Timeout(timeout))?
}

/// Fetch a feed and parse its entries. Never fails: errors are logged and
/// yield an empty list.
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn fetch_and_parse(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Vec<FeedItem> {
    let t0 = Instant::now();
    match fetch_feed(client, url, timeout).await {
        Ok(body) => {
            info!(bytes = body.len(), elapsed_ms = t0.elapsed().as_millis() as u64, "Fetched feed");
            let items = parse_entries(&body);
            if items.is_empty() {
                warn!(preview = %truncate_for_log(&body, 200), "Feed contained no usable entries");
            }
            items
        }
        Err(FetchError::Timeout(limit)) => {
            error!(?limit, "Feed request timed out");
            Vec::new()
        }
        Err(e) => {
            error!(error = %e, "Failed to fetch feed");
            Vec::new()
        }
    }
}
