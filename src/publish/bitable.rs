//! Multi-dimensional table sink speaking the tenant-token + `batch_create` API.

use crate::config::PublishConfig;
use crate::models::PublishRecord;
use crate::publish::{Credential, PublishError, TableSink};
use crate::utils::truncate_for_log;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

#[derive(Serialize)]
struct TokenRequest<'a> {
    app_id: &'a str,
    app_secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    msg: String,
}

pub struct BitableSink {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    app_token: String,
    table_id: String,
}

impl fmt::Debug for BitableSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitableSink")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("app_token", &self.app_token)
            .field("table_id", &self.table_id)
            .finish_non_exhaustive()
    }
}

impl BitableSink {
    /// Build a sink from the publish settings; every identifier must be set.
    pub fn new(config: &PublishConfig) -> Result<Self, PublishError> {
        let required = |v: &Option<String>, name: &'static str| {
            v.clone()
                .filter(|s| !s.trim().is_empty())
                .ok_or(PublishError::MissingConfig(name))
        };

        let http = reqwest::Client::builder()
            .user_agent(concat!("feed_digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: required(&config.app_id, "TABLE_APP_ID")?,
            app_secret: required(&config.app_secret, "TABLE_APP_SECRET")?,
            app_token: required(&config.app_token, "TABLE_APP_TOKEN")?,
            table_id: required(&config.table_id, "TABLE_ID")?,
        })
    }

    fn records_url(&self) -> String {
        format!(
            "{}/bitable/v1/apps/{}/tables/{}/records/batch_create",
            self.base_url,
            urlencoding::encode(&self.app_token),
            urlencoding::encode(&self.table_id)
        )
    }
}

/// Row payload for one record. URL cells take a `{link, text}` object and
/// date cells take epoch milliseconds.
pub fn record_fields(record: &PublishRecord) -> Value {
    let mut fields = json!({
        "title": record.title,
        "link": { "link": record.link, "text": record.link },
        "source": record.source,
        "summary": record.summary_text,
        "insights": record.insights_text,
        "quotes": record.quotes_text,
        "new_concepts": record.concepts_text,
    });
    if let (Some(ts), Some(map)) = (record.published_at, fields.as_object_mut()) {
        map.insert("published_at".to_string(), json!(ts.timestamp_millis()));
    }
    fields
}

impl TableSink for BitableSink {
    #[instrument(level = "info", skip_all, fields(app_id = %self.app_id))]
    async fn authenticate(&self) -> Result<Credential, PublishError> {
        let url = format!("{}/auth/v3/tenant_access_token/internal", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&TokenRequest {
                app_id: &self.app_id,
                app_secret: &self.app_secret,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|_| {
            PublishError::Auth(format!(
                "status {}: {}",
                status.as_u16(),
                truncate_for_log(&body, 200)
            ))
        })?;

        if parsed.code != 0 {
            return Err(PublishError::Auth(format!("code {}: {}", parsed.code, parsed.msg)));
        }
        parsed
            .tenant_access_token
            .filter(|t| !t.is_empty())
            .map(Credential::new)
            .ok_or_else(|| PublishError::Auth("response carried no token".to_string()))
    }

    #[instrument(level = "info", skip_all, fields(len = batch.len()))]
    async fn bulk_insert(
        &self,
        credential: &Credential,
        batch: &[PublishRecord],
    ) -> Result<(), PublishError> {
        let t0 = Instant::now();
        let records: Vec<Value> = batch
            .iter()
            .map(|r| json!({ "fields": record_fields(r) }))
            .collect();

        let response = self
            .http
            .post(self.records_url())
            .bearer_auth(credential.expose())
            .json(&json!({ "records": records }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let code = serde_json::from_str::<ApiResponse>(&body)
            .map(|r| (r.code, r.msg))
            .ok();

        match code {
            Some((0, _)) if status.is_success() => {
                debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "Bulk insert accepted");
                Ok(())
            }
            other => {
                let reason = match other {
                    Some((code, msg)) => format!("code {code}: {msg}"),
                    None => truncate_for_log(&body, 300),
                };
                warn!(status = status.as_u16(), %reason, "Bulk insert rejected");
                Err(PublishError::Rejected {
                    status: status.as_u16(),
                    reason,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisResult;
    use crate::publish::publish_all;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> PublishConfig {
        PublishConfig {
            enabled: true,
            base_url: server.uri(),
            app_id: Some("cli_app".to_string()),
            app_secret: Some("shh".to_string()),
            app_token: Some("bascn/1".to_string()),
            table_id: Some("tbl1".to_string()),
            ..PublishConfig::default()
        }
    }

    fn record(i: usize) -> PublishRecord {
        PublishRecord::project(
            &format!("Title {i}"),
            &format!("https://example.com/{i}"),
            "Example",
            None,
            &AnalysisResult::fallback("n/a"),
        )
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/auth/v3/tenant_access_token/internal"))
            .and(body_partial_json(json!({"app_id": "cli_app", "app_secret": "shh"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "ok",
                "tenant_access_token": "t-abc",
                "expire": 7200
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_missing_identifiers_rejected() {
        let config = PublishConfig {
            enabled: true,
            app_id: Some("id".to_string()),
            app_secret: Some("secret".to_string()),
            app_token: None,
            table_id: Some("tbl".to_string()),
            ..PublishConfig::default()
        };
        assert!(matches!(
            BitableSink::new(&config),
            Err(PublishError::MissingConfig("TABLE_APP_TOKEN"))
        ));
    }

    #[test]
    fn test_record_fields_shape() {
        let mut r = record(7);
        r.published_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let fields = record_fields(&r);

        assert_eq!(fields["title"], "Title 7");
        assert_eq!(fields["link"]["link"], "https://example.com/7");
        assert_eq!(fields["link"]["text"], "https://example.com/7");
        assert_eq!(fields["published_at"], 1_704_067_200_000i64);
        assert!(fields["summary"].as_str().unwrap().starts_with("Analysis failed"));
    }

    #[test]
    fn test_record_fields_without_date() {
        assert!(record_fields(&record(1)).get("published_at").is_none());
    }

    #[tokio::test]
    async fn test_authenticate_returns_token() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        let sink = BitableSink::new(&config_for(&server)).unwrap();

        assert_eq!(sink.authenticate().await.unwrap().expose(), "t-abc");
    }

    #[tokio::test]
    async fn test_authenticate_nonzero_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v3/tenant_access_token/internal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 10014,
                "msg": "app secret invalid"
            })))
            .mount(&server)
            .await;
        let sink = BitableSink::new(&config_for(&server)).unwrap();

        match sink.authenticate().await {
            Err(PublishError::Auth(msg)) => assert!(msg.contains("app secret invalid")),
            other => panic!("Expected Auth error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_end_to_end_with_rejected_batch() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        let records_path = "/bitable/v1/apps/bascn%2F1/tables/tbl1/records/batch_create";

        // First batch lands, second is refused at the application level.
        Mock::given(method("POST"))
            .and(path(records_path))
            .and(bearer_token("t-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0, "msg": "success"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(records_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 1254045,
                "msg": "FieldNameNotFound"
            })))
            .mount(&server)
            .await;

        let sink = BitableSink::new(&config_for(&server)).unwrap();
        let records: Vec<_> = (0..3).map(record).collect();
        let report = publish_all(&sink, &records, 2).await.unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert!(report.errors[0].contains("FieldNameNotFound"));
    }

    #[tokio::test]
    async fn test_bulk_insert_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;
        let sink = BitableSink::new(&config_for(&server)).unwrap();

        match sink.bulk_insert(&Credential::new("t"), &[record(0)]).await {
            Err(PublishError::Rejected { status: 502, reason }) => {
                assert_eq!(reason, "bad gateway")
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }
}
