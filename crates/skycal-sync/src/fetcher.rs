//! # Remote Schedule Fetcher
//!
//! Reads a sub-resource's schedule from its remote site proxy.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Fetch for "mrc1" (mrc / 0m31)                     │
//! │                                                                         │
//! │  1. GET {base}/observation-portal/api/last_scheduled                   │
//! │     → { "last_schedule_time": "2024-05-14T12:00:00Z" }                 │
//! │                                                                         │
//! │  2. GET {base}/observation-portal/api/schedule                         │
//! │        ?start=…&end=…&limit=1000&telescope=0m31                        │
//! │     → { "results": [ {observation}, … ] }                              │
//! │                                                                         │
//! │  Transport error / 5xx / 429 ──► retry with exponential backoff        │
//! │  Other non-2xx                ──► RemoteUnavailable (no retry)         │
//! │  Body is not the expected JSON ──► RemoteScheduleMalformed             │
//! │  One result fails to decode    ──► listed in `undecodable`, rest kept  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two calls are separate trait methods so the engine can stop after the
//! first one when the schedule has not changed.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use skycal_core::translate::parse_timestamp;
use skycal_core::RemoteObservation;

const LAST_SCHEDULED_PATH: &str = "observation-portal/api/last_scheduled";
const SCHEDULE_PATH: &str = "observation-portal/api/schedule";

/// Query-string timestamp format expected by the site proxy.
const WINDOW_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// =============================================================================
// Fetch Types
// =============================================================================

/// Time window requested from the schedule endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        FetchWindow { start, end }
    }

    /// `now .. now + horizon`
    pub fn ahead(now: DateTime<Utc>, horizon: chrono::Duration) -> Self {
        FetchWindow {
            start: now,
            end: now + horizon,
        }
    }
}

/// Observations returned for a window, in every state.
#[derive(Debug, Clone, Default)]
pub struct ObservationBatch {
    pub observations: Vec<RemoteObservation>,
    /// Results that were not valid observations, with the decode error.
    pub undecodable: Vec<String>,
}

/// A versioned schedule: what `fetch_latest` returns.
#[derive(Debug, Clone)]
pub struct RemoteSchedule {
    pub remote_updated_at: DateTime<Utc>,
    pub batch: ObservationBatch,
}

// =============================================================================
// Fetcher Trait
// =============================================================================

/// Source of remote schedules, one sub-resource at a time.
#[async_trait]
pub trait ScheduleFetcher: Send + Sync {
    /// Version timestamp of the sub-resource's current remote schedule.
    async fn last_updated(&self, subresource_id: &str) -> SyncResult<DateTime<Utc>>;

    /// Observations scheduled for the sub-resource inside `window`.
    async fn fetch_observations(
        &self,
        subresource_id: &str,
        window: &FetchWindow,
    ) -> SyncResult<ObservationBatch>;

    /// Version and observations in one call.
    async fn fetch_latest(
        &self,
        subresource_id: &str,
        window: &FetchWindow,
    ) -> SyncResult<RemoteSchedule> {
        let remote_updated_at = self.last_updated(subresource_id).await?;
        let batch = self.fetch_observations(subresource_id, window).await?;
        Ok(RemoteSchedule {
            remote_updated_at,
            batch,
        })
    }
}

// =============================================================================
// HTTP Fetcher
// =============================================================================

/// Retry bounds for one HTTP call.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Total time spent retrying one call.
    pub max_elapsed: Duration,
    pub max_attempts: u32,
    pub page_limit: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            max_elapsed: Duration::from_secs(30),
            max_attempts: 4,
            page_limit: 1000,
        }
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    base: Url,
    telescope: String,
    token: Option<String>,
}

impl Endpoint {
    fn url(&self, path: &str) -> SyncResult<Url> {
        let base = self.base.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path))?)
    }
}

#[derive(Debug, Deserialize)]
struct LastScheduledBody {
    last_schedule_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScheduleBody {
    results: Vec<serde_json::Value>,
}

enum Failure {
    Transient(SyncError),
    Permanent(SyncError),
}

/// Fetches schedules from the remote site proxies over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpScheduleFetcher {
    client: reqwest::Client,
    endpoints: HashMap<String, Endpoint>,
    retry: RetrySettings,
}

impl HttpScheduleFetcher {
    pub fn new(client: reqwest::Client, retry: RetrySettings) -> Self {
        HttpScheduleFetcher {
            client,
            endpoints: HashMap::new(),
            retry,
        }
    }

    /// Builds a fetcher with one endpoint per configured sub-resource.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        let retry = RetrySettings {
            initial_backoff: Duration::from_millis(config.sync.initial_backoff_ms),
            max_backoff: Duration::from_secs(config.sync.max_backoff_secs),
            max_elapsed: config.fetch_timeout(),
            page_limit: config.sync.page_limit,
            ..RetrySettings::default()
        };

        let mut fetcher = Self::new(client, retry);
        for sub in &config.subresources {
            let token = config.token(sub);
            if token.is_none() {
                warn!(
                    subresource = %sub.id,
                    var = %sub.token_var(),
                    "No proxy secret configured, requests will be unauthenticated"
                );
            }
            fetcher = fetcher.with_endpoint(&sub.id, config.endpoint(sub)?, &sub.telescope, token);
        }
        Ok(fetcher)
    }

    /// Registers the proxy serving `subresource_id`.
    pub fn with_endpoint(
        mut self,
        subresource_id: impl Into<String>,
        base: Url,
        telescope: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        self.endpoints.insert(
            subresource_id.into(),
            Endpoint {
                base,
                telescope: telescope.into(),
                token,
            },
        );
        self
    }

    fn endpoint(&self, subresource_id: &str) -> SyncResult<&Endpoint> {
        self.endpoints
            .get(subresource_id)
            .ok_or_else(|| SyncError::UnknownSubresource(subresource_id.to_string()))
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.retry.initial_backoff,
            max_interval: self.retry.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: Some(self.retry.max_elapsed),
            ..Default::default()
        }
    }

    /// GET with retries on transient failures.
    async fn get_json(
        &self,
        subresource_id: &str,
        endpoint: &Endpoint,
        path: &str,
        query: &[(&str, String)],
    ) -> SyncResult<serde_json::Value> {
        let url = endpoint.url(path)?;
        let mut backoff = self.create_backoff();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.try_get(subresource_id, endpoint, &url, query).await {
                Ok(body) => return Ok(body),
                Err(Failure::Permanent(e)) => return Err(e),
                Err(Failure::Transient(e)) => {
                    let next = if attempt < self.retry.max_attempts {
                        backoff.next_backoff()
                    } else {
                        None
                    };
                    match next {
                        Some(wait) => {
                            debug!(
                                subresource = %subresource_id,
                                attempt,
                                ?wait,
                                error = %e,
                                "Retrying remote request"
                            );
                            tokio::time::sleep(wait).await;
                        }
                        None => return Err(e),
                    }
                }
            }
        }
    }

    async fn try_get(
        &self,
        subresource_id: &str,
        endpoint: &Endpoint,
        url: &Url,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, Failure> {
        let mut request = self.client.get(url.clone()).query(query);
        if let Some(ref token) = endpoint.token {
            request = request.header(AUTHORIZATION, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Failure::Transient(SyncError::unavailable(subresource_id, e)))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Failure::Transient(SyncError::unavailable(
                subresource_id,
                format!("HTTP {}", status),
            )));
        }
        if !status.is_success() {
            return Err(Failure::Permanent(SyncError::unavailable(
                subresource_id,
                format!("HTTP {}", status),
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Failure::Transient(SyncError::unavailable(subresource_id, e)))?;

        serde_json::from_slice(&body)
            .map_err(|e| Failure::Permanent(SyncError::malformed(subresource_id, e)))
    }
}

#[async_trait]
impl ScheduleFetcher for HttpScheduleFetcher {
    async fn last_updated(&self, subresource_id: &str) -> SyncResult<DateTime<Utc>> {
        let endpoint = self.endpoint(subresource_id)?;
        let body = self
            .get_json(subresource_id, endpoint, LAST_SCHEDULED_PATH, &[])
            .await?;

        let parsed: LastScheduledBody = serde_json::from_value(body)
            .map_err(|e| SyncError::malformed(subresource_id, e))?;
        let raw = parsed
            .last_schedule_time
            .ok_or_else(|| SyncError::malformed(subresource_id, "missing last_schedule_time"))?;

        parse_timestamp("last_schedule_time", &raw)
            .map_err(|e| SyncError::malformed(subresource_id, e))
    }

    async fn fetch_observations(
        &self,
        subresource_id: &str,
        window: &FetchWindow,
    ) -> SyncResult<ObservationBatch> {
        let endpoint = self.endpoint(subresource_id)?;
        let query = [
            ("start", window.start.format(WINDOW_FORMAT).to_string()),
            ("end", window.end.format(WINDOW_FORMAT).to_string()),
            ("limit", self.retry.page_limit.to_string()),
            ("telescope", endpoint.telescope.clone()),
        ];

        let body = self
            .get_json(subresource_id, endpoint, SCHEDULE_PATH, &query)
            .await?;
        let page: ScheduleBody =
            serde_json::from_value(body).map_err(|e| SyncError::malformed(subresource_id, e))?;

        let mut batch = ObservationBatch::default();
        for raw in page.results {
            let hint = raw
                .get("id")
                .map(|id| id.to_string())
                .unwrap_or_else(|| "?".to_string());
            match serde_json::from_value::<RemoteObservation>(raw) {
                Ok(obs) => batch.observations.push(obs),
                Err(e) => batch.undecodable.push(format!("observation {}: {}", hint, e)),
            }
        }

        debug!(
            subresource = %subresource_id,
            observations = batch.observations.len(),
            undecodable = batch.undecodable.len(),
            "Fetched remote schedule"
        );

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> RetrySettings {
        RetrySettings {
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            max_elapsed: Duration::from_secs(2),
            max_attempts: 3,
            page_limit: 1000,
        }
    }

    fn fetcher(server: &MockServer) -> HttpScheduleFetcher {
        HttpScheduleFetcher::new(reqwest::Client::new(), fast_retry()).with_endpoint(
            "mrc1",
            Url::parse(&server.uri()).unwrap(),
            "0m31",
            Some("secret".to_string()),
        )
    }

    fn observation(id: i64, state: &str) -> serde_json::Value {
        json!({
            "id": id,
            "site": "mrc",
            "telescope": "0m31",
            "start": "2024-05-15T02:00:00Z",
            "end": "2024-05-15T02:30:00Z",
            "submitter": "alice",
            "name": "M31 mosaic",
            "observation_type": "NORMAL",
            "state": state,
            "created": "2024-05-14T10:00:00.123456Z",
            "modified": "2024-05-14T11:00:00Z",
            "request": {}
        })
    }

    #[tokio::test]
    async fn test_last_updated_sends_secret() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/observation-portal/api/last_scheduled"))
            .and(header("Authorization", "secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "last_schedule_time": "2024-05-14T12:00:00Z" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let at = fetcher(&server).last_updated("mrc1").await.unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 5, 14, 12, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_fetch_keeps_good_results_and_lists_bad_ones() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/observation-portal/api/schedule"))
            .and(query_param("telescope", "0m31"))
            .and(query_param("limit", "1000"))
            .and(query_param("start", "2024-05-14T00:00:00"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    observation(1, "PENDING"),
                    observation(2, "COMPLETED"),
                    { "id": 3, "site": "mrc" }
                ]
            })))
            .mount(&server)
            .await;

        let now = Utc.with_ymd_and_hms(2024, 5, 14, 0, 0, 0).unwrap();
        let window = FetchWindow::ahead(now, chrono::Duration::days(21));
        let batch = fetcher(&server)
            .fetch_observations("mrc1", &window)
            .await
            .unwrap();

        assert_eq!(batch.observations.len(), 2);
        assert_eq!(batch.undecodable.len(), 1);
        assert!(batch.undecodable[0].starts_with("observation 3"));
    }

    #[tokio::test]
    async fn test_fetch_latest_combines_both_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/observation-portal/api/last_scheduled"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "last_schedule_time": "2024-05-14T12:00:00" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/observation-portal/api/schedule"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "results": [observation(7, "PENDING")] })),
            )
            .mount(&server)
            .await;

        let now = Utc.with_ymd_and_hms(2024, 5, 14, 0, 0, 0).unwrap();
        let schedule = fetcher(&server)
            .fetch_latest("mrc1", &FetchWindow::ahead(now, chrono::Duration::days(1)))
            .await
            .unwrap();

        assert_eq!(
            schedule.remote_updated_at,
            Utc.with_ymd_and_hms(2024, 5, 14, 12, 0, 0).unwrap()
        );
        assert_eq!(schedule.batch.observations.len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/observation-portal/api/last_scheduled"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/observation-portal/api/last_scheduled"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "last_schedule_time": "2024-05-14T12:00:00Z" })),
            )
            .mount(&server)
            .await;

        assert!(fetcher(&server).last_updated("mrc1").await.is_ok());
    }

    #[tokio::test]
    async fn test_persistent_failure_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher(&server).last_updated("mrc1").await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher(&server).last_updated("mrc1").await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_malformed_payloads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/observation-portal/api/last_scheduled"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/observation-portal/api/schedule"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let fetcher = fetcher(&server);
        let err = fetcher.last_updated("mrc1").await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteScheduleMalformed { .. }));

        let now = Utc::now();
        let err = fetcher
            .fetch_observations("mrc1", &FetchWindow::ahead(now, chrono::Duration::days(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteScheduleMalformed { .. }));
    }

    #[tokio::test]
    async fn test_unknown_subresource() {
        let server = MockServer::start().await;
        let err = fetcher(&server).last_updated("eco1").await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownSubresource(_)));
    }
}
