//! SAPI REST API client.
//!
//! Thin wrapper over the problem and solver endpoints. Every call returns
//! raw wire records; mapping onto client types happens in the transport.

use std::time::Duration;

use anneal_client::{ConnectionConfig, JobId, Problem, ProblemStatus, RemoteStatus, SolverDescriptor};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Proxy, RequestBuilder};
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};

use crate::error::{SapiError, SapiResult};

/// Authentication header expected by SAPI (`X-Auth-Token`).
pub const AUTH_HEADER: &str = "x-auth-token";

const DEFAULT_USER_AGENT: &str = concat!("anneal-client/", env!("CARGO_PKG_VERSION"));

/// SAPI REST API client.
pub struct SapiClient {
    /// HTTP client with auth header and timeouts configured.
    client: Client,
    /// API base URL (without trailing slash).
    base_url: String,
}

impl std::fmt::Debug for SapiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SapiClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl SapiClient {
    /// Create a client from a connection descriptor.
    pub fn new(config: &ConnectionConfig) -> SapiResult<Self> {
        let token = config.token.as_deref().ok_or(SapiError::MissingToken)?;
        if config.endpoint.trim().is_empty() {
            return Err(SapiError::InvalidUrl("empty endpoint".to_string()));
        }

        let mut auth = HeaderValue::from_str(token).map_err(|_| SapiError::InvalidToken)?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTH_HEADER, auth);

        let mut builder = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT))
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout());

        if let Some(proxy) = &config.proxy {
            let proxy = Proxy::all(proxy).map_err(|e| SapiError::InvalidUrl(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a request and decode the JSON body of a success response.
    async fn send<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder) -> SapiResult<T> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let retry_after = parse_retry_after(response.headers());
            let message = response.text().await.unwrap_or_default();
            Err(SapiError::ApiError {
                status: status.as_u16(),
                message: if message.is_empty() {
                    status.canonical_reason().unwrap_or("Unknown").to_string()
                } else {
                    message
                },
                retry_after,
            })
        }
    }

    // -----------------------------------------------------------------------
    // Problem endpoints
    // -----------------------------------------------------------------------

    /// Submit a batch of problems. Replies are aligned with the request.
    #[instrument(skip(self, problems), fields(count = problems.len()))]
    pub async fn submit_problems(&self, problems: &[Problem]) -> SapiResult<Vec<ProblemReply>> {
        debug!("Submitting problems");
        self.send(self.client.post(self.url("problems/")).json(problems))
            .await
    }

    /// Fetch status records for several problems in one request.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn problem_status(&self, ids: &[JobId]) -> SapiResult<Vec<StatusRecord>> {
        let joined = ids.iter().map(JobId::as_str).collect::<Vec<_>>().join(",");
        debug!("Getting problem status");
        self.send(
            self.client
                .get(self.url("problems/"))
                .query(&[("id", joined)]),
        )
        .await
    }

    /// Fetch the full record of one problem, including its answer.
    #[instrument(skip(self))]
    pub async fn problem(&self, id: &JobId) -> SapiResult<StatusRecord> {
        debug!("Getting problem {}", id);
        self.send(self.client.get(self.url(&format!("problems/{id}/"))))
            .await
    }

    /// Cancel several problems. Replies are aligned with the request.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn cancel_problems(&self, ids: &[JobId]) -> SapiResult<Vec<ProblemReply>> {
        debug!("Cancelling problems");
        self.send(self.client.delete(self.url("problems/")).json(ids))
            .await
    }

    // -----------------------------------------------------------------------
    // Solver endpoints
    // -----------------------------------------------------------------------

    /// List every solver visible to this token.
    #[instrument(skip(self))]
    pub async fn list_solvers(&self) -> SapiResult<Vec<SolverDescriptor>> {
        self.send(self.client.get(self.url("solvers/remote/"))).await
    }

    /// Fetch one solver descriptor.
    #[instrument(skip(self))]
    pub async fn solver(&self, id: &str) -> SapiResult<SolverDescriptor> {
        self.send(self.client.get(self.url(&format!("solvers/remote/{id}/"))))
            .await
    }
}

/// `Retry-After` in its delay-seconds form. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Status record for one problem.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusRecord {
    pub id: String,
    pub status: RemoteStatus,
    #[serde(default)]
    pub solver: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub submitted_on: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub solved_on: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub earliest_estimated_completion: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub latest_estimated_completion: Option<DateTime<Utc>>,
    #[serde(default)]
    pub answer: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl StatusRecord {
    /// Convert into the client's status type.
    pub fn into_status(self) -> ProblemStatus {
        ProblemStatus {
            id: JobId::new(self.id),
            status: self.status,
            solver: self.solver,
            submitted_on: self.submitted_on,
            solved_on: self.solved_on,
            eta_min: self.earliest_estimated_completion,
            eta_max: self.latest_estimated_completion,
            answer: self.answer,
            error_message: self.error_message,
        }
    }
}

/// Error record returned in place of a status record.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorRecord {
    pub error_code: u16,
    #[serde(default)]
    pub error_msg: String,
}

/// One entry of a submission or cancellation reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProblemReply {
    Status(StatusRecord),
    Error(ErrorRecord),
}

/// Timestamps are ISO 8601; a missing offset means UTC. Unparseable
/// values are treated as absent.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn test_status_record_naive_timestamps() {
        let record: StatusRecord = serde_json::from_value(json!({
            "status": "COMPLETED",
            "solved_on": "2013-01-18T10:26:00.020954",
            "solver": "abc123",
            "submitted_on": "2013-01-18T10:25:59.941674",
            "answer": {"format": "qp", "energies": "AAAAAAAALsA="},
            "type": "ising",
            "id": "123"
        }))
        .unwrap();

        assert_eq!(record.status, RemoteStatus::Completed);
        let solved = record.solved_on.unwrap();
        assert_eq!((solved.year(), solved.hour(), solved.minute()), (2013, 10, 26));
        assert!(record.answer.is_some());
    }

    #[test]
    fn test_status_record_offset_timestamps() {
        let record: StatusRecord = serde_json::from_value(json!({
            "status": "COMPLETED",
            "solved_on": "2012-12-05T19:15:07+02:00",
            "id": "1"
        }))
        .unwrap();
        assert_eq!(record.solved_on.unwrap().hour(), 17);
        assert!(record.answer.is_none());
    }

    #[test]
    fn test_status_record_eta_maps_to_status() {
        let record: StatusRecord = serde_json::from_value(json!({
            "status": "PENDING",
            "solved_on": null,
            "submitted_on": "2020-01-01T00:00:00+00:00",
            "earliest_estimated_completion": "2020-01-01T00:00:10+00:00",
            "latest_estimated_completion": "2020-01-01T00:00:30+00:00",
            "id": "7"
        }))
        .unwrap();

        let status = record.into_status();
        assert_eq!(status.id, JobId::new("7"));
        assert!(status.status.is_pending());
        assert_eq!(status.eta_min.unwrap().second(), 10);
        assert_eq!(status.eta_max.unwrap().second(), 30);
        assert!(status.solved_on.is_none());
    }

    #[test]
    fn test_unparseable_timestamp_is_absent() {
        let record: StatusRecord = serde_json::from_value(json!({
            "status": "IN_PROGRESS",
            "submitted_on": "yesterday",
            "id": "9"
        }))
        .unwrap();
        assert!(record.submitted_on.is_none());
    }

    #[test]
    fn test_failed_record_keeps_message() {
        let record: StatusRecord = serde_json::from_value(json!({
            "status": "FAILED",
            "id": "3",
            "error_message": "An error message"
        }))
        .unwrap();
        let status = record.into_status();
        assert_eq!(status.status, RemoteStatus::Failed);
        assert_eq!(status.error_message.as_deref(), Some("An error message"));
    }

    #[test]
    fn test_problem_reply_variants() {
        let replies: Vec<ProblemReply> = serde_json::from_value(json!([
            {"status": "PENDING", "id": "1"},
            {"error_code": 400, "error_msg": "Missing parameter 'num_reads'"},
            {"error_code": 409}
        ]))
        .unwrap();

        assert!(matches!(&replies[0], ProblemReply::Status(r) if r.id == "1"));
        assert!(matches!(
            &replies[1],
            ProblemReply::Error(ErrorRecord { error_code: 400, error_msg }) if error_msg.contains("num_reads")
        ));
        assert!(matches!(&replies[2], ProblemReply::Error(e) if e.error_code == 409));
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_client_requires_token() {
        let config = ConnectionConfig::new("https://cloud.example.com/sapi");
        assert!(matches!(SapiClient::new(&config), Err(SapiError::MissingToken)));
    }

    #[test]
    fn test_client_trims_base_url_and_redacts() {
        let config = ConnectionConfig::new("https://cloud.example.com/sapi/").with_token("secret");
        let client = SapiClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "https://cloud.example.com/sapi");
        assert_eq!(client.url("problems/"), "https://cloud.example.com/sapi/problems/");

        let debug = format!("{client:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
