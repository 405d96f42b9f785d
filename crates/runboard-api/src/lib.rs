//! Read-only REST client for the scheduler's `/api/v1` endpoints.

pub mod error;
pub mod model;

pub use error::ApiError;
pub use model::{JobRecord, JobSummary};

use reqwest::Client;
use runboard_core::{RunRecord, RunsFrame};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_SERVER: &str = "http://localhost:5000";
const REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone)]
pub struct ApiClient {
    base: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(server: &str) -> Result<Self, ApiError> {
        let base = parse_base_url(server)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| ApiError::Request(format!("failed to build http client: {err}")))?;
        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Builds `{base}/api/v1/{segments..}`, percent-encoding each segment.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "v1"]).extend(segments);
        }
        url
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>, ApiError> {
        self.get_json(self.endpoint(&["jobs"])).await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<JobRecord, ApiError> {
        self.get_json(self.endpoint(&["jobs", job_id])).await
    }

    /// Every run the server still knows for `job_id`, in run id order.
    pub async fn get_job_runs(&self, job_id: &str) -> Result<Vec<RunRecord>, ApiError> {
        let frame: RunsFrame = self.get_json(self.endpoint(&["jobs", job_id, "runs"])).await?;
        Ok(frame.runs.into_values().collect())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<RunRecord, ApiError> {
        let frame: RunsFrame = self.get_json(self.endpoint(&["runs", run_id])).await?;
        pick_run(frame, run_id)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!(event = "api_request", url = %url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| ApiError::Request(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ApiError::Request(format!("response read failed: {err}")))?;

        if !status.is_success() {
            let message = error_message(&body);
            warn!(
                event = "api_error_status",
                url = %url,
                status = status.as_u16(),
                message = %message
            );
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

/// Accepts `http://` and `https://` servers, optionally under a path prefix.
pub fn parse_base_url(raw: &str) -> Result<Url, ApiError> {
    let invalid = |reason: String| ApiError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(invalid("missing host".to_string()));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("not a base url".to_string()));
    }
    Ok(url)
}

fn pick_run(frame: RunsFrame, run_id: &str) -> Result<RunRecord, ApiError> {
    let mut runs = frame.runs;
    if let Some(run) = runs.remove(run_id) {
        return Ok(run);
    }
    runs.into_values().next().ok_or_else(|| ApiError::NotFound {
        kind: "run",
        id: run_id.to_string(),
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| match value.get("error") {
            Some(Value::String(message)) if !message.trim().is_empty() => Some(message.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
        .unwrap_or_else(|| "unknown error".to_string())
}
