//! Typed HTTP wrappers for the SOD backend.
//!
//! Every call is a single request: no retry, no backoff, no circuit breaking.
//! Failures carry a human-readable message (HTTP status plus whatever body the
//! backend returned) for the console surface to show as-is.

use std::time::Duration;

use reqwest::{header, Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::{
    domain::{PinkasId, TaskId},
    protocol::{
        AmacProposal, AmacRole, AnalyticsSummary, CommandStatusReport, DayInfo, DeepHealthReport,
        HealthStatus, LoginRequest, MeetingStartReport, MissionAck, MissionRequest, PinkasEntry,
        PinkasListing, PinkasPage, PinkasQuery, ScheduleRequest, ScheduleResponse, TokenResponse,
        TreasuryBalance,
    },
};
use thiserror::Error;
use url::Url;

pub mod logs;

pub use logs::{normalize_logs, LogTailer, TailEvent, TailOptions, TailStatus};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend base url is invalid: {0}")]
    BaseUrl(String),
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend responded {status}: {message}")]
    Status { status: u16, message: String },
}

impl BackendError {
    /// HTTP status the backend answered with, when it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Backend {
    pub(crate) http: Client,
    pub(crate) base_url: String,
}

impl Backend {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, BackendError> {
        let base_url = base_url.as_ref();
        let parsed = Url::parse(base_url).map_err(|err| BackendError::BaseUrl(err.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BackendError::BaseUrl(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthStatus, BackendError> {
        self.get_json("/health").await
    }

    pub async fn deep_health(&self) -> Result<DeepHealthReport, BackendError> {
        self.get_json("/health/deep").await
    }

    pub async fn list_pinkas(&self, query: &PinkasQuery) -> Result<PinkasPage, BackendError> {
        let response = self
            .http
            .get(self.url("/pinkas"))
            .header(header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await?;
        Ok(expect_json::<PinkasListing>(response).await?.into_page())
    }

    pub async fn pinkas_entry(&self, id: PinkasId) -> Result<PinkasEntry, BackendError> {
        self.get_json(&format!("/pinkas/{}", id.0)).await
    }

    pub async fn schedule_command(
        &self,
        request: &ScheduleRequest,
    ) -> Result<ScheduleResponse, BackendError> {
        self.post_json("/commands/schedule", request).await
    }

    pub async fn command_status(
        &self,
        task_id: &TaskId,
    ) -> Result<CommandStatusReport, BackendError> {
        self.get_json(&format!("/commands/status/{task_id}")).await
    }

    pub async fn amac_roles(&self) -> Result<Vec<AmacRole>, BackendError> {
        self.get_json("/amac/roles").await
    }

    pub async fn amac_proposals(&self) -> Result<Vec<AmacProposal>, BackendError> {
        self.get_json("/admin/amac/proposals").await
    }

    pub async fn analytics_summary(&self) -> Result<AnalyticsSummary, BackendError> {
        self.get_json("/analytics/summary").await
    }

    pub async fn day_info(&self, lang: Option<&str>) -> Result<DayInfo, BackendError> {
        let mut request = self
            .http
            .get(self.url("/ritual/day-info"))
            .header(header::ACCEPT, "application/json");
        if let Some(lang) = lang {
            request = request.query(&[("lang", lang)]);
        }
        expect_json(request.send().await?).await
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<TokenResponse, BackendError> {
        self.post_json("/auth/login", request).await
    }

    /// Agent log feed, normalized to printable lines.
    pub async fn agent_log_lines(&self) -> Result<Vec<String>, BackendError> {
        self.log_lines("/logs").await
    }

    /// Board-meeting transcript, normalized to printable lines. This is the
    /// pull counterpart of the `/meeting/logs/stream` feed.
    pub async fn meeting_log_lines(&self) -> Result<Vec<String>, BackendError> {
        self.log_lines("/meeting/logs").await
    }

    pub async fn start_meeting(&self) -> Result<MeetingStartReport, BackendError> {
        let response = self.http.post(self.url("/start-meeting")).send().await?;
        expect_json(response).await
    }

    pub async fn dispatch_mission(
        &self,
        request: &MissionRequest,
    ) -> Result<MissionAck, BackendError> {
        self.post_json("/api/v1/mission", request).await
    }

    pub async fn ton_balance(&self) -> Result<TreasuryBalance, BackendError> {
        self.get_json("/ton/balance").await
    }

    pub(crate) async fn log_lines(&self, path: &str) -> Result<Vec<String>, BackendError> {
        let payload: Value = self.get_json(path).await?;
        Ok(normalize_logs(&payload))
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let response = self
            .http
            .get(self.url(path))
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        expect_json(response).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let response = self
            .http
            .post(self.url(path))
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;
        expect_json(response).await
    }
}

pub(crate) async fn expect_json<T: DeserializeOwned>(
    response: Response,
) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("no response body")
                .to_string()
        } else {
            body
        };
        return Err(BackendError::Status {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json().await?)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
