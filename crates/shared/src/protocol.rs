use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{PinkasId, Role, TaskId};

// Timestamps stay as the strings the backend sends. The two backend
// iterations disagree on timezone suffixes (naive vs aware ISO-8601), and the
// console only ever displays them.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

/// `/health/deep` report. Sub-service statuses arrive as flat top-level keys
/// (`db`, `celery`, ...) in one backend iteration and nested under `services`
/// in the other; both are folded by [`DeepHealthReport::service_statuses`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepHealthReport {
    pub status: String,
    #[serde(flatten)]
    pub services: BTreeMap<String, Value>,
}

impl DeepHealthReport {
    pub fn service_statuses(&self) -> BTreeMap<String, String> {
        let mut statuses = BTreeMap::new();
        for (name, value) in &self.services {
            match value {
                Value::String(state) => {
                    statuses.insert(name.clone(), state.clone());
                }
                Value::Object(nested) if name == "services" => {
                    for (inner, state) in nested {
                        if let Value::String(state) = state {
                            statuses.insert(inner.clone(), state.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        statuses
    }

    pub fn is_healthy(&self) -> bool {
        let overall_ok = matches!(self.status.as_str(), "ok" | "healthy");
        overall_ok
            && self
                .service_statuses()
                .values()
                .all(|state| matches!(state.as_str(), "ok" | "healthy"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinkasEntry {
    pub id: PinkasId,
    pub agent: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default, alias = "thought", alias = "details")]
    pub detail: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub result: Option<Value>,
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PinkasPage {
    pub items: Vec<PinkasEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

/// The listing endpoint returns a bare entry array in one backend iteration
/// and a page envelope in the other.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PinkasListing {
    Page(PinkasPage),
    Entries(Vec<PinkasEntry>),
}

impl PinkasListing {
    pub fn into_page(self) -> PinkasPage {
        match self {
            PinkasListing::Page(page) => page,
            PinkasListing::Entries(items) => PinkasPage {
                items,
                ..PinkasPage::default()
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PinkasQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub agent_name: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub task_id: TaskId,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandStatusReport {
    pub task_id: TaskId,
    pub state: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmacRole {
    pub internal_name: String,
    pub display_name: String,
    pub tribe: String,
    pub mission: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmacProposal {
    pub id: String,
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub budget_ton: Option<f64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCount {
    pub channel: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    #[serde(default)]
    pub pinkas_per_day: Vec<DailyCount>,
    #[serde(default)]
    pub missions_per_day: Vec<DailyCount>,
    #[serde(default)]
    pub messages_sent_per_channel: Vec<ChannelCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayInfo {
    pub gregorian_date: String,
    pub jewish_date_str: String,
    #[serde(default)]
    pub parsha: Option<String>,
    pub day_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn bearer() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingStartReport {
    #[serde(default)]
    pub mission_goal: Option<String>,
    #[serde(default)]
    pub transcript: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionRequest {
    pub goal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub mission_goal: Option<String>,
}

impl MissionAck {
    /// The orchestrator reports `status == "running"` when a mission loop was
    /// already active before this request.
    pub fn already_running(&self) -> bool {
        self.status.as_deref() == Some("running")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BalanceAmount {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TreasuryBalance {
    #[serde(default)]
    pub balance: Option<BalanceAmount>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl TreasuryBalance {
    /// Four-decimal display amount with the currency suffix, `TON` when the
    /// backend omits one. Non-numeric balances pass through verbatim.
    pub fn display(&self) -> String {
        let currency = self.currency.as_deref().unwrap_or("TON");
        let amount = match &self.balance {
            None => "0.0000".to_string(),
            Some(BalanceAmount::Number(value)) => format!("{value:.4}"),
            Some(BalanceAmount::Text(raw)) => match raw.parse::<f64>() {
                Ok(value) => format!("{value:.4}"),
                Err(_) => raw.clone(),
            },
        };
        format!("{amount} {currency}")
    }
}
