//! Operations the console surface exposes on top of the raw backend calls:
//! dashboard aggregation and mission dispatch tracking.

use std::time::Duration;

use async_trait::async_trait;
use backend_client::{Backend, BackendError};
use serde::Serialize;
use serde_json::Value;
use shared::{
    domain::{DispatchState, TaskId},
    protocol::{
        AmacProposal, AmacRole, AnalyticsSummary, CommandStatusReport, DayInfo, DeepHealthReport,
        ScheduleRequest, ScheduleResponse,
    },
};
use tracing::{info, warn};

/// Goal sent to the orchestrator when a mission is dispatched without one.
pub const DEFAULT_MISSION_GOAL: &str = "Devise the next operational steps for the council";

#[derive(Clone)]
pub struct ConsoleContext {
    pub backend: Backend,
}

/// Result of one dashboard section. Sections are fetched independently and
/// fail independently: a dead analytics endpoint must not take the health
/// panel down with it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SectionOutcome<T> {
    Ok { value: T },
    Error { message: String },
}

impl<T> SectionOutcome<T> {
    fn capture(section: &'static str, result: Result<T, BackendError>) -> Self {
        match result {
            Ok(value) => SectionOutcome::Ok { value },
            Err(err) => {
                warn!(section, %err, "dashboard section unavailable");
                SectionOutcome::Error {
                    message: err.to_string(),
                }
            }
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            SectionOutcome::Ok { value } => Some(value),
            SectionOutcome::Error { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TreasurySnapshot {
    pub display: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardOverview {
    pub health: SectionOutcome<DeepHealthReport>,
    pub analytics: SectionOutcome<AnalyticsSummary>,
    pub treasury: SectionOutcome<TreasurySnapshot>,
    pub day: SectionOutcome<DayInfo>,
}

pub async fn dashboard_overview(ctx: &ConsoleContext) -> DashboardOverview {
    let (health, analytics, treasury, day) = tokio::join!(
        ctx.backend.deep_health(),
        ctx.backend.analytics_summary(),
        ctx.backend.ton_balance(),
        ctx.backend.day_info(None),
    );

    DashboardOverview {
        health: SectionOutcome::capture("health", health),
        analytics: SectionOutcome::capture("analytics", analytics),
        treasury: SectionOutcome::capture(
            "treasury",
            treasury.map(|balance| TreasurySnapshot {
                display: balance.display(),
            }),
        ),
        day: SectionOutcome::capture("day_info", day),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GovernanceView {
    pub roles: SectionOutcome<Vec<AmacRole>>,
    pub proposals: SectionOutcome<Vec<AmacProposal>>,
}

pub async fn governance_view(ctx: &ConsoleContext) -> GovernanceView {
    let (roles, proposals) = tokio::join!(ctx.backend.amac_roles(), ctx.backend.amac_proposals());
    GovernanceView {
        roles: SectionOutcome::capture("amac_roles", roles),
        proposals: SectionOutcome::capture("amac_proposals", proposals),
    }
}

/// Collapse the orchestrator's task states onto the console's dispatch
/// lifecycle.
pub fn map_backend_state(state: &str) -> DispatchState {
    const RUNNING: [&str; 5] = ["pending", "received", "started", "retry", "queued"];

    if state.eq_ignore_ascii_case("success") {
        DispatchState::Success
    } else if RUNNING.iter().any(|known| state.eq_ignore_ascii_case(known)) {
        DispatchState::Running
    } else {
        DispatchState::Error
    }
}

/// Seam between the mission runner and the backend, so dispatch tracking is
/// testable without a live orchestrator.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<ScheduleResponse, BackendError>;
    async fn status(&self, task_id: &TaskId) -> Result<CommandStatusReport, BackendError>;
}

#[async_trait]
impl CommandChannel for Backend {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<ScheduleResponse, BackendError> {
        self.schedule_command(request).await
    }

    async fn status(&self, task_id: &TaskId) -> Result<CommandStatusReport, BackendError> {
        self.command_status(task_id).await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionOutcome {
    pub task_id: TaskId,
    pub state: DispatchState,
    /// Last task state string the backend reported, verbatim.
    pub backend_state: String,
    pub summary: Option<String>,
    pub result: Option<Value>,
    pub polls: u32,
}

/// Schedules a command and polls its status until the backend reports a
/// terminal state or the poll budget runs out.
#[derive(Debug, Clone)]
pub struct MissionRunner {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for MissionRunner {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_polls: 30,
        }
    }
}

impl MissionRunner {
    pub async fn run(
        &self,
        channel: &dyn CommandChannel,
        request: &ScheduleRequest,
    ) -> Result<MissionOutcome, BackendError> {
        let scheduled = channel.schedule(request).await?;
        info!(task_id = %scheduled.task_id, agent = %request.agent_name, "mission scheduled");

        let mut polls = 0u32;
        let mut last_state = String::from("PENDING");
        while polls < self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            polls += 1;

            let report = channel.status(&scheduled.task_id).await?;
            let state = map_backend_state(&report.state);
            if state.is_terminal() {
                info!(task_id = %scheduled.task_id, backend_state = %report.state, polls, "mission finished");
                return Ok(MissionOutcome {
                    task_id: scheduled.task_id,
                    state,
                    backend_state: report.state,
                    summary: report.summary.or(report.detail),
                    result: report.result,
                    polls,
                });
            }
            last_state = report.state;
        }

        warn!(task_id = %scheduled.task_id, polls, "mission still running after poll budget");
        Ok(MissionOutcome {
            task_id: scheduled.task_id,
            state: DispatchState::Error,
            backend_state: last_state,
            summary: Some(format!(
                "mission did not reach a terminal state after {polls} status polls"
            )),
            result: None,
            polls,
        })
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
