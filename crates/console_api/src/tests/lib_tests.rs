use super::*;
use std::sync::Mutex;

use axum::{routing::get, Json, Router};
use serde_json::json;

#[test]
fn backend_states_collapse_onto_dispatch_lifecycle() {
    assert_eq!(map_backend_state("PENDING"), DispatchState::Running);
    assert_eq!(map_backend_state("started"), DispatchState::Running);
    assert_eq!(map_backend_state("RETRY"), DispatchState::Running);
    assert_eq!(map_backend_state("SUCCESS"), DispatchState::Success);
    assert_eq!(map_backend_state("FAILURE"), DispatchState::Error);
    assert_eq!(map_backend_state("REVOKED"), DispatchState::Error);
    assert_eq!(map_backend_state(""), DispatchState::Error);
}

/// Replays a fixed status sequence; the last report repeats once the script
/// is exhausted.
struct ScriptedChannel {
    reports: Mutex<Vec<CommandStatusReport>>,
    cursor: Mutex<usize>,
}

impl ScriptedChannel {
    fn new(states: &[&str]) -> Self {
        let reports = states
            .iter()
            .map(|state| CommandStatusReport {
                task_id: TaskId("t-1".to_string()),
                state: state.to_string(),
                summary: None,
                detail: None,
                result: None,
            })
            .collect();
        Self {
            reports: Mutex::new(reports),
            cursor: Mutex::new(0),
        }
    }
}

#[async_trait]
impl CommandChannel for ScriptedChannel {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<ScheduleResponse, BackendError> {
        Ok(ScheduleResponse {
            task_id: TaskId("t-1".to_string()),
            agent_name: Some(request.agent_name.clone()),
            message: None,
        })
    }

    async fn status(&self, _task_id: &TaskId) -> Result<CommandStatusReport, BackendError> {
        let reports = self.reports.lock().expect("reports");
        let mut cursor = self.cursor.lock().expect("cursor");
        let index = (*cursor).min(reports.len() - 1);
        *cursor += 1;
        Ok(reports[index].clone())
    }
}

fn fast_runner(max_polls: u32) -> MissionRunner {
    MissionRunner {
        poll_interval: Duration::from_millis(1),
        max_polls,
    }
}

fn schedule_request() -> ScheduleRequest {
    ScheduleRequest {
        agent_name: "cmo".to_string(),
        payload: json!({"topic": "weekly update"}),
    }
}

#[tokio::test]
async fn runner_polls_until_success() {
    let channel = ScriptedChannel::new(&["PENDING", "STARTED", "SUCCESS"]);
    let outcome = fast_runner(10)
        .run(&channel, &schedule_request())
        .await
        .expect("outcome");

    assert_eq!(outcome.state, DispatchState::Success);
    assert_eq!(outcome.backend_state, "SUCCESS");
    assert_eq!(outcome.polls, 3);
}

#[tokio::test]
async fn runner_reports_failure_state() {
    let channel = ScriptedChannel::new(&["STARTED", "FAILURE"]);
    let outcome = fast_runner(10)
        .run(&channel, &schedule_request())
        .await
        .expect("outcome");

    assert_eq!(outcome.state, DispatchState::Error);
    assert_eq!(outcome.backend_state, "FAILURE");
}

#[tokio::test]
async fn runner_gives_up_after_poll_budget() {
    let channel = ScriptedChannel::new(&["STARTED"]);
    let outcome = fast_runner(4)
        .run(&channel, &schedule_request())
        .await
        .expect("outcome");

    assert_eq!(outcome.state, DispatchState::Error);
    assert_eq!(outcome.backend_state, "STARTED");
    assert_eq!(outcome.polls, 4);
    assert!(outcome
        .summary
        .as_deref()
        .is_some_and(|summary| summary.contains("did not reach a terminal state")));
}

struct FailingStatusChannel;

#[async_trait]
impl CommandChannel for FailingStatusChannel {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<ScheduleResponse, BackendError> {
        Ok(ScheduleResponse {
            task_id: TaskId("t-2".to_string()),
            agent_name: Some(request.agent_name.clone()),
            message: None,
        })
    }

    async fn status(&self, _task_id: &TaskId) -> Result<CommandStatusReport, BackendError> {
        Err(BackendError::Status {
            status: 500,
            message: "inspector offline".to_string(),
        })
    }
}

#[tokio::test]
async fn runner_propagates_status_poll_failures() {
    let err = fast_runner(3)
        .run(&FailingStatusChannel, &schedule_request())
        .await
        .expect_err("status failure");
    assert_eq!(err.status(), Some(500));
}

async fn serve(router: Router) -> ConsoleContext {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    ConsoleContext {
        backend: Backend::new(format!("http://{addr}")).expect("backend"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn overview_sections_fail_independently() {
    // Only health and treasury exist; analytics and day-info 404.
    let router = Router::new()
        .route(
            "/health/deep",
            get(|| async { Json(json!({"status": "ok", "db": "ok"})) }),
        )
        .route(
            "/ton/balance",
            get(|| async { Json(json!({"balance": "17.25"})) }),
        );
    let ctx = serve(router).await;

    let overview = dashboard_overview(&ctx).await;
    assert!(overview.health.value().is_some());
    assert_eq!(
        overview.treasury.value().map(|t| t.display.as_str()),
        Some("17.2500 TON")
    );
    assert!(overview.analytics.value().is_none());
    assert!(overview.day.value().is_none());

    let json = serde_json::to_value(&overview).expect("serializable");
    assert_eq!(json["health"]["state"], "ok");
    assert_eq!(json["analytics"]["state"], "error");
}

#[tokio::test(flavor = "multi_thread")]
async fn governance_view_combines_roles_and_proposals() {
    let router = Router::new()
        .route(
            "/amac/roles",
            get(|| async {
                Json(json!([{
                    "internal_name": "master_of_coin",
                    "display_name": "Master of Coin",
                    "tribe": "Finance",
                    "mission": "Oversees treasury allocations."
                }]))
            }),
        )
        .route(
            "/admin/amac/proposals",
            get(|| async {
                Json(json!([{
                    "id": "prop-001",
                    "title": "Emergency responder mission",
                    "status": "approved",
                    "budget_ton": 1200.0,
                    "created_at": "2025-05-28T00:00:00.000Z"
                }]))
            }),
        );
    let ctx = serve(router).await;

    let view = governance_view(&ctx).await;
    let roles = view.roles.value().expect("roles");
    assert_eq!(roles[0].internal_name, "master_of_coin");
    let proposals = view.proposals.value().expect("proposals");
    assert_eq!(proposals[0].budget_ton, Some(1200.0));
}
