use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use backend_client::{Backend, BackendError, LogTailer, TailEvent, TailOptions};
use console_api::{
    dashboard_overview, governance_view, ConsoleContext, GovernanceView, MissionOutcome,
    MissionRunner, TreasurySnapshot, DEFAULT_MISSION_GOAL,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{
    domain::{PinkasId, Role, TaskId},
    error::{ApiError, ErrorCode},
    protocol::{
        AnalyticsSummary, DayInfo, LoginRequest, MeetingStartReport, MissionRequest, PinkasEntry,
        PinkasPage, PinkasQuery, ScheduleRequest, ScheduleResponse,
    },
};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

mod auth;
mod config;

use config::{load_settings, Settings};

const MAX_BODY_BYTES: usize = 64 * 1024;

type HandlerError = (StatusCode, Json<ApiError>);

#[derive(Clone)]
pub(crate) struct AuthSettings {
    pub(crate) secret: String,
    pub(crate) cookie_name: String,
    pub(crate) session_ttl_minutes: i64,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) console: ConsoleContext,
    pub(crate) runner: MissionRunner,
    pub(crate) tailer: Arc<LogTailer>,
    pub(crate) auth: AuthSettings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let state = build_state(&settings)?;
    let app = build_router(state, &settings.dashboard_prefix);

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, backend = %settings.backend_url, "gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_state(settings: &Settings) -> anyhow::Result<AppState> {
    let backend = Backend::new(&settings.backend_url)?;
    let tailer = LogTailer::spawn(
        backend.clone(),
        TailOptions {
            poll_interval: Duration::from_secs(settings.meeting_poll_seconds.max(1)),
            ..TailOptions::default()
        },
    );

    Ok(AppState {
        console: ConsoleContext { backend },
        runner: MissionRunner::default(),
        tailer: Arc::new(tailer),
        auth: AuthSettings {
            secret: settings.auth_secret.clone(),
            cookie_name: settings.auth_cookie.clone(),
            session_ttl_minutes: settings.session_ttl_minutes,
        },
    })
}

fn build_router(state: AppState, dashboard_prefix: &str) -> Router {
    let dashboard = Router::new()
        .route("/overview", get(overview))
        .route("/logs", get(agent_logs))
        .route("/pinkas", get(list_pinkas))
        .route("/pinkas/:id", get(pinkas_entry))
        .route("/commands", post(schedule_command))
        .route("/commands/run", post(run_mission))
        .route("/commands/status/:task_id", get(command_status))
        .route("/mission", post(dispatch_mission))
        .route("/amac", get(governance))
        .route("/analytics", get(analytics))
        .route("/treasury", get(treasury))
        .route("/meeting/start", post(start_meeting))
        .route("/meeting/logs", get(meeting_logs))
        .route("/meeting/logs/stream", get(meeting_log_stream))
        // The fallback is gated too: every path under the dashboard prefix
        // requires an admin session, known route or not.
        .fallback(dashboard_not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    Router::new()
        .route("/", get(site_root))
        .route("/healthz", get(healthz))
        .route("/day-info", get(day_info))
        .route("/login", get(login_hint).post(login))
        .route("/logout", post(logout))
        .nest(dashboard_prefix, dashboard)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

/// Map a failed backend call onto the gateway's error envelope. Statuses the
/// backend answered with keep their meaning; everything else is a bad
/// gateway.
fn backend_error(err: BackendError) -> HandlerError {
    let code = match err.status() {
        Some(400) => ErrorCode::Validation,
        Some(401) => ErrorCode::Unauthorized,
        Some(404) => ErrorCode::NotFound,
        _ => ErrorCode::Upstream,
    };
    let status =
        StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(ApiError::new(code, err.to_string())))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn dashboard_not_found() -> HandlerError {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::not_found("no such console route")),
    )
}

async fn site_root() -> Json<Value> {
    Json(json!({ "service": "sod-console", "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct DayInfoQuery {
    lang: Option<String>,
}

async fn day_info(
    State(state): State<AppState>,
    Query(query): Query<DayInfoQuery>,
) -> Result<Json<DayInfo>, HandlerError> {
    let info = state
        .console
        .backend
        .day_info(query.lang.as_deref())
        .await
        .map_err(backend_error)?;
    Ok(Json(info))
}

#[derive(Debug, Serialize)]
struct LoginReport {
    role: Role,
}

async fn login_hint() -> Json<Value> {
    Json(json!({ "message": "POST credentials to /login to begin a session" }))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let token = state
        .console
        .backend
        .login(&request)
        .await
        .map_err(|err| match err.status() {
            Some(401) => (
                StatusCode::UNAUTHORIZED,
                Json(ApiError::unauthorized("invalid email or password")),
            ),
            _ => backend_error(err),
        })?;

    let max_age = state.auth.session_ttl_minutes.max(0) * 60;
    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}",
        state.auth.cookie_name, token.access_token
    );

    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            headers.insert(header::SET_COOKIE, value);
        }
        Err(err) => {
            warn!(%err, "backend issued a token that cannot travel in a cookie");
            return Err((
                StatusCode::BAD_GATEWAY,
                Json(ApiError::upstream("backend issued an unusable token")),
            ));
        }
    }

    info!(role = ?token.role, "session established");
    Ok((headers, Json(LoginReport { role: token.role })))
}

async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
        state.auth.cookie_name
    );
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.insert(header::SET_COOKIE, value);
    }
    (headers, Json(json!({ "message": "session ended" })))
}

async fn overview(State(state): State<AppState>) -> Json<console_api::DashboardOverview> {
    Json(dashboard_overview(&state.console).await)
}

async fn list_pinkas(
    State(state): State<AppState>,
    Query(query): Query<PinkasQuery>,
) -> Result<Json<PinkasPage>, HandlerError> {
    let page = state
        .console
        .backend
        .list_pinkas(&query)
        .await
        .map_err(backend_error)?;
    Ok(Json(page))
}

async fn pinkas_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PinkasEntry>, HandlerError> {
    let entry = state
        .console
        .backend
        .pinkas_entry(PinkasId(id))
        .await
        .map_err(backend_error)?;
    Ok(Json(entry))
}

async fn schedule_command(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<ScheduleResponse>, HandlerError> {
    if request.agent_name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                ErrorCode::Validation,
                "agent_name cannot be empty",
            )),
        ));
    }

    let scheduled = state
        .console
        .backend
        .schedule_command(&request)
        .await
        .map_err(backend_error)?;
    Ok(Json(scheduled))
}

async fn command_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<shared::protocol::CommandStatusReport>, HandlerError> {
    let report = state
        .console
        .backend
        .command_status(&TaskId(task_id))
        .await
        .map_err(backend_error)?;
    Ok(Json(report))
}

/// Schedule a command and wait for its terminal state in one request.
async fn run_mission(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<MissionOutcome>, HandlerError> {
    if request.agent_name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                ErrorCode::Validation,
                "agent_name cannot be empty",
            )),
        ));
    }

    let outcome = state
        .runner
        .run(&state.console.backend, &request)
        .await
        .map_err(backend_error)?;
    Ok(Json(outcome))
}

#[derive(Debug, Default, Deserialize)]
struct MissionDispatchBody {
    #[serde(default)]
    goal: Option<String>,
}

async fn dispatch_mission(
    State(state): State<AppState>,
    body: Option<Json<MissionDispatchBody>>,
) -> Result<Json<Value>, HandlerError> {
    let goal = body
        .and_then(|Json(body)| body.goal)
        .unwrap_or_else(|| DEFAULT_MISSION_GOAL.to_string());

    let ack = state
        .console
        .backend
        .dispatch_mission(&MissionRequest { goal })
        .await
        .map_err(backend_error)?;

    let message = if ack.already_running() {
        "Council already active. Mission loop confirmed running."
    } else {
        "Council convened. Backend acknowledged the start command."
    };
    Ok(Json(json!({ "message": message, "status": ack.status })))
}

async fn governance(State(state): State<AppState>) -> Json<GovernanceView> {
    Json(governance_view(&state.console).await)
}

async fn analytics(
    State(state): State<AppState>,
) -> Result<Json<AnalyticsSummary>, HandlerError> {
    let summary = state
        .console
        .backend
        .analytics_summary()
        .await
        .map_err(backend_error)?;
    Ok(Json(summary))
}

async fn treasury(State(state): State<AppState>) -> Result<Json<TreasurySnapshot>, HandlerError> {
    let balance = state
        .console
        .backend
        .ton_balance()
        .await
        .map_err(backend_error)?;
    Ok(Json(TreasurySnapshot {
        display: balance.display(),
    }))
}

async fn start_meeting(
    State(state): State<AppState>,
) -> Result<Json<MeetingStartReport>, HandlerError> {
    let report = state
        .console
        .backend
        .start_meeting()
        .await
        .map_err(backend_error)?;
    Ok(Json(report))
}

async fn agent_logs(State(state): State<AppState>) -> Result<Json<Value>, HandlerError> {
    let lines = state
        .console
        .backend
        .agent_log_lines()
        .await
        .map_err(backend_error)?;
    Ok(Json(json!({ "logs": lines })))
}

async fn meeting_logs(State(state): State<AppState>) -> Result<Json<Value>, HandlerError> {
    let lines = state
        .console
        .backend
        .meeting_log_lines()
        .await
        .map_err(backend_error)?;
    Ok(Json(json!({ "logs": lines })))
}

/// Re-serve the shared meeting-log feed as server-sent events. Payloads are
/// JSON-encoded so transcript lines with embedded newlines survive framing:
/// `line` events carry a JSON string, `snapshot` events a JSON array, and
/// `status` events a bare feed-state token.
async fn meeting_log_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let receiver = state.tailer.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|event| match event {
        Ok(TailEvent::Line(line)) => Some(Ok(Event::default()
            .event("line")
            .data(Value::String(line).to_string()))),
        Ok(TailEvent::Snapshot(lines)) => Some(Ok(Event::default()
            .event("snapshot")
            .data(Value::from(lines).to_string()))),
        Ok(TailEvent::Status(status)) => {
            Some(Ok(Event::default().event("status").data(status.as_str())))
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "meeting log subscriber lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
