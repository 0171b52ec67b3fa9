use super::*;
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

fn pinkas_json(id: i64) -> Value {
    json!({
        "id": id,
        "agent": "cfo",
        "thought": "weekly balance check",
        "payload": {"asset": "TON"},
        "status": "done",
        "timestamp": "2025-06-01T08:00:00"
    })
}

#[tokio::test]
async fn base_url_is_validated_and_trailing_slash_trimmed() {
    assert!(matches!(
        Backend::new("not a url"),
        Err(BackendError::BaseUrl(_))
    ));
    assert!(matches!(
        Backend::new("ftp://backend:8000"),
        Err(BackendError::BaseUrl(_))
    ));

    let backend = Backend::new("http://backend:8000/").expect("backend");
    assert_eq!(backend.base_url(), "http://backend:8000");
    assert_eq!(backend.url("/health"), "http://backend:8000/health");
}

#[tokio::test]
async fn health_probes_deserialize() {
    let router = Router::new()
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route(
            "/health/deep",
            get(|| async { Json(json!({"status": "ok", "db": "ok", "celery": "error"})) }),
        );
    let backend = Backend::new(serve(router).await).expect("backend");

    let health = backend.health().await.expect("health");
    assert_eq!(health.status, "ok");

    let deep = backend.deep_health().await.expect("deep health");
    assert_eq!(
        deep.service_statuses().get("celery").map(String::as_str),
        Some("error")
    );
    assert!(!deep.is_healthy());
}

#[tokio::test]
async fn pinkas_listing_handles_both_backend_shapes() {
    let router = Router::new().route(
        "/pinkas",
        get(|Query(query): Query<PinkasQuery>| async move {
            // The older backend returns a bare array, the newer one a page
            // envelope echoing the pagination parameters.
            if query.agent.as_deref() == Some("cfo") {
                Json(json!([pinkas_json(1)]))
            } else {
                Json(json!({
                    "items": [pinkas_json(2), pinkas_json(3)],
                    "total": 40,
                    "limit": query.limit,
                    "offset": query.offset
                }))
            }
        }),
    );
    let backend = Backend::new(serve(router).await).expect("backend");

    let filtered = backend
        .list_pinkas(&PinkasQuery {
            agent: Some("cfo".to_string()),
            ..PinkasQuery::default()
        })
        .await
        .expect("bare listing");
    assert_eq!(filtered.items.len(), 1);
    assert!(filtered.total.is_none());

    let paged = backend
        .list_pinkas(&PinkasQuery {
            limit: Some(2),
            offset: Some(10),
            ..PinkasQuery::default()
        })
        .await
        .expect("paged listing");
    assert_eq!(paged.total, Some(40));
    assert_eq!(paged.limit, Some(2));
    assert_eq!(paged.offset, Some(10));
    assert_eq!(paged.items[1].id, PinkasId(3));
}

#[tokio::test]
async fn missing_pinkas_entry_surfaces_status_and_body() {
    let router = Router::new().route(
        "/pinkas/:id",
        get(|Path(id): Path<i64>| async move {
            if id == 1 {
                Ok(Json(pinkas_json(1)))
            } else {
                Err((StatusCode::NOT_FOUND, "Pinkas entry not found"))
            }
        }),
    );
    let backend = Backend::new(serve(router).await).expect("backend");

    let entry = backend.pinkas_entry(PinkasId(1)).await.expect("entry");
    assert_eq!(entry.detail.as_deref(), Some("weekly balance check"));

    let err = backend
        .pinkas_entry(PinkasId(99))
        .await
        .expect_err("missing entry");
    assert_eq!(err.status(), Some(404));
    assert!(err.to_string().contains("Pinkas entry not found"));
}

#[tokio::test]
async fn schedule_then_poll_round_trip() {
    let router = Router::new()
        .route(
            "/commands/schedule",
            post(|Json(request): Json<ScheduleRequest>| async move {
                Json(json!({"task_id": "task-7", "agent_name": request.agent_name}))
            }),
        )
        .route(
            "/commands/status/:task_id",
            get(|Path(task_id): Path<String>| async move {
                Json(json!({
                    "task_id": task_id,
                    "state": "SUCCESS",
                    "result": {"published": 3}
                }))
            }),
        );
    let backend = Backend::new(serve(router).await).expect("backend");

    let scheduled = backend
        .schedule_command(&ScheduleRequest {
            agent_name: "cmo".to_string(),
            payload: json!({"topic": "weekly update"}),
        })
        .await
        .expect("schedule");
    assert_eq!(scheduled.task_id, TaskId("task-7".to_string()));
    assert_eq!(scheduled.agent_name.as_deref(), Some("cmo"));

    let report = backend
        .command_status(&scheduled.task_id)
        .await
        .expect("status");
    assert_eq!(report.state, "SUCCESS");
    assert_eq!(report.result, Some(json!({"published": 3})));
}

#[tokio::test]
async fn login_failure_keeps_backend_message() {
    let router = Router::new().route(
        "/auth/login",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "Invalid username or password"})),
            )
        }),
    );
    let backend = Backend::new(serve(router).await).expect("backend");

    let err = backend
        .login(&LoginRequest {
            email: "scribe@sod.example".to_string(),
            password: "wrong".to_string(),
        })
        .await
        .expect_err("rejected login");
    assert_eq!(err.status(), Some(401));
    assert!(err.to_string().contains("Invalid username or password"));
}

#[tokio::test]
async fn orchestration_calls_deserialize() {
    let router = Router::new()
        .route(
            "/start-meeting",
            post(|| async {
                Json(json!({
                    "mission_goal": "Review daily operations",
                    "transcript": ["APPROVED: opening statement"]
                }))
            }),
        )
        .route(
            "/api/v1/mission",
            post(|Json(request): Json<MissionRequest>| async move {
                Json(json!({"status": "running", "mission_goal": request.goal}))
            }),
        );
    let backend = Backend::new(serve(router).await).expect("backend");

    let report = backend.start_meeting().await.expect("start meeting");
    assert_eq!(report.transcript.len(), 1);

    let ack = backend
        .dispatch_mission(&MissionRequest {
            goal: "Convene the council".to_string(),
        })
        .await
        .expect("mission");
    assert!(ack.already_running());
}

#[tokio::test]
async fn meeting_log_lines_are_normalized() {
    let router = Router::new().route(
        "/meeting/logs",
        get(|| async { Json(json!({"logs": ["one", {"speaker": "cfo"}]})) }),
    );
    let backend = Backend::new(serve(router).await).expect("backend");

    let lines = backend.meeting_log_lines().await.expect("lines");
    assert_eq!(lines, vec!["one".to_string(), r#"{"speaker":"cfo"}"#.to_string()]);
}

#[tokio::test]
async fn transport_errors_are_reported_without_status() {
    // Nothing listens on this port.
    let backend = Backend::new("http://127.0.0.1:9").expect("backend");
    let err = backend.health().await.expect_err("unreachable");
    assert!(err.status().is_none());
    assert!(matches!(err, BackendError::Transport(_)));
}
