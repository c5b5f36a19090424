//! HTTP surface: routes, the shared-token header filter, and handlers.
//!
//! The surface never translates in-flight failures; it renders what the
//! result store holds. Submissions return as soon as the job is registered
//! and enqueued; polling is a store read (plus the deliver-once delete on
//! terminal states).

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::queue::QueueManager;
use crate::store::ResultStore;
use crate::types::CreationRequest;

/// 401 body when the `Authorization` header is absent.
const MSG_AUTH_REQUIRED: &str = "인증이 필요합니다";

/// 401 body when the `Authorization` header does not match.
const MSG_AUTH_FAILED: &str = "인증 실패";

/// 202 status string for a freshly queued job.
const MSG_WAITING: &str = "대기중";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Job result store (polled and pruned here).
    pub store: Arc<ResultStore>,
    /// Queue manager (fed here).
    pub queue: Arc<QueueManager>,
    /// Expected `Authorization` header value.
    pub api_token: String,
}

/// Build the full router: `/` and `/health` are open, everything else sits
/// behind the token filter.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/queue/status", get(queue_status))
        .route("/room/create", post(create_room))
        .route("/room/result", get(room_result))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_token,
        ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

/// Serve the router until the shutdown future resolves.
///
/// # Errors
///
/// Propagates I/O errors from the listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "http surface listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

// ── Middleware ──────────────────────────────────────────────────

/// Exact-match `Authorization` header filter.
async fn require_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return error_response(StatusCode::UNAUTHORIZED, MSG_AUTH_REQUIRED);
    };
    let authorized = value
        .to_str()
        .map(|v| v == state.api_token)
        .unwrap_or(false);
    if !authorized {
        return error_response(StatusCode::UNAUTHORIZED, MSG_AUTH_FAILED);
    }
    next.run(request).await
}

// ── Handlers ────────────────────────────────────────────────────

/// Liveness probe.
async fn root() -> impl IntoResponse {
    Json(json!({
        "status": "online",
        "message": "eroom scenario generation server",
    }))
}

/// Health summary with the queue snapshot.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "queue": state.queue.status(),
    }))
}

/// Raw queue snapshot.
async fn queue_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.queue.status())
}

/// Accept a creation request: 202 with the ruid, 400 on a malformed body,
/// 500 when the queue cannot take it.
async fn create_room(
    State(state): State<AppState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid request body: {rejection}"),
            );
        }
    };

    let request: CreationRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid request body: {e}"),
            );
        }
    };

    match state.queue.submit(request).await {
        Ok(ruid) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "ruid": ruid,
                "status": MSG_WAITING,
                "message": "방 생성 요청이 접수되었습니다",
            })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to enqueue creation request");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to enqueue job")
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResultQuery {
    ruid: Option<String>,
}

/// Poll a job: 404 unknown, `{ruid, status}` while running, the result
/// document (exactly once) on terminal states.
async fn room_result(
    State(state): State<AppState>,
    Query(query): Query<ResultQuery>,
) -> Response {
    let Some(ruid) = query.ruid.filter(|r| !r.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "ruid query parameter is required");
    };

    match state.store.get(&ruid).await {
        None => error_response(StatusCode::NOT_FOUND, &format!("unknown ruid: {ruid}")),
        Some(job) if job.status.is_terminal() => {
            state.store.delete(&ruid).await;
            info!(ruid = %ruid, status = %job.status, "terminal result delivered");
            let document = job.result.unwrap_or_else(|| {
                json!({"ruid": ruid, "success": false, "error": "result document missing"})
            });
            Json(document).into_response()
        }
        Some(job) => Json(json!({"ruid": ruid, "status": job.status})).into_response(),
    }
}

/// Uniform JSON error body.
fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

// ── Tests ───────────────────────────────────────────────────────
