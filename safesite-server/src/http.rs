// HTTP server: MJPEG stream, status, snapshots, toggles and audit log

use crate::metrics::Metrics;
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, Response, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures::StreamExt;
use safesite_core::{AlertLogger, Error as CoreError};
use safesite_eye::{FrameBroadcaster, LoopState, MonitorState};
use safesite_storage::SnapshotService;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

#[derive(Clone)]
pub struct ApiState {
    pub monitor: Arc<MonitorState>,
    pub broadcaster: Arc<FrameBroadcaster>,
    pub logger: Arc<dyn AlertLogger>,
    pub snapshots: Arc<SnapshotService>,
    pub metrics: Arc<Metrics>,
}

/// Create the HTTP router
pub fn create_router(state: ApiState, enable_cors: bool) -> Router {
    let router = Router::new()
        .route("/video_feed", get(video_feed_handler))
        .route("/get_status", get(get_status_handler))
        .route("/snapshot", post(snapshot_handler))
        .route("/toggle_ai", post(toggle_ai_handler))
        .route("/toggle_alarm", post(toggle_alarm_handler))
        .route("/audit_logs", get(audit_logs_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum SnapshotResponse {
    Success { filename: String },
    Error { message: String },
}

#[derive(Deserialize, Default)]
struct ToggleAiRequest {
    active: Option<bool>,
}

#[derive(Deserialize, Default)]
struct ToggleAlarmRequest {
    enabled: Option<bool>,
}

#[derive(Serialize)]
struct ToggleResponse {
    status: &'static str,
    active: bool,
}

#[derive(Deserialize)]
struct AuditLogQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct AuditLogView {
    timestamp: String,
    message: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    capture: LoopState,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(code: StatusCode, message: impl Into<String>) -> Response<Body> {
    (
        code,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Decrements the active-stream gauge when the response body is dropped
struct StreamGuard(Arc<Metrics>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.stream_closed();
    }
}

async fn video_feed_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let subscription = state.broadcaster.subscribe();
    state.metrics.stream_opened();
    let guard = StreamGuard(state.metrics.clone());

    let parts = subscription.into_stream().map(move |frame| {
        let _held = &guard;
        Ok::<_, Infallible>(frame.multipart_chunk())
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, MJPEG_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(parts))
        .unwrap_or_else(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "stream setup failed"))
}

async fn get_status_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: state.monitor.status().message(),
    })
}

async fn snapshot_handler(State(state): State<ApiState>) -> Response<Body> {
    match state.snapshots.capture().await {
        Ok(filename) => {
            state.metrics.snapshot_saved();
            Json(SnapshotResponse::Success { filename }).into_response()
        }
        Err(CoreError::NoFrame) => Json(SnapshotResponse::Error {
            message: CoreError::NoFrame.to_string(),
        })
        .into_response(),
        Err(e) => {
            error!("Snapshot failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SnapshotResponse::Error {
                    message: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Empty bodies count as `{}`; anything else must be a JSON object
fn parse_toggle<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response<Body>> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e)))
}

async fn toggle_ai_handler(State(state): State<ApiState>, body: Bytes) -> Response<Body> {
    let request: ToggleAiRequest = match parse_toggle(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let active = request.active.unwrap_or(true);
    state.monitor.set_ai_enabled(active);
    info!("AI detection {}", if active { "enabled" } else { "disabled" });
    Json(ToggleResponse {
        status: "AI state updated",
        active,
    })
    .into_response()
}

async fn toggle_alarm_handler(State(state): State<ApiState>, body: Bytes) -> Response<Body> {
    let request: ToggleAlarmRequest = match parse_toggle(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let active = request.enabled.unwrap_or(true);
    state.monitor.set_alarm_active(active);
    info!("Alarm {}", if active { "armed" } else { "silenced" });
    Json(ToggleResponse {
        status: "Alarm state updated",
        active,
    })
    .into_response()
}

async fn audit_logs_handler(
    State(state): State<ApiState>,
    Query(query): Query<AuditLogQuery>,
) -> Response<Body> {
    let entries = match query.limit {
        Some(limit) => state.logger.recent(limit).await,
        None => state.logger.list().await,
    };

    match entries {
        Ok(entries) => {
            let views: Vec<AuditLogView> = entries
                .into_iter()
                .map(|entry| AuditLogView {
                    timestamp: entry.timestamp_text(),
                    message: entry.message,
                })
                .collect();
            Json(views).into_response()
        }
        Err(e) => {
            error!("Failed to read audit log: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        capture: state.monitor.loop_state(),
    })
}

/// Metrics endpoint (Prometheus format)
async fn metrics_handler(State(state): State<ApiState>) -> Response<Body> {
    let text = state.metrics.render_prometheus(&state.monitor.stats());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(text))
        .unwrap_or_else(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable"))
}
