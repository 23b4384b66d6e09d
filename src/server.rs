//! HTTP server hosting the relay WebSocket and the dashboard/layout API
//!
//! `/ws` carries the control stream; one connection at a time may drive the
//! device (the sink models a single physical device), so a second upgrade
//! is accepted and then immediately closed. The REST routes feed the
//! dashboard and the layout editor in the client.

use crate::config::AppConfig;
use crate::device::SinkMode;
use crate::layouts::LayoutStore;
use crate::relay::{RelaySession, SharedView};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Shared state for API and WebSocket handlers
pub struct ApiState {
    /// Snapshots published by the active relay session
    pub view: Arc<SharedView>,
    /// Persisted named layouts
    pub layouts: Arc<LayoutStore>,
    /// Device sink handed to each new session
    pub sink: SinkMode,
    /// Cadence/latency ring capacity for new sessions
    pub telemetry_window: usize,
    /// Held by the active connection; enforces the single-writer policy
    connection: Arc<Mutex<()>>,
}

impl ApiState {
    pub fn new(config: &AppConfig, sink: SinkMode, layouts: Arc<LayoutStore>) -> Self {
        Self {
            view: Arc::new(SharedView::new(sink.label())),
            layouts,
            sink,
            telemetry_window: config.telemetry.window,
            connection: Arc::new(Mutex::new(())),
        }
    }
}

/// Body of `GET /api/telemetry`
#[derive(Serialize)]
struct TelemetryResponse {
    telemetry: crate::telemetry::TelemetrySnapshot,
    control: crate::state::ControlState,
    connected: bool,
    sink: String,
    frames_dropped: u64,
}

/// API error response
#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn not_found(what: &str) -> (StatusCode, Json<ApiError>) {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: format!("{what} not found"),
            }),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

/// Build the router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/api/health", get(health_check))
        .route("/api/telemetry", get(get_telemetry))
        .route("/api/layouts", get(list_layouts))
        .route(
            "/api/layouts/:id",
            get(get_layout).put(put_layout).delete(delete_layout),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /ws - upgrade to the control stream
async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<ApiState>) {
    // Single active connection: a concurrent writer to one device channel
    // would produce undefined ordering, so later clients get a clean close.
    let Ok(guard) = state.connection.clone().try_lock_owned() else {
        warn!("rejecting connection: another client is already driving the device");
        let mut socket = socket;
        let _ = socket.send(axum::extract::ws::Message::Close(None)).await;
        return;
    };

    let session = RelaySession::new(
        state.sink.clone(),
        state.layouts.clone(),
        state.view.clone(),
        state.telemetry_window,
    );
    session.run(socket).await;
    drop(guard);
}

/// GET /api/health
async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/telemetry - snapshot for the dashboard
async fn get_telemetry(State(state): State<Arc<ApiState>>) -> Json<TelemetryResponse> {
    Json(TelemetryResponse {
        telemetry: state.view.telemetry.read().clone(),
        control: state.view.control.read().clone(),
        connected: state.view.connected.load(Ordering::SeqCst),
        sink: state.view.sink_label.read().clone(),
        frames_dropped: state.view.frames_dropped.load(Ordering::Relaxed),
    })
}

/// GET /api/layouts - full layout map
async fn list_layouts(State(state): State<Arc<ApiState>>) -> Json<Value> {
    Json(serde_json::to_value(state.layouts.list()).unwrap_or_default())
}

/// GET /api/layouts/:id
async fn get_layout(
    Path(id): Path<String>,
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    state
        .layouts
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("layout"))
}

/// PUT /api/layouts/:id - create or replace one layout
async fn put_layout(
    Path(id): Path<String>,
    State(state): State<Arc<ApiState>>,
    Json(layout): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    state.layouts.upsert(&id, layout).map_err(|e| ApiError {
        error: format!("failed to save layout: {e:#}"),
    })?;
    info!("layout '{id}' saved");
    Ok(Json(serde_json::json!({ "ok": true, "id": id })))
}

/// DELETE /api/layouts/:id
async fn delete_layout(
    Path(id): Path<String>,
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    match state.layouts.delete(&id) {
        Ok(true) => Ok(Json(serde_json::json!({ "ok": true }))),
        Ok(false) => Err(ApiError::not_found("layout")),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError {
                error: format!("failed to delete layout: {e:#}"),
            }),
        )),
    }
}

/// Bind and serve until the shutdown future resolves.
pub async fn start_server(
    state: Arc<ApiState>,
    host: &str,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = build_router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("relay server listening on {addr} (ws endpoint: /ws)");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    Ok(())
}
