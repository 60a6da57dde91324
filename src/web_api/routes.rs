//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};

use crate::detection_source::{parse_detection, DetectionSource};
use crate::error::Error;
use crate::models::{
    AddTrackingRequest, ApiResponse, CameraConnectRequest, CameraErrorRequest, CameraFrameRequest,
    DetectionsResponse, IntervalRequest, IntervalResponse, RemoveTrackingRequest,
};
use crate::realtime_hub::HubMessage;
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Camera collaborator
        .route("/camera/connect", post(camera_connect))
        .route("/camera/disconnect", post(camera_disconnect))
        .route("/camera/frame", post(camera_frame))
        .route("/camera/error", post(camera_error))
        .route("/camera/start", post(camera_start))
        .route("/camera/stop", post(camera_stop))
        .route("/camera/status", get(camera_status))
        // Detections
        .route("/detect", post(detect_now))
        .route("/detections/latest", get(latest_detections))
        // Tracking
        .route("/tracking/start", post(tracking_start))
        .route("/tracking/stop", post(tracking_stop))
        .route("/tracking/add", post(tracking_add))
        .route("/tracking/remove", post(tracking_remove))
        .route("/tracking/clear", post(tracking_clear))
        .route("/tracking/interval", get(tracking_interval).post(set_tracking_interval))
        .route("/tracking/status", get(tracking_status))
        .route("/tracking/alarm/acknowledge", post(acknowledge_alarm))
        // WebSocket
        .route("/ws", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Camera Handlers
// ========================================

async fn camera_connect(
    State(state): State<AppState>,
    body: Option<Json<CameraConnectRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    state.camera.connect(req.camera_id).await;
    Json(ApiResponse::ok("Camera connected"))
}

async fn camera_disconnect(State(state): State<AppState>) -> impl IntoResponse {
    state.auto_detection.stop().await;
    state.camera.disconnect().await;
    Json(ApiResponse::ok("Camera disconnected"))
}

async fn camera_frame(
    State(state): State<AppState>,
    Json(req): Json<CameraFrameRequest>,
) -> Result<impl IntoResponse, Error> {
    state.camera.push_frame(req.frame, req.timestamp).await?;
    Ok(Json(ApiResponse::ok("Frame received")))
}

async fn camera_error(
    State(state): State<AppState>,
    Json(req): Json<CameraErrorRequest>,
) -> Result<impl IntoResponse, Error> {
    state.camera.report_error(req.message.as_deref().unwrap_or_default()).await?;
    state.auto_detection.stop().await;
    Ok(Json(ApiResponse::ok("Camera error recorded")))
}

async fn camera_start(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    state.camera.request_start().await?;
    state.auto_detection.start().await;
    Ok(Json(ApiResponse::ok("Camera start command sent")))
}

async fn camera_stop(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    state.camera.request_stop().await?;
    state.auto_detection.stop().await;
    Ok(Json(ApiResponse::ok("Camera stop command sent")))
}

async fn camera_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.camera.status().await)
}

// ========================================
// Detection Handlers
// ========================================

/// One detector call for the latest frame
async fn detect_now(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let detections = state.source.fetch().await?;
    let annotated = state.tracking.annotate(detections).await;
    Ok(Json(ApiResponse::success(
        "Detection complete",
        DetectionsResponse::new(annotated),
    )))
}

async fn latest_detections(State(state): State<AppState>) -> impl IntoResponse {
    Json(DetectionsResponse::new(state.auto_detection.latest().await))
}

// ========================================
// Tracking Handlers
// ========================================

async fn tracking_start(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let interval = state.scheduler.start().await?;
    Ok(Json(ApiResponse::success(
        "Tracking started",
        IntervalResponse { interval },
    )))
}

async fn tracking_stop(State(state): State<AppState>) -> impl IntoResponse {
    let was_active = state.scheduler.stop().await;
    let message = if was_active {
        "Tracking stopped"
    } else {
        "Tracking was not active"
    };
    Json(ApiResponse::ok(message))
}

async fn tracking_add(
    State(state): State<AppState>,
    Json(req): Json<AddTrackingRequest>,
) -> Result<impl IntoResponse, Error> {
    let raw = req
        .detection
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::Validation("No detection data provided".to_string()))?;
    let detection = parse_detection(raw)?;

    let item = state.tracking.add(detection).await?;
    Ok(Json(ApiResponse::success("Object added to tracking", item)))
}

async fn tracking_remove(
    State(state): State<AppState>,
    Json(req): Json<RemoveTrackingRequest>,
) -> Result<impl IntoResponse, Error> {
    let item_id = req
        .item_id
        .ok_or_else(|| Error::Validation("No item_id provided".to_string()))?;

    let removed = state.tracking.remove(&item_id).await?;
    Ok(Json(ApiResponse::success("Item removed from tracking", removed)))
}

async fn tracking_clear(State(state): State<AppState>) -> impl IntoResponse {
    let removed = state.scheduler.clear().await;
    Json(ApiResponse::success(
        "All tracked items cleared",
        serde_json::json!({ "removed": removed }),
    ))
}

async fn tracking_interval(State(state): State<AppState>) -> impl IntoResponse {
    Json(IntervalResponse {
        interval: state.tracking.interval_secs().await,
    })
}

async fn set_tracking_interval(
    State(state): State<AppState>,
    Json(req): Json<IntervalRequest>,
) -> Result<impl IntoResponse, Error> {
    let seconds = req
        .seconds()
        .ok_or_else(|| Error::Validation("interval must be an integer number of seconds".to_string()))?;

    let interval = state.tracking.set_interval(seconds).await?;
    Ok(Json(ApiResponse::success(
        format!("Tracking interval set to {} seconds", interval),
        IntervalResponse { interval },
    )))
}

async fn tracking_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.tracking.status().await)
}

async fn acknowledge_alarm(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    state.tracking.acknowledge().await?;
    Ok(Json(ApiResponse::ok("Alarm acknowledged")))
}

// ========================================
// WebSocket Handler
// ========================================

/// WebSocket upgrade handler
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Register with RealtimeHub
    let (conn_id, mut rx) = state.realtime.register().await;

    // Current camera state first, so the dashboard does not wait for a change
    let status = state.camera.status_message().await;
    state
        .realtime
        .send_to(&conn_id, HubMessage::CameraStatus(status))
        .await;

    // Forward messages from hub to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Client messages are not interpreted; watch for close
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %conn_id, "WebSocket client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    state.realtime.unregister(&conn_id).await;
}
