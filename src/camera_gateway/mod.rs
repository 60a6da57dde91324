//! CameraGateway - boundary to the camera app
//!
//! ## Responsibilities
//!
//! - Connection/streaming flags reported by the camera app
//! - Latest frame cache (base64 JPEG) and `live_frame` relay
//! - Start/stop commands sent to the camera app over the hub
//!
//! Camera state is independent of the tracking session.

use crate::error::{Error, Result};
use crate::realtime_hub::{CameraCommandMessage, CameraStatusMessage, HubMessage, LiveFrameMessage, RealtimeHub};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Camera status returned by GET /camera/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStatus {
    pub connected: bool,
    pub streaming: bool,
    pub has_frame: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct CameraState {
    connected: bool,
    streaming: bool,
    camera_id: Option<String>,
    latest_frame: Option<String>,
    last_frame_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// CameraGateway instance
pub struct CameraGateway {
    state: RwLock<CameraState>,
    realtime: Arc<RealtimeHub>,
}

impl CameraGateway {
    /// Create new CameraGateway
    pub fn new(realtime: Arc<RealtimeHub>) -> Self {
        Self {
            state: RwLock::new(CameraState::default()),
            realtime,
        }
    }

    pub async fn status(&self) -> CameraStatus {
        let state = self.state.read().await;
        CameraStatus {
            connected: state.connected,
            streaming: state.streaming,
            has_frame: state.latest_frame.is_some(),
            camera_id: state.camera_id.clone(),
            last_frame_at: state.last_frame_at,
            error: state.last_error.clone(),
        }
    }

    /// Status message as pushed to WebSocket clients
    pub async fn status_message(&self) -> CameraStatusMessage {
        let state = self.state.read().await;
        CameraStatusMessage {
            connected: state.connected,
            streaming: state.streaming,
            error: state.last_error.clone(),
        }
    }

    /// Camera app announced itself
    pub async fn connect(&self, camera_id: Option<String>) {
        {
            let mut state = self.state.write().await;
            state.connected = true;
            state.camera_id = camera_id;
            state.last_error = None;
            tracing::info!(camera_id = ?state.camera_id, "Camera connected");
        }
        self.broadcast_status().await;
    }

    /// Camera app went away; frame cache is dropped
    pub async fn disconnect(&self) {
        {
            let mut state = self.state.write().await;
            *state = CameraState::default();
        }
        tracing::info!("Camera disconnected");
        self.broadcast_status().await;
    }

    /// Ask the camera app to start streaming
    pub async fn request_start(&self) -> Result<()> {
        self.ensure_connected().await?;
        self.realtime
            .broadcast(HubMessage::CameraCommand(CameraCommandMessage {
                action: "start".to_string(),
            }))
            .await;
        tracing::info!("Camera start command sent");
        Ok(())
    }

    /// Ask the camera app to stop streaming
    pub async fn request_stop(&self) -> Result<()> {
        self.ensure_connected().await?;
        {
            let mut state = self.state.write().await;
            state.streaming = false;
        }
        self.realtime
            .broadcast(HubMessage::CameraCommand(CameraCommandMessage {
                action: "stop".to_string(),
            }))
            .await;
        tracing::info!("Camera stop command sent");
        self.broadcast_status().await;
        Ok(())
    }

    /// Accept a frame pushed by the camera app and relay it as `live_frame`
    pub async fn push_frame(&self, frame: String, timestamp: Option<String>) -> Result<()> {
        if frame.is_empty() {
            return Err(Error::Validation("Frame is empty".to_string()));
        }

        let now = Utc::now();
        let became_streaming = {
            let mut state = self.state.write().await;
            let became_streaming = !state.streaming;
            state.connected = true;
            state.streaming = true;
            state.latest_frame = Some(frame.clone());
            state.last_frame_at = Some(now);
            state.last_error = None;
            became_streaming
        };

        if became_streaming {
            tracing::info!("Camera streaming");
            self.broadcast_status().await;
        }

        self.realtime
            .broadcast(HubMessage::LiveFrame(LiveFrameMessage {
                frame,
                timestamp: timestamp.unwrap_or_else(|| now.to_rfc3339()),
            }))
            .await;
        Ok(())
    }

    /// Camera app failed (permission denied, device lost). Streaming ends;
    /// the last frame stays cached.
    pub async fn report_error(&self, message: &str) -> Result<()> {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::Validation("No error message provided".to_string()));
        }

        {
            let mut state = self.state.write().await;
            state.streaming = false;
            state.last_error = Some(message.to_string());
        }
        tracing::warn!(error = %message, "Camera error reported");
        self.broadcast_status().await;
        Ok(())
    }

    /// Latest frame as base64 text
    pub async fn latest_frame(&self) -> Option<String> {
        self.state.read().await.latest_frame.clone()
    }

    /// Latest frame decoded to JPEG bytes
    pub async fn latest_frame_bytes(&self) -> Result<Option<Vec<u8>>> {
        let Some(frame) = self.latest_frame().await else {
            return Ok(None);
        };

        // Accept data URLs as sent by browsers
        let payload = frame
            .split_once(";base64,")
            .map(|(_, data)| data)
            .unwrap_or(&frame);

        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map(Some)
            .map_err(|e| Error::DetectionSourceUnavailable(format!("Latest frame is not valid base64: {}", e)))
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.state.read().await.connected {
            Ok(())
        } else {
            Err(Error::Conflict("Camera not connected".to_string()))
        }
    }

    async fn broadcast_status(&self) {
        let message = self.status_message().await;
        self.realtime.broadcast(HubMessage::CameraStatus(message)).await;
    }
}
