//! RealtimeHub - WebSocket push distribution
//!
//! ## Responsibilities
//!
//! - WebSocket connection management
//! - Fire-and-forget broadcast of camera, detection, tracking and alarm events
//!
//! Delivery is best effort. Clients treat GET /tracking/status as the source
//! of truth after a reconnect.

use crate::tracking::{AnnotatedDetection, ClearReason, MissingItem, TrackingStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    CameraStatus(CameraStatusMessage),
    /// Start/stop instruction for the camera app
    CameraCommand(CameraCommandMessage),
    LiveFrame(LiveFrameMessage),
    /// Raw per-frame detections, independent of the watch-list
    AutoDetectionResult(AutoDetectionResultMessage),
    /// Registry snapshot after each cycle or mutation
    DetectionTrackingUpdate(TrackingUpdateMessage),
    AlarmTriggered(AlarmTriggeredMessage),
    AlarmCleared(AlarmClearedMessage),
    AlarmAcknowledged(AlarmAcknowledgedMessage),
}

impl HubMessage {
    /// Wire name of the event
    pub fn event_name(&self) -> &'static str {
        match self {
            HubMessage::CameraStatus(_) => "camera_status",
            HubMessage::CameraCommand(_) => "camera_command",
            HubMessage::LiveFrame(_) => "live_frame",
            HubMessage::AutoDetectionResult(_) => "auto_detection_result",
            HubMessage::DetectionTrackingUpdate(_) => "detection_tracking_update",
            HubMessage::AlarmTriggered(_) => "alarm_triggered",
            HubMessage::AlarmCleared(_) => "alarm_cleared",
            HubMessage::AlarmAcknowledged(_) => "alarm_acknowledged",
        }
    }
}

/// Camera status message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStatusMessage {
    pub connected: bool,
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Camera command message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraCommandMessage {
    /// "start" or "stop"
    pub action: String,
}

/// Live frame relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveFrameMessage {
    /// Base64 JPEG
    pub frame: String,
    pub timestamp: String,
}

/// Raw detection batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoDetectionResultMessage {
    pub detections: Vec<AnnotatedDetection>,
    pub timestamp: String,
}

/// Tracking snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingUpdateMessage {
    #[serde(flatten)]
    pub status: TrackingStatus,
    /// Reconciliation cycle number (0 for snapshots caused by a mutation)
    pub cycle: u64,
    pub timestamp: String,
}

/// Alarm raised
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmTriggeredMessage {
    pub missing_items: Vec<MissingItem>,
    pub timestamp: String,
}

/// Alarm back to idle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmClearedMessage {
    pub reason: ClearReason,
    pub timestamp: String,
}

/// Alarm silenced by an operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmAcknowledgedMessage {
    pub missing_items: Vec<MissingItem>,
    pub timestamp: String,
}

/// Client connection
struct ClientConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, ClientConnection>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new client
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, ClientConnection { id, tx });
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "Client connected");

        (id, rx)
    }

    /// Unregister a client
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Client disconnected");
        }
    }

    /// Broadcast message to all clients
    pub async fn broadcast(&self, message: HubMessage) {
        let msg_type = message.event_name();

        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(message_type = %msg_type, error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        // live_frame arrives at camera FPS; keep it out of the debug stream
        if !matches!(message, HubMessage::LiveFrame(_)) {
            tracing::debug!(
                message_type = %msg_type,
                client_count = connections.len(),
                "Broadcasting message to clients"
            );
        }

        for conn in connections.values() {
            if let Err(e) = conn.tx.send(json.clone()) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
            }
        }
    }

    /// Send message to one connection
    pub async fn send_to(&self, id: &Uuid, message: HubMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        if let Some(conn) = connections.get(id) {
            if let Err(e) = conn.tx.send(json) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
            }
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let hub = RealtimeHub::new();
        let (_a, mut rx_a) = hub.register().await;
        let (_b, mut rx_b) = hub.register().await;
        assert_eq!(hub.connection_count(), 2);

        hub.broadcast(HubMessage::CameraCommand(CameraCommandMessage {
            action: "start".into(),
        }))
        .await;

        for rx in [&mut rx_a, &mut rx_b] {
            let raw = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(value["type"], "camera_command");
            assert_eq!(value["data"]["action"], "start");
        }
    }

    #[tokio::test]
    async fn test_unregister_and_send_to() {
        let hub = RealtimeHub::new();
        let (a, mut rx_a) = hub.register().await;
        let (b, mut rx_b) = hub.register().await;

        hub.send_to(
            &a,
            HubMessage::CameraStatus(CameraStatusMessage {
                connected: true,
                streaming: false,
                error: None,
            }),
        )
        .await;
        assert!(rx_a.recv().await.unwrap().contains("camera_status"));
        assert!(rx_b.try_recv().is_err());

        hub.unregister(&b).await;
        hub.unregister(&b).await;
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_alarm_cleared_wire_format() {
        let hub = RealtimeHub::new();
        let (_id, mut rx) = hub.register().await;

        hub.broadcast(HubMessage::AlarmCleared(AlarmClearedMessage {
            reason: ClearReason::Recovered,
            timestamp: "2026-01-01T00:00:00Z".into(),
        }))
        .await;

        let value: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(value["type"], "alarm_cleared");
        assert_eq!(value["data"]["reason"], "recovered");
    }
}
