//! Shared models for the HTTP surface

use crate::tracking::AnnotatedDetection;
use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// Success without payload
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub camera_connected: bool,
    pub tracking_active: bool,
    pub ws_clients: u64,
}

/// POST /tracking/add
///
/// The detection is parsed with the detector's bbox encodings, so a dashboard
/// can post back exactly what it received.
#[derive(Debug, Deserialize)]
pub struct AddTrackingRequest {
    pub detection: Option<serde_json::Value>,
}

/// POST /tracking/remove
#[derive(Debug, Deserialize)]
pub struct RemoveTrackingRequest {
    pub item_id: Option<String>,
}

/// POST /tracking/interval
///
/// Kept loose so a non-integer value gets a readable validation error
/// instead of a body rejection.
#[derive(Debug, Deserialize)]
pub struct IntervalRequest {
    pub interval: Option<serde_json::Value>,
}

impl IntervalRequest {
    pub fn seconds(&self) -> Option<i64> {
        self.interval.as_ref().and_then(|v| v.as_i64())
    }
}

/// GET/POST /tracking/interval payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalResponse {
    pub interval: u32,
}

/// POST /camera/connect
#[derive(Debug, Default, Deserialize)]
pub struct CameraConnectRequest {
    pub camera_id: Option<String>,
}

/// POST /camera/error
#[derive(Debug, Deserialize)]
pub struct CameraErrorRequest {
    pub message: Option<String>,
}

/// POST /camera/frame
#[derive(Debug, Deserialize)]
pub struct CameraFrameRequest {
    pub frame: String,
    pub timestamp: Option<String>,
}

/// Detection batch returned by POST /detect and GET /detections/latest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionsResponse {
    pub detections: Vec<AnnotatedDetection>,
    pub num_detections: usize,
    pub timestamp: String,
}

impl DetectionsResponse {
    pub fn new(detections: Vec<AnnotatedDetection>) -> Self {
        Self {
            num_detections: detections.len(),
            detections,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
