//! Detection Source Adapter
//!
//! ## Responsibilities
//!
//! - Pull one detection batch for the current camera frame
//! - Normalize the detector's loosely-typed payload into `Detection`
//! - Report every failure as `DetectionSourceUnavailable` (transient)
//!
//! The ML service contract: `POST <ML_API_URL>` with a multipart `file`
//! (JPEG), answering `{"detections": [{label, confidence, class_id, bbox}]}`.

use crate::camera_gateway::CameraGateway;
use crate::error::{Error, Result};
use crate::tracking::{BBox, Detection};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Anything that can produce the detections visible right now
pub trait DetectionSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Detection>>>;
}

/// Detector response envelope
#[derive(Debug, Deserialize)]
struct MlResponse {
    #[serde(default)]
    detections: Vec<serde_json::Value>,
}

/// Detection as the detector sends it
#[derive(Debug, Deserialize)]
pub struct RawDetection {
    pub label: String,
    pub class_id: i64,
    pub confidence: f64,
    pub bbox: RawBBox,
}

/// Accepted bbox encodings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawBBox {
    Corners { x1: f32, y1: f32, x2: f32, y2: f32 },
    TopLeftSize { x: f32, y: f32, width: f32, height: f32 },
    Array([f32; 4]),
}

impl From<RawBBox> for BBox {
    fn from(raw: RawBBox) -> Self {
        match raw {
            RawBBox::Corners { x1, y1, x2, y2 } => BBox::new(x1, y1, x2, y2),
            RawBBox::TopLeftSize { x, y, width, height } => BBox::from_tlwh(x, y, width, height),
            RawBBox::Array([x1, y1, x2, y2]) => BBox::new(x1, y1, x2, y2),
        }
    }
}

/// Parse and validate one detection in any accepted encoding
pub fn parse_detection(value: serde_json::Value) -> Result<Detection> {
    let parsed: RawDetection = serde_json::from_value(value)
        .map_err(|e| Error::Validation(format!("Malformed detection: {}", e)))?;

    let class_id = i32::try_from(parsed.class_id)
        .map_err(|_| Error::Validation(format!("Invalid class_id {}", parsed.class_id)))?;

    let detection = Detection {
        label: parsed.label,
        class_id,
        confidence: parsed.confidence as f32,
        bbox: parsed.bbox.into(),
    };
    detection.validate()?;
    Ok(detection)
}

/// Turn raw detector entries into validated detections.
///
/// Malformed entries and entries below `min_confidence` are dropped; one bad
/// entry never discards the rest of the batch.
pub fn normalize_detections(raw: Vec<serde_json::Value>, min_confidence: f32) -> Vec<Detection> {
    let total = raw.len();
    let mut out = Vec::with_capacity(total);

    for value in raw {
        let detection = match parse_detection(value) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping invalid detection");
                continue;
            }
        };
        if detection.confidence < min_confidence {
            continue;
        }
        out.push(detection);
    }

    if out.len() < total {
        tracing::debug!(kept = out.len(), total = total, "Detection batch filtered");
    }

    out
}

/// HTTP client for the external ML detector
pub struct MlDetectorClient {
    client: reqwest::Client,
    url: String,
    camera: Arc<CameraGateway>,
    min_confidence: f32,
}

impl MlDetectorClient {
    /// Create new detector client
    pub fn new(
        url: String,
        timeout: Duration,
        camera: Arc<CameraGateway>,
        min_confidence: f32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url,
            camera,
            min_confidence,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send the latest frame to the detector
    pub async fn detect_latest(&self) -> Result<Vec<Detection>> {
        let frame = self
            .camera
            .latest_frame_bytes()
            .await?
            .ok_or_else(|| Error::DetectionSourceUnavailable("No camera frame available".to_string()))?;

        self.detect(frame).await
    }

    /// Send one JPEG frame to the detector
    pub async fn detect(&self, image: Vec<u8>) -> Result<Vec<Detection>> {
        let part = Part::bytes(image)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| Error::Internal(format!("Invalid multipart mime: {}", e)))?;
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::DetectionSourceUnavailable(format!("Detector request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::DetectionSourceUnavailable(format!(
                "Detector returned {} - {}",
                status, body
            )));
        }

        let result: MlResponse = resp
            .json()
            .await
            .map_err(|e| Error::DetectionSourceUnavailable(format!("Detector response unreadable: {}", e)))?;

        Ok(normalize_detections(result.detections, self.min_confidence))
    }
}

impl DetectionSource for MlDetectorClient {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Detection>>> {
        self.detect_latest().boxed()
    }
}
