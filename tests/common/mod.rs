//! Shared fixtures for integration tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use watchlist_camserver::camera_gateway::CameraGateway;
use watchlist_camserver::detection_source::DetectionSource;
use watchlist_camserver::realtime_hub::RealtimeHub;
use watchlist_camserver::state::{AppConfig, AppState};
use watchlist_camserver::tracking::{BBox, Detection, TrackingConfig};
use watchlist_camserver::{web_api, Result};

/// Detector replaying scripted batches; once the script runs out it keeps
/// returning the fallback batch
pub struct ScriptedSource {
    batches: Mutex<VecDeque<Result<Vec<Detection>>>>,
    fallback: Vec<Detection>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(batches: Vec<Result<Vec<Detection>>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            fallback: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_fallback(mut self, fallback: Vec<Detection>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DetectionSource for ScriptedSource {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Detection>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()));
        async move { next }.boxed()
    }
}

pub fn detection(label: &str, class_id: i32, bbox: (f32, f32, f32, f32)) -> Detection {
    Detection {
        label: label.to_string(),
        class_id,
        confidence: 0.9,
        bbox: BBox::new(bbox.0, bbox.1, bbox.2, bbox.3),
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ml_api_url: "http://127.0.0.1:9/predict".to_string(),
        ml_api_timeout_secs: 1,
        auto_detection_interval_secs: 5,
        detection_confidence_threshold: 0.3,
        static_dir: None,
        tracking: TrackingConfig::default(),
    }
}

pub fn build_state(source: Arc<ScriptedSource>) -> AppState {
    let realtime = Arc::new(RealtimeHub::new());
    let camera = Arc::new(CameraGateway::new(realtime.clone()));
    AppState::build(test_config(), realtime, camera, source)
}

/// Send one request through the router and decode the JSON answer
pub async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

pub fn router(state: AppState) -> Router {
    web_api::create_router(state)
}
