//! Application state
//!
//! Holds all shared components and configuration

use crate::auto_detection::AutoDetectionService;
use crate::camera_gateway::CameraGateway;
use crate::detection_source::DetectionSource;
use crate::realtime_hub::RealtimeHub;
use crate::tracking::{TrackingConfig, TrackingEngine};
use crate::tracking_scheduler::TrackingScheduler;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// ML detector endpoint
    pub ml_api_url: String,
    /// ML detector request timeout (seconds)
    pub ml_api_timeout_secs: u64,
    /// Auto detection period (seconds)
    pub auto_detection_interval_secs: u64,
    /// Detections below this confidence are dropped
    pub detection_confidence_threshold: f32,
    /// Frontend assets, served as router fallback when set
    pub static_dir: Option<PathBuf>,
    /// Reconciliation engine tuning
    pub tracking: TrackingConfig,
}

/// Parse an env var, falling back to `default` when unset or unparsable
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key = key, value = %raw, "Ignoring unparsable setting");
                default
            }
        },
        Err(_) => default,
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let defaults = TrackingConfig::default();
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 5000),
            ml_api_url: std::env::var("ML_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000/predict".to_string()),
            ml_api_timeout_secs: env_or("ML_API_TIMEOUT", 10),
            auto_detection_interval_secs: env_or("AUTO_DETECTION_INTERVAL", 5).max(1),
            detection_confidence_threshold: env_or("DETECTION_CONFIDENCE_THRESHOLD", 0.3),
            static_dir: std::env::var("STATIC_DIR").ok().map(PathBuf::from),
            tracking: TrackingConfig {
                match_iou_threshold: env_or("MATCH_IOU_THRESHOLD", defaults.match_iou_threshold),
                duplicate_iou_threshold: env_or(
                    "DUPLICATE_IOU_THRESHOLD",
                    defaults.duplicate_iou_threshold,
                ),
                missing_cycles_threshold: env_or(
                    "MISSING_CYCLES_THRESHOLD",
                    defaults.missing_cycles_threshold,
                )
                .max(1),
                default_interval_secs: env_or(
                    "DEFAULT_TRACKING_INTERVAL",
                    defaults.default_interval_secs,
                ),
                degraded_after_failures: env_or(
                    "DEGRADED_AFTER_FAILURES",
                    defaults.degraded_after_failures,
                ),
            },
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// RealtimeHub (WebSocket push)
    pub realtime: Arc<RealtimeHub>,
    /// CameraGateway (camera app boundary)
    pub camera: Arc<CameraGateway>,
    /// Detector adapter shared by the scheduler, auto detection and POST /detect
    pub source: Arc<dyn DetectionSource>,
    /// TrackingEngine (watch-list, alarm)
    pub tracking: Arc<TrackingEngine>,
    /// TrackingScheduler (reconciliation loop)
    pub scheduler: Arc<TrackingScheduler>,
    /// AutoDetectionService (live preview)
    pub auto_detection: Arc<AutoDetectionService>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the tracking components around an already built detection source
    pub fn build(
        config: AppConfig,
        realtime: Arc<RealtimeHub>,
        camera: Arc<CameraGateway>,
        source: Arc<dyn DetectionSource>,
    ) -> Self {
        let tracking = Arc::new(TrackingEngine::new(config.tracking.clone(), realtime.clone()));
        let scheduler = Arc::new(TrackingScheduler::new(tracking.clone(), source.clone()));
        let auto_detection = Arc::new(AutoDetectionService::new(
            source.clone(),
            tracking.clone(),
            realtime.clone(),
            Duration::from_secs(config.auto_detection_interval_secs),
        ));

        Self {
            config,
            realtime,
            camera,
            source,
            tracking,
            scheduler,
            auto_detection,
            started_at: Instant::now(),
        }
    }
}
