//! AutoDetectionService - live detection preview
//!
//! ## Responsibilities
//!
//! - Periodic detector calls while the camera streams
//! - `is_tracked` annotation against the watch-list
//! - `auto_detection_result` push and latest-result cache for GET /detections/latest
//!
//! Runs independently of the tracking scheduler and never touches alarm state.

use crate::detection_source::DetectionSource;
use crate::realtime_hub::{AutoDetectionResultMessage, HubMessage, RealtimeHub};
use crate::tracking::{AnnotatedDetection, TrackingEngine};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Handle to the live loop
struct LoopHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// AutoDetectionService instance
pub struct AutoDetectionService {
    source: Arc<dyn DetectionSource>,
    tracking: Arc<TrackingEngine>,
    realtime: Arc<RealtimeHub>,
    period: Duration,
    handle: Mutex<Option<LoopHandle>>,
    latest: Arc<RwLock<Vec<AnnotatedDetection>>>,
}

impl AutoDetectionService {
    /// Create new AutoDetectionService
    pub fn new(
        source: Arc<dyn DetectionSource>,
        tracking: Arc<TrackingEngine>,
        realtime: Arc<RealtimeHub>,
        period: Duration,
    ) -> Self {
        Self {
            source,
            tracking,
            realtime,
            period,
            handle: Mutex::new(None),
            latest: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Start detection loop. At most one loop runs at a time.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;

        if handle.as_ref().is_some_and(|h| !h.task.is_finished()) {
            tracing::warn!("Auto detection already running");
            return;
        }

        tracing::info!(period_secs = self.period.as_secs(), "Starting auto detection");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(Self::run_loop(
            self.source.clone(),
            self.tracking.clone(),
            self.realtime.clone(),
            self.latest.clone(),
            self.period,
            shutdown_rx,
        ));

        *handle = Some(LoopHandle {
            shutdown: shutdown_tx,
            task,
        });
    }

    /// Stop detection loop
    pub async fn stop(&self) {
        if let Some(running) = self.handle.lock().await.take() {
            tracing::info!("Stopping auto detection");
            let _ = running.shutdown.send(true);
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .map(|h| !h.task.is_finished())
            .unwrap_or(false)
    }

    /// Most recent annotated batch
    pub async fn latest(&self) -> Vec<AnnotatedDetection> {
        self.latest.read().await.clone()
    }

    async fn run_loop(
        source: Arc<dyn DetectionSource>,
        tracking: Arc<TrackingEngine>,
        realtime: Arc<RealtimeHub>,
        latest: Arc<RwLock<Vec<AnnotatedDetection>>>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            let shut_down = *shutdown.borrow();
            if shut_down {
                break;
            }

            let detections = match source.fetch().await {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!(error = %e, "Auto detection skipped");
                    continue;
                }
            };

            let annotated = tracking.annotate(detections).await;
            *latest.write().await = annotated.clone();

            tracing::debug!(count = annotated.len(), "Auto detection result");
            realtime
                .broadcast(HubMessage::AutoDetectionResult(AutoDetectionResultMessage {
                    detections: annotated,
                    timestamp: Utc::now().to_rfc3339(),
                }))
                .await;
        }

        tracing::info!("Auto detection stopped");
    }
}
