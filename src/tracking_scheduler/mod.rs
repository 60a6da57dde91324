//! TrackingScheduler - periodic reconciliation driver
//!
//! ## Responsibilities
//!
//! - Stopped/Running lifecycle behind POST /tracking/start, /tracking/stop and /tracking/clear
//! - One tick per `interval_seconds`, re-read at the start of every tick
//! - Detector call outside the session lock, bounded by one interval
//! - Failed or late batches skip the cycle; the loop keeps running
//!
//! `stop()` interrupts the wait for the next tick. A cycle already in
//! progress runs to completion before the loop exits.

use crate::detection_source::DetectionSource;
use crate::error::{Error, Result};
use crate::tracking::{CycleReport, TrackingEngine};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Handle to a running loop
struct LoopHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// What happened in one tick
#[derive(Debug)]
pub enum CycleOutcome {
    Applied(CycleReport),
    /// Detector failed or timed out
    Skipped { degraded: bool },
    /// Nothing on the watch-list
    Idle,
}

/// TrackingScheduler instance
pub struct TrackingScheduler {
    engine: Arc<TrackingEngine>,
    source: Arc<dyn DetectionSource>,
    handle: Mutex<Option<LoopHandle>>,
}

impl TrackingScheduler {
    /// Create new TrackingScheduler
    pub fn new(engine: Arc<TrackingEngine>, source: Arc<dyn DetectionSource>) -> Self {
        Self {
            engine,
            source,
            handle: Mutex::new(None),
        }
    }

    /// Stopped -> Running. Returns the interval in effect.
    pub async fn start(&self) -> Result<u32> {
        let mut handle = self.handle.lock().await;

        let interval_secs = self.engine.begin_tracking().await?;

        // A previous loop may still be finishing its last cycle; it already saw
        // its shutdown signal and exits on its own.
        if let Some(previous) = handle.take() {
            let _ = previous.shutdown.send(true);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine = self.engine.clone();
        let source = self.source.clone();
        let task = tokio::spawn(async move {
            Self::run_loop(engine, source, shutdown_rx).await;
        });

        *handle = Some(LoopHandle {
            shutdown: shutdown_tx,
            task,
        });

        tracing::info!(interval_secs = interval_secs, "Tracking started");
        Ok(interval_secs)
    }

    /// Running -> Stopped. Registry and alarm state are left untouched.
    /// Returns whether tracking was running.
    pub async fn stop(&self) -> bool {
        let mut handle = self.handle.lock().await;
        let was_active = self.engine.end_tracking().await;

        if let Some(running) = handle.take() {
            let _ = running.shutdown.send(true);
        }

        if was_active {
            tracing::info!("Tracking stopped");
        }
        was_active
    }

    /// Empty the watch-list and stop the loop under the same lock `start`
    /// takes, so no start can slip in between. Returns the number removed.
    pub async fn clear(&self) -> usize {
        let mut handle = self.handle.lock().await;
        let removed = self.engine.clear().await;

        if let Some(running) = handle.take() {
            let _ = running.shutdown.send(true);
            tracing::info!("Tracking stopped by clear");
        }
        removed
    }

    /// True while a loop task is alive (including one finishing its last cycle)
    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .map(|h| !h.task.is_finished())
            .unwrap_or(false)
    }

    async fn run_loop(
        engine: Arc<TrackingEngine>,
        source: Arc<dyn DetectionSource>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!("Tracking scheduler loop started");

        loop {
            let interval = Duration::from_secs(engine.interval_secs().await as u64);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }

            let shut_down = *shutdown.borrow();
            if shut_down || !engine.is_tracking_active().await {
                break;
            }

            Self::run_cycle(&engine, source.as_ref(), interval).await;
        }

        tracing::info!("Tracking scheduler loop stopped");
    }

    /// One reconciliation cycle. The batch is fetched before the session lock
    /// is taken; a batch not delivered within `budget` skips the cycle.
    pub async fn run_cycle(
        engine: &TrackingEngine,
        source: &dyn DetectionSource,
        budget: Duration,
    ) -> CycleOutcome {
        if engine.item_count().await == 0 {
            tracing::debug!("No items to track - cycle skipped");
            return CycleOutcome::Idle;
        }

        let fetched = match tokio::time::timeout(budget, source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(Error::DetectionSourceUnavailable(format!(
                "Detector did not answer within {}s",
                budget.as_secs()
            ))),
        };

        match fetched {
            Ok(detections) => {
                let report = engine.apply_batch(&detections, Utc::now()).await;
                CycleOutcome::Applied(report)
            }
            Err(e) => {
                let degraded = engine.record_source_failure(&e).await;
                CycleOutcome::Skipped { degraded }
            }
        }
    }
}
