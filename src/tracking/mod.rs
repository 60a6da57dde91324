//! Tracking & Alarm Reconciliation Engine
//!
//! ## Responsibilities
//!
//! - Owns the single `TrackingSession` (watch-list, interval, alarm, flags)
//! - Serializes HTTP mutations and reconciliation cycles behind one lock
//! - Publishes alarm transitions and tracking snapshots to the RealtimeHub
//!
//! ## Lock discipline
//!
//! Every read-modify-write runs inside one critical section on `session`.
//! Detector calls happen before the lock is taken (see `tracking_scheduler`).
//! Events are broadcast while the lock is still held, so they reach clients in
//! the order their transitions were applied, and a cycle's alarm events always
//! precede its `detection_tracking_update`.

mod alarm;
mod matcher;
mod registry;
mod types;

pub use alarm::{AlarmStateMachine, AlarmTransition};
pub use matcher::{is_duplicate, match_items, MatchOutcome};
pub use registry::TrackingRegistry;
pub use types::*;

use crate::error::{Error, Result};
use crate::realtime_hub::{
    AlarmAcknowledgedMessage, AlarmClearedMessage, AlarmTriggeredMessage, HubMessage,
    RealtimeHub, TrackingUpdateMessage,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Process-wide tracking state
#[derive(Debug)]
pub struct TrackingSession {
    registry: TrackingRegistry,
    alarm: AlarmStateMachine,
    tracking_active: bool,
    consecutive_failures: u32,
    source_degraded: bool,
    cycle: u64,
}

impl TrackingSession {
    fn new(config: &TrackingConfig) -> Self {
        Self {
            registry: TrackingRegistry::new(config.default_interval_secs),
            alarm: AlarmStateMachine::new(),
            tracking_active: false,
            consecutive_failures: 0,
            source_degraded: false,
            cycle: 0,
        }
    }

    fn status(&self) -> TrackingStatus {
        TrackingStatus {
            tracking_active: self.tracking_active,
            alarm_active: self.alarm.is_active(),
            alarm_acknowledged: self.alarm.is_acknowledged(),
            alarm_state: self.alarm.state(),
            tracking_interval: self.registry.interval_secs(),
            count: self.registry.len(),
            tracked_items: self.registry.list().to_vec(),
            missing_items: self.alarm.missing().to_vec(),
            source_degraded: self.source_degraded,
        }
    }
}

/// Summary of one applied reconciliation cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub matched: usize,
    pub missing: usize,
    pub transition: Option<AlarmTransition>,
}

/// TrackingEngine instance
pub struct TrackingEngine {
    session: Mutex<TrackingSession>,
    config: TrackingConfig,
    realtime: Arc<RealtimeHub>,
}

impl TrackingEngine {
    /// Create new TrackingEngine
    pub fn new(config: TrackingConfig, realtime: Arc<RealtimeHub>) -> Self {
        Self {
            session: Mutex::new(TrackingSession::new(&config)),
            config,
            realtime,
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Add a detection to the watch-list
    pub async fn add(&self, detection: Detection) -> Result<TrackedItem> {
        let mut session = self.session.lock().await;
        let item = session
            .registry
            .add(&detection, Utc::now(), self.config.duplicate_iou_threshold)?;
        self.publish_snapshot(&session, 0).await;
        Ok(item)
    }

    /// Remove an item. A removed missing item triggers an immediate recompute.
    pub async fn remove(&self, item_id: &str) -> Result<TrackedItem> {
        let mut session = self.session.lock().await;
        let removed = session
            .registry
            .remove(item_id)
            .ok_or_else(|| Error::NotFound(format!("Tracked item {} not found", item_id)))?;

        let was_missing = session.alarm.missing().iter().any(|m| m.id == removed.id);
        if session.alarm.is_active() && was_missing {
            let missing = session.registry.missing();
            if let Some(transition) = session.alarm.reconcile(missing) {
                self.publish_transition(&transition).await;
            }
        }

        self.publish_snapshot(&session, 0).await;
        Ok(removed)
    }

    /// Empty the watch-list, force the alarm to Idle and stop tracking
    pub async fn clear(&self) -> usize {
        let mut session = self.session.lock().await;
        let removed = session.registry.clear();
        session.tracking_active = false;
        session.consecutive_failures = 0;
        session.source_degraded = false;

        if let Some(transition) = session.alarm.reset() {
            self.publish_transition(&transition).await;
        }

        tracing::info!(removed = removed, "Tracking cleared");
        self.publish_snapshot(&session, 0).await;
        removed
    }

    /// Change the polling interval; takes effect on the next tick
    pub async fn set_interval(&self, seconds: i64) -> Result<u32> {
        let mut session = self.session.lock().await;
        session.registry.set_interval(seconds)?;
        Ok(session.registry.interval_secs())
    }

    pub async fn interval_secs(&self) -> u32 {
        self.session.lock().await.registry.interval_secs()
    }

    /// Items in insertion order
    pub async fn list(&self) -> Vec<TrackedItem> {
        self.session.lock().await.registry.list().to_vec()
    }

    pub async fn item_count(&self) -> usize {
        self.session.lock().await.registry.len()
    }

    pub async fn status(&self) -> TrackingStatus {
        self.session.lock().await.status()
    }

    pub async fn is_tracking_active(&self) -> bool {
        self.session.lock().await.tracking_active
    }

    /// Active -> Acknowledged
    pub async fn acknowledge(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if let Some(transition) = session.alarm.acknowledge()? {
            self.publish_transition(&transition).await;
        }
        Ok(())
    }

    /// Raise the tracking-enabled flag. Returns the interval in effect.
    pub(crate) async fn begin_tracking(&self) -> Result<u32> {
        let mut session = self.session.lock().await;
        if session.tracking_active {
            return Err(Error::Conflict("Tracking already active".to_string()));
        }
        if session.registry.is_empty() {
            return Err(Error::Validation("No items to track".to_string()));
        }
        session.tracking_active = true;
        session.consecutive_failures = 0;
        Ok(session.registry.interval_secs())
    }

    /// Drop the tracking-enabled flag; registry and alarm stay as they are.
    /// Returns whether tracking was active.
    pub(crate) async fn end_tracking(&self) -> bool {
        let mut session = self.session.lock().await;
        std::mem::replace(&mut session.tracking_active, false)
    }

    /// Apply one detection batch: match, update presence, drive the alarm,
    /// then publish the cycle snapshot.
    pub async fn apply_batch(&self, detections: &[Detection], now: DateTime<Utc>) -> CycleReport {
        let mut session = self.session.lock().await;
        session.cycle += 1;
        let cycle = session.cycle;

        if session.source_degraded {
            tracing::info!(cycle = cycle, "Detection source recovered");
        }
        session.consecutive_failures = 0;
        session.source_degraded = false;

        let outcomes = match_items(
            session.registry.list(),
            detections,
            self.config.match_iou_threshold,
        );
        let matched = outcomes.iter().filter(|o| o.matched).count();

        session
            .registry
            .apply_matches(&outcomes, now, self.config.missing_cycles_threshold);

        let missing = session.registry.missing();
        let missing_count = missing.len();
        let transition = session.alarm.reconcile(missing);
        if let Some(t) = &transition {
            self.publish_transition(t).await;
        }

        tracing::debug!(
            cycle = cycle,
            detections = detections.len(),
            items = session.registry.len(),
            matched = matched,
            missing = missing_count,
            alarm_state = ?session.alarm.state(),
            "Reconciliation cycle applied"
        );

        self.publish_snapshot(&session, cycle).await;

        CycleReport {
            cycle,
            matched,
            missing: missing_count,
            transition,
        }
    }

    /// Count a skipped cycle. Returns whether the source is now degraded.
    pub async fn record_source_failure(&self, error: &Error) -> bool {
        let mut session = self.session.lock().await;
        session.consecutive_failures = session.consecutive_failures.saturating_add(1);

        let threshold = self.config.degraded_after_failures.max(1);
        if session.consecutive_failures < threshold {
            tracing::warn!(
                consecutive_failures = session.consecutive_failures,
                error = %error,
                "Detection batch unavailable - cycle skipped"
            );
            return false;
        }

        if !session.source_degraded {
            tracing::error!(
                consecutive_failures = session.consecutive_failures,
                error = %error,
                "Detection source degraded"
            );
        }
        session.source_degraded = true;

        let cycle = session.cycle;
        self.publish_snapshot(&session, cycle).await;
        true
    }

    /// Mark which detections already correspond to a tracked item
    pub async fn annotate(&self, detections: Vec<Detection>) -> Vec<AnnotatedDetection> {
        let session = self.session.lock().await;
        let items = session.registry.list();
        detections
            .into_iter()
            .map(|detection| AnnotatedDetection {
                is_tracked: is_duplicate(items, &detection, self.config.duplicate_iou_threshold),
                detection,
            })
            .collect()
    }

    async fn publish_transition(&self, transition: &AlarmTransition) {
        let timestamp = Utc::now().to_rfc3339();
        let message = match transition {
            AlarmTransition::Triggered(missing_items) => {
                HubMessage::AlarmTriggered(AlarmTriggeredMessage {
                    missing_items: missing_items.clone(),
                    timestamp,
                })
            }
            AlarmTransition::Cleared(reason) => HubMessage::AlarmCleared(AlarmClearedMessage {
                reason: *reason,
                timestamp,
            }),
            AlarmTransition::Acknowledged(missing_items) => {
                HubMessage::AlarmAcknowledged(AlarmAcknowledgedMessage {
                    missing_items: missing_items.clone(),
                    timestamp,
                })
            }
        };
        self.realtime.broadcast(message).await;
    }

    async fn publish_snapshot(&self, session: &TrackingSession, cycle: u64) {
        self.realtime
            .broadcast(HubMessage::DetectionTrackingUpdate(TrackingUpdateMessage {
                status: session.status(),
                cycle,
                timestamp: Utc::now().to_rfc3339(),
            }))
            .await;
    }
}
