//! Tracking types

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Smallest accepted polling interval (seconds)
pub const MIN_INTERVAL_SECS: u32 = 1;
/// Largest accepted polling interval (seconds)
pub const MAX_INTERVAL_SECS: u32 = 60;

/// Axis-aligned bounding box in pixel space (TLBR)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create from top-left corner and size
    pub fn from_tlwh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Finite coordinates with x1 < x2 and y1 < y2
    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }

    /// Intersection over Union with another box
    pub fn iou(&self, other: &BBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

/// One object reported by the detector for the current frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub class_id: i32,
    pub confidence: f32,
    pub bbox: BBox,
}

impl Detection {
    /// Reject entries that cannot be matched reliably
    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(Error::Validation("Detection label is empty".to_string()));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::Validation(format!(
                "Detection confidence {} is outside [0, 1]",
                self.confidence
            )));
        }
        if !self.bbox.is_valid() {
            return Err(Error::Validation(format!(
                "Detection bbox ({}, {}, {}, {}) requires x1<x2 and y1<y2",
                self.bbox.x1, self.bbox.y1, self.bbox.x2, self.bbox.y2
            )));
        }
        Ok(())
    }
}

/// Detection annotated with whether it already corresponds to a tracked item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDetection {
    #[serde(flatten)]
    pub detection: Detection,
    pub is_tracked: bool,
}

/// A detection promoted to long-lived monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedItem {
    pub id: String,
    pub label: String,
    pub class_id: i32,
    pub confidence_at_add: f32,
    pub bbox_at_add: BBox,
    /// Box of the last successful match; drifts with the object
    pub bbox: BBox,
    pub added_at: DateTime<Utc>,
    pub is_present: bool,
    pub last_seen: DateTime<Utc>,
    /// Consecutive cycles without a match
    pub missing_cycles: u32,
}

impl TrackedItem {
    pub(crate) fn from_detection(detection: &Detection, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("track_{}", uuid::Uuid::new_v4().simple()),
            label: detection.label.clone(),
            class_id: detection.class_id,
            confidence_at_add: detection.confidence,
            bbox_at_add: detection.bbox,
            bbox: detection.bbox,
            added_at: now,
            is_present: true,
            last_seen: now,
            missing_cycles: 0,
        }
    }

    pub fn to_missing(&self) -> MissingItem {
        MissingItem {
            id: self.id.clone(),
            label: self.label.clone(),
            class_id: self.class_id,
            last_seen: self.last_seen,
        }
    }
}

/// Missing-set entry carried by alarm events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingItem {
    pub id: String,
    pub label: String,
    pub class_id: i32,
    pub last_seen: DateTime<Utc>,
}

/// Alarm state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmState {
    #[default]
    Idle,
    Active,
    Acknowledged,
}

impl AlarmState {
    /// Active and Acknowledged both count as a raised alarm
    pub fn is_raised(&self) -> bool {
        !matches!(self, AlarmState::Idle)
    }
}

/// Why an alarm went back to Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearReason {
    /// Every tracked item is present again
    Recovered,
    /// Cleared by an operator
    Manual,
}

impl std::fmt::Display for ClearReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClearReason::Recovered => write!(f, "recovered"),
            ClearReason::Manual => write!(f, "manual"),
        }
    }
}

/// Snapshot returned by GET /tracking/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingStatus {
    pub tracking_active: bool,
    pub alarm_active: bool,
    pub alarm_acknowledged: bool,
    pub alarm_state: AlarmState,
    pub tracking_interval: u32,
    pub count: usize,
    pub tracked_items: Vec<TrackedItem>,
    pub missing_items: Vec<MissingItem>,
    pub source_degraded: bool,
}

/// Engine tuning
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// A detection matches an item only above this IoU
    pub match_iou_threshold: f32,
    /// `add` rejects a detection overlapping an item of the same class above this IoU
    pub duplicate_iou_threshold: f32,
    /// K: consecutive misses before an item counts as missing
    pub missing_cycles_threshold: u32,
    /// Initial polling interval (seconds)
    pub default_interval_secs: u32,
    /// Consecutive skipped cycles before the source is reported degraded
    pub degraded_after_failures: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            match_iou_threshold: 0.5,
            duplicate_iou_threshold: 0.5,
            missing_cycles_threshold: 1,
            default_interval_secs: 5,
            degraded_after_failures: 3,
        }
    }
}
