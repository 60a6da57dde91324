//! TrackingRegistry - the watch-list
//!
//! Plain data owned by the tracking session; callers hold the session lock.

use super::matcher::{self, MatchOutcome};
use super::types::{Detection, MissingItem, TrackedItem, MAX_INTERVAL_SECS, MIN_INTERVAL_SECS};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};

/// Tracked items (insertion order) and the polling interval
#[derive(Debug, Clone)]
pub struct TrackingRegistry {
    items: Vec<TrackedItem>,
    interval_secs: u32,
}

impl TrackingRegistry {
    /// Create an empty registry; out-of-range defaults are clamped
    pub fn new(default_interval_secs: u32) -> Self {
        Self {
            items: Vec::new(),
            interval_secs: default_interval_secs.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS),
        }
    }

    /// Promote a detection to a tracked item
    pub fn add(
        &mut self,
        detection: &Detection,
        now: DateTime<Utc>,
        duplicate_iou_threshold: f32,
    ) -> Result<TrackedItem> {
        detection.validate()?;

        if matcher::is_duplicate(&self.items, detection, duplicate_iou_threshold) {
            return Err(Error::AlreadyTracked(format!(
                "{} (class {}) is already being tracked",
                detection.label, detection.class_id
            )));
        }

        let item = TrackedItem::from_detection(detection, now);
        self.items.push(item.clone());

        tracing::info!(
            item_id = %item.id,
            label = %item.label,
            class_id = item.class_id,
            count = self.items.len(),
            "Item added to tracking"
        );

        Ok(item)
    }

    /// Remove an item; returns it if it existed
    pub fn remove(&mut self, id: &str) -> Option<TrackedItem> {
        let pos = self.items.iter().position(|item| item.id == id)?;
        let removed = self.items.remove(pos);

        tracing::info!(
            item_id = %removed.id,
            label = %removed.label,
            count = self.items.len(),
            "Item removed from tracking"
        );

        Some(removed)
    }

    /// Drop every item; returns how many were removed
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        removed
    }

    pub fn set_interval(&mut self, seconds: i64) -> Result<()> {
        if seconds < MIN_INTERVAL_SECS as i64 || seconds > MAX_INTERVAL_SECS as i64 {
            return Err(Error::OutOfRange(format!(
                "Interval must be between {}-{} seconds (got {})",
                MIN_INTERVAL_SECS, MAX_INTERVAL_SECS, seconds
            )));
        }
        self.interval_secs = seconds as u32;
        tracing::info!(interval_secs = self.interval_secs, "Tracking interval changed");
        Ok(())
    }

    pub fn interval_secs(&self) -> u32 {
        self.interval_secs
    }

    /// Items in insertion order
    pub fn list(&self) -> &[TrackedItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Apply one cycle's match outcomes.
    ///
    /// A matched item is present, its box and `last_seen` move forward. An
    /// unmatched item counts a miss and is flagged absent once it reaches
    /// `missing_cycles_threshold` consecutive misses.
    pub fn apply_matches(
        &mut self,
        outcomes: &[MatchOutcome],
        now: DateTime<Utc>,
        missing_cycles_threshold: u32,
    ) {
        let threshold = missing_cycles_threshold.max(1);

        for outcome in outcomes {
            let Some(item) = self.items.iter_mut().find(|i| i.id == outcome.item_id) else {
                tracing::warn!(item_id = %outcome.item_id, "Match outcome for unknown item skipped");
                continue;
            };

            if outcome.matched {
                if let Some(bbox) = outcome.bbox {
                    item.bbox = bbox;
                }
                item.last_seen = item.last_seen.max(now);
                item.missing_cycles = 0;
                if !item.is_present {
                    tracing::info!(item_id = %item.id, label = %item.label, "Tracked item reappeared");
                }
                item.is_present = true;
            } else {
                item.missing_cycles = item.missing_cycles.saturating_add(1);
                if item.missing_cycles >= threshold {
                    if item.is_present {
                        tracing::warn!(
                            item_id = %item.id,
                            label = %item.label,
                            missing_cycles = item.missing_cycles,
                            "Tracked item missing"
                        );
                    }
                    item.is_present = false;
                } else {
                    tracing::debug!(
                        item_id = %item.id,
                        label = %item.label,
                        missing_cycles = item.missing_cycles,
                        threshold = threshold,
                        "Tracked item not found this cycle"
                    );
                }
            }
        }
    }

    /// Items currently flagged absent, in insertion order
    pub fn missing(&self) -> Vec<MissingItem> {
        self.items
            .iter()
            .filter(|item| !item.is_present)
            .map(TrackedItem::to_missing)
            .collect()
    }
}
