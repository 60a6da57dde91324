//! Matcher - pairs tracked items with this cycle's detections
//!
//! Pure: reads the watch-list and a batch, returns one outcome per item.
//! Each item is matched on its own: candidates must share the item's
//! `class_id` and overlap its last matched box above the IoU threshold, and
//! the highest IoU wins (first in batch order on ties). A detection may
//! confirm several items. Unmatched detections are ignored.

use super::types::{BBox, Detection, TrackedItem};

/// Per-item result of one reconciliation cycle
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub item_id: String,
    pub matched: bool,
    /// Box to remember when matched
    pub bbox: Option<BBox>,
    pub iou: f32,
}

impl MatchOutcome {
    fn unmatched(item_id: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            matched: false,
            bbox: None,
            iou: 0.0,
        }
    }
}

/// Best detection for one item, if any clears the threshold
fn best_match(item: &TrackedItem, detections: &[Detection], iou_threshold: f32) -> Option<(BBox, f32)> {
    let mut best: Option<(BBox, f32)> = None;
    for det in detections.iter().filter(|d| d.class_id == item.class_id) {
        let iou = item.bbox.iou(&det.bbox);
        if !iou.is_finite() || iou <= iou_threshold {
            continue;
        }
        if best.map_or(true, |(_, best_iou)| iou > best_iou) {
            best = Some((det.bbox, iou));
        }
    }
    best
}

/// Match every tracked item against the batch. Output order follows `items`.
pub fn match_items(
    items: &[TrackedItem],
    detections: &[Detection],
    iou_threshold: f32,
) -> Vec<MatchOutcome> {
    items
        .iter()
        .map(|item| match best_match(item, detections, iou_threshold) {
            Some((bbox, iou)) => MatchOutcome {
                item_id: item.id.clone(),
                matched: true,
                bbox: Some(bbox),
                iou,
            },
            None => MatchOutcome::unmatched(&item.id),
        })
        .collect()
}

/// True when `detection` would be rejected by `add` as a duplicate of any item
pub fn is_duplicate(items: &[TrackedItem], detection: &Detection, iou_threshold: f32) -> bool {
    items.iter().any(|item| {
        item.class_id == detection.class_id && item.bbox.iou(&detection.bbox) > iou_threshold
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn det(class_id: i32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            label: format!("class-{}", class_id),
            class_id,
            confidence: 0.9,
            bbox: BBox::new(x1, y1, x2, y2),
        }
    }

    fn item(class_id: i32, x1: f32, y1: f32, x2: f32, y2: f32) -> TrackedItem {
        TrackedItem::from_detection(&det(class_id, x1, y1, x2, y2), Utc::now())
    }

    #[test]
    fn test_match_same_class_overlapping() {
        let items = vec![item(3, 10.0, 10.0, 50.0, 50.0)];
        let dets = vec![det(3, 12.0, 12.0, 52.0, 52.0)];

        let out = match_items(&items, &dets, 0.5);
        assert_eq!(out.len(), 1);
        assert!(out[0].matched);
        assert_eq!(out[0].bbox, Some(BBox::new(12.0, 12.0, 52.0, 52.0)));
    }

    #[test]
    fn test_class_mismatch_never_matches() {
        let items = vec![item(3, 10.0, 10.0, 50.0, 50.0)];
        let dets = vec![det(4, 10.0, 10.0, 50.0, 50.0)];

        let out = match_items(&items, &dets, 0.5);
        assert!(!out[0].matched);
        assert_eq!(out[0].bbox, None);
    }

    #[test]
    fn test_below_threshold_rejected() {
        let items = vec![item(3, 10.0, 10.0, 50.0, 50.0)];
        // IoU = 0.6 with a 10px shift, 0.333.. with a 20px shift
        let dets = vec![det(3, 30.0, 10.0, 70.0, 50.0)];

        let out = match_items(&items, &dets, 0.5);
        assert!(!out[0].matched);
    }

    #[test]
    fn test_picks_highest_iou_candidate() {
        let items = vec![item(3, 10.0, 10.0, 50.0, 50.0)];
        let dets = vec![det(3, 16.0, 10.0, 56.0, 50.0), det(3, 11.0, 10.0, 51.0, 50.0)];

        let out = match_items(&items, &dets, 0.5);
        assert!(out[0].matched);
        assert_eq!(out[0].bbox, Some(BBox::new(11.0, 10.0, 51.0, 50.0)));
    }

    #[test]
    fn test_shared_detection_confirms_both_items() {
        // A and B overlap at IoU 0.43, so both were accepted by add
        let items = vec![item(41, 0.0, 0.0, 100.0, 100.0), item(41, 40.0, 0.0, 140.0, 100.0)];
        assert!(!is_duplicate(&items[..1], &det(41, 40.0, 0.0, 140.0, 100.0), 0.5));

        // One detection sitting between them, IoU 0.667 against each
        let dets = vec![det(41, 20.0, 0.0, 120.0, 100.0)];

        let out = match_items(&items, &dets, 0.5);
        assert!(out[0].matched);
        assert!(out[1].matched);
        assert_eq!(out[0].bbox, Some(BBox::new(20.0, 0.0, 120.0, 100.0)));
        assert_eq!(out[1].bbox, Some(BBox::new(20.0, 0.0, 120.0, 100.0)));
    }

    #[test]
    fn test_equal_iou_prefers_first_detection() {
        let items = vec![item(3, 20.0, 10.0, 60.0, 50.0)];
        // Shifted 5px left and 5px right: same IoU
        let dets = vec![det(3, 15.0, 10.0, 55.0, 50.0), det(3, 25.0, 10.0, 65.0, 50.0)];

        let out = match_items(&items, &dets, 0.5);
        assert_eq!(out[0].bbox, Some(BBox::new(15.0, 10.0, 55.0, 50.0)));
    }

    #[test]
    fn test_uses_drifted_box() {
        let mut tracked = item(3, 10.0, 10.0, 50.0, 50.0);
        tracked.bbox = BBox::new(60.0, 10.0, 100.0, 50.0);
        let dets = vec![det(3, 62.0, 10.0, 102.0, 50.0)];

        let out = match_items(&[tracked], &dets, 0.5);
        assert!(out[0].matched);
    }

    #[test]
    fn test_empty_batch() {
        let items = vec![item(3, 10.0, 10.0, 50.0, 50.0)];
        let out = match_items(&items, &[], 0.5);
        assert_eq!(out, vec![MatchOutcome::unmatched(&items[0].id)]);
    }

    #[test]
    fn test_is_duplicate() {
        let items = vec![item(3, 10.0, 10.0, 50.0, 50.0)];
        assert!(is_duplicate(&items, &det(3, 11.0, 11.0, 51.0, 51.0), 0.5));
        assert!(!is_duplicate(&items, &det(5, 11.0, 11.0, 51.0, 51.0), 0.5));
        assert!(!is_duplicate(&items, &det(3, 200.0, 200.0, 240.0, 240.0), 0.5));
    }
}
