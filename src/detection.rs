//! Marker detections and the snapshot board shared with the vision callback.
//!
//! The frame callback runs on the vision driver's side and writes into a
//! [`DetectionBoard`]; the state machine only ever reads copies of the
//! snapshot, so a poll never observes a half-written frame.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::error::SetupError;
use crate::geometry::Point3;
use crate::hardware::FrameCallback;

/// Pixel coordinates in the camera image. `x` is horizontal.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

/// One marker seen in one camera frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub tag_id: u32,
    pub center_px: PixelPoint,
    /// Marker position in the robot base-link frame.
    pub pose_base_link: Point3,
    /// Unprocessed model output, kept for diagnostics.
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Marker families and ids the detector should report, e.g. `tag36h11 -> [1, 43]`.
pub type TagFilter = BTreeMap<String, Vec<u32>>;

/// Groups `family.id` entries into a [`TagFilter`].
pub fn parse_tag_families<S: AsRef<str>>(entries: &[S]) -> Result<TagFilter, SetupError> {
    let mut filter = TagFilter::new();
    for entry in entries {
        let entry = entry.as_ref();
        let (family, id) = entry
            .split_once('.')
            .filter(|(family, _)| !family.is_empty())
            .ok_or_else(|| SetupError::InvalidTagFamily(entry.to_string()))?;
        let id = id
            .parse::<u32>()
            .map_err(|_| SetupError::InvalidTagFamily(entry.to_string()))?;
        filter.entry(family.to_string()).or_default().push(id);
    }
    Ok(filter)
}

/// Latest view of what the camera has reported since the last reset.
#[derive(Debug, Clone, Default)]
pub struct DetectionSnapshot {
    pub records: HashMap<u32, DetectionRecord>,
    /// Set when the target tag was seen; cleared when consumed.
    pub target_detected: bool,
    pub target_pose: Option<Point3>,
}

/// Single-writer, single-reader store of detections for one target tag.
#[derive(Debug, Clone)]
pub struct DetectionBoard {
    target_tag_id: u32,
    tx: Arc<watch::Sender<DetectionSnapshot>>,
}

impl DetectionBoard {
    pub fn new(target_tag_id: u32) -> Self {
        let (tx, _rx) = watch::channel(DetectionSnapshot::default());
        Self {
            target_tag_id,
            tx: Arc::new(tx),
        }
    }

    /// Records every detection of a frame, replacing older records per tag id.
    pub fn ingest(&self, frame: &[DetectionRecord]) {
        if frame.is_empty() {
            return;
        }
        let target = self.target_tag_id;
        self.tx.send_modify(|snapshot| {
            for record in frame {
                snapshot.records.insert(record.tag_id, record.clone());
            }
            if let Some(record) = snapshot.records.get(&target) {
                snapshot.target_pose = Some(record.pose_base_link);
                snapshot.target_detected = true;
            }
        });
    }

    /// Callback to register with the detector's per-frame hook.
    pub fn frame_callback(&self) -> FrameCallback {
        let board = self.clone();
        Arc::new(move |frame: &[DetectionRecord]| board.ingest(frame))
    }

    /// Forgets all detections and the target flag.
    pub fn reset(&self) {
        debug!(tag_id = self.target_tag_id, "resetting detections");
        self.tx.send_modify(|snapshot| *snapshot = DetectionSnapshot::default());
    }

    /// Returns and clears the target flag in one step.
    pub fn take_detected(&self) -> bool {
        let mut was_detected = false;
        self.tx.send_if_modified(|snapshot| {
            was_detected = std::mem::take(&mut snapshot.target_detected);
            was_detected
        });
        was_detected
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> DetectionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn target_pose(&self) -> Option<Point3> {
        self.tx.borrow().target_pose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag_id: u32, y: f64) -> DetectionRecord {
        DetectionRecord {
            tag_id,
            center_px: PixelPoint { x: 400.0, y: 240.0 },
            pose_base_link: Point3::new(0.7, y, 0.85),
            raw: serde_json::json!({ "tag_id": tag_id }),
        }
    }

    #[test]
    fn parse_groups_ids_by_family() {
        let filter = parse_tag_families(&["tag36h11.43", "tag36h11.1", "tag25h9.7"]).unwrap();
        assert_eq!(filter["tag36h11"], vec![43, 1]);
        assert_eq!(filter["tag25h9"], vec![7]);
    }

    #[test]
    fn parse_rejects_malformed_entries() {
        for bad in ["tag36h11", "tag36h11.x", ".4", "tag36h11.-1"] {
            assert!(
                matches!(parse_tag_families(&[bad]), Err(SetupError::InvalidTagFamily(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn other_tags_do_not_raise_target_flag() {
        let board = DetectionBoard::new(1);
        board.ingest(&[record(4, 0.1)]);
        let snapshot = board.snapshot();
        assert!(snapshot.records.contains_key(&4));
        assert!(!snapshot.target_detected);
        assert_eq!(snapshot.target_pose, None);
    }

    #[test]
    fn target_flag_is_consumed_once() {
        let board = DetectionBoard::new(1);
        board.ingest(&[record(4, 0.1), record(1, 0.2)]);
        assert_eq!(board.target_pose(), Some(Point3::new(0.7, 0.2, 0.85)));
        assert!(board.take_detected());
        assert!(!board.take_detected());
        // The record survives consumption of the flag.
        assert!(board.snapshot().records.contains_key(&1));
    }

    #[test]
    fn newer_record_replaces_older_one() {
        let board = DetectionBoard::new(1);
        board.ingest(&[record(1, 0.2)]);
        board.ingest(&[record(1, 0.25)]);
        assert_eq!(board.snapshot().records[&1].pose_base_link.y, 0.25);
    }

    #[test]
    fn reset_clears_everything() {
        let board = DetectionBoard::new(1);
        let callback = board.frame_callback();
        callback(&[record(1, 0.2)]);
        board.reset();
        let snapshot = board.snapshot();
        assert!(snapshot.records.is_empty());
        assert!(!snapshot.target_detected);
        assert_eq!(snapshot.target_pose, None);
    }

    #[test]
    fn empty_frames_are_ignored() {
        let board = DetectionBoard::new(1);
        board.ingest(&[record(1, 0.2)]);
        board.ingest(&[]);
        assert!(board.snapshot().target_detected);
    }
}
