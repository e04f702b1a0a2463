//! Pure conversions between sensor-frame detections and robot-frame motion.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::detection::DetectionRecord;

/// A point in the robot base-link frame, meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn offset(&self, by: [f64; 3]) -> Self {
        Self::new(self.x + by[0], self.y + by[1], self.z + by[2])
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Planar robot pose in the map frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    /// Heading in degrees.
    pub heading: f64,
}

/// Plausibility limits applied to the pixel-based lateral estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LateralBand {
    pub min: f64,
    pub max: f64,
    /// Base distance added to the measured lateral offset when the estimate is implausible.
    pub fallback_offset: f64,
}

impl Default for LateralBand {
    fn default() -> Self {
        Self {
            min: 0.275,
            max: 0.4,
            fallback_offset: 0.32,
        }
    }
}

impl LateralBand {
    fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

/// Distance to drive sideways so the target tag ends up at the frame edge.
///
/// The horizontal pixel offset from the frame center and the base-link lateral
/// offset give a pixels-to-meters ratio, which then scales the pixel distance to
/// the frame edge. The result overshoots the tag on purpose: the turn-and-translate
/// maneuver drives past it before turning back.
///
/// Estimates outside `band` are replaced by `band.fallback_offset` plus the
/// measured lateral offset. Returns `None` when `tag_id` was never recorded.
pub fn pixels_to_lateral_meters(
    detections: &HashMap<u32, DetectionRecord>,
    tag_id: u32,
    camera_width_px: f64,
    band: &LateralBand,
) -> Option<f64> {
    let record = detections.get(&tag_id)?;

    // Camera x (horizontal) is base-link y.
    let center_px = record.center_px.x;
    let from_center_px = (camera_width_px / 2.0 - center_px).abs();
    let from_edge_px = (camera_width_px - center_px).abs();
    let lateral_m = record.pose_base_link.y;

    let estimate = from_edge_px * (lateral_m / from_center_px).abs();
    if band.contains(estimate) {
        Some(estimate)
    } else {
        Some(band.fallback_offset + lateral_m)
    }
}

/// Euclidean distance between a pose and a planar waypoint.
pub fn planar_distance(pose: &Pose2D, waypoint: [f64; 2]) -> f64 {
    (pose.x - waypoint[0]).hypot(pose.y - waypoint[1])
}

/// Signed heading correction from `actual` to `goal`, normalized to (-180, 180].
pub fn heading_error(goal_deg: f64, actual_deg: f64) -> f64 {
    let mut error = (goal_deg - actual_deg) % 360.0;
    if error > 180.0 {
        error -= 360.0;
    } else if error <= -180.0 {
        error += 360.0;
    }
    error
}

/// True when every axis of `actual` is within `threshold` of `target`.
pub fn within_per_axis(actual: &Point3, target: &Point3, threshold: f64) -> bool {
    actual
        .to_array()
        .iter()
        .zip(target.to_array())
        .all(|(a, t)| (a - t).abs() <= threshold)
}

/// Closest return in the forward arc: the last `half_width` and first `half_width` samples.
pub fn front_arc_min(samples: &[f64], half_width: usize) -> Option<f64> {
    let head = samples.iter().take(half_width);
    let tail = samples.iter().skip(samples.len().saturating_sub(half_width));
    head.chain(tail)
        .copied()
        .filter(|r| r.is_finite())
        .reduce(f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::PixelPoint;

    fn detections_with(tag_id: u32, center_x: f64, lateral: f64) -> HashMap<u32, DetectionRecord> {
        let record = DetectionRecord {
            tag_id,
            center_px: PixelPoint {
                x: center_x,
                y: 240.0,
            },
            pose_base_link: Point3::new(0.6, lateral, 0.9),
            raw: serde_json::Value::Null,
        };
        HashMap::from([(tag_id, record)])
    }

    #[test]
    fn lateral_estimate_inside_band_is_kept() {
        // 80px from center, 240px from edge, 0.1m lateral => 0.3m.
        let detections = detections_with(1, 400.0, 0.1);
        let lateral =
            pixels_to_lateral_meters(&detections, 1, 640.0, &LateralBand::default()).unwrap();
        assert!((lateral - 0.3).abs() < 1e-9);
    }

    #[test]
    fn lateral_estimate_outside_band_uses_fallback() {
        // 120px from center, 440px from edge, 0.3m lateral => 1.1m, implausible.
        let detections = detections_with(1, 200.0, 0.3);
        let lateral =
            pixels_to_lateral_meters(&detections, 1, 640.0, &LateralBand::default()).unwrap();
        assert!((lateral - (0.32 + 0.3)).abs() < 1e-9);
    }

    #[test]
    fn lateral_estimate_at_frame_center_falls_back() {
        let detections = detections_with(1, 320.0, 0.05);
        let lateral =
            pixels_to_lateral_meters(&detections, 1, 640.0, &LateralBand::default()).unwrap();
        assert!((lateral - 0.37).abs() < 1e-9);
    }

    #[test]
    fn lateral_estimate_absent_without_record() {
        let detections = detections_with(4, 400.0, 0.1);
        assert_eq!(
            pixels_to_lateral_meters(&detections, 1, 640.0, &LateralBand::default()),
            None
        );
    }

    #[test]
    fn lateral_estimate_is_deterministic() {
        let band = LateralBand::default();
        for center in [10.0, 150.0, 319.0, 321.0, 500.0, 630.0] {
            let detections = detections_with(1, center, 0.12);
            let first = pixels_to_lateral_meters(&detections, 1, 640.0, &band);
            let second = pixels_to_lateral_meters(&detections, 1, 640.0, &band);
            assert_eq!(first, second);
            let value = first.unwrap();
            assert!(band.contains(value) || (value - (0.32 + 0.12)).abs() < 1e-12);
        }
    }

    #[test]
    fn heading_error_wraps() {
        assert_eq!(heading_error(90.0, 85.0), 5.0);
        assert_eq!(heading_error(-170.0, 170.0), 20.0);
        assert_eq!(heading_error(170.0, -170.0), -20.0);
        assert_eq!(heading_error(0.0, 180.0), 180.0);
    }

    #[test]
    fn per_axis_threshold() {
        let target = Point3::new(0.5, 0.1, 0.9);
        assert!(within_per_axis(&Point3::new(0.52, 0.08, 0.9), &target, 0.05));
        assert!(!within_per_axis(&Point3::new(0.5, 0.1, 0.96), &target, 0.05));
    }

    #[test]
    fn front_arc_ignores_side_returns() {
        let mut samples = vec![0.2; 360];
        for i in (0..10).chain(350..360) {
            samples[i] = 1.0;
        }
        samples[355] = 0.8;
        assert_eq!(front_arc_min(&samples, 10), Some(0.8));
        assert_eq!(front_arc_min(&[], 10), None);
    }

    #[test]
    fn planar_distance_to_waypoint() {
        let pose = Pose2D {
            x: 4.0,
            y: 4.5,
            heading: 0.0,
        };
        assert!((planar_distance(&pose, [1.0, 0.5]) - 5.0).abs() < 1e-12);
    }
}
