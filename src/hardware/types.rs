//! Value types exchanged with the hardware collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{Point3, Pose2D};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionUnit {
    Meters,
    Centimeters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AngleUnit {
    Degrees,
    Radians,
}

/// Units used for both requests and replies of a navigation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoseUnits {
    pub position: PositionUnit,
    pub angle: AngleUnit,
}

impl PositionUnit {
    fn per_meter(self) -> f64 {
        match self {
            PositionUnit::Meters => 1.0,
            PositionUnit::Centimeters => 100.0,
        }
    }
}

impl AngleUnit {
    fn per_degree(self) -> f64 {
        match self {
            AngleUnit::Degrees => 1.0,
            AngleUnit::Radians => std::f64::consts::PI / 180.0,
        }
    }
}

impl PoseUnits {
    pub const METERS_DEGREES: PoseUnits = PoseUnits {
        position: PositionUnit::Meters,
        angle: AngleUnit::Degrees,
    };

    /// Expresses a meters/degrees pose in these units.
    pub fn from_metric(self, pose: Pose2D) -> Pose2D {
        let (k, a) = (self.position.per_meter(), self.angle.per_degree());
        Pose2D {
            x: pose.x * k,
            y: pose.y * k,
            heading: pose.heading * a,
        }
    }

    /// Converts a pose in these units back to meters and degrees.
    pub fn to_metric(self, pose: Pose2D) -> Pose2D {
        let (k, a) = (self.position.per_meter(), self.angle.per_degree());
        Pose2D {
            x: pose.x / k,
            y: pose.y / k,
            heading: pose.heading / a,
        }
    }
}

/// End-effector pose reported by the arm.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ArmPose {
    pub position: Point3,
    /// Roll, pitch, yaw in degrees.
    pub orientation: [f64; 3],
}

/// Cartesian goal plus planning options for an arm move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmMotion {
    pub pose: ArmPose,
    pub planner: String,
    pub cartesian: bool,
    pub velocity_scaling: f64,
    pub acceleration_scaling: f64,
    pub wait: bool,
}

/// Joint-space goal, angles in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointTarget {
    pub names: Vec<String>,
    pub angles: Vec<f64>,
    pub velocity_scaling: f64,
    pub acceleration_scaling: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GripperAction {
    Open,
    Close,
}

impl std::fmt::Display for GripperAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GripperAction::Open => write!(f, "open"),
            GripperAction::Close => write!(f, "close"),
        }
    }
}

/// Progress of an arm trajectory, 0 to 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryProgress {
    pub percentage: f64,
}

/// Result of an arm trajectory. `error_code` 0 means the goal was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryDone {
    pub error_code: i32,
    pub message: String,
}

impl TrajectoryDone {
    pub fn succeeded(&self) -> bool {
        self.error_code == 0
    }
}

/// Marker-detection model parameters handed to the vision collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerModelParams {
    pub family: String,
    pub threads: u32,
    pub quad_decimate: f64,
    pub quad_sigma: f64,
    pub decode_sharpening: f64,
    pub refine_edges: u32,
    /// Physical marker edge length, meters.
    pub tag_size: f64,
}

/// Options for the per-frame detection hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCallbackOptions {
    /// Invoke the callback for frames without any detection too.
    pub call_without_detections: bool,
}

impl Default for FrameCallbackOptions {
    fn default() -> Self {
        Self {
            call_without_detections: true,
        }
    }
}

/// A filtered marker sighting reported by the tag hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSighting {
    pub tag_id: u32,
    pub family: String,
    pub seen_at: DateTime<Utc>,
}

/// Setup handed to the approach-to-marker collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproachParams {
    pub tag_size: f64,
    pub working_camera: String,
    pub angle_to_goal: f64,
    pub distance_to_goal: f64,
    pub linear_velocity: f64,
    pub max_x_error: f64,
    pub max_y_error: f64,
    pub max_angle_error: f64,
    pub min_correction_distance: f64,
}

/// Final report of the approach collaborator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApproachDone {
    pub succeeded: bool,
    #[serde(default)]
    pub info: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_units_convert_both_ways() {
        let units = PoseUnits {
            position: PositionUnit::Centimeters,
            angle: AngleUnit::Radians,
        };
        let pose = Pose2D {
            x: 1.0,
            y: -0.5,
            heading: 90.0,
        };
        let converted = units.from_metric(pose);
        assert_eq!(converted.x, 100.0);
        assert_eq!(converted.y, -50.0);
        assert!((converted.heading - std::f64::consts::FRAC_PI_2).abs() < 1e-12);

        let back = units.to_metric(converted);
        assert!((back.heading - 90.0).abs() < 1e-9);
        assert_eq!(PoseUnits::METERS_DEGREES.from_metric(pose), pose);
    }

    #[test]
    fn gripper_action_names() {
        assert_eq!(GripperAction::Open.to_string(), "open");
        assert_eq!(GripperAction::Close.to_string(), "close");
    }
}
