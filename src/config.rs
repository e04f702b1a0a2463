//! Task configuration loaded from TOML.
//!
//! [`TaskConfig`] holds the setup arguments of a picking task plus every
//! tuning constant. Only the camera, map, item and marker size are required;
//! everything else falls back to the values used on the robot.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::SetupError;
use crate::geometry::LateralBand;
use crate::hardware::MarkerModelParams;

/// Item names the task knows how to find, with the id of the tag marking them.
pub const ITEM_CATALOG: &[(&str, u32)] = &[("water bottle", 1), ("pajamas", 3), ("towel", 4)];

/// Looks up the tag id marking `item_name`.
pub fn tag_for_item(item_name: &str) -> Result<u32, SetupError> {
    ITEM_CATALOG
        .iter()
        .find(|(name, _)| *name == item_name)
        .map(|(_, tag)| *tag)
        .ok_or_else(|| SetupError::UnknownItem(item_name.to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub working_camera: String,
    pub map_name: String,
    pub item_name: String,
    /// Physical marker edge length, meters.
    pub tag_size: f64,

    #[serde(default = "default_arm_name")]
    pub arm_name: String,

    /// `family.id` entries the tag callback listens for.
    #[serde(default = "default_tag_families")]
    pub tag_families: Vec<String>,

    /// Start in the bench-test state instead of navigating to the cart.
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub navigation: NavigationTuning,
    #[serde(default)]
    pub approach: ApproachTuning,
    #[serde(default)]
    pub detection: DetectionTuning,
    #[serde(default)]
    pub sideways: SidewaysTuning,
    #[serde(default)]
    pub arm: ArmTuning,
    #[serde(default)]
    pub engine: EngineTuning,
}

fn default_arm_name() -> String {
    "right_arm".to_string()
}

fn default_tag_families() -> Vec<String> {
    vec!["tag36h11.43".to_string(), "tag36h11.1".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationTuning {
    /// Map coordinates of the spot in front of the cart, meters.
    pub cart_waypoint: [f64; 2],
    pub success_radius: f64,
    pub max_attempts: u32,
}

impl Default for NavigationTuning {
    fn default() -> Self {
        Self {
            cart_waypoint: [1.0, 0.5],
            success_radius: 0.3,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApproachTuning {
    pub max_attempts: u32,
    pub linear_velocity: f64,
    pub max_x_error: f64,
    pub max_y_error: f64,
    pub max_angle_error: f64,
    pub min_correction_distance: f64,
    /// Accepted excess over the stand-off distance, meters.
    pub range_tolerance: f64,
    /// Samples taken from each end of the scan to form the forward arc.
    pub front_arc_samples: usize,
    pub nudge_velocity: f64,
}

impl Default for ApproachTuning {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            linear_velocity: 0.06,
            max_x_error: 0.03,
            max_y_error: 0.02,
            max_angle_error: 3.0,
            min_correction_distance: 0.1,
            range_tolerance: 0.1,
            front_arc_samples: 10,
            nudge_velocity: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionTuning {
    pub no_target_timeout_secs: f64,
    /// Pause before each detection check.
    pub settle_secs: f64,
    pub camera_width_px: f64,
    pub lateral_band: [f64; 2],
    pub fallback_offset: f64,
    /// Backward creep used to vary the viewpoint while searching.
    pub creep_distance: f64,
    pub creep_velocity: f64,
    pub heading_correction_speed: f64,
    pub family: String,
    pub threads: u32,
    pub quad_decimate: f64,
    pub quad_sigma: f64,
    pub decode_sharpening: f64,
    pub refine_edges: u32,
}

impl Default for DetectionTuning {
    fn default() -> Self {
        Self {
            no_target_timeout_secs: 30.0,
            settle_secs: 1.5,
            camera_width_px: 640.0,
            lateral_band: [0.275, 0.4],
            fallback_offset: 0.32,
            creep_distance: 0.07,
            creep_velocity: -0.05,
            heading_correction_speed: 10.0,
            family: "tag36h11".to_string(),
            threads: 4,
            quad_decimate: 2.0,
            quad_sigma: 0.0,
            decode_sharpening: 0.25,
            refine_edges: 1,
        }
    }
}

impl DetectionTuning {
    pub fn no_target_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.no_target_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs_f64(self.settle_secs)
    }

    pub fn band(&self) -> LateralBand {
        LateralBand {
            min: self.lateral_band[0],
            max: self.lateral_band[1],
            fallback_offset: self.fallback_offset,
        }
    }

    pub fn model_params(&self, tag_size: f64) -> MarkerModelParams {
        MarkerModelParams {
            family: self.family.clone(),
            threads: self.threads,
            quad_decimate: self.quad_decimate,
            quad_sigma: self.quad_sigma,
            decode_sharpening: self.decode_sharpening,
            refine_edges: self.refine_edges,
            tag_size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidewaysTuning {
    pub settle_secs: f64,
    pub angular_speed: f64,
    pub linear_velocity: f64,
}

impl Default for SidewaysTuning {
    fn default() -> Self {
        Self {
            settle_secs: 1.5,
            angular_speed: 15.0,
            linear_velocity: 0.05,
        }
    }
}

impl SidewaysTuning {
    pub fn settle(&self) -> Duration {
        Duration::from_secs_f64(self.settle_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmTuning {
    pub max_position_attempts: u32,
    /// Per-axis tolerance on the end-effector position, meters.
    pub error_threshold: f64,
    /// Added to the detected tag position to get the dynamic arm goal.
    pub tool_offset: [f64; 3],
    pub joint_names: Vec<String>,
    /// Static reference configuration, radians.
    pub reference_joint_angles: Vec<f64>,
    pub planner: String,
    pub velocity_scaling: f64,
    pub acceleration_scaling: f64,
    pub joint_velocity_scaling: f64,
    pub home_pose: String,
    pub gripper_settle_secs: f64,
}

impl Default for ArmTuning {
    fn default() -> Self {
        Self {
            max_position_attempts: 3,
            error_threshold: 0.05,
            tool_offset: [-0.1, 0.0, 0.08],
            joint_names: [
                "arm_shoulder_pitch",
                "arm_shoulder_roll",
                "arm_shoulder_yaw",
                "arm_elbow_pitch",
                "arm_wrist_yaw",
                "arm_wrist_pitch",
                "arm_wrist_roll",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            reference_joint_angles: vec![0.0, -0.22, 0.0, -1.92, 0.0, 0.38, 0.0],
            planner: "RRTconnect".to_string(),
            velocity_scaling: 0.1,
            acceleration_scaling: 0.1,
            joint_velocity_scaling: 0.4,
            home_pose: "home".to_string(),
            gripper_settle_secs: 2.0,
        }
    }
}

impl ArmTuning {
    pub fn gripper_settle(&self) -> Duration {
        Duration::from_secs_f64(self.gripper_settle_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    pub poll_interval_ms: u64,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
        }
    }
}

impl EngineTuning {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Per-execution goal of the task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecuteArgs {
    /// Heading the robot should face the cart with, degrees.
    pub angle_to_goal: f64,
    /// Desired stand-off distance from the cart, meters.
    #[serde(default = "default_distance_to_goal")]
    pub distance_to_goal: f64,
}

fn default_distance_to_goal() -> f64 {
    0.75
}

impl ExecuteArgs {
    pub fn new(angle_to_goal: f64) -> Self {
        Self {
            angle_to_goal,
            distance_to_goal: default_distance_to_goal(),
        }
    }
}

impl TaskConfig {
    /// Minimal configuration with all tuning at defaults.
    pub fn new(
        working_camera: impl Into<String>,
        map_name: impl Into<String>,
        item_name: impl Into<String>,
        tag_size: f64,
    ) -> Self {
        Self {
            working_camera: working_camera.into(),
            map_name: map_name.into(),
            item_name: item_name.into(),
            tag_size,
            arm_name: default_arm_name(),
            tag_families: default_tag_families(),
            debug: false,
            navigation: NavigationTuning::default(),
            approach: ApproachTuning::default(),
            detection: DetectionTuning::default(),
            sideways: SidewaysTuning::default(),
            arm: ArmTuning::default(),
            engine: EngineTuning::default(),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse task configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Checks everything setup relies on. Unknown items fail here too.
    pub fn validate(&self) -> Result<(), SetupError> {
        tag_for_item(&self.item_name)?;

        let invalid = |msg: &str| Err(SetupError::InvalidConfig(msg.to_string()));
        if !is_positive(self.tag_size) {
            return invalid("tag_size must be positive");
        }
        if self.navigation.max_attempts == 0
            || self.approach.max_attempts == 0
            || self.arm.max_position_attempts == 0
        {
            return invalid("attempt maxima must be at least 1");
        }
        if self.approach.front_arc_samples == 0 {
            return invalid("front_arc_samples must be at least 1");
        }
        let [min, max] = self.detection.lateral_band;
        if !(min.is_finite() && max.is_finite() && min < max) {
            return invalid("lateral_band must be [min, max] with min < max");
        }
        if !is_positive(self.detection.camera_width_px) {
            return invalid("camera_width_px must be positive");
        }
        if !is_positive(self.detection.no_target_timeout_secs) {
            return invalid("no_target_timeout_secs must be positive");
        }
        // Every `*_secs` value ends up in a `Duration`.
        let pauses = [
            ("detection.no_target_timeout_secs", self.detection.no_target_timeout_secs),
            ("detection.settle_secs", self.detection.settle_secs),
            ("sideways.settle_secs", self.sideways.settle_secs),
            ("arm.gripper_settle_secs", self.arm.gripper_settle_secs),
        ];
        for (name, secs) in pauses {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(SetupError::InvalidConfig(format!(
                    "{name} must be a finite, non-negative number of seconds, got {secs}"
                )));
            }
        }
        if self.arm.joint_names.len() != self.arm.reference_joint_angles.len() {
            return invalid("reference_joint_angles must match joint_names");
        }
        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
