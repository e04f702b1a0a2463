use serde::Serialize;

use crate::config::TaskConfig;
use crate::geometry::Point3;
use crate::state_machine::{AttemptCounter, PhaseTimer};

/// Where the arm goal of a positioning attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseSource {
    /// Detected tag pose plus the tool offset.
    Dynamic,
    /// Fixed joint configuration.
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArmTarget {
    pub position: Point3,
    pub source: PoseSource,
}

impl ArmTarget {
    pub fn dynamic(position: Point3) -> Self {
        Self {
            position,
            source: PoseSource::Dynamic,
        }
    }

    pub fn fixed(position: Point3) -> Self {
        Self {
            position,
            source: PoseSource::Static,
        }
    }
}

/// Mutable state of one task execution. Counters start at zero for every run.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub target_tag_id: u32,
    pub navigation_attempts: AttemptCounter,
    pub approach_attempts: AttemptCounter,
    /// Failed placements; cleared whenever an inaccurate pose restarts positioning.
    pub arm_position_attempts: AttemptCounter,
    /// Inaccurate poses over the whole run.
    pub arm_accuracy_checks: AttemptCounter,
    pub approach_succeeded: bool,
    pub approach_angle_error_deg: f64,
    /// Linear residual the approach skill last reported, meters.
    pub approach_final_linear_m: Option<f64>,
    pub lateral_correction_m: Option<f64>,
    pub arm_target: Option<ArmTarget>,
    pub detection_timer: PhaseTimer,
}

impl TaskContext {
    pub fn new(target_tag_id: u32, config: &TaskConfig) -> Self {
        Self {
            target_tag_id,
            navigation_attempts: AttemptCounter::new(config.navigation.max_attempts),
            approach_attempts: AttemptCounter::new(config.approach.max_attempts),
            arm_position_attempts: AttemptCounter::new(config.arm.max_position_attempts),
            arm_accuracy_checks: AttemptCounter::new(config.arm.max_position_attempts),
            approach_succeeded: false,
            approach_angle_error_deg: 0.0,
            approach_final_linear_m: None,
            lateral_correction_m: None,
            arm_target: None,
            detection_timer: PhaseTimer::new(config.detection.no_target_timeout()),
        }
    }

    pub fn attempts(&self) -> AttemptSummary {
        AttemptSummary {
            navigation: self.navigation_attempts.count(),
            approach: self.approach_attempts.count(),
            arm_position: self.arm_position_attempts.count(),
            arm_accuracy: self.arm_accuracy_checks.count(),
        }
    }
}

/// Failed attempts per counter at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AttemptSummary {
    pub navigation: u32,
    pub approach: u32,
    pub arm_position: u32,
    pub arm_accuracy: u32,
}
