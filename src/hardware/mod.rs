//! Interfaces to the robot's collaborators.
//!
//! Implementations live outside this crate (or in [`crate::sim`]). The task
//! graph owns one value implementing [`Robot`] and one [`FeedbackSink`]; no
//! global controller registry is involved.

mod types;

use std::sync::Arc;

pub use types::{
    AngleUnit, ApproachDone, ApproachParams, ArmMotion, ArmPose, FrameCallbackOptions,
    GripperAction, JointTarget, MarkerModelParams, PoseUnits, PositionUnit, TagSighting,
    TrajectoryDone, TrajectoryProgress,
};

use crate::detection::{DetectionRecord, TagFilter};
use crate::error::HardwareError;
use crate::geometry::Pose2D;
use crate::task::Feedback;

/// Called for every filtered marker sighting.
pub type TagCallback = Arc<dyn Fn(&TagSighting) + Send + Sync>;

/// Called for every camera frame with the full detection set.
pub type FrameCallback = Arc<dyn Fn(&[DetectionRecord]) + Send + Sync>;

/// Progress reports from the approach collaborator.
pub type ApproachFeedback = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Completion report from the approach collaborator.
pub type ApproachFinished = Arc<dyn Fn(&ApproachDone) + Send + Sync>;

/// Hooks an arm collaborator calls while a trajectory executes.
#[derive(Clone)]
pub struct TrajectoryCallbacks {
    pub on_feedback: Arc<dyn Fn(&TrajectoryProgress) + Send + Sync>,
    pub on_finish: Arc<dyn Fn(&TrajectoryDone) + Send + Sync>,
}

pub trait Navigation {
    async fn navigate_to(
        &self,
        goal: Pose2D,
        units: PoseUnits,
        wait: bool,
    ) -> Result<(), HardwareError>;

    async fn current_pose(&self, units: PoseUnits) -> Result<Pose2D, HardwareError>;

    async fn set_active_map(
        &self,
        name: &str,
        wait_localization: bool,
    ) -> Result<(), HardwareError>;
}

/// Differential-drive motion primitives. Angles in degrees, distances in meters.
pub trait Motion {
    async fn rotate(
        &self,
        angle_deg: f64,
        angular_speed: f64,
        wait: bool,
    ) -> Result<(), HardwareError>;

    /// Negative `velocity` drives backwards.
    async fn move_linear(
        &self,
        distance: f64,
        velocity: f64,
        wait: bool,
        obstacle_avoidance: bool,
    ) -> Result<(), HardwareError>;

    async fn is_moving(&self) -> Result<bool, HardwareError>;
}

/// Handle to an enabled marker-detection model.
pub trait MarkerDetector {
    async fn register_tag_callback(
        &mut self,
        filter: &TagFilter,
        callback: TagCallback,
    ) -> Result<(), HardwareError>;

    async fn register_frame_callback(
        &mut self,
        callback: FrameCallback,
        options: FrameCallbackOptions,
    ) -> Result<(), HardwareError>;
}

pub trait Vision {
    type Detector: MarkerDetector;

    async fn enable_marker_detector(
        &self,
        camera: &str,
        params: &MarkerModelParams,
    ) -> Result<Self::Detector, HardwareError>;
}

pub trait Arm {
    async fn move_to_pose(
        &self,
        arm: &str,
        motion: &ArmMotion,
        callbacks: TrajectoryCallbacks,
    ) -> Result<(), HardwareError>;

    async fn move_to_named_pose(
        &self,
        arm: &str,
        name: &str,
        wait: bool,
        callbacks: TrajectoryCallbacks,
    ) -> Result<(), HardwareError>;

    async fn move_to_joint_angles(
        &self,
        arm: &str,
        target: &JointTarget,
        wait: bool,
    ) -> Result<(), HardwareError>;

    async fn end_effector_pose(&self, arm: &str) -> Result<ArmPose, HardwareError>;

    async fn gripper_command(
        &self,
        arm: &str,
        action: GripperAction,
        wait: bool,
    ) -> Result<(), HardwareError>;
}

pub trait Ranging {
    /// One full scan, ordered by bearing starting straight ahead.
    async fn range_samples(&self) -> Result<Vec<f64>, HardwareError>;
}

/// The external approach-to-marker visual-servoing skill.
pub trait ApproachSkill {
    async fn configure_approach(&self, params: &ApproachParams) -> Result<(), HardwareError>;

    async fn start_approach(
        &self,
        on_feedback: ApproachFeedback,
        on_done: ApproachFinished,
    ) -> Result<(), HardwareError>;

    async fn await_approach(&self) -> Result<ApproachDone, HardwareError>;

    async fn finalize_approach(&self) -> Result<(), HardwareError>;
}

/// Everything the task graph drives.
pub trait Robot: Navigation + Motion + Vision + Arm + Ranging + ApproachSkill {}

impl<T> Robot for T where T: Navigation + Motion + Vision + Arm + Ranging + ApproachSkill {}

/// User-visible progress reporting. Fire and forget.
pub trait FeedbackSink {
    fn emit(&self, feedback: Feedback);
}
