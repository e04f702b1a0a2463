//! In-process robot used by the `simulate` command and the scenario tests.
//!
//! Every hardware call completes instantly and is appended to a journal. The
//! marker detector runs a background task per registered callback, so
//! detections arrive asynchronously the way they do on the robot.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::detection::{DetectionRecord, PixelPoint, TagFilter};
use crate::error::HardwareError;
use crate::geometry::{Point3, Pose2D};
use crate::hardware::{
    ApproachDone, ApproachFeedback, ApproachFinished, ApproachParams, ApproachSkill, Arm,
    ArmMotion, ArmPose, FeedbackSink, FrameCallback, FrameCallbackOptions, GripperAction,
    JointTarget, MarkerDetector, MarkerModelParams, Motion, Navigation, PoseUnits, Ranging,
    TagCallback, TagSighting, TrajectoryCallbacks, TrajectoryDone, TrajectoryProgress, Vision,
};
use crate::task::Feedback;

/// Scan resolution of the simulated lidar, one sample per degree.
const SCAN_SAMPLES: usize = 360;
/// Samples on each side of straight ahead that see the cart face.
const CART_HALF_WIDTH: usize = 15;

/// Behavior of the simulated robot. The defaults produce a clean run.
#[derive(Debug, Clone)]
pub struct SimSettings {
    pub start_pose: Pose2D,
    /// Navigations that stop 1 m short of the goal before one lands.
    pub navigation_misses: u32,
    /// Heading error left by the approach skill, degrees.
    pub heading_drift_deg: f64,
    /// Distance beyond the stand-off the approach skill stops at.
    pub approach_residual: f64,
    /// Share of a commanded forward move that actually closes the gap to the cart.
    pub nudge_efficiency: f64,
    pub approach_error: bool,
    /// Range reported outside the cart face.
    pub side_range: f64,

    /// Target marker as it appears in every frame, if at all.
    pub target: Option<DetectionRecord>,
    /// Frames containing the target before it drops out of view.
    pub target_frames: Option<u32>,
    /// Other markers in view.
    pub distractors: Vec<DetectionRecord>,
    pub frame_interval: Duration,
    pub detector_error: bool,
    /// Status queries reporting motion after each linear move.
    pub moving_polls: u32,

    /// End-effector position at the static joint configuration.
    pub static_reference_position: Point3,
    /// Offset between commanded and reached cartesian goals.
    pub arm_drift: Point3,
    /// Cartesian moves affected by `arm_drift`.
    pub drifting_arm_moves: u32,
    pub joint_move_failures: u32,
    pub cartesian_error: bool,
    pub gripper_error: bool,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            start_pose: Pose2D::default(),
            navigation_misses: 0,
            heading_drift_deg: 0.0,
            approach_residual: 0.0,
            nudge_efficiency: 1.0,
            approach_error: false,
            side_range: 0.3,
            target: Some(DetectionRecord {
                tag_id: 1,
                center_px: PixelPoint { x: 400.0, y: 240.0 },
                pose_base_link: Point3::new(0.65, 0.1, 0.92),
                raw: json!({ "family": "tag36h11", "decision_margin": 61.2 }),
            }),
            target_frames: None,
            distractors: Vec::new(),
            frame_interval: Duration::from_millis(100),
            detector_error: false,
            moving_polls: 2,
            static_reference_position: Point3::new(0.45, -0.25, 0.95),
            arm_drift: Point3::default(),
            drifting_arm_moves: 0,
            joint_move_failures: 0,
            cartesian_error: false,
            gripper_error: false,
        }
    }
}

impl SimSettings {
    /// Convenience for tests that place the target marker differently.
    pub fn with_target(mut self, target: Option<DetectionRecord>) -> Self {
        self.target = target;
        self
    }
}

/// One hardware call, as issued by the task.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCall {
    SetActiveMap { name: String },
    NavigateTo { goal: Pose2D },
    Rotate { angle_deg: f64 },
    MoveLinear { distance: f64, velocity: f64, wait: bool },
    EnableDetector { camera: String },
    ConfigureApproach { distance_to_goal: f64 },
    StartApproach,
    FinalizeApproach,
    MoveToJointAngles { angles: Vec<f64> },
    MoveToPose { position: Point3 },
    MoveToNamedPose { name: String },
    Gripper { action: GripperAction },
}

#[derive(Debug)]
struct SimState {
    settings: SimSettings,
    pose: Pose2D,
    /// Gap between the robot front and the cart face.
    cart_range: f64,
    /// Rotation since the approach finished; the cart is ahead only at zero.
    turned_deg: f64,
    moving_polls_left: u32,
    navigations: u32,
    target_frames_seen: u32,
    end_effector: Point3,
    gripper_open: bool,
    drifting_moves_left: u32,
    joint_failures_left: u32,
    approach: Option<ApproachParams>,
    calls: Vec<SimCall>,
}

impl SimState {
    fn frame(&mut self) -> Vec<DetectionRecord> {
        let mut frame = self.settings.distractors.clone();
        if let Some(target) = self.settings.target.clone() {
            let in_view = self
                .settings
                .target_frames
                .is_none_or(|limit| self.target_frames_seen < limit);
            if in_view {
                self.target_frames_seen += 1;
                frame.push(target);
            }
        }
        frame
    }

    fn visible_ids(&self) -> Vec<u32> {
        let target = self.settings.target.iter().filter(|_| {
            self.settings
                .target_frames
                .is_none_or(|limit| self.target_frames_seen < limit)
        });
        self.settings
            .distractors
            .iter()
            .chain(target)
            .map(|record| record.tag_id)
            .collect()
    }
}

/// Simulated robot. Clones share state, so a test keeps one to inspect the journal.
#[derive(Debug, Clone)]
pub struct SimRobot {
    state: Arc<Mutex<SimState>>,
}

impl SimRobot {
    pub fn new(settings: SimSettings) -> Self {
        let state = SimState {
            pose: settings.start_pose,
            cart_range: 2.0,
            turned_deg: 0.0,
            moving_polls_left: 0,
            navigations: 0,
            target_frames_seen: 0,
            end_effector: Point3::default(),
            gripper_open: true,
            drifting_moves_left: settings.drifting_arm_moves,
            joint_failures_left: settings.joint_move_failures,
            approach: None,
            calls: Vec::new(),
            settings,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self, call: SimCall) -> MutexGuard<'_, SimState> {
        debug!(?call, "sim call");
        let mut state = self.lock();
        state.calls.push(call);
        state
    }

    /// Every call issued so far, oldest first.
    pub fn calls(&self) -> Vec<SimCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, matches: impl Fn(&SimCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| matches(call)).count()
    }

    pub fn pose(&self) -> Pose2D {
        self.lock().pose
    }

    pub fn end_effector(&self) -> Point3 {
        self.lock().end_effector
    }

    pub fn gripper_open(&self) -> bool {
        self.lock().gripper_open
    }
}

impl Default for SimRobot {
    fn default() -> Self {
        Self::new(SimSettings::default())
    }
}

impl Navigation for SimRobot {
    async fn navigate_to(
        &self,
        goal: Pose2D,
        units: PoseUnits,
        _wait: bool,
    ) -> Result<(), HardwareError> {
        let goal = units.to_metric(goal);
        let mut state = self.log(SimCall::NavigateTo { goal });
        state.navigations += 1;
        let miss = if state.navigations <= state.settings.navigation_misses {
            1.0
        } else {
            0.0
        };
        state.pose = Pose2D {
            x: goal.x - miss,
            ..goal
        };
        Ok(())
    }

    async fn current_pose(&self, units: PoseUnits) -> Result<Pose2D, HardwareError> {
        Ok(units.from_metric(self.lock().pose))
    }

    async fn set_active_map(
        &self,
        name: &str,
        _wait_localization: bool,
    ) -> Result<(), HardwareError> {
        self.log(SimCall::SetActiveMap {
            name: name.to_string(),
        });
        Ok(())
    }
}

impl Motion for SimRobot {
    async fn rotate(
        &self,
        angle_deg: f64,
        _angular_speed: f64,
        _wait: bool,
    ) -> Result<(), HardwareError> {
        let mut state = self.log(SimCall::Rotate { angle_deg });
        state.pose.heading += angle_deg;
        state.turned_deg += angle_deg;
        Ok(())
    }

    async fn move_linear(
        &self,
        distance: f64,
        velocity: f64,
        wait: bool,
        _obstacle_avoidance: bool,
    ) -> Result<(), HardwareError> {
        let mut state = self.log(SimCall::MoveLinear {
            distance,
            velocity,
            wait,
        });
        if state.turned_deg.abs() < 1e-9 {
            let closed = distance.copysign(velocity) * state.settings.nudge_efficiency;
            state.cart_range -= closed;
        }
        state.moving_polls_left = state.settings.moving_polls;
        Ok(())
    }

    async fn is_moving(&self) -> Result<bool, HardwareError> {
        let mut state = self.lock();
        if state.moving_polls_left > 0 {
            state.moving_polls_left -= 1;
            return Ok(true);
        }
        Ok(false)
    }
}

impl Ranging for SimRobot {
    async fn range_samples(&self) -> Result<Vec<f64>, HardwareError> {
        let state = self.lock();
        let samples = (0..SCAN_SAMPLES)
            .map(|i| {
                if i < CART_HALF_WIDTH || i >= SCAN_SAMPLES - CART_HALF_WIDTH {
                    state.cart_range
                } else {
                    state.settings.side_range
                }
            })
            .collect();
        Ok(samples)
    }
}

impl ApproachSkill for SimRobot {
    async fn configure_approach(&self, params: &ApproachParams) -> Result<(), HardwareError> {
        let mut state = self.log(SimCall::ConfigureApproach {
            distance_to_goal: params.distance_to_goal,
        });
        state.approach = Some(params.clone());
        Ok(())
    }

    async fn start_approach(
        &self,
        on_feedback: ApproachFeedback,
        on_done: ApproachFinished,
    ) -> Result<(), HardwareError> {
        let (outcome, residual) = {
            let mut state = self.log(SimCall::StartApproach);
            let Some(params) = state.approach.clone() else {
                return Err(HardwareError::Approach("approach not configured".into()));
            };
            let residual = state.settings.approach_residual;
            if state.settings.approach_error {
                (None, residual)
            } else {
                state.cart_range = params.distance_to_goal + residual;
                state.turned_deg = 0.0;
                state.pose.heading = params.angle_to_goal + state.settings.heading_drift_deg;
                (Some(state.cart_range), residual)
            }
        };

        on_feedback(&json!({ "phase": "servoing", "final_linear": residual }));
        if let Some(range) = outcome {
            on_done(&ApproachDone {
                succeeded: true,
                info: json!({ "range": range }),
            });
        }
        Ok(())
    }

    async fn await_approach(&self) -> Result<ApproachDone, HardwareError> {
        let state = self.lock();
        if state.settings.approach_error {
            return Err(HardwareError::Approach("marker lost during servoing".into()));
        }
        Ok(ApproachDone {
            succeeded: true,
            info: json!({ "range": state.cart_range }),
        })
    }

    async fn finalize_approach(&self) -> Result<(), HardwareError> {
        let mut state = self.log(SimCall::FinalizeApproach);
        state.approach = None;
        Ok(())
    }
}

impl Arm for SimRobot {
    async fn move_to_pose(
        &self,
        _arm: &str,
        motion: &ArmMotion,
        callbacks: TrajectoryCallbacks,
    ) -> Result<(), HardwareError> {
        let result = {
            let mut state = self.log(SimCall::MoveToPose {
                position: motion.pose.position,
            });
            if state.settings.cartesian_error {
                Err(HardwareError::Arm("no cartesian path found".into()))
            } else {
                let mut reached = motion.pose.position;
                if state.drifting_moves_left > 0 {
                    state.drifting_moves_left -= 1;
                    reached = reached.offset(state.settings.arm_drift.to_array());
                }
                state.end_effector = reached;
                Ok(())
            }
        };
        report_trajectory(&callbacks, &result);
        result
    }

    async fn move_to_named_pose(
        &self,
        _arm: &str,
        name: &str,
        _wait: bool,
        callbacks: TrajectoryCallbacks,
    ) -> Result<(), HardwareError> {
        {
            let mut state = self.log(SimCall::MoveToNamedPose {
                name: name.to_string(),
            });
            state.end_effector = Point3::default();
        }
        report_trajectory(&callbacks, &Ok(()));
        Ok(())
    }

    async fn move_to_joint_angles(
        &self,
        _arm: &str,
        target: &JointTarget,
        _wait: bool,
    ) -> Result<(), HardwareError> {
        let mut state = self.log(SimCall::MoveToJointAngles {
            angles: target.angles.clone(),
        });
        if state.joint_failures_left > 0 {
            state.joint_failures_left -= 1;
            return Err(HardwareError::Arm("joint goal rejected".into()));
        }
        state.end_effector = state.settings.static_reference_position;
        Ok(())
    }

    async fn end_effector_pose(&self, _arm: &str) -> Result<ArmPose, HardwareError> {
        Ok(ArmPose {
            position: self.lock().end_effector,
            orientation: [0.0; 3],
        })
    }

    async fn gripper_command(
        &self,
        _arm: &str,
        action: GripperAction,
        _wait: bool,
    ) -> Result<(), HardwareError> {
        let mut state = self.log(SimCall::Gripper { action });
        if state.settings.gripper_error {
            return Err(HardwareError::Arm("gripper not responding".into()));
        }
        state.gripper_open = action == GripperAction::Open;
        Ok(())
    }
}

/// Reports a completed move the way a trajectory server would. Failures get no progress.
fn report_trajectory(callbacks: &TrajectoryCallbacks, result: &Result<(), HardwareError>) {
    let done = match result {
        Ok(()) => {
            for percentage in [50.0, 100.0] {
                (callbacks.on_feedback)(&TrajectoryProgress { percentage });
            }
            TrajectoryDone {
                error_code: 0,
                message: String::new(),
            }
        }
        Err(e) => TrajectoryDone {
            error_code: -1,
            message: e.to_string(),
        },
    };
    (callbacks.on_finish)(&done);
}

impl Vision for SimRobot {
    type Detector = SimDetector;

    async fn enable_marker_detector(
        &self,
        camera: &str,
        _params: &MarkerModelParams,
    ) -> Result<SimDetector, HardwareError> {
        let state = self.log(SimCall::EnableDetector {
            camera: camera.to_string(),
        });
        if state.settings.detector_error {
            return Err(HardwareError::Vision(format!("camera {camera} unavailable")));
        }
        Ok(SimDetector {
            robot: self.clone(),
            frame_interval: state.settings.frame_interval,
            tasks: Vec::new(),
        })
    }
}

/// Detector handle; its background tasks stop when it is dropped.
#[derive(Debug)]
pub struct SimDetector {
    robot: SimRobot,
    frame_interval: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl MarkerDetector for SimDetector {
    async fn register_tag_callback(
        &mut self,
        filter: &TagFilter,
        callback: TagCallback,
    ) -> Result<(), HardwareError> {
        let wanted: Vec<(String, u32)> = filter
            .iter()
            .flat_map(|(family, ids)| ids.iter().map(move |id| (family.clone(), *id)))
            .collect();
        let robot = self.robot.clone();
        let mut ticker = interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.tasks.push(tokio::spawn(async move {
            let mut reported = HashSet::new();
            loop {
                ticker.tick().await;
                let visible = robot.lock().visible_ids();
                for (family, id) in &wanted {
                    if visible.contains(id) && reported.insert(*id) {
                        callback(&TagSighting {
                            tag_id: *id,
                            family: family.clone(),
                            seen_at: Utc::now(),
                        });
                    }
                }
            }
        }));
        Ok(())
    }

    async fn register_frame_callback(
        &mut self,
        callback: FrameCallback,
        options: FrameCallbackOptions,
    ) -> Result<(), HardwareError> {
        let robot = self.robot.clone();
        let mut ticker = interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.tasks.push(tokio::spawn(async move {
            loop {
                ticker.tick().await;
                let frame = robot.lock().frame();
                if frame.is_empty() && !options.call_without_detections {
                    continue;
                }
                callback(frame.as_slice());
            }
        }));
        Ok(())
    }
}

impl Drop for SimDetector {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Feedback sink that keeps every message, for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingFeedback {
    events: Arc<Mutex<Vec<Feedback>>>,
}

impl RecordingFeedback {
    pub fn events(&self) -> Vec<Feedback> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FeedbackSink for RecordingFeedback {
    fn emit(&self, feedback: Feedback) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(feedback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectionBoard;

    #[tokio::test]
    async fn forward_moves_close_the_gap_only_when_facing_the_cart() {
        let robot = SimRobot::default();
        robot
            .configure_approach(&ApproachParams {
                tag_size: 0.06,
                working_camera: "nav_bottom".into(),
                angle_to_goal: 90.0,
                distance_to_goal: 0.75,
                linear_velocity: 0.06,
                max_x_error: 0.03,
                max_y_error: 0.02,
                max_angle_error: 3.0,
                min_correction_distance: 0.1,
            })
            .await
            .unwrap();
        robot
            .start_approach(Arc::new(|_: &serde_json::Value| {}), Arc::new(|_: &ApproachDone| {}))
            .await
            .unwrap();
        assert_eq!(robot.range_samples().await.unwrap()[0], 0.75);

        robot.move_linear(0.1, 0.05, true, true).await.unwrap();
        assert!((robot.range_samples().await.unwrap()[0] - 0.65).abs() < 1e-9);

        robot.rotate(90.0, 15.0, true).await.unwrap();
        robot.move_linear(0.3, 0.05, true, true).await.unwrap();
        let samples = robot.range_samples().await.unwrap();
        assert!((samples[SCAN_SAMPLES - 1] - 0.65).abs() < 1e-9);
        assert_eq!(samples[180], 0.3);
    }

    #[tokio::test]
    async fn motion_reports_busy_after_moves() {
        let robot = SimRobot::default();
        robot.move_linear(0.1, 0.05, true, true).await.unwrap();
        assert!(robot.is_moving().await.unwrap());
        assert!(robot.is_moving().await.unwrap());
        assert!(!robot.is_moving().await.unwrap());
    }

    #[tokio::test]
    async fn joint_failures_are_consumed_in_order() {
        let robot = SimRobot::new(SimSettings {
            joint_move_failures: 1,
            ..Default::default()
        });
        let target = JointTarget {
            names: vec!["j1".into()],
            angles: vec![0.0],
            velocity_scaling: 0.4,
            acceleration_scaling: 0.4,
        };
        assert!(robot.move_to_joint_angles("right_arm", &target, true).await.is_err());
        robot.move_to_joint_angles("right_arm", &target, true).await.unwrap();
        assert_eq!(robot.end_effector(), Point3::new(0.45, -0.25, 0.95));
    }

    #[tokio::test(start_paused = true)]
    async fn detector_feeds_board_until_target_leaves_view() {
        let robot = SimRobot::new(SimSettings {
            target_frames: Some(2),
            ..Default::default()
        });
        let board = DetectionBoard::new(1);
        let mut detector = robot
            .enable_marker_detector("nav_bottom", &crate::config::DetectionTuning::default().model_params(0.06))
            .await
            .unwrap();
        detector
            .register_frame_callback(board.frame_callback(), FrameCallbackOptions::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(board.take_detected());
        board.reset();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!board.take_detected());

        drop(detector);
        assert_eq!(robot.lock().target_frames_seen, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tag_callback_reports_only_filtered_ids_once() {
        let mut distractor = SimSettings::default().target.unwrap();
        distractor.tag_id = 43;
        let robot = SimRobot::new(SimSettings {
            distractors: vec![distractor],
            ..Default::default()
        });
        let mut detector = robot
            .enable_marker_detector("nav_bottom", &crate::config::DetectionTuning::default().model_params(0.06))
            .await
            .unwrap();

        let sightings = Arc::new(Mutex::new(Vec::new()));
        let seen = sightings.clone();
        let filter = crate::detection::parse_tag_families(&["tag36h11.1", "tag36h11.7"]).unwrap();
        detector
            .register_tag_callback(
                &filter,
                Arc::new(move |sighting: &TagSighting| seen.lock().unwrap().push(sighting.clone())),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(550)).await;
        drop(detector);

        let sightings = sightings.lock().unwrap();
        assert_eq!(sightings.len(), 1, "{sightings:?}");
        assert_eq!(sightings[0].tag_id, 1);
        assert_eq!(sightings[0].family, "tag36h11");
    }

    #[tokio::test]
    async fn navigation_honors_requested_units() {
        let robot = SimRobot::default();
        let units = PoseUnits {
            position: crate::hardware::PositionUnit::Centimeters,
            angle: crate::hardware::AngleUnit::Radians,
        };
        let goal = Pose2D {
            x: 100.0,
            y: 50.0,
            heading: std::f64::consts::PI,
        };
        robot.navigate_to(goal, units, true).await.unwrap();

        let metric = robot.pose();
        assert!((metric.x - 1.0).abs() < 1e-9);
        assert!((metric.y - 0.5).abs() < 1e-9);
        assert!((metric.heading - 180.0).abs() < 1e-9);

        let reported = robot.current_pose(units).await.unwrap();
        assert!((reported.x - 100.0).abs() < 1e-9);
        assert!((reported.heading - std::f64::consts::PI).abs() < 1e-9);
    }

    #[tokio::test]
    async fn gripper_follows_commands() {
        let robot = SimRobot::default();
        assert!(robot.gripper_open());
        robot
            .gripper_command("right_arm", GripperAction::Close, true)
            .await
            .unwrap();
        assert!(!robot.gripper_open());
        robot
            .gripper_command("right_arm", GripperAction::Open, true)
            .await
            .unwrap();
        assert!(robot.gripper_open());
    }

    type Recorded<T> = Arc<Mutex<Vec<T>>>;

    fn recording_callbacks() -> (TrajectoryCallbacks, Recorded<f64>, Recorded<TrajectoryDone>) {
        let progress = Arc::new(Mutex::new(Vec::new()));
        let finished = Arc::new(Mutex::new(Vec::new()));
        let (p, f) = (progress.clone(), finished.clone());
        let callbacks = TrajectoryCallbacks {
            on_feedback: Arc::new(move |update: &TrajectoryProgress| {
                p.lock().unwrap().push(update.percentage)
            }),
            on_finish: Arc::new(move |done: &TrajectoryDone| f.lock().unwrap().push(done.clone())),
        };
        (callbacks, progress, finished)
    }

    fn motion_to(position: Point3) -> ArmMotion {
        ArmMotion {
            pose: ArmPose {
                position,
                orientation: [0.0; 3],
            },
            planner: "LIN".into(),
            cartesian: true,
            velocity_scaling: 0.1,
            acceleration_scaling: 0.1,
            wait: true,
        }
    }

    #[tokio::test]
    async fn arm_moves_report_trajectory_progress_and_result() {
        let robot = SimRobot::default();
        let (callbacks, progress, finished) = recording_callbacks();
        robot
            .move_to_pose("right_arm", &motion_to(Point3::new(0.5, 0.0, 1.0)), callbacks)
            .await
            .unwrap();
        assert_eq!(*progress.lock().unwrap(), vec![50.0, 100.0]);
        assert!(finished.lock().unwrap()[0].succeeded());

        let robot = SimRobot::new(SimSettings {
            cartesian_error: true,
            ..Default::default()
        });
        let (callbacks, progress, finished) = recording_callbacks();
        assert!(
            robot
                .move_to_pose("right_arm", &motion_to(Point3::new(0.5, 0.0, 1.0)), callbacks)
                .await
                .is_err()
        );
        assert!(progress.lock().unwrap().is_empty());
        let done = finished.lock().unwrap()[0].clone();
        assert!(!done.succeeded());
        assert!(done.message.contains("cartesian"));
    }

    #[test]
    fn recording_feedback_keeps_order() {
        let sink = RecordingFeedback::default();
        sink.emit(Feedback::Completed { item: "towel".into() });
        sink.emit(Feedback::Aborted {
            code: 3,
            message: "tag 4 not found".into(),
        });
        assert_eq!(sink.events().len(), 2);
        assert!(matches!(sink.events()[0], Feedback::Completed { .. }));
    }
}
