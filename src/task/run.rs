use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::Feedback;
use super::context::TaskContext;
use super::state::TaskState;
use crate::config::{ExecuteArgs, TaskConfig};
use crate::detection::{DetectionBoard, TagFilter};
use crate::error::{HardwareError, TaskError};
use crate::geometry::{self, Pose2D};
use crate::hardware::{
    ApproachDone, ApproachFeedback, ApproachFinished, ApproachParams, FeedbackSink,
    FrameCallbackOptions, MarkerDetector, MarkerModelParams, PoseUnits, Robot, TagCallback,
    TagSighting,
};
use crate::state_machine::{AttemptVerdict, StateLogic, Transition};

type Step = Transition<TaskState, TaskError>;

/// One execution of the task graph. Borrows the graph's handles, owns the context.
pub(super) struct TaskRun<'a, R: Robot, F> {
    pub(super) config: &'a TaskConfig,
    tag_filter: &'a TagFilter,
    pub(super) robot: &'a R,
    feedback: &'a F,
    goal: ExecuteArgs,
    pub(super) ctx: TaskContext,
    pub(super) board: DetectionBoard,
    detector: Option<R::Detector>,
}

impl<'a, R: Robot, F: FeedbackSink> TaskRun<'a, R, F> {
    pub(super) fn new(
        config: &'a TaskConfig,
        tag_filter: &'a TagFilter,
        robot: &'a R,
        feedback: &'a F,
        target_tag_id: u32,
        goal: ExecuteArgs,
    ) -> Self {
        Self {
            config,
            tag_filter,
            robot,
            feedback,
            goal,
            ctx: TaskContext::new(target_tag_id, config),
            board: DetectionBoard::new(target_tag_id),
            detector: None,
        }
    }

    pub(super) fn context(&self) -> &TaskContext {
        &self.ctx
    }

    // NAVIGATING_TO_CART

    async fn navigate_to_cart(&mut self) {
        let [x, y] = self.config.navigation.cart_waypoint;
        let goal = Pose2D {
            x,
            y,
            heading: self.goal.angle_to_goal,
        };
        info!(
            x,
            y,
            heading = goal.heading,
            attempt = self.ctx.navigation_attempts.count() + 1,
            "navigating to cart"
        );
        if let Err(e) = self
            .robot
            .navigate_to(goal, PoseUnits::METERS_DEGREES, true)
            .await
        {
            warn!(error = %e, "navigation command failed");
        }
    }

    async fn check_navigation(&mut self) -> Step {
        let tuning = &self.config.navigation;
        let reached = match self.robot.current_pose(PoseUnits::METERS_DEGREES).await {
            Ok(pose) => {
                let distance = geometry::planar_distance(&pose, tuning.cart_waypoint);
                debug!(distance, radius = tuning.success_radius, "distance to cart waypoint");
                distance <= tuning.success_radius
            }
            Err(e) => {
                warn!(error = %e, "couldn't read robot pose");
                false
            }
        };
        if reached {
            return Transition::Next(TaskState::ApproachingCart);
        }

        match self.ctx.navigation_attempts.record_failure() {
            AttemptVerdict::Exhausted { attempts } => {
                Transition::Abort(TaskError::CouldNotReachDestination { attempts })
            }
            AttemptVerdict::Retry { attempt, max } => {
                warn!(attempt, max, "cart waypoint not reached");
                Transition::Retry
            }
        }
    }

    // APPROACHING_CART

    async fn approach_cart(&mut self) {
        self.ctx.approach_succeeded = false;
        let tuning = &self.config.approach;
        let params = ApproachParams {
            tag_size: self.config.tag_size,
            working_camera: self.config.working_camera.clone(),
            angle_to_goal: self.goal.angle_to_goal,
            distance_to_goal: self.goal.distance_to_goal,
            linear_velocity: tuning.linear_velocity,
            max_x_error: tuning.max_x_error,
            max_y_error: tuning.max_y_error,
            max_angle_error: tuning.max_angle_error,
            min_correction_distance: tuning.min_correction_distance,
        };

        info!("running approach skill");
        match self.run_approach_skill(&params).await {
            Ok((done, final_linear)) => {
                debug!(succeeded = done.succeeded, ?final_linear, "approach skill finished");
                self.ctx.approach_final_linear_m = final_linear;
            }
            Err(e) => {
                warn!(error = %e, "approach skill failed");
                return;
            }
        }

        match self.check_standoff().await {
            Ok(close_enough) => self.ctx.approach_succeeded = close_enough,
            Err(e) => warn!(error = %e, "proximity check failed"),
        }
    }

    /// Runs the skill to completion. Also returns the last `final_linear` residual it reported.
    async fn run_approach_skill(
        &self,
        params: &ApproachParams,
    ) -> Result<(ApproachDone, Option<f64>), HardwareError> {
        self.robot.configure_approach(params).await?;

        let (final_linear_tx, final_linear_rx) = watch::channel(None);
        let on_feedback: ApproachFeedback = Arc::new(move |feedback: &serde_json::Value| {
            info!(%feedback, "approach feedback");
            if let Some(residual) = feedback.get("final_linear").and_then(serde_json::Value::as_f64)
            {
                final_linear_tx.send_replace(Some(residual));
            }
        });
        let on_done: ApproachFinished = Arc::new(|done: &ApproachDone| {
            info!(succeeded = done.succeeded, info = %done.info, "approach done")
        });
        self.robot.start_approach(on_feedback, on_done).await?;

        let done = self.robot.await_approach().await;
        let finalized = self.robot.finalize_approach().await;
        let done = done?;
        finalized?;
        let final_linear = *final_linear_rx.borrow();
        Ok((done, final_linear))
    }

    /// Stand-off check against the forward lidar arc, with one corrective nudge.
    async fn check_standoff(&self) -> Result<bool, HardwareError> {
        let tuning = &self.config.approach;
        let Some(gap) = self.standoff_gap().await? else {
            warn!("no forward range returns");
            return Ok(false);
        };
        if gap <= tuning.range_tolerance {
            return Ok(true);
        }

        debug!(gap, "too far from the cart, nudging forward");
        self.robot
            .move_linear(gap, tuning.nudge_velocity, true, true)
            .await?;
        let gap = self.standoff_gap().await?;
        debug!(?gap, "gap after nudge");
        Ok(gap.is_some_and(|gap| gap <= tuning.range_tolerance))
    }

    async fn standoff_gap(&self) -> Result<Option<f64>, HardwareError> {
        let samples = self.robot.range_samples().await?;
        let closest = geometry::front_arc_min(&samples, self.config.approach.front_arc_samples);
        Ok(closest.map(|range| range - self.goal.distance_to_goal))
    }

    async fn check_approach(&mut self) -> Step {
        if std::mem::take(&mut self.ctx.approach_succeeded) {
            match self.robot.current_pose(PoseUnits::METERS_DEGREES).await {
                Ok(pose) => {
                    let error = geometry::heading_error(self.goal.angle_to_goal, pose.heading);
                    self.ctx.approach_angle_error_deg = error;
                    info!(angle_error = error, "cart approached");
                    return Transition::Next(TaskState::DetectingTags1);
                }
                Err(e) => warn!(error = %e, "couldn't read heading after approach"),
            }
        }

        match self.ctx.approach_attempts.record_failure() {
            AttemptVerdict::Exhausted { attempts } => {
                Transition::Abort(TaskError::CouldNotApproachCart { attempts })
            }
            AttemptVerdict::Retry { attempt, max } => {
                warn!(attempt, max, "cart approach failed");
                Transition::Retry
            }
        }
    }

    // DETECTING_TAGS_1 / DEBUG_STATE

    async fn enable_detection(&mut self) {
        self.board.reset();
        self.ctx.lateral_correction_m = None;

        let params = self.config.detection.model_params(self.config.tag_size);
        info!(camera = %self.config.working_camera, "enabling marker detector");
        match self.open_detector(&params).await {
            Ok(detector) => self.detector = Some(detector),
            Err(e) => error!(error = %e, "couldn't enable marker detector"),
        }
        self.ctx.detection_timer.start();
    }

    async fn open_detector(&self, params: &MarkerModelParams) -> Result<R::Detector, HardwareError> {
        let mut detector = self
            .robot
            .enable_marker_detector(&self.config.working_camera, params)
            .await?;
        let on_sighting: TagCallback = Arc::new(log_sighting);
        detector
            .register_tag_callback(self.tag_filter, on_sighting)
            .await?;
        detector
            .register_frame_callback(self.board.frame_callback(), FrameCallbackOptions::default())
            .await?;
        Ok(detector)
    }

    async fn check_first_detection(&mut self) -> Step {
        let tuning = &self.config.detection;
        sleep(tuning.settle()).await;

        if self.board.take_detected() {
            let snapshot = self.board.snapshot();
            let lateral = geometry::pixels_to_lateral_meters(
                &snapshot.records,
                self.ctx.target_tag_id,
                tuning.camera_width_px,
                &tuning.band(),
            );
            if let Some(lateral) = lateral {
                let rotation = self.ctx.approach_angle_error_deg;
                if let Err(e) = self
                    .robot
                    .rotate(rotation, tuning.heading_correction_speed, true)
                    .await
                {
                    warn!(error = %e, "heading correction failed");
                }
                self.ctx.lateral_correction_m = Some(lateral);
                info!(rotation, lateral, "target tag found");
                self.feedback.emit(Feedback::Correction {
                    rotation_deg: rotation,
                    sideways_m: lateral,
                });
                return Transition::Next(TaskState::MovingSideways);
            }
            warn!("target flagged without a record, waiting for the next frame");
        } else {
            debug!("target not in view, creeping backwards");
            if let Err(e) = self
                .robot
                .move_linear(tuning.creep_distance, tuning.creep_velocity, false, false)
                .await
            {
                warn!(error = %e, "creep failed");
            }
        }

        if self.ctx.detection_timer.expired() {
            return Transition::Abort(self.tag_not_found());
        }
        Transition::Stay
    }

    // MOVING_SIDEWAYS

    async fn move_sideways(&mut self) {
        sleep(self.config.sideways.settle()).await;
        let Some(distance) = self.ctx.lateral_correction_m else {
            warn!("no lateral correction computed, skipping maneuver");
            return;
        };
        if let Err(e) = self.turn_and_translate(distance).await {
            error!(error = %e, distance, "sideways maneuver failed");
        }
    }

    /// Rotate 90°, drive `distance`, rotate back. The base can't strafe.
    async fn turn_and_translate(&self, distance: f64) -> Result<(), HardwareError> {
        let tuning = &self.config.sideways;
        info!(distance, "moving sideways");
        self.robot.rotate(90.0, tuning.angular_speed, true).await?;
        self.robot
            .move_linear(
                distance.abs(),
                tuning.linear_velocity.copysign(distance),
                true,
                true,
            )
            .await?;
        self.robot.rotate(-90.0, tuning.angular_speed, true).await
    }

    async fn check_sideways_done(&mut self) -> Step {
        match self.robot.is_moving().await {
            Ok(false) => Transition::Next(TaskState::DetectingTags2),
            Ok(true) => Transition::Stay,
            Err(e) => {
                warn!(error = %e, "couldn't read motion status");
                Transition::Stay
            }
        }
    }

    // DETECTING_TAGS_2

    async fn restart_detection(&mut self) {
        if self.detector.is_none() {
            warn!("marker detector not running, enabling it again");
            self.enable_detection().await;
            return;
        }
        self.board.reset();
        sleep(self.config.detection.settle()).await;
        self.ctx.detection_timer.start();
    }

    async fn check_second_detection(&mut self) -> Step {
        sleep(self.config.detection.settle()).await;
        if self.board.take_detected() {
            info!(tag_id = self.ctx.target_tag_id, "target tag confirmed");
            return Transition::Next(TaskState::PositionArm);
        }
        if self.ctx.detection_timer.expired() {
            return Transition::Abort(self.tag_not_found());
        }
        Transition::Stay
    }

    fn tag_not_found(&self) -> TaskError {
        TaskError::TagNotFound {
            tag_id: self.ctx.target_tag_id,
            timeout_ms: self.ctx.detection_timer.timeout().as_millis() as u64,
        }
    }
}

fn log_sighting(sighting: &TagSighting) {
    info!(
        tag_id = sighting.tag_id,
        family = %sighting.family,
        seen_at = %sighting.seen_at,
        "tag sighted"
    );
}

impl<R: Robot, F: FeedbackSink> StateLogic for TaskRun<'_, R, F> {
    type State = TaskState;
    type Error = TaskError;

    async fn enter(&mut self, state: TaskState) -> Result<(), TaskError> {
        self.feedback.emit(Feedback::StateEntered { state });
        match state {
            TaskState::NavigatingToCart => self.navigate_to_cart().await,
            TaskState::ApproachingCart => self.approach_cart().await,
            TaskState::DetectingTags1 | TaskState::DebugState => self.enable_detection().await,
            TaskState::MovingSideways => self.move_sideways().await,
            TaskState::DetectingTags2 => self.restart_detection().await,
            TaskState::PositionArm => return self.position_arm().await,
            TaskState::PickItem => debug!("grasp execution not implemented"),
            TaskState::End => {
                self.ctx.detection_timer.stop();
                info!(item = %self.config.item_name, "task complete");
                self.feedback.emit(Feedback::Completed {
                    item: self.config.item_name.clone(),
                });
            }
        }
        Ok(())
    }

    async fn transition(&mut self, state: TaskState) -> Step {
        match state {
            TaskState::NavigatingToCart => self.check_navigation().await,
            TaskState::ApproachingCart => self.check_approach().await,
            TaskState::DetectingTags1 => self.check_first_detection().await,
            TaskState::MovingSideways => self.check_sideways_done().await,
            TaskState::DetectingTags2 | TaskState::DebugState => {
                self.check_second_detection().await
            }
            TaskState::PositionArm => self.check_arm_position().await,
            TaskState::PickItem => self.finish_pick().await,
            TaskState::End => Transition::Stay,
        }
    }

    async fn on_abort(&mut self, state: TaskState, error: &TaskError) {
        self.ctx.detection_timer.stop();
        error!(%state, code = error.code(), %error, "task aborted");
        self.feedback.emit(Feedback::Aborted {
            code: error.code(),
            message: error.to_string(),
        });
    }
}
