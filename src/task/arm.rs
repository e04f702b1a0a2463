use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::context::ArmTarget;
use super::run::TaskRun;
use super::state::TaskState;
use crate::error::{ArmPlacementError, HardwareError, TaskError};
use crate::geometry::{self, Point3};
use crate::hardware::{
    ArmMotion, ArmPose, FeedbackSink, GripperAction, JointTarget, Robot, TrajectoryCallbacks,
    TrajectoryDone, TrajectoryProgress,
};
use crate::state_machine::{AttemptVerdict, Transition};

impl<R: Robot, F: FeedbackSink> TaskRun<'_, R, F> {
    /// POSITION_ARM entry: static reference pose first, then refine toward the tag.
    ///
    /// When the static pose fails the arm goes home and no target is recorded, so
    /// the transition re-enters the state. Too many of those in a row abort.
    pub(super) async fn position_arm(&mut self) -> Result<(), TaskError> {
        match self.place_arm().await {
            Ok(target) => {
                info!(source = ?target.source, position = ?target.position, "arm target set");
                self.ctx.arm_target = Some(target);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "arm positioning failed, returning home");
                self.ctx.arm_target = None;
                self.return_arm_home().await;
                match self.ctx.arm_position_attempts.record_failure() {
                    AttemptVerdict::Exhausted { attempts } => Err(TaskError::CouldNotPositionArm {
                        attempts,
                        reason: err.to_string(),
                    }),
                    AttemptVerdict::Retry { attempt, max } => {
                        debug!(attempt, max, "arm placement will be retried");
                        Ok(())
                    }
                }
            }
        }
    }

    async fn place_arm(&self) -> Result<ArmTarget, ArmPlacementError> {
        let static_position = self
            .static_reference_pose()
            .await
            .map_err(ArmPlacementError::StaticPoseFailed)?;

        let Some(tag) = self.board.target_pose() else {
            debug!("no tag pose recorded, keeping static reference pose");
            return Ok(ArmTarget::fixed(static_position));
        };

        match self.dynamic_reference_pose(tag).await {
            Ok(goal) => Ok(ArmTarget::dynamic(goal)),
            Err(err) => {
                debug!(error = %err, "returning to static reference pose");
                // The failed plan may have moved the arm.
                let position = self
                    .static_reference_pose()
                    .await
                    .map_err(ArmPlacementError::StaticPoseFailed)?;
                Ok(ArmTarget::fixed(position))
            }
        }
    }

    /// Moves to the fixed joint configuration and returns the resulting end-effector position.
    pub(super) async fn static_reference_pose(&self) -> Result<Point3, HardwareError> {
        let tuning = &self.config.arm;
        let target = JointTarget {
            names: tuning.joint_names.clone(),
            angles: tuning.reference_joint_angles.clone(),
            velocity_scaling: tuning.joint_velocity_scaling,
            acceleration_scaling: tuning.joint_velocity_scaling,
        };
        self.robot
            .move_to_joint_angles(&self.config.arm_name, &target, true)
            .await?;
        let pose = self.robot.end_effector_pose(&self.config.arm_name).await?;
        Ok(pose.position)
    }

    async fn dynamic_reference_pose(&self, tag: Point3) -> Result<Point3, ArmPlacementError> {
        let tuning = &self.config.arm;
        let goal = tag.offset(tuning.tool_offset);
        let motion = ArmMotion {
            pose: ArmPose {
                position: goal,
                orientation: [0.0; 3],
            },
            planner: tuning.planner.clone(),
            cartesian: true,
            velocity_scaling: tuning.velocity_scaling,
            acceleration_scaling: tuning.acceleration_scaling,
            wait: true,
        };
        debug!(?goal, "moving arm toward tag");
        self.robot
            .move_to_pose(&self.config.arm_name, &motion, trajectory_logger("tag approach"))
            .await
            .map_err(|e| ArmPlacementError::DynamicPoseUnavailable(e.to_string()))?;
        Ok(goal)
    }

    pub(super) async fn check_arm_position(&mut self) -> Transition<TaskState, TaskError> {
        let Some(target) = self.ctx.arm_target else {
            debug!("no arm target, repositioning");
            return Transition::Retry;
        };

        let threshold = self.config.arm.error_threshold;
        let accurate = match self.robot.end_effector_pose(&self.config.arm_name).await {
            Ok(pose) => {
                debug!(actual = ?pose.position, target = ?target.position, "arm position check");
                geometry::within_per_axis(&pose.position, &target.position, threshold)
            }
            Err(e) => {
                warn!(error = %e, "couldn't read arm pose");
                false
            }
        };
        if accurate {
            return Transition::Next(TaskState::PickItem);
        }

        match self.ctx.arm_accuracy_checks.record_failure() {
            AttemptVerdict::Exhausted { attempts } => {
                Transition::Abort(TaskError::ArmPositionNotAccurate { attempts })
            }
            AttemptVerdict::Retry { attempt, max } => {
                warn!(attempt, max, threshold, "arm position not accurate");
                self.ctx.arm_position_attempts.reset();
                Transition::Retry
            }
        }
    }

    /// PICK_ITEM transition: back through the reference pose to home.
    pub(super) async fn finish_pick(&mut self) -> Transition<TaskState, TaskError> {
        if let Err(e) = self.static_reference_pose().await {
            warn!(error = %e, "couldn't return to reference pose");
        }
        self.return_arm_home().await;
        Transition::Next(TaskState::End)
    }

    async fn return_arm_home(&self) {
        let arm = &self.config.arm_name;
        if let Err(e) = self
            .robot
            .move_to_named_pose(
                arm,
                &self.config.arm.home_pose,
                true,
                trajectory_logger("home"),
            )
            .await
        {
            warn!(error = %e, "couldn't move arm home");
        }
        self.gripper(GripperAction::Open).await;
    }

    /// Gripper failures are logged only; the settle pause happens either way.
    async fn gripper(&self, action: GripperAction) {
        info!(%action, "gripper command");
        if let Err(e) = self
            .robot
            .gripper_command(&self.config.arm_name, action, true)
            .await
        {
            warn!(error = %e, %action, "gripper command failed");
        }
        sleep(self.config.arm.gripper_settle()).await;
    }
}

/// Trajectory hooks that only log, tagged with the motion they follow.
pub(super) fn trajectory_logger(motion: &'static str) -> TrajectoryCallbacks {
    TrajectoryCallbacks {
        on_feedback: Arc::new(move |progress: &TrajectoryProgress| {
            debug!(motion, percentage = progress.percentage, "arm trajectory progress");
        }),
        on_finish: Arc::new(move |done: &TrajectoryDone| {
            if done.succeeded() {
                info!(motion, "arm trajectory finished");
            } else {
                error!(
                    motion,
                    code = done.error_code,
                    message = %done.message,
                    "arm trajectory failed"
                );
            }
        }),
    }
}
