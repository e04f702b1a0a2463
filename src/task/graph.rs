use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::context::{ArmTarget, AttemptSummary};
use super::run::TaskRun;
use super::state::TaskState;
use crate::config::{ExecuteArgs, TaskConfig, tag_for_item};
use crate::detection::{TagFilter, parse_tag_families};
use crate::error::{EngineError, SetupError, TaskError};
use crate::hardware::{FeedbackSink, Robot};
use crate::state_machine::{RunRecord, StateMachine};

/// The configured picking task, owning its hardware handles.
pub struct TaskGraph<R, F> {
    config: TaskConfig,
    target_tag_id: u32,
    tag_filter: TagFilter,
    robot: R,
    feedback: F,
}

/// Everything a finished execution leaves behind.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub run_id: Uuid,
    pub item_name: String,
    pub tag_id: u32,
    pub goal: ExecuteArgs,
    pub attempts: AttemptSummary,
    pub approach_angle_error_deg: f64,
    pub approach_final_linear_m: Option<f64>,
    pub lateral_correction_m: Option<f64>,
    pub arm_target: Option<ArmTarget>,
    pub record: RunRecord<TaskState, TaskError>,
}

impl TaskReport {
    pub fn is_completed(&self) -> bool {
        self.record.is_completed()
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.record.error()
    }
}

impl<R: Robot, F: FeedbackSink> TaskGraph<R, F> {
    /// Validates `config`, resolves the target tag and localizes in the configured map.
    pub async fn setup(config: TaskConfig, robot: R, feedback: F) -> Result<Self, SetupError> {
        config.validate()?;
        let target_tag_id = tag_for_item(&config.item_name)?;
        let tag_filter = parse_tag_families(&config.tag_families)?;
        info!(item = %config.item_name, tag_id = target_tag_id, "target resolved");

        info!(map = %config.map_name, "localizing");
        robot.set_active_map(&config.map_name, true).await?;
        info!("setup done");

        Ok(Self {
            config,
            target_tag_id,
            tag_filter,
            robot,
            feedback,
        })
    }

    pub fn target_tag_id(&self) -> u32 {
        self.target_tag_id
    }

    pub fn initial_state(&self) -> TaskState {
        TaskState::initial(self.config.debug)
    }

    /// Runs the task once toward `goal`, from the initial state to END or an abort.
    pub async fn execute(&mut self, goal: ExecuteArgs) -> Result<TaskReport, EngineError> {
        let run_id = Uuid::new_v4();
        let initial = self.initial_state();
        info!(%run_id, item = %self.config.item_name, state = %initial, "executing task");

        let mut machine = self.machine();
        let mut run = TaskRun::new(
            &self.config,
            &self.tag_filter,
            &self.robot,
            &self.feedback,
            self.target_tag_id,
            goal,
        );
        let record = machine.run(&mut run, initial).await?;
        let ctx = run.context();

        Ok(TaskReport {
            run_id,
            item_name: self.config.item_name.clone(),
            tag_id: self.target_tag_id,
            goal,
            attempts: ctx.attempts(),
            approach_angle_error_deg: ctx.approach_angle_error_deg,
            approach_final_linear_m: ctx.approach_final_linear_m,
            lateral_correction_m: ctx.lateral_correction_m,
            arm_target: ctx.arm_target,
            record,
        })
    }

    fn machine(&self) -> StateMachine<TaskState, TaskError> {
        let timeout = self.config.detection.no_target_timeout();
        let not_found = TaskError::TagNotFound {
            tag_id: self.target_tag_id,
            timeout_ms: timeout.as_millis() as u64,
        };
        StateMachine::new([TaskState::End], self.config.engine.poll_interval())
            .with_timeout(TaskState::DetectingTags1, timeout, not_found.clone())
            .with_timeout(TaskState::DetectingTags2, timeout, not_found.clone())
            .with_timeout(TaskState::DebugState, timeout, not_found)
    }
}
