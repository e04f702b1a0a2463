use serde::Serialize;
use thiserror::Error;

/// Terminal failures of a picking task. Once one is raised the task halts.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    #[error("couldn't reach the cart after {attempts} navigation attempts")]
    CouldNotReachDestination { attempts: u32 },

    #[error("couldn't approach the cart after {attempts} attempts")]
    CouldNotApproachCart { attempts: u32 },

    #[error("tag {tag_id} not found within {timeout_ms}ms")]
    TagNotFound { tag_id: u32, timeout_ms: u64 },

    #[error("couldn't position the arm after {attempts} attempts: {reason}")]
    CouldNotPositionArm { attempts: u32, reason: String },

    #[error("arm position not accurate after {attempts} attempts")]
    ArmPositionNotAccurate { attempts: u32 },
}

impl TaskError {
    /// Stable machine-readable code reported alongside the message.
    pub fn code(&self) -> u32 {
        match self {
            TaskError::CouldNotReachDestination { .. } => 1,
            TaskError::CouldNotApproachCart { .. } => 2,
            TaskError::TagNotFound { .. } => 3,
            TaskError::CouldNotPositionArm { .. } => 4,
            TaskError::ArmPositionNotAccurate { .. } => 5,
        }
    }
}

/// Failure reported by one of the hardware collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    #[error("navigation error: {0}")]
    Navigation(String),

    #[error("motion error: {0}")]
    Motion(String),

    #[error("vision error: {0}")]
    Vision(String),

    #[error("arm error: {0}")]
    Arm(String),

    #[error("ranging error: {0}")]
    Ranging(String),

    #[error("approach skill error: {0}")]
    Approach(String),
}

/// Outcome of a single arm positioning attempt that did not reach a target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArmPlacementError {
    /// The dynamic pose could not be computed or reached; the static pose may still hold.
    #[error("dynamic pose unavailable: {0}")]
    DynamicPoseUnavailable(String),

    /// The static reference pose itself failed.
    #[error("static reference pose failed: {0}")]
    StaticPoseFailed(#[source] HardwareError),
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("unknown item '{0}'")]
    UnknownItem(String),

    #[error("invalid tag family entry '{0}', expected <family>.<id>")]
    InvalidTagFamily(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("hardware setup failed: {0}")]
    Hardware(#[from] HardwareError),
}

/// Misuse of the state machine driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("state machine already started")]
    AlreadyStarted,

    #[error("state machine not started")]
    NotStarted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_error_codes_are_distinct() {
        let errors = [
            TaskError::CouldNotReachDestination { attempts: 3 },
            TaskError::CouldNotApproachCart { attempts: 3 },
            TaskError::TagNotFound {
                tag_id: 1,
                timeout_ms: 30_000,
            },
            TaskError::CouldNotPositionArm {
                attempts: 3,
                reason: "joint limit".into(),
            },
            TaskError::ArmPositionNotAccurate { attempts: 3 },
        ];
        let codes: Vec<u32> = errors.iter().map(TaskError::code).collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn task_error_display() {
        let err = TaskError::TagNotFound {
            tag_id: 4,
            timeout_ms: 1500,
        };
        assert_eq!(err.to_string(), "tag 4 not found within 1500ms");
    }

    #[test]
    fn task_error_serializes_with_kind_tag() {
        let json = serde_json::to_value(TaskError::ArmPositionNotAccurate { attempts: 2 }).unwrap();
        assert_eq!(json["kind"], "arm_position_not_accurate");
        assert_eq!(json["attempts"], 2);
    }

    #[test]
    fn placement_error_keeps_hardware_source() {
        let err = ArmPlacementError::StaticPoseFailed(HardwareError::Arm("collision".into()));
        assert_eq!(
            err.to_string(),
            "static reference pose failed: arm error: collision"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TaskError>();
        assert_send_sync::<SetupError>();
    }
}
