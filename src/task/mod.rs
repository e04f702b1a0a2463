//! The cart picking task built on the generic state machine.

mod arm;
mod context;
mod graph;
mod run;
mod state;


use serde::Serialize;

pub use context::{ArmTarget, AttemptSummary, PoseSource, TaskContext};
pub use graph::{TaskGraph, TaskReport};
pub use state::TaskState;

/// Structured progress message for the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Feedback {
    StateEntered { state: TaskState },
    /// Heading and lateral corrections computed from the first detection.
    Correction { rotation_deg: f64, sideways_m: f64 },
    Completed { item: String },
    Aborted { code: u32, message: String },
}
