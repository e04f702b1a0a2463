use chrono::{DateTime, Utc};
use serde::Serialize;

/// One stay in a state, from entry until the state was left.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateVisit<S> {
    pub state: S,
    pub entered_at: DateTime<Utc>,
    /// Number of times the transition check ran during this stay.
    pub polls: u32,
    /// Time in the state including its entry action.
    pub elapsed_ms: u64,
}

impl<S> StateVisit<S> {
    pub(crate) fn new(state: S) -> Self {
        Self {
            state,
            entered_at: Utc::now(),
            polls: 0,
            elapsed_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome<S, E> {
    NotStarted,
    Running { state: S },
    Completed { state: S },
    Aborted { state: S, error: E, message: String },
}

/// Structured audit trail of one state machine run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord<S, E> {
    pub transitions: Vec<StateVisit<S>>,
    pub outcome: RunOutcome<S, E>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl<S: Copy + PartialEq, E> RunRecord<S, E> {
    /// States in the order they were entered, re-entries included.
    pub fn states(&self) -> Vec<S> {
        self.transitions.iter().map(|visit| visit.state).collect()
    }

    pub fn visited(&self, state: S) -> bool {
        self.transitions.iter().any(|visit| visit.state == state)
    }

    pub fn entries_of(&self, state: S) -> usize {
        self.transitions
            .iter()
            .filter(|visit| visit.state == state)
            .count()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed { .. })
    }

    pub fn error(&self) -> Option<&E> {
        match &self.outcome {
            RunOutcome::Aborted { error, .. } => Some(error),
            _ => None,
        }
    }
}
