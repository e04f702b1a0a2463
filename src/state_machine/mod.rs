mod engine;
mod record;
mod tracker;

pub use engine::{StateLogic, StateMachine, StateTimeout, Status, Transition};
pub use record::{RunOutcome, RunRecord, StateVisit};
pub use tracker::{AttemptCounter, AttemptVerdict, PhaseTimer};
