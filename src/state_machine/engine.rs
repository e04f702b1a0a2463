use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use super::record::{RunOutcome, RunRecord, StateVisit};
use crate::error::EngineError;

/// What a transition check asks the machine to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<S, E> {
    /// Keep polling the current state.
    Stay,
    /// Leave the current state and enter another one.
    Next(S),
    /// Leave and re-enter the current state, running its entry action again.
    Retry,
    /// Stop with a terminal failure.
    Abort(E),
}

/// Per-state behavior driven by [`StateMachine`].
///
/// `enter` runs exactly once per entry into a state; `transition` is polled
/// while the state is active. Only one of them runs at a time.
pub trait StateLogic {
    type State: Copy + Eq + Hash + fmt::Display + fmt::Debug;
    type Error: Clone + fmt::Display + fmt::Debug;

    /// Entry action. An error aborts the run.
    async fn enter(&mut self, state: Self::State) -> Result<(), Self::Error>;

    async fn transition(&mut self, state: Self::State) -> Transition<Self::State, Self::Error>;

    /// Called once when the run aborts, before the machine halts.
    async fn on_abort(&mut self, state: Self::State, error: &Self::Error) {
        let _ = (state, error);
    }
}

/// Timeout declared for a state: abort with `error` once `after` has elapsed.
#[derive(Debug, Clone)]
pub struct StateTimeout<E> {
    pub after: Duration,
    pub error: E,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Status<S, E> {
    Idle,
    Running(S),
    Completed(S),
    Aborted { state: S, error: E },
}

impl<S, E> Status<S, E> {
    pub fn is_finished(&self) -> bool {
        matches!(self, Status::Completed(_) | Status::Aborted { .. })
    }
}

/// Cooperative driver over a [`StateLogic`] implementation.
pub struct StateMachine<S, E> {
    status: Status<S, E>,
    terminal: HashSet<S>,
    timeouts: HashMap<S, StateTimeout<E>>,
    poll_interval: Duration,
    // Start of the current visit, before its entry action.
    visit_started: Instant,
    // End of the current entry action; timeouts count from here.
    entered_at: Instant,
    visits: Vec<StateVisit<S>>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl<S, E> StateMachine<S, E>
where
    S: Copy + Eq + Hash + fmt::Display + fmt::Debug,
    E: Clone + fmt::Display + fmt::Debug,
{
    pub fn new(terminal: impl IntoIterator<Item = S>, poll_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            status: Status::Idle,
            terminal: terminal.into_iter().collect(),
            timeouts: HashMap::new(),
            poll_interval,
            visit_started: now,
            entered_at: now,
            visits: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Declares a timeout for `state`, checked on every poll before its transition.
    pub fn with_timeout(mut self, state: S, after: Duration, error: E) -> Self {
        self.timeouts.insert(state, StateTimeout { after, error });
        self
    }

    pub fn current_state(&self) -> Option<S> {
        match self.status {
            Status::Idle => None,
            Status::Running(state) | Status::Completed(state) => Some(state),
            Status::Aborted { state, .. } => Some(state),
        }
    }

    /// Enters `initial` and runs its entry action.
    pub async fn start<L>(&mut self, logic: &mut L, initial: S) -> Result<Status<S, E>, EngineError>
    where
        L: StateLogic<State = S, Error = E>,
    {
        if !matches!(self.status, Status::Idle) {
            return Err(EngineError::AlreadyStarted);
        }
        self.started_at = Utc::now();
        info!(state = %initial, "starting state machine");
        Ok(self.enter(logic, initial).await)
    }

    /// Runs one timeout check and one transition check of the active state.
    ///
    /// A finished machine returns its final status without touching `logic`.
    pub async fn poll<L>(&mut self, logic: &mut L) -> Result<Status<S, E>, EngineError>
    where
        L: StateLogic<State = S, Error = E>,
    {
        let state = match &self.status {
            Status::Idle => return Err(EngineError::NotStarted),
            Status::Running(state) => *state,
            finished => return Ok(finished.clone()),
        };

        if let Some(timeout) = self.timeouts.get(&state)
            && self.entered_at.elapsed() > timeout.after
        {
            let error = timeout.error.clone();
            warn!(state = %state, after_ms = timeout.after.as_millis() as u64, "state timed out");
            return Ok(self.abort(logic, state, error).await);
        }

        if let Some(visit) = self.visits.last_mut() {
            visit.polls += 1;
        }

        let status = match logic.transition(state).await {
            Transition::Stay => self.status.clone(),
            Transition::Next(next) => self.enter(logic, next).await,
            Transition::Retry => {
                debug!(state = %state, "re-entering state");
                self.enter(logic, state).await
            }
            Transition::Abort(error) => self.abort(logic, state, error).await,
        };
        Ok(status)
    }

    /// Starts at `initial` and polls on the configured cadence until the run finishes.
    pub async fn run<L>(&mut self, logic: &mut L, initial: S) -> Result<RunRecord<S, E>, EngineError>
    where
        L: StateLogic<State = S, Error = E>,
    {
        let mut status = self.start(logic, initial).await?;
        while !status.is_finished() {
            sleep(self.poll_interval).await;
            status = self.poll(logic).await?;
        }
        Ok(self.record())
    }

    /// Snapshot of the run so far.
    pub fn record(&self) -> RunRecord<S, E> {
        let completed_at = self.finished_at.unwrap_or_else(Utc::now);
        let outcome = match &self.status {
            Status::Idle => RunOutcome::NotStarted,
            Status::Running(state) => RunOutcome::Running { state: *state },
            Status::Completed(state) => RunOutcome::Completed { state: *state },
            Status::Aborted { state, error } => RunOutcome::Aborted {
                state: *state,
                error: error.clone(),
                message: error.to_string(),
            },
        };
        RunRecord {
            transitions: self.visits.clone(),
            outcome,
            started_at: self.started_at,
            completed_at,
            duration_ms: (completed_at - self.started_at).num_milliseconds(),
        }
    }

    async fn enter<L>(&mut self, logic: &mut L, state: S) -> Status<S, E>
    where
        L: StateLogic<State = S, Error = E>,
    {
        if matches!(self.status, Status::Running(_)) {
            self.close_visit();
        }
        info!(state = %state, "entering state");
        self.visits.push(StateVisit::new(state));
        self.visit_started = Instant::now();
        self.status = Status::Running(state);

        if let Err(error) = logic.enter(state).await {
            return self.abort(logic, state, error).await;
        }
        self.entered_at = Instant::now();

        if self.terminal.contains(&state) {
            self.close_visit();
            info!(state = %state, "reached terminal state");
            self.status = Status::Completed(state);
            self.finished_at = Some(Utc::now());
        }
        self.status.clone()
    }

    async fn abort<L>(&mut self, logic: &mut L, state: S, error: E) -> Status<S, E>
    where
        L: StateLogic<State = S, Error = E>,
    {
        self.close_visit();
        error!(state = %state, error = %error, "aborting");
        logic.on_abort(state, &error).await;
        self.status = Status::Aborted { state, error };
        self.finished_at = Some(Utc::now());
        self.status.clone()
    }

    fn close_visit(&mut self) {
        if let Some(visit) = self.visits.last_mut() {
            visit.elapsed_ms = self.visit_started.elapsed().as_millis() as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Step {
        Warmup,
        Work,
        Done,
    }

    impl fmt::Display for Step {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Step::Warmup => write!(f, "WARMUP"),
                Step::Work => write!(f, "WORK"),
                Step::Done => write!(f, "DONE"),
            }
        }
    }

    /// Warmup stays for `warmup_polls` polls, Work retries `work_retries` times.
    #[derive(Default)]
    struct Script {
        warmup_polls: u32,
        work_retries: u32,
        never_leave_warmup: bool,
        abort_in_work: bool,
        fail_entry_of: Option<Step>,
        entries: Vec<Step>,
        transitions: u32,
        aborts: Vec<(Step, String)>,
    }

    impl StateLogic for Script {
        type State = Step;
        type Error = String;

        async fn enter(&mut self, state: Step) -> Result<(), String> {
            self.entries.push(state);
            if self.fail_entry_of == Some(state) {
                return Err(format!("{state} entry failed"));
            }
            Ok(())
        }

        async fn transition(&mut self, state: Step) -> Transition<Step, String> {
            self.transitions += 1;
            match state {
                Step::Warmup if self.never_leave_warmup => Transition::Stay,
                Step::Warmup if self.warmup_polls > 0 => {
                    self.warmup_polls -= 1;
                    Transition::Stay
                }
                Step::Warmup => Transition::Next(Step::Work),
                Step::Work if self.abort_in_work => Transition::Abort("work broke".into()),
                Step::Work if self.work_retries > 0 => {
                    self.work_retries -= 1;
                    Transition::Retry
                }
                Step::Work => Transition::Next(Step::Done),
                Step::Done => unreachable!("terminal state polled"),
            }
        }

        async fn on_abort(&mut self, state: Step, error: &String) {
            self.aborts.push((state, error.clone()));
        }
    }

    fn machine() -> StateMachine<Step, String> {
        StateMachine::new([Step::Done], Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_walks_all_states() {
        let mut script = Script {
            warmup_polls: 2,
            ..Default::default()
        };
        let record = machine().run(&mut script, Step::Warmup).await.unwrap();

        assert!(record.is_completed());
        assert_eq!(record.states(), vec![Step::Warmup, Step::Work, Step::Done]);
        assert_eq!(script.entries, vec![Step::Warmup, Step::Work, Step::Done]);
        assert_eq!(record.transitions[0].polls, 3);
        assert!(script.aborts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_reruns_entry_action() {
        let mut script = Script {
            work_retries: 2,
            ..Default::default()
        };
        let record = machine().run(&mut script, Step::Warmup).await.unwrap();

        assert_eq!(record.entries_of(Step::Work), 3);
        assert_eq!(
            script.entries,
            vec![Step::Warmup, Step::Work, Step::Work, Step::Work, Step::Done]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn declared_timeout_aborts_not_before_deadline() {
        let mut script = Script {
            never_leave_warmup: true,
            ..Default::default()
        };
        let mut machine = machine().with_timeout(Step::Warmup, Duration::from_secs(2), "too slow".into());

        let started = Instant::now();
        let record = machine.run(&mut script, Step::Warmup).await.unwrap();

        assert!(started.elapsed() > Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(record.error(), Some(&"too slow".to_string()));
        assert_eq!(script.aborts, vec![(Step::Warmup, "too slow".to_string())]);
        assert!(!record.visited(Step::Work));
    }

    #[tokio::test(start_paused = true)]
    async fn transition_abort_stops_polling() {
        let mut script = Script {
            abort_in_work: true,
            ..Default::default()
        };
        let mut machine = machine();
        machine.run(&mut script, Step::Warmup).await.unwrap();
        let transitions = script.transitions;

        let status = machine.poll(&mut script).await.unwrap();
        assert_eq!(
            status,
            Status::Aborted {
                state: Step::Work,
                error: "work broke".into()
            }
        );
        assert_eq!(script.transitions, transitions);
        assert_eq!(script.aborts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_failure_aborts() {
        let mut script = Script {
            fail_entry_of: Some(Step::Work),
            ..Default::default()
        };
        let record = machine().run(&mut script, Step::Warmup).await.unwrap();

        assert_eq!(record.error(), Some(&"WORK entry failed".to_string()));
        assert!(!record.visited(Step::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_initial_state_completes_on_start() {
        let mut script = Script::default();
        let mut machine = machine();
        let status = machine.start(&mut script, Step::Done).await.unwrap();
        assert_eq!(status, Status::Completed(Step::Done));
        assert_eq!(script.transitions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn misuse_is_reported() {
        let mut script = Script::default();
        let mut machine = machine();
        assert_eq!(
            machine.poll(&mut script).await.unwrap_err(),
            EngineError::NotStarted
        );
        machine.start(&mut script, Step::Warmup).await.unwrap();
        assert_eq!(
            machine.start(&mut script, Step::Warmup).await.unwrap_err(),
            EngineError::AlreadyStarted
        );
        assert_eq!(machine.current_state(), Some(Step::Warmup));
    }
}
