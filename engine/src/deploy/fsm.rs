//! Finite state machine for one scheduling run

use serde::{Deserialize, Serialize};

use crate::models::run::RunStatus;

/// Run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Created, nothing loaded yet
    Initialized,

    /// Loading the catalog and resolving environment and servers
    Resolving,

    /// Dispatching to a strategy
    Scheduling,

    /// Units are running
    Executing,

    /// Folding outcomes into the report
    Aggregating,

    Completed,
    Failed,
    Cancelled,
}

/// Run event
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Begin loading configuration
    Resolve,

    /// Catalog and targets are ready
    Resolved,

    /// Strategy selected, first unit about to start
    Dispatch,

    /// Every scheduled unit produced an outcome
    UnitsFinished,

    /// The strategy stopped early
    Halt(String),

    /// Caller requested cancellation
    Cancel,

    /// Aggregation done; `failed` is true when any unit or probe failed
    Aggregated { failed: bool },

    /// Unrecoverable error before execution
    Abort(String),
}

/// Run FSM
#[derive(Debug, Clone)]
pub struct RunFsm {
    state: RunState,
    error: Option<String>,
    halt_reason: Option<String>,
    cancelled: bool,
}

impl RunFsm {
    /// Create a new FSM in the initialized state
    pub fn new() -> Self {
        Self {
            state: RunState::Initialized,
            error: None,
            halt_reason: None,
            cancelled: false,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halt_reason.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }

    /// Terminal status, once reached
    pub fn run_status(&self) -> Option<RunStatus> {
        match self.state {
            RunState::Completed => Some(RunStatus::Completed),
            RunState::Failed => Some(RunStatus::Failed),
            RunState::Cancelled => Some(RunStatus::Cancelled),
            _ => None,
        }
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: RunEvent) -> Result<(), String> {
        let new_state = match (self.state, &event) {
            (RunState::Initialized, RunEvent::Resolve) => RunState::Resolving,
            (RunState::Resolving, RunEvent::Resolved) => RunState::Scheduling,
            (RunState::Scheduling, RunEvent::Dispatch) => RunState::Executing,

            (RunState::Executing, RunEvent::UnitsFinished) => RunState::Aggregating,
            (RunState::Executing, RunEvent::Halt(reason)) => {
                self.halt_reason = Some(reason.clone());
                RunState::Aggregating
            }
            (RunState::Executing, RunEvent::Cancel) => {
                self.cancelled = true;
                RunState::Aggregating
            }

            // Nothing has run yet, so there is nothing to aggregate
            (RunState::Resolving | RunState::Scheduling, RunEvent::Cancel) => {
                self.cancelled = true;
                RunState::Cancelled
            }

            (RunState::Aggregating, RunEvent::Aggregated { failed }) => {
                if self.cancelled {
                    RunState::Cancelled
                } else if *failed || self.halt_reason.is_some() {
                    RunState::Failed
                } else {
                    RunState::Completed
                }
            }

            (
                RunState::Initialized
                | RunState::Resolving
                | RunState::Scheduling
                | RunState::Executing
                | RunState::Aggregating,
                RunEvent::Abort(err),
            ) => {
                self.error = Some(err.clone());
                RunState::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for RunFsm {
    fn default() -> Self {
        Self::new()
    }
}
