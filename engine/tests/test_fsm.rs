//! Run FSM tests

use shipwright::deploy::fsm::{RunEvent, RunFsm, RunState};
use shipwright::models::run::RunStatus;

#[test]
fn test_fsm_initial_state() {
    let fsm = RunFsm::new();
    assert_eq!(fsm.state(), RunState::Initialized);
    assert!(fsm.error().is_none());
    assert!(fsm.halt_reason().is_none());
    assert!(!fsm.is_terminal());
    assert!(fsm.run_status().is_none());
}

#[test]
fn test_fsm_walks_every_stage() {
    let mut fsm = RunFsm::new();

    fsm.process(RunEvent::Resolve).unwrap();
    assert_eq!(fsm.state(), RunState::Resolving);

    fsm.process(RunEvent::Resolved).unwrap();
    assert_eq!(fsm.state(), RunState::Scheduling);

    fsm.process(RunEvent::Dispatch).unwrap();
    assert_eq!(fsm.state(), RunState::Executing);

    fsm.process(RunEvent::UnitsFinished).unwrap();
    assert_eq!(fsm.state(), RunState::Aggregating);

    fsm.process(RunEvent::Aggregated { failed: true }).unwrap();
    assert_eq!(fsm.state(), RunState::Failed);
    assert_eq!(fsm.run_status(), Some(RunStatus::Failed));
    assert!(fsm.is_terminal());
}

#[test]
fn test_fsm_cancel_before_dispatch_skips_aggregation() {
    let mut fsm = RunFsm::new();
    fsm.process(RunEvent::Resolve).unwrap();
    fsm.process(RunEvent::Resolved).unwrap();

    fsm.process(RunEvent::Cancel).unwrap();
    assert_eq!(fsm.state(), RunState::Cancelled);
    assert!(fsm.process(RunEvent::Dispatch).is_err());
}

#[test]
fn test_fsm_terminal_states_reject_events() {
    let mut fsm = RunFsm::new();
    fsm.process(RunEvent::Resolve).unwrap();
    fsm.process(RunEvent::Resolved).unwrap();
    fsm.process(RunEvent::Dispatch).unwrap();
    fsm.process(RunEvent::UnitsFinished).unwrap();
    fsm.process(RunEvent::Aggregated { failed: false }).unwrap();
    assert_eq!(fsm.run_status(), Some(RunStatus::Completed));

    assert!(fsm.process(RunEvent::Cancel).is_err());
    assert!(fsm.process(RunEvent::Abort("late".to_string())).is_err());
    assert_eq!(fsm.state(), RunState::Completed);
}

#[test]
fn test_fsm_state_serialization() {
    let json = serde_json::to_string(&RunState::Executing).unwrap();
    assert_eq!(json, "\"executing\"");

    let state: RunState = serde_json::from_str("\"cancelled\"").unwrap();
    assert_eq!(state, RunState::Cancelled);
}
