//! FSM unit tests

use deploy_agent::deploy::fsm::{RunEvent, RunFsm, RunState};
use deploy_agent::models::run::RunStatus;

#[test]
fn test_fsm_initial_state() {
    let fsm = RunFsm::new();
    assert_eq!(fsm.state(), &RunState::Pending);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.state().run_status(), RunStatus::InProgress);
}

#[test]
fn test_fsm_success_flow() {
    let mut fsm = RunFsm::new();

    // Pending -> Running
    fsm.process(RunEvent::Start).unwrap();
    assert_eq!(fsm.state(), &RunState::Running);
    assert_eq!(fsm.state().run_status(), RunStatus::InProgress);

    // Running -> Succeeded
    fsm.process(RunEvent::Complete).unwrap();
    assert_eq!(fsm.state(), &RunState::Succeeded);
    assert_eq!(fsm.state().run_status(), RunStatus::Success);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_failure_flow() {
    let mut fsm = RunFsm::new();

    fsm.process(RunEvent::Start).unwrap();
    fsm.process(RunEvent::Fail("step 2 failed".to_string())).unwrap();

    assert_eq!(fsm.state(), &RunState::Failed);
    assert_eq!(fsm.state().run_status(), RunStatus::Failed);
    assert_eq!(fsm.error(), Some("step 2 failed"));
}

#[test]
fn test_fsm_fail_before_start() {
    let mut fsm = RunFsm::new();

    fsm.process(RunEvent::Fail("aborted".to_string())).unwrap();
    assert_eq!(fsm.state(), &RunState::Failed);
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = RunFsm::new();

    // Cannot complete from Pending
    let result = fsm.process(RunEvent::Complete);
    assert!(result.is_err());
    assert_eq!(fsm.state(), &RunState::Pending);
}
