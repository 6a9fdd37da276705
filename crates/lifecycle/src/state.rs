//! The run state machine.
//!
//! ```text
//! created ──► running ──► completed
//!    │           │  ▲
//!    │           ▼  │
//!    │      waiting_human
//!    │           │
//!    └──────► failed ◄── (any non-terminal state)
//! ```

use runledger_storage::RunStatus;

use crate::error::LifecycleError;

/// States reachable from `from` in one step.
pub fn allowed_transitions(from: RunStatus) -> &'static [RunStatus] {
    match from {
        RunStatus::Created => &[RunStatus::Running, RunStatus::Failed],
        RunStatus::Running => &[
            RunStatus::WaitingHuman,
            RunStatus::Completed,
            RunStatus::Failed,
        ],
        RunStatus::WaitingHuman => &[RunStatus::Running, RunStatus::Failed],
        RunStatus::Completed | RunStatus::Failed => &[],
    }
}

pub fn can_transition(from: RunStatus, to: RunStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

pub fn validate_transition(
    run_id: &str,
    from: RunStatus,
    to: RunStatus,
) -> Result<(), LifecycleError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition {
            run_id: run_id.to_string(),
            from,
            to,
        })
    }
}
