use runledger_storage::{RunStatus, StorageError};

/// Errors returned by the run controller.
///
/// A failing generation call is not among them: it is an outcome of the
/// approval and ends with the run in `failed`.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("run {run_id} cannot move from {from} to {to}")]
    InvalidTransition {
        run_id: String,
        from: RunStatus,
        to: RunStatus,
    },

    /// New runs must enter the lifecycle in `created`.
    #[error("a new run must be submitted in status created, got {status}")]
    InvalidInitialStatus { status: RunStatus },
}
