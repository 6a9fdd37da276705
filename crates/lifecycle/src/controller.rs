use std::sync::Arc;

use runledger_storage::{
    ids, AuditEventType, NewArtefact, NewAuditEvent, NewRun, Persistence, RunPatch, RunRecord,
    RunStatus, StorageError, Stored, DEFAULT_ARTEFACT_KIND,
};
use serde::Serialize;
use serde_json::json;
use time::{Duration, OffsetDateTime};

use crate::error::LifecycleError;
use crate::generation::{ExecutionMode, GenerationClient};
use crate::state;

/// Note left on a run approved without an input to execute.
pub const NO_INPUT_NOTE: &str = "No input_ref found to execute run.";
/// Note left on a run the teacher rejected.
pub const REJECTED_NOTE: &str = "Rejected by teacher gate.";
/// Note left on a run failed by the reconciliation sweep.
pub const STUCK_NOTE: &str = "Reconciled: run stayed in running past the sweep threshold.";

/// Backend code for a single-row read that matched nothing.
const NO_ROWS_CODE: &str = "PGRST116";

/// How an approval or rejection ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Generation succeeded and its proposal was stored.
    Completed {
        run_id: String,
        artefact_id: String,
        has_analysis: bool,
    },
    /// The run had no input to execute.
    FailedNoInput { run_id: String },
    /// Generation or storing its result failed; `error` is the run's note.
    FailedGeneration { run_id: String, error: String },
    Rejected { run_id: String },
}

impl RunOutcome {
    pub fn run_id(&self) -> &str {
        match self {
            RunOutcome::Completed { run_id, .. }
            | RunOutcome::FailedNoInput { run_id }
            | RunOutcome::FailedGeneration { run_id, .. }
            | RunOutcome::Rejected { run_id } => run_id,
        }
    }

    pub fn final_status(&self) -> RunStatus {
        match self {
            RunOutcome::Completed { .. } => RunStatus::Completed,
            _ => RunStatus::Failed,
        }
    }
}

/// Applies the teacher gate to runs held by a [`Persistence`] facade.
///
/// Concurrent decisions on the same run are not coordinated beyond the
/// transition guard: the last write wins.
pub struct RunController {
    store: Arc<Persistence>,
    generator: Arc<dyn GenerationClient>,
}

impl RunController {
    pub fn new(store: Arc<Persistence>, generator: Arc<dyn GenerationClient>) -> Self {
        Self { store, generator }
    }

    pub fn store(&self) -> &Persistence {
        &self.store
    }

    /// Persist a new run. It must start in `created`.
    pub async fn submit_run(&self, run: NewRun) -> Result<Stored<RunRecord>, LifecycleError> {
        if run.status != RunStatus::Created {
            return Err(LifecycleError::InvalidInitialStatus { status: run.status });
        }
        let stored = self.store.save_run(run).await?;
        warn_if_degraded(&stored, "save run");
        if let Some(run) = &stored.data {
            tracing::info!(run_id = %run.id, mode = %stored.mode, "run submitted");
        }
        Ok(stored)
    }

    /// Approve a run and execute its prompt in teacher mode.
    ///
    /// The run is marked `running` and the approval audited before its
    /// input is read. It then ends in `completed` with one `proposal`
    /// artefact, or in `failed` with a note. Local write failures never
    /// stop the sequence; remote backend errors abort it.
    pub async fn approve_run(&self, run_id: &str) -> Result<RunOutcome, LifecycleError> {
        let run = self.load_run(run_id).await?;
        state::validate_transition(run_id, run.status, RunStatus::Running)?;

        self.update(run_id, RunPatch::status(RunStatus::Running)).await?;
        self.audit(AuditEventType::TeacherGateApproved, run_id, json!({}))
            .await?;

        let prompt = self
            .store
            .get_run(run_id)
            .await?
            .into_data()
            .and_then(|r| r.input_ref)
            .unwrap_or_default();

        if prompt.is_empty() {
            tracing::warn!(run_id, "approved run has no input");
            self.update(
                run_id,
                RunPatch::status(RunStatus::Failed).with_notes(NO_INPUT_NOTE),
            )
            .await?;
            self.audit(AuditEventType::RunFailedNoInput, run_id, json!({}))
                .await?;
            return Ok(RunOutcome::FailedNoInput {
                run_id: run_id.to_string(),
            });
        }

        match self.execute(run_id, &prompt).await {
            Ok((artefact_id, has_analysis)) => {
                self.audit(
                    AuditEventType::RunCompletedAfterTeacherGate,
                    run_id,
                    json!({ "has_analysis": has_analysis }),
                )
                .await?;
                tracing::info!(run_id, %artefact_id, has_analysis, "run completed after teacher gate");
                Ok(RunOutcome::Completed {
                    run_id: run_id.to_string(),
                    artefact_id,
                    has_analysis,
                })
            }
            Err(error) => {
                tracing::warn!(run_id, %error, "run failed after teacher gate");
                self.update(
                    run_id,
                    RunPatch::status(RunStatus::Failed).with_notes(error.clone()),
                )
                .await?;
                self.audit(
                    AuditEventType::RunFailedAfterTeacherGate,
                    run_id,
                    json!({ "error": error }),
                )
                .await?;
                Ok(RunOutcome::FailedGeneration {
                    run_id: run_id.to_string(),
                    error,
                })
            }
        }
    }

    /// Reject a run: it moves straight to `failed`, nothing is generated.
    ///
    /// Any non-terminal status may be rejected. A run that is already
    /// `completed` or `failed` admits no transition, so rejecting it returns
    /// [`LifecycleError::InvalidTransition`] and leaves it and its audit
    /// trail untouched.
    pub async fn reject_run(&self, run_id: &str) -> Result<RunOutcome, LifecycleError> {
        let run = self.load_run(run_id).await?;
        state::validate_transition(run_id, run.status, RunStatus::Failed)?;

        self.update(
            run_id,
            RunPatch::status(RunStatus::Failed).with_notes(REJECTED_NOTE),
        )
        .await?;
        self.audit(AuditEventType::TeacherGateRejected, run_id, json!({}))
            .await?;
        tracing::info!(run_id, "run rejected by teacher gate");
        Ok(RunOutcome::Rejected {
            run_id: run_id.to_string(),
        })
    }

    /// Fail every run left in `running` for longer than `threshold`.
    ///
    /// A run's age is measured from `updated_at`, or `created_at` when it
    /// was never updated. Returns the ids of the runs moved to `failed`.
    pub async fn sweep_stuck_runs(
        &self,
        threshold: Duration,
        now: OffsetDateTime,
    ) -> Result<Vec<String>, LifecycleError> {
        let runs = self.store.list_runs().await?.into_data().unwrap_or_default();
        let mut swept = Vec::new();

        for run in runs.into_iter().filter(|r| r.status == RunStatus::Running) {
            let Some(last_touched) = run.updated_at.as_deref().or(run.created_at.as_deref())
            else {
                continue;
            };
            let Some(at) = ids::parse_timestamp(last_touched) else {
                tracing::warn!(run_id = %run.id, last_touched, "unparseable run timestamp, not swept");
                continue;
            };
            if now - at <= threshold {
                continue;
            }

            self.update(
                &run.id,
                RunPatch::status(RunStatus::Failed).with_notes(STUCK_NOTE),
            )
            .await?;
            self.audit(
                AuditEventType::RunReconciledStuck,
                &run.id,
                json!({
                    "stale_since": last_touched,
                    "threshold_secs": threshold.whole_seconds(),
                }),
            )
            .await?;
            tracing::warn!(run_id = %run.id, stale_since = last_touched, "stuck run reconciled");
            swept.push(run.id);
        }

        Ok(swept)
    }

    /// Generate, store the proposal and mark the run completed. Any
    /// failure comes back as the message to leave on the run.
    async fn execute(&self, run_id: &str, prompt: &str) -> Result<(String, bool), String> {
        let generation = self
            .generator
            .generate(prompt, ExecutionMode::Teacher)
            .await
            .map_err(|e| e.to_string())?;

        let artefact = NewArtefact {
            id: None,
            run_id: run_id.to_string(),
            kind: Some(DEFAULT_ARTEFACT_KIND.to_string()),
            provider: Some(self.generator.provider().to_string()),
            model: self.generator.model().map(str::to_string),
            content: generation.text,
        };
        let stored = self
            .store
            .save_artefact(artefact)
            .await
            .map_err(|e| e.to_string())?;
        warn_if_degraded(&stored, "save artefact");
        let artefact_id = stored.data.map(|a| a.id).unwrap_or_default();

        self.update(run_id, RunPatch::status(RunStatus::Completed))
            .await
            .map_err(|e| e.to_string())?;

        Ok((artefact_id, generation.analysis.is_some()))
    }

    async fn load_run(&self, run_id: &str) -> Result<RunRecord, LifecycleError> {
        let not_found = || LifecycleError::RunNotFound {
            run_id: run_id.to_string(),
        };
        match self.store.get_run(run_id).await {
            Ok(stored) => stored.into_data().ok_or_else(not_found),
            Err(StorageError::Backend {
                code: Some(code), ..
            }) if code == NO_ROWS_CODE => Err(not_found()),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, run_id: &str, patch: RunPatch) -> Result<(), LifecycleError> {
        let stored = self.store.update_run(run_id, patch).await?;
        if !stored.ok {
            tracing::warn!(run_id, "run vanished from the local store during transition");
        }
        warn_if_degraded(&stored, "update run");
        Ok(())
    }

    async fn audit(
        &self,
        event_type: AuditEventType,
        run_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), LifecycleError> {
        let stored = self
            .store
            .log_audit(NewAuditEvent::for_run(event_type, run_id).with_payload(payload))
            .await?;
        warn_if_degraded(&stored, "append audit event");
        Ok(())
    }
}

fn warn_if_degraded<T>(stored: &Stored<T>, what: &str) {
    if let runledger_storage::Durability::Degraded { reason } = &stored.durability {
        tracing::warn!(operation = what, %reason, "local write not persisted");
    }
}
