use std::fmt;

use serde::{Deserialize, Serialize};

/// Artefact kind used when the caller does not supply one.
pub const DEFAULT_ARTEFACT_KIND: &str = "proposal";

/// One of the three persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Runs,
    Artefacts,
    Audit,
}

impl Collection {
    /// Table name on the remote relational backend.
    pub fn table(self) -> &'static str {
        match self {
            Collection::Runs => "runs",
            Collection::Artefacts => "artefacts",
            Collection::Audit => "audit_log",
        }
    }

    /// Namespaced key under which the local store keeps the collection.
    pub fn local_key(self) -> &'static str {
        match self {
            Collection::Runs => "runledger:runs:v1",
            Collection::Artefacts => "runledger:artefacts:v1",
            Collection::Audit => "runledger:audit:v1",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Running,
    WaitingHuman,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Created => "created",
            RunStatus::Running => "running",
            RunStatus::WaitingHuman => "waiting_human",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consequence class of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Formative,
    Summative,
    Policy,
}

/// Who requested a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Teacher,
    Student,
    System,
}

/// A run as submitted for insertion. `id` is assigned by the store when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRun {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub impact: Impact,
    pub workflow_id: String,
    pub ssot_version: String,
    pub status: RunStatus,
    #[serde(default)]
    pub input_ref: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewRun {
    /// A run in status `created` with no input, id or notes.
    pub fn new(
        actor_type: ActorType,
        actor_id: impl Into<String>,
        impact: Impact,
        workflow_id: impl Into<String>,
        ssot_version: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            actor_type,
            actor_id: actor_id.into(),
            impact,
            workflow_id: workflow_id.into(),
            ssot_version: ssot_version.into(),
            status: RunStatus::Created,
            input_ref: None,
            notes: None,
        }
    }

    pub fn with_input(mut self, input_ref: impl Into<String>) -> Self {
        self.input_ref = Some(input_ref.into());
        self
    }
}

/// A run as stored by either backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub impact: Impact,
    pub workflow_id: String,
    pub ssot_version: String,
    pub status: RunStatus,
    #[serde(default)]
    pub input_ref: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// RFC 3339 timestamp assigned on insert.
    #[serde(default)]
    pub created_at: Option<String>,
    /// RFC 3339 timestamp of the last update.
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl RunRecord {
    pub(crate) fn from_new(run: NewRun, id: String, created_at: String) -> Self {
        RunRecord {
            id,
            actor_type: run.actor_type,
            actor_id: run.actor_id,
            impact: run.impact,
            workflow_id: run.workflow_id,
            ssot_version: run.ssot_version,
            status: run.status,
            input_ref: run.input_ref,
            notes: run.notes,
            created_at: Some(created_at),
            updated_at: None,
        }
    }

    /// Merge a patch into this record. The id never changes.
    pub fn apply(&mut self, patch: &RunPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(notes) = &patch.notes {
            self.notes = Some(notes.clone());
        }
        if let Some(input_ref) = &patch.input_ref {
            self.input_ref = Some(input_ref.clone());
        }
        if let Some(updated_at) = &patch.updated_at {
            self.updated_at = Some(updated_at.clone());
        }
    }
}

/// Partial update of a run. Unset fields are left untouched and not serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl RunPatch {
    pub fn status(status: RunStatus) -> Self {
        RunPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// An artefact as submitted for insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArtefact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub content: String,
}

/// An artefact as stored. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtefactRecord {
    pub id: String,
    pub run_id: String,
    pub kind: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ArtefactRecord {
    pub(crate) fn from_new(artefact: NewArtefact, id: String, created_at: String) -> Self {
        ArtefactRecord {
            id,
            run_id: artefact.run_id,
            kind: artefact
                .kind
                .unwrap_or_else(|| DEFAULT_ARTEFACT_KIND.to_string()),
            provider: artefact.provider,
            model: artefact.model,
            content: artefact.content,
            created_at: Some(created_at),
        }
    }
}

/// Closed vocabulary of audit event tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    TeacherGateApproved,
    TeacherGateRejected,
    RunFailedNoInput,
    RunCompletedAfterTeacherGate,
    RunFailedAfterTeacherGate,
    RunReconciledStuck,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventType::TeacherGateApproved => "teacher_gate_approved",
            AuditEventType::TeacherGateRejected => "teacher_gate_rejected",
            AuditEventType::RunFailedNoInput => "run_failed_no_input",
            AuditEventType::RunCompletedAfterTeacherGate => "run_completed_after_teacher_gate",
            AuditEventType::RunFailedAfterTeacherGate => "run_failed_after_teacher_gate",
            AuditEventType::RunReconciledStuck => "run_reconciled_stuck",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// An audit event as submitted for appending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub event_type: AuditEventType,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
}

impl NewAuditEvent {
    /// An event about `run_id` with an empty payload.
    pub fn for_run(event_type: AuditEventType, run_id: impl Into<String>) -> Self {
        NewAuditEvent {
            id: None,
            event_type,
            run_id: Some(run_id.into()),
            payload: empty_payload(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// An audit event as stored. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub event_type: AuditEventType,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl AuditRecord {
    pub(crate) fn from_new(event: NewAuditEvent, id: String, created_at: String) -> Self {
        AuditRecord {
            id,
            event_type: event.event_type,
            run_id: event.run_id,
            payload: event.payload,
            created_at: Some(created_at),
        }
    }
}
