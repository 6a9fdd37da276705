//! The persistence facade: the single entry point for runs, artefacts and
//! audit events.
//!
//! Every operation has the same two branches. When a remote backend is
//! authoritative the call is delegated to it and tagged `remote`; otherwise it
//! is served by the local store, which assigns identifiers and timestamps
//! itself, and tagged `local`. Which branch applies is fixed when the facade
//! is constructed.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::config::PersistenceConfig;
use crate::envelope::{PersistenceMode, Stored};
use crate::error::StorageError;
use crate::ids;
use crate::local::{FileMedium, LocalStore};
use crate::record::{
    ArtefactRecord, AuditRecord, Collection, NewArtefact, NewAuditEvent, NewRun, RunPatch,
    RunRecord, DEFAULT_ARTEFACT_KIND,
};
use crate::remote::RestRemoteStore;
use crate::traits::{RemoteStore, SelectQuery};

/// Number of audit events returned when the caller gives no limit.
pub const DEFAULT_AUDIT_LIMIT: usize = 200;

enum Backend {
    Remote(Arc<dyn RemoteStore>),
    Local(LocalStore),
}

/// Routes every record operation to the authoritative backend.
pub struct Persistence {
    backend: Backend,
}

impl Persistence {
    /// Build the facade the configuration calls for: the REST backend when
    /// a remote is authoritative, otherwise a local store (file-backed when a
    /// directory is configured, in memory if not).
    pub fn from_config(config: &PersistenceConfig) -> Self {
        match config.authoritative_remote() {
            Some(remote) => {
                tracing::debug!(url = %remote.url, "persistence: remote backend authoritative");
                Self::remote(Arc::new(RestRemoteStore::new(remote)))
            }
            None => {
                let store = match &config.local.dir {
                    Some(dir) => LocalStore::new(FileMedium::new(dir)),
                    None => LocalStore::in_memory(),
                };
                tracing::debug!(dir = ?config.local.dir, "persistence: local store authoritative");
                Self::local(store)
            }
        }
    }

    pub fn remote(store: Arc<dyn RemoteStore>) -> Self {
        Persistence {
            backend: Backend::Remote(store),
        }
    }

    pub fn local(store: LocalStore) -> Self {
        Persistence {
            backend: Backend::Local(store),
        }
    }

    pub fn mode(&self) -> PersistenceMode {
        match self.backend {
            Backend::Remote(_) => PersistenceMode::Remote,
            Backend::Local(_) => PersistenceMode::Local,
        }
    }

    // ── Runs ─────────────────────────────────────────────────────────────────

    pub async fn save_run(&self, run: NewRun) -> Result<Stored<RunRecord>, StorageError> {
        match &self.backend {
            Backend::Remote(remote) => {
                let row = remote
                    .insert(Collection::Runs, serde_json::to_value(&run)?)
                    .await?;
                Ok(Stored::remote(decode(row)?))
            }
            Backend::Local(store) => local_ops::save_run(store, run),
        }
    }

    /// All runs, newest first.
    pub async fn list_runs(&self) -> Result<Stored<Vec<RunRecord>>, StorageError> {
        match &self.backend {
            Backend::Remote(remote) => {
                let rows = remote
                    .select_all(Collection::Runs, &SelectQuery::all())
                    .await?;
                Ok(Stored::remote(decode_all(rows)?))
            }
            Backend::Local(store) => Ok(local_ops::list(
                store,
                Collection::Runs,
                |_: &RunRecord| true,
                None,
            )),
        }
    }

    /// One run by id. Locally an unknown id yields `data: None`; the remote
    /// backend reports it as an error.
    pub async fn get_run(&self, id: &str) -> Result<Stored<RunRecord>, StorageError> {
        match &self.backend {
            Backend::Remote(remote) => {
                let row = remote.select_one(Collection::Runs, id).await?;
                Ok(Stored::remote(decode(row)?))
            }
            Backend::Local(store) => Ok(local_ops::get_run(store, id)),
        }
    }

    /// Merge `patch` into a run, stamping `updated_at`. A local update of an
    /// unknown id is the one operation that answers `ok: false` instead of
    /// an error.
    pub async fn update_run(
        &self,
        id: &str,
        patch: RunPatch,
    ) -> Result<Stored<RunRecord>, StorageError> {
        let patch = RunPatch {
            updated_at: Some(patch.updated_at.clone().unwrap_or_else(ids::timestamp)),
            ..patch
        };
        tracing::debug!(run_id = id, status = ?patch.status, mode = %self.mode(), "update run");
        match &self.backend {
            Backend::Remote(remote) => {
                let row = remote
                    .update(Collection::Runs, id, serde_json::to_value(&patch)?)
                    .await?;
                Ok(Stored::remote(decode(row)?))
            }
            Backend::Local(store) => Ok(local_ops::update_run(store, id, &patch)),
        }
    }

    // ── Artefacts ────────────────────────────────────────────────────────────

    /// Persist an artefact. Its run must exist in either mode.
    pub async fn save_artefact(
        &self,
        artefact: NewArtefact,
    ) -> Result<Stored<ArtefactRecord>, StorageError> {
        match &self.backend {
            Backend::Remote(remote) => {
                let artefact = NewArtefact {
                    kind: Some(artefact.kind.unwrap_or_else(|| DEFAULT_ARTEFACT_KIND.to_string())),
                    ..artefact
                };
                let row = remote
                    .insert(Collection::Artefacts, serde_json::to_value(&artefact)?)
                    .await?;
                Ok(Stored::remote(decode(row)?))
            }
            Backend::Local(store) => local_ops::save_artefact(store, artefact),
        }
    }

    /// Artefacts newest first, optionally restricted to an exact `run_id`.
    pub async fn list_artefacts(
        &self,
        run_id: Option<&str>,
    ) -> Result<Stored<Vec<ArtefactRecord>>, StorageError> {
        match &self.backend {
            Backend::Remote(remote) => {
                let query = match run_id {
                    Some(run_id) => SelectQuery::eq("run_id", run_id),
                    None => SelectQuery::all(),
                };
                let rows = remote.select_all(Collection::Artefacts, &query).await?;
                Ok(Stored::remote(decode_all(rows)?))
            }
            Backend::Local(store) => Ok(local_ops::list(
                store,
                Collection::Artefacts,
                |a: &ArtefactRecord| run_id.map_or(true, |id| a.run_id == id),
                None,
            )),
        }
    }

    // ── Audit ────────────────────────────────────────────────────────────────

    /// Append an audit event. Events are never updated or removed.
    pub async fn log_audit(
        &self,
        event: NewAuditEvent,
    ) -> Result<Stored<AuditRecord>, StorageError> {
        tracing::debug!(
            event_type = %event.event_type,
            run_id = ?event.run_id,
            mode = %self.mode(),
            "append audit event"
        );
        match &self.backend {
            Backend::Remote(remote) => {
                let row = remote
                    .insert(Collection::Audit, serde_json::to_value(&event)?)
                    .await?;
                Ok(Stored::remote(decode(row)?))
            }
            Backend::Local(store) => local_ops::log_audit(store, event),
        }
    }

    /// Newest audit events, at most `limit` (default [`DEFAULT_AUDIT_LIMIT`]).
    pub async fn list_audit(
        &self,
        limit: Option<usize>,
    ) -> Result<Stored<Vec<AuditRecord>>, StorageError> {
        self.query_audit(None, limit).await
    }

    /// Newest audit events about one run, at most `limit`.
    pub async fn list_run_audit(
        &self,
        run_id: &str,
        limit: Option<usize>,
    ) -> Result<Stored<Vec<AuditRecord>>, StorageError> {
        self.query_audit(Some(run_id), limit).await
    }

    async fn query_audit(
        &self,
        run_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Stored<Vec<AuditRecord>>, StorageError> {
        let limit = limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
        match &self.backend {
            Backend::Remote(remote) => {
                let query = match run_id {
                    Some(run_id) => SelectQuery::eq("run_id", run_id),
                    None => SelectQuery::all(),
                }
                .limit(limit);
                let mut rows: Vec<AuditRecord> =
                    decode_all(remote.select_all(Collection::Audit, &query).await?)?;
                rows.truncate(limit);
                Ok(Stored::remote(rows))
            }
            Backend::Local(store) => Ok(local_ops::list(
                store,
                Collection::Audit,
                |e: &AuditRecord| run_id.map_or(true, |id| e.run_id.as_deref() == Some(id)),
                Some(limit),
            )),
        }
    }
}

fn decode<T: DeserializeOwned>(row: serde_json::Value) -> Result<T, StorageError> {
    Ok(serde_json::from_value(row)?)
}

fn decode_all<T: DeserializeOwned>(rows: Vec<serde_json::Value>) -> Result<Vec<T>, StorageError> {
    rows.into_iter().map(decode).collect()
}

/// Local branch of every operation. Each read-modify-write holds the
/// store's lock, and the medium lease, for its whole cycle.
mod local_ops {
    use serde::de::DeserializeOwned;
    use serde::Serialize;

    use crate::envelope::{Durability, Stored};
    use crate::error::StorageError;
    use crate::ids;
    use crate::local::{LocalLock, LocalStore};
    use crate::record::{
        ArtefactRecord, AuditRecord, Collection, NewArtefact, NewAuditEvent, NewRun, RunPatch,
        RunRecord,
    };

    fn prepend<T: Serialize + Clone>(
        lock: &LocalLock<'_>,
        collection: Collection,
        mut rows: Vec<T>,
        record: T,
    ) -> (T, Durability) {
        rows.insert(0, record.clone());
        let durability = lock.set(collection, &rows);
        (record, durability)
    }

    fn assign_id(
        collection: Collection,
        requested: Option<String>,
        taken: impl Fn(&str) -> bool,
    ) -> Result<String, StorageError> {
        match requested {
            Some(id) if taken(&id) => Err(StorageError::DuplicateId { collection, id }),
            Some(id) => Ok(id),
            None => Ok(ids::generate()),
        }
    }

    pub(super) fn save_run(
        store: &LocalStore,
        run: NewRun,
    ) -> Result<Stored<RunRecord>, StorageError> {
        let lock = store.lock();
        let runs: Vec<RunRecord> = lock.get(Collection::Runs);
        let id = assign_id(Collection::Runs, run.id.clone(), |id| {
            runs.iter().any(|r| r.id == id)
        })?;
        let record = RunRecord::from_new(run, id, ids::timestamp());
        let (record, durability) = prepend(&lock, Collection::Runs, runs, record);
        Ok(Stored::local(Some(record), durability))
    }

    pub(super) fn get_run(store: &LocalStore, id: &str) -> Stored<RunRecord> {
        let runs: Vec<RunRecord> = store.get(Collection::Runs);
        let found = runs.into_iter().find(|r| r.id == id);
        Stored::local(found, Durability::Persisted)
    }

    pub(super) fn update_run(store: &LocalStore, id: &str, patch: &RunPatch) -> Stored<RunRecord> {
        let lock = store.lock();
        let mut runs: Vec<RunRecord> = lock.get(Collection::Runs);
        let Some(run) = runs.iter_mut().find(|r| r.id == id) else {
            tracing::debug!(run_id = id, "local update of unknown run");
            return Stored::local_not_found();
        };
        run.apply(patch);
        let updated = run.clone();
        let durability = lock.set(Collection::Runs, &runs);
        Stored::local(Some(updated), durability)
    }

    pub(super) fn save_artefact(
        store: &LocalStore,
        artefact: NewArtefact,
    ) -> Result<Stored<ArtefactRecord>, StorageError> {
        let lock = store.lock();
        let runs: Vec<RunRecord> = lock.get(Collection::Runs);
        if !runs.iter().any(|r| r.id == artefact.run_id) {
            return Err(StorageError::UnknownRun {
                run_id: artefact.run_id,
            });
        }
        let artefacts: Vec<ArtefactRecord> = lock.get(Collection::Artefacts);
        let id = assign_id(Collection::Artefacts, artefact.id.clone(), |id| {
            artefacts.iter().any(|a| a.id == id)
        })?;
        let record = ArtefactRecord::from_new(artefact, id, ids::timestamp());
        let (record, durability) = prepend(&lock, Collection::Artefacts, artefacts, record);
        Ok(Stored::local(Some(record), durability))
    }

    pub(super) fn log_audit(
        store: &LocalStore,
        event: NewAuditEvent,
    ) -> Result<Stored<AuditRecord>, StorageError> {
        let lock = store.lock();
        let audit: Vec<AuditRecord> = lock.get(Collection::Audit);
        let id = assign_id(Collection::Audit, event.id.clone(), |id| {
            audit.iter().any(|e| e.id == id)
        })?;
        let record = AuditRecord::from_new(event, id, ids::timestamp());
        let (record, durability) = prepend(&lock, Collection::Audit, audit, record);
        Ok(Stored::local(Some(record), durability))
    }

    pub(super) fn list<T: DeserializeOwned>(
        store: &LocalStore,
        collection: Collection,
        keep: impl Fn(&T) -> bool,
        limit: Option<usize>,
    ) -> Stored<Vec<T>> {
        let rows: Vec<T> = store.get(collection);
        let rows = rows
            .into_iter()
            .filter(|row| keep(row))
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Stored::local(Some(rows), Durability::Persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LocalConfig, RemoteConfig};
    use crate::envelope::Durability;
    use crate::local::MemoryMedium;
    use crate::record::{ActorType, AuditEventType, Impact, RunStatus};
    use crate::remote::MemoryRemoteStore;

    fn sample_run() -> NewRun {
        NewRun::new(ActorType::Teacher, "teacher-1", Impact::Formative, "w1", "v1")
            .with_input("Explain fractions")
    }

    fn artefact_for(run_id: &str) -> NewArtefact {
        NewArtefact {
            id: None,
            run_id: run_id.to_string(),
            kind: None,
            provider: Some("test".into()),
            model: None,
            content: "proposal text".into(),
        }
    }

    #[test]
    fn config_selects_backend() {
        let local = Persistence::from_config(&PersistenceConfig::default());
        assert_eq!(local.mode(), PersistenceMode::Local);

        let remote = Persistence::from_config(&PersistenceConfig {
            remote: Some(RemoteConfig {
                url: "https://db.example.com".into(),
                api_key: "k".into(),
                enabled: true,
                rest_path: "/rest/v1".into(),
            }),
            local: LocalConfig::default(),
        });
        assert_eq!(remote.mode(), PersistenceMode::Remote);
    }

    #[tokio::test]
    async fn local_save_assigns_id_and_timestamp() {
        let p = Persistence::local(LocalStore::in_memory());
        let stored = p.save_run(sample_run()).await.unwrap();
        assert!(stored.ok);
        assert_eq!(stored.mode, PersistenceMode::Local);
        let run = stored.data.unwrap();
        assert_eq!(run.id.len(), 36);
        assert!(run.created_at.is_some());
        assert_eq!(run.status, RunStatus::Created);
    }

    #[tokio::test]
    async fn local_save_keeps_caller_id_and_rejects_duplicates() {
        let p = Persistence::local(LocalStore::in_memory());
        let mut run = sample_run();
        run.id = Some("run-fixed".into());
        let stored = p.save_run(run.clone()).await.unwrap();
        assert_eq!(stored.data.unwrap().id, "run-fixed");
        let err = p.save_run(run).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateId { .. }));
    }

    #[tokio::test]
    async fn local_update_of_unknown_id_is_not_ok() {
        let p = Persistence::local(LocalStore::in_memory());
        let stored = p
            .update_run("missing", RunPatch::status(RunStatus::Failed))
            .await
            .unwrap();
        assert!(!stored.ok);
        assert_eq!(stored.data, None);
    }

    #[tokio::test]
    async fn remote_update_of_unknown_id_is_an_error() {
        let p = Persistence::remote(Arc::new(MemoryRemoteStore::new()));
        let err = p
            .update_run("missing", RunPatch::status(RunStatus::Failed))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend { .. }));
    }

    #[tokio::test]
    async fn update_stamps_updated_at() {
        let p = Persistence::local(LocalStore::in_memory());
        let run = p.save_run(sample_run()).await.unwrap().data.unwrap();
        assert_eq!(run.updated_at, None);
        let updated = p
            .update_run(&run.id, RunPatch::status(RunStatus::Running))
            .await
            .unwrap()
            .data
            .unwrap();
        assert!(updated.updated_at.is_some());
        assert_eq!(updated.created_at, run.created_at);
    }

    #[tokio::test]
    async fn remote_update_writes_updated_at_column() {
        let p = Persistence::remote(Arc::new(MemoryRemoteStore::new()));
        let run = p.save_run(sample_run()).await.unwrap().data.unwrap();
        p.update_run(&run.id, RunPatch::status(RunStatus::Running))
            .await
            .unwrap();
        let stored = p.get_run(&run.id).await.unwrap().data.unwrap();
        assert!(stored.updated_at.is_some());
    }

    #[tokio::test]
    async fn local_get_of_unknown_id_is_empty_but_ok() {
        let p = Persistence::local(LocalStore::in_memory());
        let stored = p.get_run("missing").await.unwrap();
        assert!(stored.ok);
        assert_eq!(stored.data, None);
    }

    #[tokio::test]
    async fn degraded_writes_still_return_the_record() {
        let medium = MemoryMedium::new();
        medium.refuse_writes(true);
        let p = Persistence::local(LocalStore::new(medium));
        let stored = p.save_run(sample_run()).await.unwrap();
        assert!(stored.ok);
        assert!(stored.durability.is_degraded());
        assert!(stored.data.is_some());
        let listed = p.list_runs().await.unwrap().data.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn local_artefact_for_unknown_run_is_rejected() {
        let p = Persistence::local(LocalStore::in_memory());
        let err = p.save_artefact(artefact_for("ghost")).await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownRun { ref run_id } if run_id == "ghost"));
    }

    #[tokio::test]
    async fn remote_artefact_defaults_kind() {
        let p = Persistence::remote(Arc::new(MemoryRemoteStore::new()));
        let run = p.save_run(sample_run()).await.unwrap().data.unwrap();
        let artefact = p
            .save_artefact(artefact_for(&run.id))
            .await
            .unwrap()
            .data
            .unwrap();
        assert_eq!(artefact.kind, "proposal");
    }

    #[tokio::test]
    async fn audit_can_be_listed_per_run() {
        let p = Persistence::local(LocalStore::in_memory());
        let a = p.save_run(sample_run()).await.unwrap().data.unwrap();
        let b = p.save_run(sample_run()).await.unwrap().data.unwrap();
        p.log_audit(NewAuditEvent::for_run(AuditEventType::TeacherGateApproved, &a.id))
            .await
            .unwrap();
        p.log_audit(NewAuditEvent::for_run(AuditEventType::TeacherGateRejected, &b.id))
            .await
            .unwrap();
        let for_a = p.list_run_audit(&a.id, None).await.unwrap().data.unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].event_type, AuditEventType::TeacherGateApproved);
    }

    #[tokio::test]
    async fn remote_backend_errors_propagate() {
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.fail_collection(Collection::Runs, "permission denied");
        let p = Persistence::remote(remote);
        let err = p.list_runs().await.unwrap_err();
        assert_eq!(err.to_string(), "backend error on runs: permission denied");
    }

    #[tokio::test]
    async fn local_envelope_is_persisted_when_medium_accepts() {
        let p = Persistence::local(LocalStore::in_memory());
        let stored = p.save_run(sample_run()).await.unwrap();
        assert_eq!(stored.durability, Durability::Persisted);
    }
}
