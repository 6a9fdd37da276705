//! Persistence for pedagogical runs, their artefacts and the audit trail.
//!
//! [`Persistence`] is the one entry point. It routes every operation either
//! to a remote relational backend ([`RemoteStore`]) or to the [`LocalStore`]
//! fallback, and wraps each result in a [`Stored`] envelope naming the
//! backend that served it.

mod config;
pub mod conformance;
mod envelope;
mod error;
mod facade;
pub mod ids;
mod local;
mod record;
pub mod remote;
mod traits;

pub use config::{
    LocalConfig, PersistenceConfig, RemoteConfig, ENV_LOCAL_DIR, ENV_REMOTE_ENABLED,
    ENV_REMOTE_KEY, ENV_REMOTE_URL,
};
pub use envelope::{Durability, PersistenceMode, Stored};
pub use error::{MediumError, StorageError};
pub use facade::{Persistence, DEFAULT_AUDIT_LIMIT};
pub use local::{
    FileMedium, KeyValueMedium, LocalLock, LocalStore, MediumLease, MemoryMedium, LEASE_FILE,
};
pub use record::{
    ActorType, ArtefactRecord, AuditEventType, AuditRecord, Collection, Impact, NewArtefact,
    NewAuditEvent, NewRun, RunPatch, RunRecord, RunStatus, DEFAULT_ARTEFACT_KIND,
};
pub use remote::{MemoryRemoteStore, RestRemoteStore};
pub use traits::{Filter, RemoteStore, SelectQuery};
