use crate::record::Collection;

/// All errors that can be returned by the persistence facade or a remote store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The remote backend rejected the operation (constraint violation,
    /// network failure, auth failure). Propagated unmodified, never retried.
    #[error("backend error on {collection}: {message}")]
    Backend {
        collection: Collection,
        message: String,
        /// Backend-specific error code (e.g. a PostgREST `PGRST116`), when reported.
        code: Option<String>,
    },

    /// An artefact was saved against a run id the local store does not hold.
    #[error("artefact references unknown run: {run_id}")]
    UnknownRun { run_id: String },

    /// A caller-supplied id is already taken in the local store.
    #[error("duplicate id {id} in {collection}")]
    DuplicateId { collection: Collection, id: String },

    /// A row could not be converted to or from its typed record.
    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Shorthand for a backend error without a code.
    pub fn backend(collection: Collection, message: impl Into<String>) -> Self {
        StorageError::Backend {
            collection,
            message: message.into(),
            code: None,
        }
    }
}

/// Failure of the key-value medium underneath the local store.
///
/// Never surfaces through the facade: reads fall back to an empty
/// collection and writes are reported as degraded durability.
#[derive(Debug, thiserror::Error)]
pub enum MediumError {
    #[error("medium io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("medium unavailable: {0}")]
    Unavailable(String),
}
