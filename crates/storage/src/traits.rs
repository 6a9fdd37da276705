use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::Collection;

/// An exact-match filter on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

/// Parameters for [`RemoteStore::select_all`].
///
/// Results are always ordered by the server-assigned `created_at`, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectQuery {
    pub filter: Option<Filter>,
    /// Maximum number of rows; `None` = unbounded.
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        SelectQuery {
            filter: Some(Filter {
                column: column.into(),
                value: value.into(),
            }),
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Contract of the remote relational backend.
///
/// Rows travel as JSON objects; typing happens in the facade. The backend
/// owns identifier and `created_at` assignment on insert.
///
/// ## Errors
///
/// Every backend-reported failure is returned as
/// [`StorageError::Backend`] and is neither retried nor masked here.
/// There is no client-side timeout: a hung backend blocks only its caller.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` so one facade can be shared
/// across async tasks.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert one row and return it as stored.
    async fn insert(
        &self,
        collection: Collection,
        row: serde_json::Value,
    ) -> Result<serde_json::Value, StorageError>;

    /// Select rows ordered by `created_at` descending.
    async fn select_all(
        &self,
        collection: Collection,
        query: &SelectQuery,
    ) -> Result<Vec<serde_json::Value>, StorageError>;

    /// Select exactly one row by id. A missing row is a backend error.
    async fn select_one(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<serde_json::Value, StorageError>;

    /// Apply a partial update to one row by id and return the updated row.
    /// A missing row is a backend error.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<serde_json::Value, StorageError>;
}
