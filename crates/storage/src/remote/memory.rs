//! In-process stand-in for the remote relational backend.
//!
//! Behaves like the hosted tables: the server assigns `id` and
//! `created_at`, the foreign key from `artefacts.run_id` to `runs` is
//! enforced, and reads come back newest first. Failures can be injected per
//! collection to exercise backend error propagation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StorageError;
use crate::ids;
use crate::record::Collection;
use crate::traits::{RemoteStore, SelectQuery};

const NO_ROWS_CODE: &str = "PGRST116";
const FOREIGN_KEY_CODE: &str = "23503";
const UNIQUE_CODE: &str = "23505";

#[derive(Default)]
struct Tables {
    /// Rows per collection in insertion order.
    rows: HashMap<Collection, Vec<Map<String, Value>>>,
    failing: HashMap<Collection, String>,
}

impl Tables {
    fn table(&self, collection: Collection) -> &[Map<String, Value>] {
        self.rows.get(&collection).map(Vec::as_slice).unwrap_or(&[])
    }

    fn contains_id(&self, collection: Collection, id: &str) -> bool {
        self.table(collection)
            .iter()
            .any(|row| row.get("id").and_then(Value::as_str) == Some(id))
    }

    fn check_failing(&self, collection: Collection) -> Result<(), StorageError> {
        match self.failing.get(&collection) {
            Some(message) => Err(StorageError::backend(collection, message.clone())),
            None => Ok(()),
        }
    }
}

/// Remote backend kept in process memory.
#[derive(Default)]
pub struct MemoryRemoteStore {
    tables: Mutex<Tables>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `collection` fail with `message` until healed.
    pub fn fail_collection(&self, collection: Collection, message: impl Into<String>) {
        self.lock().failing.insert(collection, message.into());
    }

    pub fn heal(&self, collection: Collection) {
        self.lock().failing.remove(&collection);
    }

    /// Number of rows currently held in `collection`.
    pub fn row_count(&self, collection: Collection) -> usize {
        self.lock().table(collection).len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn into_object(collection: Collection, value: Value) -> Result<Map<String, Value>, StorageError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::backend(
            collection,
            format!("expected a JSON object, got {other}"),
        )),
    }
}

fn missing_row(collection: Collection, id: &str) -> StorageError {
    StorageError::Backend {
        collection,
        message: format!("no row with id {id}"),
        code: Some(NO_ROWS_CODE.to_string()),
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn insert(&self, collection: Collection, row: Value) -> Result<Value, StorageError> {
        let mut tables = self.lock();
        tables.check_failing(collection)?;
        let mut row = into_object(collection, row)?;

        let id = match row.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => ids::generate(),
        };
        if tables.contains_id(collection, &id) {
            return Err(StorageError::Backend {
                collection,
                message: format!("duplicate key value violates unique constraint on id {id}"),
                code: Some(UNIQUE_CODE.to_string()),
            });
        }

        if collection == Collection::Artefacts {
            if let Some(run_id) = row.get("run_id").and_then(Value::as_str) {
                if !tables.contains_id(Collection::Runs, run_id) {
                    return Err(StorageError::Backend {
                        collection,
                        message: format!(
                            "insert on {collection} violates foreign key: run {run_id} does not exist"
                        ),
                        code: Some(FOREIGN_KEY_CODE.to_string()),
                    });
                }
            }
        }

        row.insert("id".to_string(), Value::String(id));
        row.insert("created_at".to_string(), Value::String(ids::timestamp()));
        tables.rows.entry(collection).or_default().push(row.clone());
        Ok(Value::Object(row))
    }

    async fn select_all(
        &self,
        collection: Collection,
        query: &SelectQuery,
    ) -> Result<Vec<Value>, StorageError> {
        let tables = self.lock();
        tables.check_failing(collection)?;
        let rows = tables
            .table(collection)
            .iter()
            .rev()
            .filter(|row| match &query.filter {
                Some(f) => row.get(&f.column).and_then(Value::as_str) == Some(f.value.as_str()),
                None => true,
            })
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|row| Value::Object(row.clone()))
            .collect();
        Ok(rows)
    }

    async fn select_one(&self, collection: Collection, id: &str) -> Result<Value, StorageError> {
        let tables = self.lock();
        tables.check_failing(collection)?;
        tables
            .table(collection)
            .iter()
            .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
            .map(|row| Value::Object(row.clone()))
            .ok_or_else(|| missing_row(collection, id))
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
    ) -> Result<Value, StorageError> {
        let mut tables = self.lock();
        tables.check_failing(collection)?;
        let patch = into_object(collection, patch)?;
        let row = tables
            .rows
            .get_mut(&collection)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
            })
            .ok_or_else(|| missing_row(collection, id))?;
        for (key, value) in patch {
            if key != "id" {
                row.insert(key, value);
            }
        }
        Ok(Value::Object(row.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_id_and_created_at() {
        let store = MemoryRemoteStore::new();
        let row = store
            .insert(Collection::Runs, json!({"status": "created"}))
            .await
            .unwrap();
        assert!(row["id"].as_str().is_some());
        assert!(row["created_at"].as_str().is_some());
    }

    #[tokio::test]
    async fn select_all_is_newest_first_and_filtered() {
        let store = MemoryRemoteStore::new();
        store.insert(Collection::Runs, json!({"id": "r1"})).await.unwrap();
        store.insert(Collection::Runs, json!({"id": "r2"})).await.unwrap();
        store
            .insert(Collection::Artefacts, json!({"run_id": "r1", "n": 1}))
            .await
            .unwrap();
        store
            .insert(Collection::Artefacts, json!({"run_id": "r2", "n": 2}))
            .await
            .unwrap();
        store
            .insert(Collection::Artefacts, json!({"run_id": "r1", "n": 3}))
            .await
            .unwrap();

        let runs = store
            .select_all(Collection::Runs, &SelectQuery::all())
            .await
            .unwrap();
        assert_eq!(runs[0]["id"], "r2");

        let for_r1 = store
            .select_all(Collection::Artefacts, &SelectQuery::eq("run_id", "r1"))
            .await
            .unwrap();
        let ns: Vec<i64> = for_r1.iter().map(|r| r["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![3, 1]);

        let limited = store
            .select_all(Collection::Artefacts, &SelectQuery::all().limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn artefact_for_unknown_run_violates_foreign_key() {
        let store = MemoryRemoteStore::new();
        let err = store
            .insert(Collection::Artefacts, json!({"run_id": "ghost", "content": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Backend { code: Some(ref c), .. } if c == FOREIGN_KEY_CODE
        ));
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let store = MemoryRemoteStore::new();
        store.insert(Collection::Runs, json!({"id": "r1"})).await.unwrap();
        let err = store
            .insert(Collection::Runs, json!({"id": "r1"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Backend { code: Some(ref c), .. } if c == UNIQUE_CODE
        ));
    }

    #[tokio::test]
    async fn update_merges_and_keeps_id() {
        let store = MemoryRemoteStore::new();
        store
            .insert(Collection::Runs, json!({"id": "r1", "status": "created", "notes": null}))
            .await
            .unwrap();
        let updated = store
            .update(Collection::Runs, "r1", json!({"status": "running", "id": "other"}))
            .await
            .unwrap();
        assert_eq!(updated["id"], "r1");
        assert_eq!(updated["status"], "running");
    }

    #[tokio::test]
    async fn missing_rows_are_backend_errors() {
        let store = MemoryRemoteStore::new();
        assert!(store.select_one(Collection::Runs, "nope").await.is_err());
        assert!(store
            .update(Collection::Runs, "nope", json!({"status": "failed"}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn injected_failure_applies_until_healed() {
        let store = MemoryRemoteStore::new();
        store.fail_collection(Collection::Audit, "connection reset");
        let err = store
            .insert(Collection::Audit, json!({"event_type": "teacher_gate_rejected"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "backend error on audit_log: connection reset");
        store.heal(Collection::Audit);
        assert!(store
            .insert(Collection::Audit, json!({"event_type": "teacher_gate_rejected"}))
            .await
            .is_ok());
    }
}
