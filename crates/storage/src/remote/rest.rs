//! Remote store speaking the PostgREST dialect of the hosted relational backend.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` to avoid
//! blocking the async runtime. No retries and no client-side timeout: a
//! failed call surfaces as [`StorageError::Backend`] to the caller.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::RemoteConfig;
use crate::error::StorageError;
use crate::record::Collection;
use crate::traits::{RemoteStore, SelectQuery};

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Remote store speaking the PostgREST table API.
///
/// - `{url}{rest_path}/{table}` per collection
/// - `apikey` and `Authorization: Bearer` headers from the configured key
/// - `order=created_at.desc` on every select, `col=eq.value` filters
#[derive(Debug, Clone)]
pub struct RestRemoteStore {
    base_url: String,
    api_key: String,
}

enum Method {
    Get,
    Post,
    Patch,
}

struct Call {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    single: bool,
}

impl RestRemoteStore {
    pub fn new(config: &RemoteConfig) -> Self {
        RestRemoteStore {
            base_url: format!(
                "{}/{}",
                config.url.trim_end_matches('/'),
                config.rest_path.trim_matches('/')
            ),
            api_key: config.api_key.clone(),
        }
    }

    /// Endpoint for one collection's table.
    pub fn table_url(&self, collection: Collection) -> String {
        format!("{}/{}", self.base_url, collection.table())
    }

    /// Query pairs for a select: `select=*`, ordering, filter and limit.
    pub fn select_params(query: &SelectQuery) -> Vec<(String, String)> {
        let mut params = vec![
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), "created_at.desc".to_string()),
        ];
        if let Some(filter) = &query.filter {
            params.push((filter.column.clone(), format!("eq.{}", filter.value)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    async fn execute(&self, collection: Collection, call: Call) -> Result<Value, StorageError> {
        let api_key = self.api_key.clone();
        tokio::task::spawn_blocking(move || send(collection, &api_key, call))
            .await
            .map_err(|e| StorageError::backend(collection, format!("task join error: {e}")))?
    }
}

fn send(collection: Collection, api_key: &str, call: Call) -> Result<Value, StorageError> {
    let config = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build();
    let agent: ureq::Agent = config.into();
    let bearer = format!("Bearer {api_key}");
    let accept = if call.single {
        SINGLE_OBJECT
    } else {
        "application/json"
    };

    let transport = |e: ureq::Error| StorageError::backend(collection, e.to_string());
    let mut response = match call.method {
        Method::Get => {
            let mut request = agent.get(&call.url);
            for (k, v) in &call.query {
                request = request.query(k, v);
            }
            request
                .header("apikey", api_key)
                .header("Authorization", &bearer)
                .header("Accept", accept)
                .call()
                .map_err(transport)?
        }
        Method::Post | Method::Patch => {
            let mut request = match call.method {
                Method::Patch => agent.patch(&call.url),
                _ => agent.post(&call.url),
            };
            for (k, v) in &call.query {
                request = request.query(k, v);
            }
            request
                .header("apikey", api_key)
                .header("Authorization", &bearer)
                .header("Accept", accept)
                .header("Prefer", "return=representation")
                .send_json(call.body.unwrap_or(Value::Null))
                .map_err(transport)?
        }
    };

    let status = response.status().as_u16();
    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|e| StorageError::backend(collection, format!("failed to read response: {e}")))?;

    if !(200..300).contains(&status) {
        return Err(backend_error(collection, status, &text));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| {
        StorageError::backend(collection, format!("failed to parse response as JSON: {e}"))
    })
}

/// Convert an error response into a backend error, keeping the PostgREST
/// `message` and `code` when the body carries them.
pub(crate) fn backend_error(collection: Collection, status: u16, body: &str) -> StorageError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}: {}", body.trim()));
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_str)
        .map(str::to_string);
    StorageError::Backend {
        collection,
        message,
        code,
    }
}

/// `return=representation` on an insert yields a one-element array.
fn first_row(collection: Collection, value: Value) -> Result<Value, StorageError> {
    let row = match value {
        Value::Array(rows) => rows.into_iter().next(),
        row @ Value::Object(_) => Some(row),
        _ => None,
    };
    row.ok_or_else(|| StorageError::backend(collection, "insert returned no representation"))
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn insert(&self, collection: Collection, row: Value) -> Result<Value, StorageError> {
        let value = self
            .execute(
                collection,
                Call {
                    method: Method::Post,
                    url: self.table_url(collection),
                    query: vec![("select".to_string(), "*".to_string())],
                    body: Some(row),
                    single: false,
                },
            )
            .await?;
        first_row(collection, value)
    }

    async fn select_all(
        &self,
        collection: Collection,
        query: &SelectQuery,
    ) -> Result<Vec<Value>, StorageError> {
        let value = self
            .execute(
                collection,
                Call {
                    method: Method::Get,
                    url: self.table_url(collection),
                    query: Self::select_params(query),
                    body: None,
                    single: false,
                },
            )
            .await?;
        match value {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Err(StorageError::backend(
                collection,
                format!("expected an array of rows, got {other}"),
            )),
        }
    }

    async fn select_one(&self, collection: Collection, id: &str) -> Result<Value, StorageError> {
        self.execute(
            collection,
            Call {
                method: Method::Get,
                url: self.table_url(collection),
                query: vec![
                    ("select".to_string(), "*".to_string()),
                    ("id".to_string(), format!("eq.{id}")),
                ],
                body: None,
                single: true,
            },
        )
        .await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
    ) -> Result<Value, StorageError> {
        self.execute(
            collection,
            Call {
                method: Method::Patch,
                url: self.table_url(collection),
                query: vec![
                    ("select".to_string(), "*".to_string()),
                    ("id".to_string(), format!("eq.{id}")),
                ],
                body: Some(patch),
                single: true,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RemoteConfig {
        RemoteConfig {
            url: "https://db.example.com/".to_string(),
            api_key: "anon-key".to_string(),
            enabled: true,
            rest_path: "/rest/v1".to_string(),
        }
    }

    #[test]
    fn table_urls_join_base_path_and_table() {
        let store = RestRemoteStore::new(&config());
        assert_eq!(
            store.table_url(Collection::Audit),
            "https://db.example.com/rest/v1/audit_log"
        );
    }

    #[test]
    fn select_params_order_filter_and_limit() {
        let params = RestRemoteStore::select_params(&SelectQuery::eq("run_id", "r1").limit(5));
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("run_id".to_string(), "eq.r1".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn backend_error_keeps_postgrest_message_and_code() {
        let body = r#"{"code":"PGRST116","message":"JSON object requested, multiple (or no) rows returned"}"#;
        match backend_error(Collection::Runs, 406, body) {
            StorageError::Backend { message, code, .. } => {
                assert_eq!(code.as_deref(), Some("PGRST116"));
                assert!(message.starts_with("JSON object requested"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn backend_error_falls_back_to_status_and_body() {
        match backend_error(Collection::Runs, 502, "bad gateway") {
            StorageError::Backend { message, code, .. } => {
                assert_eq!(message, "HTTP 502: bad gateway");
                assert_eq!(code, None);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn insert_representation_is_unwrapped() {
        let rows = serde_json::json!([{"id": "r1"}]);
        assert_eq!(
            first_row(Collection::Runs, rows).unwrap(),
            serde_json::json!({"id": "r1"})
        );
        assert!(first_row(Collection::Runs, serde_json::json!([])).is_err());
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_backend_error() {
        let store = RestRemoteStore::new(&RemoteConfig {
            url: "http://127.0.0.1:1".to_string(),
            ..config()
        });
        let err = store
            .select_all(Collection::Runs, &SelectQuery::all())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend { collection: Collection::Runs, .. }));
    }
}
