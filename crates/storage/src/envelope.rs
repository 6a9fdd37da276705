use std::fmt;

use serde::{Deserialize, Serialize};

/// Which backend served an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    Remote,
    Local,
}

impl PersistenceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PersistenceMode::Remote => "remote",
            PersistenceMode::Local => "local",
        }
    }
}

impl fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the result of a write actually reached its medium.
///
/// Local writes are best-effort: when the medium refuses a write the
/// operation still succeeds with its in-memory result, tagged `Degraded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Durability {
    Persisted,
    Degraded { reason: String },
}

impl Durability {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Durability::Degraded { .. })
    }
}

/// Uniform result envelope returned by every facade operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<T> {
    pub ok: bool,
    pub mode: PersistenceMode,
    pub data: Option<T>,
    pub durability: Durability,
}

impl<T> Stored<T> {
    pub(crate) fn remote(data: T) -> Self {
        Stored {
            ok: true,
            mode: PersistenceMode::Remote,
            data: Some(data),
            durability: Durability::Persisted,
        }
    }

    pub(crate) fn local(data: Option<T>, durability: Durability) -> Self {
        Stored {
            ok: true,
            mode: PersistenceMode::Local,
            data,
            durability,
        }
    }

    /// Local update of an id the store does not hold.
    pub(crate) fn local_not_found() -> Self {
        Stored {
            ok: false,
            mode: PersistenceMode::Local,
            data: None,
            durability: Durability::Persisted,
        }
    }

    /// Consume the envelope, keeping only the payload.
    pub fn into_data(self) -> Option<T> {
        self.data
    }
}
