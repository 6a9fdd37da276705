//! Local fallback store: one JSON array per collection under a namespaced key.
//!
//! The store degrades instead of failing. An unreadable or corrupt key reads
//! as an empty collection, and a refused write is reported as
//! [`Durability::Degraded`] while the caller keeps its in-memory result.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::envelope::Durability;
use crate::error::MediumError;
use crate::record::Collection;

/// Persistent key-value medium underneath the local store.
pub trait KeyValueMedium: Send + Sync {
    /// Read the raw value stored under `key`, `None` if never written.
    fn read(&self, key: &str) -> Result<Option<String>, MediumError>;

    /// Replace the value stored under `key`.
    fn write(&self, key: &str, value: &str) -> Result<(), MediumError>;

    /// Exclusive lease over the whole medium, held across a read-modify-write.
    ///
    /// Media shared between processes must return one; `None` means the
    /// in-process lock of [`LocalStore`] is sufficient.
    fn lease(&self) -> Result<Option<MediumLease>, MediumError> {
        Ok(None)
    }
}

/// A held lease file. Removed when dropped.
#[derive(Debug)]
pub struct MediumLease {
    path: PathBuf,
    _file: fs::File,
}

impl Drop for MediumLease {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "lease file not removed");
        }
    }
}

/// Name of the lease file guarding a [`FileMedium`] directory.
pub const LEASE_FILE: &str = ".runledger.lock";

/// How long a writer waits for the lease before giving up.
const LEASE_TIMEOUT: Duration = Duration::from_secs(10);

/// A lease file older than this was left by a crashed writer and is broken.
const LEASE_STALE_AFTER: Duration = Duration::from_secs(30);

const LEASE_POLL: Duration = Duration::from_millis(5);

/// One JSON file per key inside a directory.
///
/// Writes land in a uniquely named temp file first and are renamed over the
/// target, so a reader never observes a half-written collection. Processes
/// sharing the directory serialize their read-modify-write cycles through
/// a lease file created with `create_new`.
#[derive(Debug, Clone)]
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileMedium { dir: dir.into() }
    }

    fn lease_path(&self) -> PathBuf {
        self.dir.join(LEASE_FILE)
    }

    /// Remove the lease file if it is older than [`LEASE_STALE_AFTER`].
    fn break_stale_lease(&self, path: &Path) {
        let age = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());
        if matches!(age, Some(age) if age >= LEASE_STALE_AFTER) {
            tracing::warn!(path = %path.display(), "breaking stale lease");
            let _ = fs::remove_file(path);
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `runledger:runs:v1` → `<dir>/runledger_runs_v1.json`
    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl KeyValueMedium for FileMedium {
    fn read(&self, key: &str) -> Result<Option<String>, MediumError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), MediumError> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn lease(&self) -> Result<Option<MediumLease>, MediumError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.lease_path();
        let started = Instant::now();
        loop {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok(Some(MediumLease { path, _file: file })),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if started.elapsed() >= LEASE_TIMEOUT {
                        return Err(MediumError::Unavailable(format!(
                            "timed out waiting for lease {}",
                            path.display()
                        )));
                    }
                    self.break_stale_lease(&path);
                    std::thread::sleep(LEASE_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// In-process medium. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    entries: Arc<Mutex<HashMap<String, String>>>,
    refuse_writes: Arc<AtomicBool>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, as a full or revoked medium would.
    pub fn refuse_writes(&self, refuse: bool) {
        self.refuse_writes.store(refuse, Ordering::SeqCst);
    }

    /// Overwrite a key with arbitrary raw content.
    pub fn put_raw(&self, key: &str, raw: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), raw.to_string());
    }
}

impl KeyValueMedium for MemoryMedium {
    fn read(&self, key: &str) -> Result<Option<String>, MediumError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| MediumError::Unavailable(format!("lock poisoned: {e}")))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), MediumError> {
        if self.refuse_writes.load(Ordering::SeqCst) {
            return Err(MediumError::Unavailable("medium refused write".to_string()));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| MediumError::Unavailable(format!("lock poisoned: {e}")))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Collection-level get/set over a [`KeyValueMedium`].
pub struct LocalStore {
    medium: Box<dyn KeyValueMedium>,
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(medium: impl KeyValueMedium + 'static) -> Self {
        LocalStore {
            medium: Box::new(medium),
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryMedium::new())
    }

    /// Read a whole collection, newest first. Falls back to empty.
    pub fn get<T: DeserializeOwned>(&self, collection: Collection) -> Vec<T> {
        let key = collection.local_key();
        let raw = match self.medium.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(key, error = %e, "local medium unreadable, using empty collection");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(key, error = %e, "local collection corrupt, using empty collection");
                Vec::new()
            }
        }
    }

    /// Overwrite a whole collection. Never fails; reports durability.
    ///
    /// Callers that read the collection first should go through
    /// [`LocalStore::lock`] and [`LocalLock::set`] instead.
    pub fn set<T: Serialize>(&self, collection: Collection, records: &[T]) -> Durability {
        let key = collection.local_key();
        let raw = match serde_json::to_string(records) {
            Ok(raw) => raw,
            Err(e) => return degraded(key, e.to_string()),
        };
        match self.medium.write(key, &raw) {
            Ok(()) => Durability::Persisted,
            Err(e) => degraded(key, e.to_string()),
        }
    }

    /// Serialize read-modify-write cycles of callers sharing this store, and
    /// of other processes sharing its medium.
    pub fn lock(&self) -> LocalLock<'_> {
        let guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let lease = self.medium.lease().map_err(|e| e.to_string());
        LocalLock {
            store: self,
            lease,
            _guard: guard,
        }
    }
}

/// A held read-modify-write cycle on a [`LocalStore`].
///
/// When the medium lease could not be taken every write through the lock is
/// skipped and reported degraded.
pub struct LocalLock<'a> {
    store: &'a LocalStore,
    // Released before the mutex guard.
    lease: Result<Option<MediumLease>, String>,
    _guard: MutexGuard<'a, ()>,
}

impl LocalLock<'_> {
    pub fn get<T: DeserializeOwned>(&self, collection: Collection) -> Vec<T> {
        self.store.get(collection)
    }

    pub fn set<T: Serialize>(&self, collection: Collection, records: &[T]) -> Durability {
        match &self.lease {
            Ok(_) => self.store.set(collection, records),
            Err(reason) => degraded(collection.local_key(), reason.clone()),
        }
    }
}

fn degraded(key: &str, reason: String) -> Durability {
    tracing::warn!(key, reason = %reason, "local write dropped");
    Durability::Degraded { reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_reads_as_empty() {
        let store = LocalStore::in_memory();
        let runs: Vec<serde_json::Value> = store.get(Collection::Runs);
        assert!(runs.is_empty());
    }

    #[test]
    fn corrupt_key_reads_as_empty() {
        let medium = MemoryMedium::new();
        medium.put_raw(Collection::Audit.local_key(), "{not json");
        let store = LocalStore::new(medium);
        let audit: Vec<serde_json::Value> = store.get(Collection::Audit);
        assert!(audit.is_empty());
    }

    #[test]
    fn set_then_get_preserves_order() {
        let store = LocalStore::in_memory();
        let rows = vec![serde_json::json!({"n": 2}), serde_json::json!({"n": 1})];
        assert_eq!(store.set(Collection::Runs, &rows), Durability::Persisted);
        let back: Vec<serde_json::Value> = store.get(Collection::Runs);
        assert_eq!(back, rows);
    }

    #[test]
    fn refused_write_is_degraded_not_an_error() {
        let medium = MemoryMedium::new();
        medium.refuse_writes(true);
        let store = LocalStore::new(medium.clone());
        let durability = store.set(Collection::Artefacts, &[serde_json::json!({"n": 1})]);
        assert!(durability.is_degraded());
        let back: Vec<serde_json::Value> = store.get(Collection::Artefacts);
        assert!(back.is_empty());
    }

    #[test]
    fn collections_use_separate_keys() {
        let store = LocalStore::in_memory();
        store.set(Collection::Runs, &[serde_json::json!({"r": 1})]);
        let artefacts: Vec<serde_json::Value> = store.get(Collection::Artefacts);
        assert!(artefacts.is_empty());
    }

    #[test]
    fn file_medium_round_trips_and_names_files_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path().join("nested"));
        assert_eq!(medium.read("runledger:runs:v1").unwrap(), None);
        medium.write("runledger:runs:v1", "[]").unwrap();
        assert_eq!(medium.read("runledger:runs:v1").unwrap().as_deref(), Some("[]"));
        let entries: Vec<_> = fs::read_dir(dir.path().join("nested")).unwrap().collect();
        assert_eq!(entries.len(), 1, "no temp files left behind");
        assert!(dir.path().join("nested/runledger_runs_v1.json").exists());
    }

    #[test]
    fn lease_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path());
        let lease = medium.lease().unwrap().unwrap();
        assert!(dir.path().join(LEASE_FILE).exists());
        let err = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.path().join(LEASE_FILE))
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        drop(lease);
        assert!(!dir.path().join(LEASE_FILE).exists());
        assert!(medium.lease().unwrap().is_some());
    }

    #[test]
    fn stale_lease_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEASE_FILE);
        let file = fs::File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - LEASE_STALE_AFTER * 2).unwrap();
        drop(file);
        let lease = FileMedium::new(dir.path()).lease().unwrap();
        assert!(lease.is_some());
    }

    #[test]
    fn memory_medium_needs_no_lease() {
        assert!(MemoryMedium::new().lease().unwrap().is_none());
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![serde_json::json!({"id": "a"})];
        LocalStore::new(FileMedium::new(dir.path())).set(Collection::Audit, &rows);
        let reopened = LocalStore::new(FileMedium::new(dir.path()));
        let back: Vec<serde_json::Value> = reopened.get(Collection::Audit);
        assert_eq!(back, rows);
    }
}
