//! Two independent local stores over one directory, as two CLI sessions
//! pointed at the same `RUNLEDGER_LOCAL_DIR` would be.

use std::path::PathBuf;
use std::thread;

use runledger_storage::{
    ActorType, AuditEventType, FileMedium, Impact, LocalStore, NewAuditEvent, NewRun, Persistence,
    LEASE_FILE,
};

const EVENTS_PER_SESSION: usize = 50;

fn session(dir: PathBuf, tag: &'static str) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let store = Persistence::local(LocalStore::new(FileMedium::new(dir)));
            let mut persisted = 0;
            for n in 0..EVENTS_PER_SESSION {
                let event =
                    NewAuditEvent::for_run(AuditEventType::TeacherGateApproved, format!("{tag}-{n}"));
                let stored = store.log_audit(event).await.unwrap();
                assert!(stored.ok);
                if !stored.durability.is_degraded() {
                    persisted += 1;
                }
            }
            persisted
        })
    })
}

#[test]
fn concurrent_sessions_keep_every_persisted_audit_event() {
    let dir = tempfile::tempdir().unwrap();
    let a = session(dir.path().to_path_buf(), "a");
    let b = session(dir.path().to_path_buf(), "b");
    let persisted = a.join().unwrap() + b.join().unwrap();
    assert_eq!(persisted, 2 * EVENTS_PER_SESSION);

    let rt = tokio::runtime::Runtime::new().unwrap();
    let reopened = Persistence::local(LocalStore::new(FileMedium::new(dir.path())));
    let audit = rt
        .block_on(reopened.list_audit(Some(usize::MAX)))
        .unwrap()
        .data
        .unwrap();
    assert_eq!(audit.len(), persisted);
    for tag in ["a", "b"] {
        let ours = audit
            .iter()
            .filter(|e| e.run_id.as_deref().is_some_and(|id| id.starts_with(tag)))
            .count();
        assert_eq!(ours, EVENTS_PER_SESSION, "session {tag}");
    }
    assert!(!dir.path().join(LEASE_FILE).exists());
}

#[test]
fn concurrent_sessions_keep_every_run() {
    let dir = tempfile::tempdir().unwrap();
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let dir = dir.path().to_path_buf();
            thread::spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                rt.block_on(async move {
                    let store = Persistence::local(LocalStore::new(FileMedium::new(dir)));
                    for _ in 0..20 {
                        let run =
                            NewRun::new(ActorType::Student, "s-1", Impact::Formative, "w1", "v1");
                        assert!(!store.save_run(run).await.unwrap().durability.is_degraded());
                    }
                })
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let rt = tokio::runtime::Runtime::new().unwrap();
    let reopened = Persistence::local(LocalStore::new(FileMedium::new(dir.path())));
    let runs = rt.block_on(reopened.list_runs()).unwrap().data.unwrap();
    assert_eq!(runs.len(), 40);
}
