use std::sync::Arc;

use runledger_storage::conformance::run_conformance_suite;
use runledger_storage::{FileMedium, LocalStore, MemoryRemoteStore, Persistence};

#[tokio::test]
async fn local_in_memory_store_conforms() {
    let report = run_conformance_suite(|| async { Persistence::local(LocalStore::in_memory()) }).await;
    assert!(report.failed == 0, "{report}");
}

#[tokio::test]
async fn local_file_store_conforms() {
    let root = tempfile::tempdir().unwrap();
    let counter = std::sync::atomic::AtomicUsize::new(0);
    let report = run_conformance_suite(|| {
        let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let dir = root.path().join(format!("store-{n}"));
        async move { Persistence::local(LocalStore::new(FileMedium::new(dir))) }
    })
    .await;
    assert!(report.failed == 0, "{report}");
}

#[tokio::test]
async fn memory_remote_store_conforms() {
    let report = run_conformance_suite(|| async {
        Persistence::remote(Arc::new(MemoryRemoteStore::new()))
    })
    .await;
    assert!(report.failed == 0, "{report}");
}

#[tokio::test]
async fn report_counts_every_test() {
    let report = run_conformance_suite(|| async { Persistence::local(LocalStore::in_memory()) }).await;
    assert_eq!(report.total, report.results.len());
    assert_eq!(report.passed + report.failed, report.total);
    assert!(report.results.iter().any(|r| r.category == "concurrent"));
    let (passed, total) = report.category("audit");
    assert!(total > 0);
    assert_eq!(passed, total);
    assert_eq!(report.failures().count(), 0);
    assert!(report.to_string().starts_with("persistence conformance"));
}
