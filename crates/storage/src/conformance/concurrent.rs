use std::future::Future;
use std::sync::Arc;

use super::{expect, make_run, saved_run, TestResult};
use crate::error::StorageError;
use crate::facade::Persistence;
use crate::record::{AuditEventType, NewAuditEvent};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<F, Fut>(factory: &F) -> Vec<TestResult>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Persistence>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_saves_all_land",
        concurrent_saves_all_land(Arc::new(factory().await)).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_audit_appends_all_land",
        concurrent_audit_appends_all_land(Arc::new(factory().await)).await,
    ));

    results
}

/// N tasks save a run each through one shared facade; none is lost.
async fn concurrent_saves_all_land(p: Arc<Persistence>) -> Result<(), String> {
    let mut handles = Vec::new();
    for i in 0..N {
        let p = p.clone();
        handles.push(tokio::spawn(async move {
            p.save_run(make_run(&format!("prompt-{i}"))).await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }
    let listed = p
        .list_runs()
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("no data")?;
    expect("runs stored", N, listed.len())
}

/// N tasks append audit events for the same run; the trail keeps all of them.
async fn concurrent_audit_appends_all_land(p: Arc<Persistence>) -> Result<(), String> {
    let run = saved_run(&p, "prompt").await?;
    let mut handles = Vec::new();
    for _ in 0..N {
        let p = p.clone();
        let run_id = run.id.clone();
        handles.push(tokio::spawn(async move {
            p.log_audit(NewAuditEvent::for_run(
                AuditEventType::TeacherGateApproved,
                run_id,
            ))
            .await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }
    let trail = p
        .list_run_audit(&run.id, None)
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("no data")?;
    expect("events stored", N, trail.len())
}
