use std::future::Future;

use serde_json::json;

use super::{expect, saved_run, TestResult};
use crate::facade::{Persistence, DEFAULT_AUDIT_LIMIT};
use crate::record::{AuditEventType, AuditRecord, NewAuditEvent};

pub(super) async fn run_audit_tests<F, Fut>(factory: &F) -> Vec<TestResult>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Persistence>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "audit",
        "log_then_list_round_trips_payload",
        log_then_list_round_trips_payload(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "list_is_newest_first",
        list_is_newest_first(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "list_respects_limit",
        list_respects_limit(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "default_limit_applies",
        default_limit_applies(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "event_without_run_is_accepted",
        event_without_run_is_accepted(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "list_run_audit_filters_by_run",
        list_run_audit_filters_by_run(&factory().await).await,
    ));

    results
}

async fn log(p: &Persistence, event: NewAuditEvent) -> Result<AuditRecord, String> {
    p.log_audit(event)
        .await
        .map_err(|e| format!("log_audit: {e}"))?
        .into_data()
        .ok_or_else(|| "log_audit returned no data".to_string())
}

async fn list(p: &Persistence, limit: Option<usize>) -> Result<Vec<AuditRecord>, String> {
    p.list_audit(limit)
        .await
        .map_err(|e| format!("list_audit: {e}"))?
        .into_data()
        .ok_or_else(|| "list_audit returned no data".to_string())
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn log_then_list_round_trips_payload(p: &Persistence) -> Result<(), String> {
    let run = saved_run(p, "prompt").await?;
    let payload = json!({"error": "model overloaded", "attempt": 1});
    let logged = log(
        p,
        NewAuditEvent::for_run(AuditEventType::RunFailedAfterTeacherGate, &run.id)
            .with_payload(payload.clone()),
    )
    .await?;
    let listed = list(p, None).await?;
    let got = listed.first().ok_or("event missing from list")?;
    expect("full record", &logged, got)?;
    expect(
        "event_type",
        AuditEventType::RunFailedAfterTeacherGate,
        got.event_type,
    )?;
    expect("run_id", Some(run.id.as_str()), got.run_id.as_deref())?;
    expect("payload", &payload, &got.payload)
}

async fn list_is_newest_first(p: &Persistence) -> Result<(), String> {
    let run = saved_run(p, "prompt").await?;
    let sequence = [
        AuditEventType::TeacherGateApproved,
        AuditEventType::RunCompletedAfterTeacherGate,
    ];
    for event_type in sequence {
        log(p, NewAuditEvent::for_run(event_type, &run.id)).await?;
    }
    let types: Vec<AuditEventType> = list(p, None)
        .await?
        .iter()
        .map(|e| e.event_type)
        .collect();
    expect(
        "order",
        vec![
            AuditEventType::RunCompletedAfterTeacherGate,
            AuditEventType::TeacherGateApproved,
        ],
        types,
    )
}

async fn list_respects_limit(p: &Persistence) -> Result<(), String> {
    let run = saved_run(p, "prompt").await?;
    let mut last = None;
    for _ in 0..5 {
        last = Some(log(p, NewAuditEvent::for_run(AuditEventType::TeacherGateApproved, &run.id)).await?);
    }
    let limited = list(p, Some(2)).await?;
    expect("limited length", 2, limited.len())?;
    expect(
        "newest kept",
        last.map(|e| e.id),
        limited.first().map(|e| e.id.clone()),
    )
}

async fn default_limit_applies(p: &Persistence) -> Result<(), String> {
    let run = saved_run(p, "prompt").await?;
    for _ in 0..DEFAULT_AUDIT_LIMIT + 5 {
        log(p, NewAuditEvent::for_run(AuditEventType::TeacherGateApproved, &run.id)).await?;
    }
    expect("default length", DEFAULT_AUDIT_LIMIT, list(p, None).await?.len())
}

async fn event_without_run_is_accepted(p: &Persistence) -> Result<(), String> {
    let event = NewAuditEvent {
        id: None,
        event_type: AuditEventType::RunReconciledStuck,
        run_id: None,
        payload: json!({"swept": 0}),
    };
    let logged = log(p, event).await?;
    expect("run_id", None, logged.run_id.as_deref())
}

async fn list_run_audit_filters_by_run(p: &Persistence) -> Result<(), String> {
    let a = saved_run(p, "a").await?;
    let b = saved_run(p, "b").await?;
    log(p, NewAuditEvent::for_run(AuditEventType::TeacherGateApproved, &a.id)).await?;
    log(p, NewAuditEvent::for_run(AuditEventType::TeacherGateRejected, &b.id)).await?;
    log(p, NewAuditEvent::for_run(AuditEventType::RunFailedNoInput, &a.id)).await?;

    let for_a = p
        .list_run_audit(&a.id, None)
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("no data")?;
    let types: Vec<AuditEventType> = for_a.iter().map(|e| e.event_type).collect();
    expect(
        "events for a",
        vec![
            AuditEventType::RunFailedNoInput,
            AuditEventType::TeacherGateApproved,
        ],
        types,
    )
}
