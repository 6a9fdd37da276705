use std::future::Future;

use super::{expect, make_run, saved_run, TestResult};
use crate::facade::Persistence;
use crate::record::{RunPatch, RunStatus};

pub(super) async fn run_run_tests<F, Fut>(factory: &F) -> Vec<TestResult>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Persistence>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "runs",
        "save_assigns_id_and_created_at",
        save_assigns_id_and_created_at(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "runs",
        "save_keeps_caller_supplied_id",
        save_keeps_caller_supplied_id(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "runs",
        "save_then_get_round_trips",
        save_then_get_round_trips(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "runs",
        "list_runs_newest_first",
        list_runs_newest_first(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "runs",
        "update_merges_patch_and_keeps_id",
        update_merges_patch_and_keeps_id(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "runs",
        "update_leaves_unset_fields_untouched",
        update_leaves_unset_fields_untouched(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "runs",
        "update_visible_to_get_and_list",
        update_visible_to_get_and_list(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "runs",
        "envelope_mode_matches_facade_mode",
        envelope_mode_matches_facade_mode(&factory().await).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// A run saved without an id gets a UUID-shaped id and a creation timestamp.
async fn save_assigns_id_and_created_at(p: &Persistence) -> Result<(), String> {
    let run = saved_run(p, "prompt").await?;
    if run.id.is_empty() {
        return Err("assigned id is empty".to_string());
    }
    if run.created_at.is_none() {
        return Err("created_at was not assigned".to_string());
    }
    expect("status", RunStatus::Created, run.status)
}

async fn save_keeps_caller_supplied_id(p: &Persistence) -> Result<(), String> {
    let mut new = make_run("prompt");
    new.id = Some("run-caller-id".to_string());
    let run = p
        .save_run(new)
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("no data")?;
    expect("id", "run-caller-id", run.id.as_str())
}

/// Every field of the submitted run comes back unchanged.
async fn save_then_get_round_trips(p: &Persistence) -> Result<(), String> {
    let mut new = make_run("Explain fractions");
    new.notes = Some("first attempt".to_string());
    let saved = p
        .save_run(new.clone())
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("no data")?;
    let got = p
        .get_run(&saved.id)
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("get_run found nothing")?;

    expect("full record", &saved, &got)?;
    expect("actor_type", new.actor_type, got.actor_type)?;
    expect("actor_id", new.actor_id.as_str(), got.actor_id.as_str())?;
    expect("impact", new.impact, got.impact)?;
    expect("workflow_id", new.workflow_id.as_str(), got.workflow_id.as_str())?;
    expect("ssot_version", new.ssot_version.as_str(), got.ssot_version.as_str())?;
    expect("status", new.status, got.status)?;
    expect("input_ref", new.input_ref, got.input_ref)?;
    expect("notes", new.notes, got.notes)
}

async fn list_runs_newest_first(p: &Persistence) -> Result<(), String> {
    let first = saved_run(p, "one").await?;
    let second = saved_run(p, "two").await?;
    let third = saved_run(p, "three").await?;
    let listed = p
        .list_runs()
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("no data")?;
    let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
    expect(
        "order",
        vec![third.id.as_str(), second.id.as_str(), first.id.as_str()],
        ids,
    )
}

async fn update_merges_patch_and_keeps_id(p: &Persistence) -> Result<(), String> {
    let run = saved_run(p, "prompt").await?;
    let stored = p
        .update_run(
            &run.id,
            RunPatch::status(RunStatus::Failed).with_notes("Rejected by teacher gate."),
        )
        .await
        .map_err(|e| e.to_string())?;
    if !stored.ok {
        return Err("update of an existing run was not ok".to_string());
    }
    let updated = stored.into_data().ok_or("no data")?;
    expect("id", run.id.as_str(), updated.id.as_str())?;
    expect("status", RunStatus::Failed, updated.status)?;
    expect(
        "notes",
        Some("Rejected by teacher gate."),
        updated.notes.as_deref(),
    )?;
    if updated.updated_at.is_none() {
        return Err("updated_at was not stamped".to_string());
    }
    Ok(())
}

async fn update_leaves_unset_fields_untouched(p: &Persistence) -> Result<(), String> {
    let mut new = make_run("keep me");
    new.notes = Some("original note".to_string());
    let run = p
        .save_run(new)
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("no data")?;
    let updated = p
        .update_run(&run.id, RunPatch::status(RunStatus::Running))
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("no data")?;
    expect("input_ref", Some("keep me"), updated.input_ref.as_deref())?;
    expect("notes", Some("original note"), updated.notes.as_deref())?;
    expect("created_at", run.created_at, updated.created_at)
}

/// Read-after-write: an update is immediately visible to both read paths.
async fn update_visible_to_get_and_list(p: &Persistence) -> Result<(), String> {
    let run = saved_run(p, "prompt").await?;
    p.update_run(&run.id, RunPatch::status(RunStatus::Completed))
        .await
        .map_err(|e| e.to_string())?;

    let got = p
        .get_run(&run.id)
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("get_run found nothing")?;
    expect("status via get", RunStatus::Completed, got.status)?;

    let listed = p
        .list_runs()
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("no data")?;
    let status = listed
        .iter()
        .find(|r| r.id == run.id)
        .map(|r| r.status)
        .ok_or("run missing from list")?;
    expect("status via list", RunStatus::Completed, status)
}

async fn envelope_mode_matches_facade_mode(p: &Persistence) -> Result<(), String> {
    let stored = p.save_run(make_run("prompt")).await.map_err(|e| e.to_string())?;
    expect("save mode", p.mode(), stored.mode)?;
    let listed = p.list_runs().await.map_err(|e| e.to_string())?;
    expect("list mode", p.mode(), listed.mode)?;
    expect("list ok", true, listed.ok)
}
