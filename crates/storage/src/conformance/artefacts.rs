use std::future::Future;

use super::{expect, make_artefact, saved_run, TestResult};
use crate::facade::Persistence;
use crate::record::ArtefactRecord;

pub(super) async fn run_artefact_tests<F, Fut>(factory: &F) -> Vec<TestResult>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Persistence>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "artefacts",
        "save_defaults_kind_to_proposal",
        save_defaults_kind_to_proposal(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "artefacts",
        "save_round_trips_explicit_kind_and_provenance",
        save_round_trips_explicit_kind_and_provenance(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "artefacts",
        "list_filters_by_exact_run_id",
        list_filters_by_exact_run_id(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "artefacts",
        "list_with_empty_run_id_matches_nothing",
        list_with_empty_run_id_matches_nothing(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "artefacts",
        "list_without_filter_returns_all_newest_first",
        list_without_filter_returns_all_newest_first(&factory().await).await,
    ));
    results.push(TestResult::from_result(
        "artefacts",
        "artefact_for_unknown_run_fails",
        artefact_for_unknown_run_fails(&factory().await).await,
    ));

    results
}

async fn list(p: &Persistence, run_id: Option<&str>) -> Result<Vec<ArtefactRecord>, String> {
    p.list_artefacts(run_id)
        .await
        .map_err(|e| format!("list_artefacts: {e}"))?
        .into_data()
        .ok_or_else(|| "list_artefacts returned no data".to_string())
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn save_defaults_kind_to_proposal(p: &Persistence) -> Result<(), String> {
    let run = saved_run(p, "prompt").await?;
    let artefact = p
        .save_artefact(make_artefact(&run.id, None))
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("no data")?;
    expect("kind", "proposal", artefact.kind.as_str())
}

async fn save_round_trips_explicit_kind_and_provenance(p: &Persistence) -> Result<(), String> {
    let run = saved_run(p, "prompt").await?;
    let new = make_artefact(&run.id, Some("summary"));
    let saved = p
        .save_artefact(new.clone())
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("no data")?;
    let listed = list(p, Some(&run.id)).await?;
    let got = listed.first().ok_or("artefact missing from list")?;

    expect("full record", &saved, got)?;
    expect("run_id", new.run_id.as_str(), got.run_id.as_str())?;
    expect("kind", "summary", got.kind.as_str())?;
    expect("provider", new.provider.as_deref(), got.provider.as_deref())?;
    expect("model", new.model.as_deref(), got.model.as_deref())?;
    expect("content", new.content.as_str(), got.content.as_str())
}

async fn list_filters_by_exact_run_id(p: &Persistence) -> Result<(), String> {
    let a = saved_run(p, "a").await?;
    let b = saved_run(p, "b").await?;
    for run_id in [&a.id, &b.id, &a.id] {
        p.save_artefact(make_artefact(run_id, None))
            .await
            .map_err(|e| e.to_string())?;
    }

    let for_a = list(p, Some(&a.id)).await?;
    expect("artefacts for a", 2, for_a.len())?;
    if for_a.iter().any(|x| x.run_id != a.id) {
        return Err("filter returned an artefact of another run".to_string());
    }

    // A prefix of a real id must not match.
    let prefix = &a.id[..a.id.len() / 2];
    expect("artefacts for prefix", 0, list(p, Some(prefix)).await?.len())
}

async fn list_with_empty_run_id_matches_nothing(p: &Persistence) -> Result<(), String> {
    let run = saved_run(p, "prompt").await?;
    p.save_artefact(make_artefact(&run.id, None))
        .await
        .map_err(|e| e.to_string())?;
    expect("artefacts for \"\"", 0, list(p, Some("")).await?.len())
}

async fn list_without_filter_returns_all_newest_first(p: &Persistence) -> Result<(), String> {
    let a = saved_run(p, "a").await?;
    let b = saved_run(p, "b").await?;
    let first = p
        .save_artefact(make_artefact(&a.id, None))
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("no data")?;
    let second = p
        .save_artefact(make_artefact(&b.id, None))
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or("no data")?;
    let all = list(p, None).await?;
    let ids: Vec<&str> = all.iter().map(|x| x.id.as_str()).collect();
    expect("order", vec![second.id.as_str(), first.id.as_str()], ids)
}

/// An artefact must reference an existing run in every mode.
async fn artefact_for_unknown_run_fails(p: &Persistence) -> Result<(), String> {
    match p.save_artefact(make_artefact("no-such-run", None)).await {
        Ok(_) => Err("artefact for an unknown run was accepted".to_string()),
        Err(_) => expect("artefacts stored", 0, list(p, None).await?.len()),
    }
}
