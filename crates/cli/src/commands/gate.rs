use runledger_lifecycle::RunOutcome;
use serde_json::json;
use time::{Duration, OffsetDateTime};

use super::App;

fn outcome_text(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed {
            run_id,
            artefact_id,
            has_analysis,
        } => format!(
            "run {} completed: proposal {}{}",
            run_id,
            artefact_id,
            if *has_analysis { " (with analysis)" } else { "" }
        ),
        RunOutcome::FailedNoInput { run_id } => {
            format!("run {} failed: no input to execute", run_id)
        }
        RunOutcome::FailedGeneration { run_id, error } => {
            format!("run {} failed: {}", run_id, error)
        }
        RunOutcome::Rejected { run_id } => format!("run {} rejected", run_id),
    }
}

pub(crate) async fn cmd_approve(app: &App, run_id: &str) -> Result<(), String> {
    let outcome = app
        .controller
        .approve_run(run_id)
        .await
        .map_err(|e| e.to_string())?;
    app.emit(&outcome, || outcome_text(&outcome))
}

pub(crate) async fn cmd_reject(app: &App, run_id: &str) -> Result<(), String> {
    let outcome = app
        .controller
        .reject_run(run_id)
        .await
        .map_err(|e| e.to_string())?;
    app.emit(&outcome, || outcome_text(&outcome))
}

pub(crate) async fn cmd_sweep(app: &App, older_than_secs: u64) -> Result<(), String> {
    let threshold = Duration::seconds(i64::try_from(older_than_secs).unwrap_or(i64::MAX));
    let swept = app
        .controller
        .sweep_stuck_runs(threshold, OffsetDateTime::now_utc())
        .await
        .map_err(|e| e.to_string())?;
    app.emit(&json!({ "swept": swept }), || {
        let mut lines = vec![format!("swept {} stuck run(s)", swept.len())];
        lines.extend(swept.iter().cloned());
        lines.join("\n")
    })
}
