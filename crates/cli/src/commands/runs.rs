use runledger_storage::{ActorType, Impact, NewRun, RunRecord};

use super::{warn_degraded, App};
use crate::{ActorArg, ImpactArg};

pub(crate) struct CreateArgs {
    pub input: Option<String>,
    pub actor_type: ActorArg,
    pub actor_id: String,
    pub impact: ImpactArg,
    pub workflow_id: String,
    pub ssot_version: String,
}

impl From<ActorArg> for ActorType {
    fn from(arg: ActorArg) -> Self {
        match arg {
            ActorArg::Teacher => ActorType::Teacher,
            ActorArg::Student => ActorType::Student,
            ActorArg::System => ActorType::System,
        }
    }
}

impl From<ImpactArg> for Impact {
    fn from(arg: ImpactArg) -> Self {
        match arg {
            ImpactArg::Formative => Impact::Formative,
            ImpactArg::Summative => Impact::Summative,
            ImpactArg::Policy => Impact::Policy,
        }
    }
}

pub(crate) fn run_line(run: &RunRecord) -> String {
    format!(
        "{}  {:<13}  {}  {}",
        run.id,
        run.status.as_str(),
        run.created_at.as_deref().unwrap_or("-"),
        run.input_ref.as_deref().unwrap_or("")
    )
}

pub(crate) async fn cmd_list(app: &App) -> Result<(), String> {
    let stored = app.store.list_runs().await.map_err(|e| e.to_string())?;
    let runs = stored.data.as_deref().unwrap_or_default();
    app.emit(&stored, || {
        if runs.is_empty() {
            "no runs".to_string()
        } else {
            runs.iter().map(run_line).collect::<Vec<_>>().join("\n")
        }
    })
}

pub(crate) async fn cmd_show(app: &App, run_id: &str) -> Result<(), String> {
    let run = app
        .store
        .get_run(run_id)
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .ok_or_else(|| format!("run not found: {}", run_id))?;
    let artefacts = app
        .store
        .list_artefacts(Some(run_id))
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .unwrap_or_default();
    let audit = app
        .store
        .list_run_audit(run_id, None)
        .await
        .map_err(|e| e.to_string())?
        .into_data()
        .unwrap_or_default();

    let value = serde_json::json!({
        "mode": app.store.mode(),
        "run": run,
        "artefacts": artefacts,
        "audit": audit,
    });
    app.emit(&value, || {
        let mut lines = vec![
            format!("id:           {}", run.id),
            format!("status:       {}", run.status),
            format!("workflow:     {} @ {}", run.workflow_id, run.ssot_version),
            format!("input_ref:    {}", run.input_ref.as_deref().unwrap_or("")),
            format!("notes:        {}", run.notes.as_deref().unwrap_or("")),
            format!("created_at:   {}", run.created_at.as_deref().unwrap_or("-")),
            format!("updated_at:   {}", run.updated_at.as_deref().unwrap_or("-")),
            format!("artefacts:    {}", artefacts.len()),
        ];
        lines.extend(artefacts.iter().map(super::ledger::artefact_line));
        lines.push(format!("audit:        {}", audit.len()));
        lines.extend(audit.iter().map(super::ledger::audit_line));
        lines.join("\n")
    })
}

pub(crate) async fn cmd_create(app: &App, args: CreateArgs) -> Result<(), String> {
    let mut run = NewRun::new(
        args.actor_type.into(),
        args.actor_id,
        args.impact.into(),
        args.workflow_id,
        args.ssot_version,
    );
    run.input_ref = args.input;

    let stored = app.controller.submit_run(run).await.map_err(|e| e.to_string())?;
    warn_degraded(&stored);
    app.emit(&stored, || match &stored.data {
        Some(run) => format!("created run {} ({})", run.id, stored.mode),
        None => String::new(),
    })
}
