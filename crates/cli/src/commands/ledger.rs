use runledger_storage::{ArtefactRecord, AuditRecord};

use super::App;

pub(crate) fn artefact_line(artefact: &ArtefactRecord) -> String {
    let preview: String = artefact
        .content
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(60)
        .collect();
    format!(
        "{}  run={}  kind={}  provider={}  {}",
        artefact.id,
        artefact.run_id,
        artefact.kind,
        artefact.provider.as_deref().unwrap_or("-"),
        preview
    )
}

pub(crate) fn audit_line(event: &AuditRecord) -> String {
    format!(
        "{}  {}  run={}  {}",
        event.created_at.as_deref().unwrap_or("-"),
        event.event_type,
        event.run_id.as_deref().unwrap_or("-"),
        event.payload
    )
}

pub(crate) fn cmd_mode(app: &App) -> Result<(), String> {
    let mode = app.store.mode();
    app.emit(&serde_json::json!({ "mode": mode }), || mode.to_string())
}

pub(crate) async fn cmd_artefacts(app: &App, run_id: Option<&str>) -> Result<(), String> {
    let stored = app
        .store
        .list_artefacts(run_id)
        .await
        .map_err(|e| e.to_string())?;
    let artefacts = stored.data.as_deref().unwrap_or_default();
    app.emit(&stored, || {
        if artefacts.is_empty() {
            "no artefacts".to_string()
        } else {
            artefacts.iter().map(artefact_line).collect::<Vec<_>>().join("\n")
        }
    })
}

pub(crate) async fn cmd_audit(
    app: &App,
    limit: Option<usize>,
    run_id: Option<&str>,
) -> Result<(), String> {
    let stored = match run_id {
        Some(run_id) => app.store.list_run_audit(run_id, limit).await,
        None => app.store.list_audit(limit).await,
    }
    .map_err(|e| e.to_string())?;
    let events = stored.data.as_deref().unwrap_or_default();
    app.emit(&stored, || {
        if events.is_empty() {
            "no audit events".to_string()
        } else {
            events.iter().map(audit_line).collect::<Vec<_>>().join("\n")
        }
    })
}
