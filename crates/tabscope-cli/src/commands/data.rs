/// Data management command handlers (export, clear)
use anyhow::Result;
use chrono::Utc;
use std::fmt::Write;
use tabscope_core::{AnalyticsAggregator, ExportDocument};
use tabscope_storage::{ContextSwitchEvent, Database, WorkspaceId, WorkspaceMap};

use super::helpers::escape_csv;

fn workspace_name<'a>(workspaces: &'a WorkspaceMap, id: &WorkspaceId) -> &'a str {
    workspaces.get(id).map_or("", |ws| ws.name.as_str())
}

fn switches_csv(events: &[ContextSwitchEvent], workspaces: &WorkspaceMap) -> String {
    let mut csv_content =
        String::from("timestamp,from_workspace_id,from_name,to_workspace_id,to_name,url\n");
    for event in events {
        let from_id = event
            .from_workspace_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let from_name = event
            .from_workspace_id
            .as_ref()
            .map_or("", |id| workspace_name(workspaces, id));
        let _ = writeln!(
            csv_content,
            "{},{},{},{},{},{}",
            event.timestamp.to_rfc3339(),
            escape_csv(&from_id),
            escape_csv(from_name),
            escape_csv(event.to_workspace_id.as_str()),
            escape_csv(workspace_name(workspaces, &event.to_workspace_id)),
            escape_csv(&event.url),
        );
    }
    csv_content
}

pub fn handle_export(db: &Database, format: &str, output: Option<String>) -> Result<()> {
    let output_path = output.unwrap_or_else(|| format!("tabscope_export.{format}"));

    match format {
        "json" => {
            let document = ExportDocument::collect(db, &AnalyticsAggregator::default(), Utc::now())?;
            std::fs::write(&output_path, serde_json::to_string_pretty(&document)?)?;
            println!(
                "Exported {} workspaces and {} context switches to {output_path}",
                document.workspaces.len(),
                document.context_switches.len()
            );
        }
        "csv" => {
            let events = db.load_switch_events()?;
            let workspaces = db.load_workspaces()?;
            std::fs::write(&output_path, switches_csv(&events, &workspaces))?;
            println!("Exported {} context switches to {output_path}", events.len());
        }
        _ => {
            println!("Unknown format: {format}. Use 'json' or 'csv'");
        }
    }

    Ok(())
}

pub fn handle_clear(db: &Database, yes: bool) -> Result<()> {
    if !yes {
        println!("This deletes all workspaces, context switches, the saved session and settings.");
        println!("Re-run with --yes to confirm.");
        return Ok(());
    }

    db.clear()?;
    log::info!("Cleared all stored data");
    println!("All data cleared. Settings are back to defaults.");
    Ok(())
}
