/// Workspace listing
use anyhow::Result;
use chrono::Utc;
use tabled::{Table, Tabled};
use tabscope_detector::SignatureKind;
use tabscope_storage::{Database, Workspace};

use super::helpers::{format_ago, truncate_str};

#[derive(Tabled)]
struct WorkspaceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Project")]
    signature: String,
    #[tabled(rename = "Tabs")]
    tabs: usize,
    #[tabled(rename = "Stack")]
    stack: String,
    #[tabled(rename = "Color")]
    color: String,
    #[tabled(rename = "Last active")]
    last_active: String,
}

/// Most recently active first
fn select(mut workspaces: Vec<Workspace>, kind: Option<SignatureKind>) -> Vec<Workspace> {
    if let Some(kind) = kind {
        workspaces.retain(|ws| ws.project_signature.kind == kind);
    }
    workspaces.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
    workspaces
}

pub fn handle_list(db: &Database, kind: Option<SignatureKind>) -> Result<()> {
    let workspaces = select(db.load_workspaces()?.into_values().collect(), kind);

    if workspaces.is_empty() {
        println!("No workspaces yet. Open a project page in the browser to create one.");
        return Ok(());
    }

    let now = Utc::now();
    let rows: Vec<WorkspaceRow> = workspaces
        .iter()
        .map(|ws| WorkspaceRow {
            name: truncate_str(&ws.name, 24),
            signature: truncate_str(&ws.project_signature.to_string(), 40),
            tabs: ws.tab_ids.len(),
            stack: ws.tech_stack.iter().cloned().collect::<Vec<_>>().join(", "),
            color: ws.color.to_string(),
            last_active: format_ago(ws.last_active_at, now),
        })
        .collect();

    println!("{}", Table::new(rows));
    println!("\n{} workspaces", workspaces.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tabscope_detector::ProjectSignature;
    use tabscope_storage::{GroupColor, WorkspaceId};

    fn workspace(id: &str, signature: ProjectSignature, minutes_ago: i64) -> Workspace {
        let now = Utc.with_ymd_and_hms(2024, 5, 14, 12, 0, 0).unwrap();
        let mut ws = Workspace::new(
            WorkspaceId::from(id),
            signature.display_name(),
            signature,
            GroupColor::Blue,
            now - Duration::hours(1),
        );
        ws.last_active_at = now - Duration::minutes(minutes_ago);
        ws
    }

    #[test]
    fn test_select_orders_by_recency() {
        let selected = select(
            vec![
                workspace("ws_a", ProjectSignature::repo("github.com/a/old"), 50),
                workspace("ws_b", ProjectSignature::localhost(3000), 5),
            ],
            None,
        );
        let names: Vec<_> = selected.iter().map(|ws| ws.name.as_str()).collect();
        assert_eq!(names, ["localhost:3000", "old"]);
    }

    #[test]
    fn test_select_filters_by_kind() {
        let selected = select(
            vec![
                workspace("ws_a", ProjectSignature::repo("github.com/a/b"), 1),
                workspace("ws_b", ProjectSignature::localhost(5173), 2),
            ],
            Some(SignatureKind::Localhost),
        );
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, WorkspaceId::from("ws_b"));
    }
}
