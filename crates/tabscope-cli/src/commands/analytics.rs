/// Analytics report command
use anyhow::Result;
use chrono::Utc;
use tabled::{Table, Tabled};
use tabscope_core::{AnalyticsAggregator, AnalyticsReport, TimeRange};
use tabscope_storage::Database;

use super::helpers::truncate_str;

#[derive(Tabled)]
struct DayRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Switches")]
    count: usize,
    #[tabled(rename = "")]
    bar: String,
}

#[derive(Tabled)]
struct UsageRow {
    #[tabled(rename = "Workspace")]
    name: String,
    #[tabled(rename = "Tabs")]
    tabs: usize,
    #[tabled(rename = "Switches in")]
    switches_in: usize,
}

const BAR_WIDTH: usize = 30;

fn bar(count: usize, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    "#".repeat((count * BAR_WIDTH).div_ceil(max))
}

pub fn handle_analytics(db: &Database, range: TimeRange, json: bool) -> Result<()> {
    let report = AnalyticsAggregator::default().report(db, Utc::now(), range)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &AnalyticsReport) {
    println!("Analytics ({})", report.time_range);
    println!("{}", "=".repeat(40));
    println!("Context switches (7 days): {}", report.context_switch_count);
    println!("Productivity score:        {}/100", report.productivity_score);
    println!(
        "Focus time (approx.):      {}h {}m",
        report.focus_time_proxy_minutes / 60,
        report.focus_time_proxy_minutes % 60
    );
    println!(
        "Active workspaces:         {} of {}",
        report.active_workspaces, report.total_workspaces
    );

    let max = report
        .daily_switches
        .iter()
        .map(|day| day.count)
        .max()
        .unwrap_or(0);
    let days: Vec<DayRow> = report
        .daily_switches
        .iter()
        .map(|day| DayRow {
            date: day.date.format("%a %Y-%m-%d").to_string(),
            count: day.count,
            bar: bar(day.count, max),
        })
        .collect();
    println!("\nDaily context switches:");
    println!("{}", Table::new(days));

    if !report.workspace_usage.is_empty() {
        let usage: Vec<UsageRow> = report
            .workspace_usage
            .iter()
            .map(|ws| UsageRow {
                name: truncate_str(&ws.name, 30),
                tabs: ws.tab_count,
                switches_in: ws.switches_in,
            })
            .collect();
        println!("\nWorkspaces:");
        println!("{}", Table::new(usage));
    }

    if !report.tech_stack_usage.is_empty() {
        let stack: Vec<String> = report
            .tech_stack_usage
            .iter()
            .map(|t| format!("{} ({})", t.tech, t.workspaces))
            .collect();
        println!("\nTech stack: {}", stack.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_scales_to_max() {
        assert_eq!(bar(10, 10).len(), BAR_WIDTH);
        assert_eq!(bar(5, 10).len(), BAR_WIDTH / 2);
        assert_eq!(bar(1, 100).len(), 1);
        assert!(bar(0, 10).is_empty());
        assert!(bar(0, 0).is_empty());
    }

    #[test]
    fn test_report_on_empty_store() {
        let db = Database::in_memory().unwrap();
        let report = AnalyticsAggregator::default()
            .report(&db, Utc::now(), TimeRange::Week)
            .unwrap();
        assert_eq!(report.context_switch_count, 0);
        assert_eq!(report.daily_switches.len(), 7);
        print_report(&report);
    }
}
