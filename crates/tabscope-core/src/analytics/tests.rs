use super::*;
use chrono::FixedOffset;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use tabscope_detector::ProjectSignature;
use tabscope_storage::GroupColor;

use crate::test_support::at;

// ============================================================================
// Helper functions for creating test data
// ============================================================================

fn workspace(id: &str, created: DateTime<Utc>, last_active: DateTime<Utc>) -> Workspace {
    let mut workspace = Workspace::new(
        WorkspaceId::from(id),
        id.to_string(),
        ProjectSignature::manual(id),
        GroupColor::Blue,
        created,
    );
    workspace.last_active_at = last_active;
    workspace
}

fn switch(to: &str, timestamp: DateTime<Utc>) -> ContextSwitchEvent {
    ContextSwitchEvent {
        from_workspace_id: None,
        to_workspace_id: WorkspaceId::from(to),
        timestamp,
        url: format!("https://{to}.test/"),
    }
}

/// Produces arbitrary distributions from a seeded generator
struct RandomUsageDetector {
    rng: Mutex<StdRng>,
}

impl UsageDetector for RandomUsageDetector {
    fn workspace_usage(
        &self,
        workspaces: &[Workspace],
        _events: &[ContextSwitchEvent],
    ) -> Vec<WorkspaceUsage> {
        let mut rng = self.rng.lock().unwrap();
        workspaces
            .iter()
            .map(|w| WorkspaceUsage {
                workspace_id: w.id.clone(),
                name: w.name.clone(),
                tab_count: rng.gen_range(0..20),
                switches_in: rng.gen_range(0..50),
            })
            .collect()
    }

    fn tech_stack_usage(&self, _workspaces: &[Workspace]) -> Vec<TechUsage> {
        let mut rng = self.rng.lock().unwrap();
        ["React", "Rust"]
            .iter()
            .map(|tech| TechUsage {
                tech: (*tech).to_string(),
                workspaces: rng.gen_range(1..10),
            })
            .collect()
    }
}

// ============================================================================
// productivity_score tests
// ============================================================================

#[test]
fn test_productivity_score_values() {
    assert_eq!(AnalyticsAggregator::productivity_score(0, 0), 70);
    assert_eq!(AnalyticsAggregator::productivity_score(4, 0), 90);
    assert_eq!(AnalyticsAggregator::productivity_score(2, 16), 75);
    assert_eq!(AnalyticsAggregator::productivity_score(2, 31), 70);
    assert_eq!(AnalyticsAggregator::productivity_score(2, 51), 65);
}

#[test]
fn test_productivity_score_non_increasing_in_switches() {
    for workspaces in [0, 1, 3, 4, 10] {
        let mut previous = u8::MAX;
        for switches in 0..=120 {
            let score = AnalyticsAggregator::productivity_score(workspaces, switches);
            assert!(score <= previous, "score rose at {workspaces} ws / {switches} switches");
            previous = score;
        }
    }
}

#[test]
fn test_productivity_score_extreme_inputs_are_clamped() {
    let score = AnalyticsAggregator::productivity_score(1000, 1000);
    assert!(score <= 100);
    assert_eq!(score, 75);
    assert!(AnalyticsAggregator::productivity_score(usize::MAX, 0) <= 100);
}

// ============================================================================
// focus_time_proxy_minutes tests
// ============================================================================

#[test]
fn test_focus_proxy_caps_and_filters() {
    let now = at(20, 0);
    let workspaces = vec![
        // 10h old, capped at 8h
        workspace("old", at(10, 0), at(19, 0)),
        // 30 minutes old
        workspace("new", at(19, 30), at(19, 45)),
        // idle for more than a day
        workspace("idle", now - Duration::days(3), now - Duration::hours(25)),
    ];

    assert_eq!(
        AnalyticsAggregator::focus_time_proxy_minutes(&workspaces, now),
        8 * 60 + 30
    );
}

#[test]
fn test_focus_proxy_empty() {
    assert_eq!(AnalyticsAggregator::focus_time_proxy_minutes(&[], at(9, 0)), 0);
}

// ============================================================================
// daily_switches tests
// ============================================================================

#[test]
fn test_daily_switches_has_one_bucket_per_day() {
    for range in [TimeRange::Day, TimeRange::Week, TimeRange::Month, TimeRange::Quarter] {
        let series = AnalyticsAggregator::daily_switches(&[], at(12, 0), range, &Utc);
        assert_eq!(series.len(), usize::try_from(range.days()).unwrap());
        assert_eq!(series.last().unwrap().date, at(12, 0).date_naive());
    }
}

#[test]
fn test_daily_switches_bucket_by_local_day() {
    let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
    // 23:30 UTC on the 13th is already the 14th at UTC+2
    let late = at(0, 0) - Duration::minutes(30);
    let events = vec![switch("a", late), switch("b", at(9, 0))];

    let utc = AnalyticsAggregator::daily_switches(&events, at(12, 0), TimeRange::Week, &Utc);
    assert_eq!(utc[6].count, 1);
    assert_eq!(utc[5].count, 1);

    let local = AnalyticsAggregator::daily_switches(&events, at(12, 0), TimeRange::Week, &plus_two);
    assert_eq!(local[6].count, 2);
    assert_eq!(local[5].count, 0);
}

#[test]
fn test_daily_switches_ignores_events_outside_range() {
    let events = vec![switch("a", at(9, 0) - Duration::days(10))];
    let series = AnalyticsAggregator::daily_switches(&events, at(12, 0), TimeRange::Week, &Utc);
    assert!(series.iter().all(|d| d.count == 0));
}

// ============================================================================
// compute tests
// ============================================================================

#[test]
fn test_compute_report() {
    let now = at(12, 0);
    let mut alpha = workspace("alpha", at(8, 0), at(11, 0));
    alpha.tab_ids = vec![1, 2];
    alpha.tech_stack.insert("React".to_string());
    let mut beta = workspace("beta", at(9, 0), at(11, 30));
    beta.tab_ids = vec![3];
    beta.tech_stack.insert("React".to_string());
    beta.tech_stack.insert("Rust".to_string());
    let workspaces = vec![alpha, beta];

    let events = vec![
        switch("alpha", now - Duration::days(3)),
        switch("beta", at(10, 0)),
        switch("beta", at(11, 0)),
    ];

    let report = AnalyticsAggregator::default().compute(&workspaces, &events, now, TimeRange::Day, &Utc);

    // Headline count covers 7 days even for a 1-day range
    assert_eq!(report.context_switch_count, 3);
    assert_eq!(report.daily_switches.len(), 1);
    assert_eq!(report.daily_switches[0].count, 2);
    assert_eq!(report.productivity_score, 80);
    assert_eq!(report.active_workspaces, 2);
    assert_eq!(report.total_workspaces, 2);
    assert_eq!(report.focus_time_proxy_minutes, 4 * 60 + 3 * 60);

    assert_eq!(report.workspace_usage[0].name, "beta");
    assert_eq!(report.workspace_usage[0].switches_in, 2);
    assert_eq!(report.workspace_usage[1].switches_in, 0);

    assert_eq!(report.tech_stack_usage[0].tech, "React");
    assert_eq!(report.tech_stack_usage[0].workspaces, 2);
    assert_eq!(report.tech_stack_usage[1].tech, "Rust");
}

#[test]
fn test_compute_with_pluggable_detector() {
    let aggregator = AnalyticsAggregator::new(Box::new(RandomUsageDetector {
        rng: Mutex::new(StdRng::seed_from_u64(7)),
    }));
    let workspaces = vec![workspace("alpha", at(8, 0), at(11, 0))];

    let report = aggregator.compute(&workspaces, &[], at(12, 0), TimeRange::Month, &Utc);
    assert_eq!(report.workspace_usage.len(), 1);
    assert!(report.workspace_usage[0].switches_in < 50);
    assert_eq!(report.tech_stack_usage.len(), 2);
    assert_eq!(report.daily_switches.len(), 30);
}

#[test]
fn test_report_serializes_camel_case() {
    let report = AnalyticsAggregator::default().compute(&[], &[], at(12, 0), TimeRange::Quarter, &Utc);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["timeRange"], "90d");
    assert_eq!(json["focusTimeProxyMinutes"], 0);
    assert_eq!(json["productivityScore"], 70);
}

// ============================================================================
// TimeRange tests
// ============================================================================

#[test]
fn test_time_range_parse() {
    assert_eq!("1d".parse::<TimeRange>().unwrap(), TimeRange::Day);
    assert_eq!("Week".parse::<TimeRange>().unwrap(), TimeRange::Week);
    assert_eq!(" 30d ".parse::<TimeRange>().unwrap(), TimeRange::Month);
    assert_eq!("quarter".parse::<TimeRange>().unwrap(), TimeRange::Quarter);
    assert!("2w".parse::<TimeRange>().is_err());
}

#[test]
fn test_time_range_wire_format() {
    assert_eq!(serde_json::to_value(TimeRange::Month).unwrap(), "30d");
    let parsed: TimeRange = serde_json::from_str("\"1d\"").unwrap();
    assert_eq!(parsed, TimeRange::Day);
    assert_eq!(TimeRange::default(), TimeRange::Week);
}
