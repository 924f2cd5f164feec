#[cfg(test)]
mod tests;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tabscope_storage::{ContextSwitchEvent, Database, Workspace, WorkspaceId};
use thiserror::Error;

use crate::error::EngineResult;

/// Window for the headline context-switch count
pub const SWITCH_COUNT_WINDOW_DAYS: i64 = 7;
/// A workspace counts as active if touched within this window
pub const ACTIVE_WINDOW_HOURS: i64 = 24;
/// Per-workspace cap on the focus-time proxy
pub const FOCUS_PROXY_CAP_HOURS: i64 = 8;

const BASE_SCORE: i32 = 70;
const WORKSPACE_BONUS: i32 = 5;
const MAX_WORKSPACE_BONUS: i32 = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1d")]
    Day,
    #[default]
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl TimeRange {
    #[must_use]
    pub const fn days(self) -> i64 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "1d",
            Self::Week => "7d",
            Self::Month => "30d",
            Self::Quarter => "90d",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown time range '{0}' (expected 1d, 7d, 30d or 90d)")]
pub struct ParseTimeRangeError(String);

impl FromStr for TimeRange {
    type Err = ParseTimeRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" | "day" | "today" => Ok(Self::Day),
            "7d" | "week" => Ok(Self::Week),
            "30d" | "month" => Ok(Self::Month),
            "90d" | "quarter" => Ok(Self::Quarter),
            _ => Err(ParseTimeRangeError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySwitches {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceUsage {
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub tab_count: usize,
    /// Switches into this workspace within the report range
    pub switches_in: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechUsage {
    pub tech: String,
    pub workspaces: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub time_range: TimeRange,
    pub generated_at: DateTime<Utc>,
    /// Switches in the last 7 days, whatever the range
    pub context_switch_count: usize,
    /// Summed age of recently active workspaces, not measured dwell time
    pub focus_time_proxy_minutes: i64,
    pub productivity_score: u8,
    pub daily_switches: Vec<DailySwitches>,
    pub workspace_usage: Vec<WorkspaceUsage>,
    pub tech_stack_usage: Vec<TechUsage>,
    pub active_workspaces: usize,
    pub total_workspaces: usize,
}

/// Source of the usage distributions in a report
pub trait UsageDetector: Send + Sync {
    /// `events` are already limited to the report range
    fn workspace_usage(
        &self,
        workspaces: &[Workspace],
        events: &[ContextSwitchEvent],
    ) -> Vec<WorkspaceUsage>;

    fn tech_stack_usage(&self, workspaces: &[Workspace]) -> Vec<TechUsage>;
}

/// Derives usage from workspace metadata and the switch log
pub struct MetadataUsageDetector;

impl UsageDetector for MetadataUsageDetector {
    fn workspace_usage(
        &self,
        workspaces: &[Workspace],
        events: &[ContextSwitchEvent],
    ) -> Vec<WorkspaceUsage> {
        let mut switches_in: HashMap<&WorkspaceId, usize> = HashMap::new();
        for event in events {
            *switches_in.entry(&event.to_workspace_id).or_insert(0) += 1;
        }

        let mut usage: Vec<_> = workspaces
            .iter()
            .map(|w| WorkspaceUsage {
                workspace_id: w.id.clone(),
                name: w.name.clone(),
                tab_count: w.tab_ids.len(),
                switches_in: switches_in.get(&w.id).copied().unwrap_or(0),
            })
            .collect();
        usage.sort_by(|a, b| {
            b.switches_in
                .cmp(&a.switches_in)
                .then(b.tab_count.cmp(&a.tab_count))
                .then(a.name.cmp(&b.name))
        });
        usage
    }

    fn tech_stack_usage(&self, workspaces: &[Workspace]) -> Vec<TechUsage> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for tech in workspaces.iter().flat_map(|w| w.tech_stack.iter()) {
            *counts.entry(tech.as_str()).or_insert(0) += 1;
        }

        let mut usage: Vec<_> = counts
            .into_iter()
            .map(|(tech, workspaces)| TechUsage {
                tech: tech.to_string(),
                workspaces,
            })
            .collect();
        // Stable sort keeps alphabetical order among equal counts
        usage.sort_by(|a, b| b.workspaces.cmp(&a.workspaces));
        usage
    }
}

/// Computes reports from workspaces and the switch log
///
/// Nothing is cached; every call recomputes from its inputs.
pub struct AnalyticsAggregator {
    detector: Box<dyn UsageDetector>,
}

impl Default for AnalyticsAggregator {
    fn default() -> Self {
        Self::new(Box::new(MetadataUsageDetector))
    }
}

impl AnalyticsAggregator {
    #[must_use]
    pub fn new(detector: Box<dyn UsageDetector>) -> Self {
        Self { detector }
    }

    /// Report over everything persisted, bucketed by local calendar day
    ///
    /// # Errors
    ///
    /// Returns an error if workspaces or the switch log cannot be read
    pub fn report(
        &self,
        database: &Database,
        now: DateTime<Utc>,
        range: TimeRange,
    ) -> EngineResult<AnalyticsReport> {
        let workspaces: Vec<Workspace> = database.load_workspaces()?.into_values().collect();
        let events = database.load_switch_events()?;
        Ok(self.compute(&workspaces, &events, now, range, &Local))
    }

    /// Build a report; daily buckets follow calendar days in `tz`
    #[must_use]
    pub fn compute<Tz: TimeZone>(
        &self,
        workspaces: &[Workspace],
        events: &[ContextSwitchEvent],
        now: DateTime<Utc>,
        range: TimeRange,
        tz: &Tz,
    ) -> AnalyticsReport {
        let switch_count = Self::count_since(events, now - Duration::days(SWITCH_COUNT_WINDOW_DAYS));
        let active_since = now - Duration::hours(ACTIVE_WINDOW_HOURS);
        let range_start = now - Duration::days(range.days());
        let in_range: Vec<_> = events
            .iter()
            .filter(|e| e.timestamp >= range_start && e.timestamp <= now)
            .cloned()
            .collect();

        AnalyticsReport {
            time_range: range,
            generated_at: now,
            context_switch_count: switch_count,
            focus_time_proxy_minutes: Self::focus_time_proxy_minutes(workspaces, now),
            productivity_score: Self::productivity_score(workspaces.len(), switch_count),
            daily_switches: Self::daily_switches(events, now, range, tz),
            workspace_usage: self.detector.workspace_usage(workspaces, &in_range),
            tech_stack_usage: self.detector.tech_stack_usage(workspaces),
            active_workspaces: workspaces
                .iter()
                .filter(|w| w.last_active_at >= active_since)
                .count(),
            total_workspaces: workspaces.len(),
        }
    }

    fn count_since(events: &[ContextSwitchEvent], since: DateTime<Utc>) -> usize {
        events.iter().filter(|e| e.timestamp >= since).count()
    }

    /// `70 + min(5 x workspaces, 20) - penalty`, where the penalty grows with
    /// weekly switches (5 above 15, 10 above 30, 15 above 50)
    #[must_use]
    pub fn productivity_score(workspace_count: usize, switches: usize) -> u8 {
        let bonus = i32::try_from(workspace_count)
            .unwrap_or(i32::MAX)
            .saturating_mul(WORKSPACE_BONUS)
            .min(MAX_WORKSPACE_BONUS);
        let penalty = match switches {
            s if s > 50 => 15,
            s if s > 30 => 10,
            s if s > 15 => 5,
            _ => 0,
        };
        u8::try_from((BASE_SCORE + bonus - penalty).clamp(0, 100)).unwrap_or(100)
    }

    /// Sum over workspaces active in the last 24h of their age, each capped
    /// at 8 hours
    #[must_use]
    pub fn focus_time_proxy_minutes(workspaces: &[Workspace], now: DateTime<Utc>) -> i64 {
        let active_since = now - Duration::hours(ACTIVE_WINDOW_HOURS);
        let cap = Duration::hours(FOCUS_PROXY_CAP_HOURS);
        workspaces
            .iter()
            .filter(|w| w.last_active_at >= active_since)
            .map(|w| (now - w.created_at).clamp(Duration::zero(), cap).num_minutes())
            .sum()
    }

    /// One bucket per local calendar day, oldest first, ending today
    #[must_use]
    pub fn daily_switches<Tz: TimeZone>(
        events: &[ContextSwitchEvent],
        now: DateTime<Utc>,
        range: TimeRange,
        tz: &Tz,
    ) -> Vec<DailySwitches> {
        let today = now.with_timezone(tz).date_naive();
        let mut buckets: BTreeMap<NaiveDate, usize> = (0..range.days())
            .filter_map(|back| today.checked_sub_signed(Duration::days(back)))
            .map(|date| (date, 0))
            .collect();

        for event in events {
            let date = event.timestamp.with_timezone(tz).date_naive();
            if let Some(count) = buckets.get_mut(&date) {
                *count += 1;
            }
        }

        buckets
            .into_iter()
            .map(|(date, count)| DailySwitches { date, count })
            .collect()
    }
}
