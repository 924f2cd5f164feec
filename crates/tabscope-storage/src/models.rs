use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use strum_macros::{Display, EnumString};
use tabscope_detector::{ProjectSignature, DEFAULT_THRESHOLD};
use uuid::Uuid;

/// Host tab handle
pub type TabId = i64;

/// Host tab-group handle
pub type GroupId = i64;

/// Maximum number of URLs kept per workspace in a session snapshot
pub const MAX_SNAPSHOT_URLS: usize = 10;

/// Workspace identifier: `ws_<unix millis>_<random hex>`.
///
/// Unique across process restarts without a persisted counter, and sorts in
/// creation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(pub String);

impl WorkspaceId {
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("ws_{}_{}", now.timestamp_millis(), &suffix[..8]))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkspaceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Colors offered by the host's native tab groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GroupColor {
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}

impl GroupColor {
    pub const PALETTE: [Self; 9] = [
        Self::Grey,
        Self::Blue,
        Self::Red,
        Self::Yellow,
        Self::Green,
        Self::Pink,
        Self::Purple,
        Self::Cyan,
        Self::Orange,
    ];
}

/// Tabs grouped under one detected or user-declared project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub project_signature: ProjectSignature,
    #[serde(default)]
    pub tech_stack: BTreeSet<String>,
    /// Insertion order is the group order; no duplicates
    #[serde(default)]
    pub tab_ids: Vec<TabId>,
    #[serde(default)]
    pub tab_group_id: Option<GroupId>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub color: GroupColor,
}

impl Workspace {
    #[must_use]
    pub fn new(
        id: WorkspaceId,
        name: String,
        project_signature: ProjectSignature,
        color: GroupColor,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            project_signature,
            tech_stack: BTreeSet::new(),
            tab_ids: Vec::new(),
            tab_group_id: None,
            created_at: now,
            last_active_at: now,
            color,
        }
    }

    #[must_use]
    pub fn contains_tab(&self, tab_id: TabId) -> bool {
        self.tab_ids.contains(&tab_id)
    }

    /// Add a tab, returning `false` if it was already a member
    pub fn add_tab(&mut self, tab_id: TabId) -> bool {
        if self.contains_tab(tab_id) {
            return false;
        }
        self.tab_ids.push(tab_id);
        true
    }

    /// Remove a tab, returning `false` if it was not a member
    pub fn remove_tab(&mut self, tab_id: TabId) -> bool {
        let before = self.tab_ids.len();
        self.tab_ids.retain(|id| *id != tab_id);
        if self.tab_ids.is_empty() {
            // The host drops a group once its last tab is gone
            self.tab_group_id = None;
        }
        self.tab_ids.len() != before
    }

    /// Move `last_active_at` forward; never backwards
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_active_at {
            self.last_active_at = now;
        }
    }
}

/// All workspaces keyed by id (iteration order = creation order)
pub type WorkspaceMap = BTreeMap<WorkspaceId, Workspace>;

/// Transition of the active tab from one workspace to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSwitchEvent {
    pub from_workspace_id: Option<WorkspaceId>,
    pub to_workspace_id: WorkspaceId,
    pub timestamp: DateTime<Utc>,
    pub url: String,
}

/// Restorable state of one workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotWorkspace {
    pub name: String,
    pub project_signature: ProjectSignature,
    #[serde(default)]
    pub tech_stack: BTreeSet<String>,
    pub color: GroupColor,
    pub created_at: DateTime<Utc>,
    /// At most [`MAX_SNAPSHOT_URLS`] entries
    pub urls: Vec<String>,
}

/// The last saved session; overwritten wholesale on every save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub timestamp: DateTime<Utc>,
    pub workspaces: BTreeMap<WorkspaceId, SnapshotWorkspace>,
}

/// User preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub session_persistence: bool,
    /// Sites blocked while focus mode is active (domains or substrings)
    pub blocklist: Vec<String>,
    /// Break reminder delay after enabling focus mode; 0 disables it
    pub focus_duration_minutes: u32,
    /// Periodic session autosave; 0 disables it
    pub autosave_interval_minutes: u32,
    /// Classifier decision threshold for tab page loads
    pub detection_threshold: f32,
}

impl Settings {
    #[must_use]
    pub fn default_settings() -> Self {
        Self {
            session_persistence: true,
            blocklist: vec![
                "facebook.com".to_string(),
                "instagram.com".to_string(),
                "reddit.com".to_string(),
                "tiktok.com".to_string(),
                "twitter.com".to_string(),
                "x.com".to_string(),
                "youtube.com".to_string(),
            ],
            focus_duration_minutes: 50,
            autosave_interval_minutes: 5,
            detection_threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Trim, lowercase and de-duplicate the blocklist, clamp the threshold
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let mut seen = BTreeSet::new();
        self.blocklist = self
            .blocklist
            .into_iter()
            .map(|site| site.trim().to_ascii_lowercase())
            .filter(|site| !site.is_empty() && seen.insert(site.clone()))
            .collect();
        self.detection_threshold = self.detection_threshold.clamp(0.0, 1.0);
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::default_settings()
    }
}

/// Focus mode state that must survive process suspension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusRecord {
    pub active: bool,
    pub installed_rule_ids: BTreeSet<u32>,
    pub started_at: Option<DateTime<Utc>>,
    /// Deadline of the pending break reminder
    pub break_due_at: Option<DateTime<Utc>>,
    pub distractions: u32,
}

/// Engine state rehydrated on every wake
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeState {
    pub active_workspace: Option<WorkspaceId>,
    pub focus: FocusRecord,
    /// Next periodic session save
    pub autosave_due_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn workspace() -> Workspace {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Workspace::new(
            WorkspaceId::from("ws_1"),
            "cargo".to_string(),
            ProjectSignature::repo("github.com/rust-lang/cargo"),
            GroupColor::Blue,
            now,
        )
    }

    #[test]
    fn test_workspace_id_sorts_by_creation_time() {
        let early = WorkspaceId::generate(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let late = WorkspaceId::generate(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        assert!(early < late);
        assert!(early.as_str().starts_with("ws_"));
    }

    #[test]
    fn test_workspace_ids_do_not_collide() {
        let now = Utc::now();
        let ids: BTreeSet<_> = (0..100).map(|_| WorkspaceId::generate(now)).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_add_tab_is_idempotent() {
        let mut ws = workspace();
        assert!(ws.add_tab(7));
        assert!(!ws.add_tab(7));
        assert_eq!(ws.tab_ids, vec![7]);
    }

    #[test]
    fn test_removing_last_tab_clears_group() {
        let mut ws = workspace();
        ws.add_tab(1);
        ws.add_tab(2);
        ws.tab_group_id = Some(40);
        assert!(ws.remove_tab(1));
        assert_eq!(ws.tab_group_id, Some(40));
        assert!(ws.remove_tab(2));
        assert_eq!(ws.tab_group_id, None);
        assert!(!ws.remove_tab(2));
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut ws = workspace();
        let later = ws.last_active_at + chrono::Duration::minutes(5);
        ws.touch(later);
        ws.touch(later - chrono::Duration::hours(1));
        assert_eq!(ws.last_active_at, later);
    }

    #[test]
    fn test_settings_normalized() {
        let settings = Settings {
            blocklist: vec![" Reddit.com ".into(), "reddit.com".into(), String::new()],
            detection_threshold: 3.0,
            ..Settings::default()
        }
        .normalized();
        assert_eq!(settings.blocklist, vec!["reddit.com".to_string()]);
        assert!((settings.detection_threshold - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_settings_missing_fields_use_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"sessionPersistence": false}"#).unwrap();
        assert!(!settings.session_persistence);
        assert_eq!(settings.autosave_interval_minutes, 5);
        assert!(!settings.blocklist.is_empty());
    }

    #[test]
    fn test_workspace_serializes_camel_case() {
        let json = serde_json::to_value(workspace()).unwrap();
        assert_eq!(json["projectSignature"], "repo:github.com/rust-lang/cargo");
        assert_eq!(json["color"], "blue");
        assert!(json["tabGroupId"].is_null());
    }
}
