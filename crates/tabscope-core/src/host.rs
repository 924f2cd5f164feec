use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabscope_detector::PageObservation;
use tabscope_storage::{GroupColor, GroupId, TabId};
use thiserror::Error;

/// Failure reported by the browsing host
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum HostError {
    #[error("tab {0} no longer exists")]
    TabNotFound(TabId),
    #[error("tab grouping rejected: {0}")]
    GroupRejected(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("host unavailable: {0}")]
    Unavailable(String),
    #[error("host protocol error: {0}")]
    Protocol(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Declarative block rule installed while focus mode is active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRule {
    pub id: u32,
    /// Host URL filter, e.g. `||reddit.com`
    pub url_filter: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    Distraction,
    BreakReminder,
    SessionRestored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

/// Primitives the engine consumes from the browsing host.
///
/// Every method may fail with a [`HostError`]; callers decide whether a
/// failure is logged or surfaced.
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// Current URL of a tab, `None` if the tab has no URL yet
    async fn tab_url(&self, tab_id: TabId) -> HostResult<Option<String>>;

    /// Open a tab; `active = false` opens it in the background
    async fn create_tab(&self, url: &str, active: bool) -> HostResult<TabId>;

    async fn activate_tab(&self, tab_id: TabId) -> HostResult<()>;

    async fn close_tabs(&self, tab_ids: &[TabId]) -> HostResult<()>;

    /// Group tabs, creating a group when `group_id` is `None`, otherwise
    /// adding to the existing one. Returns the group handle.
    async fn group_tabs(&self, tab_ids: &[TabId], group_id: Option<GroupId>)
        -> HostResult<GroupId>;

    /// Label a group
    async fn update_group(&self, group_id: GroupId, title: &str, color: GroupColor)
        -> HostResult<()>;

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> HostResult<()>;

    /// Run the page-observation script in a tab
    async fn observe_page(&self, tab_id: TabId) -> HostResult<Option<PageObservation>>;

    async fn notify(&self, notification: Notification) -> HostResult<()>;

    async fn add_block_rules(&self, rules: &[BlockRule]) -> HostResult<()>;

    async fn remove_block_rules(&self, rule_ids: &[u32]) -> HostResult<()>;

    /// Schedule (or replace) a named one-shot wake-up
    async fn schedule_alarm(&self, name: &str, at: DateTime<Utc>) -> HostResult<()>;

    async fn clear_alarm(&self, name: &str) -> HostResult<()>;
}
