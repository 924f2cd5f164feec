use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tabscope_storage::{Database, SessionSnapshot, SnapshotWorkspace, MAX_SNAPSHOT_URLS};
use url::Url;

use crate::error::EngineResult;
use crate::host::{BrowserHost, Notification, NotificationKind};
use crate::registry::WorkspaceRegistry;
use crate::tab_groups::TabGroupSynchronizer;

/// Snapshots older than this are discarded instead of restored
pub const SNAPSHOT_MAX_AGE_HOURS: i64 = 24;

/// Only web pages can be reopened; internal and extension pages cannot
#[must_use]
pub fn is_restorable_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStatus {
    Restored,
    Disabled,
    NoSnapshot,
    Stale,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub status: RestoreStatus,
    pub workspaces: usize,
    pub tabs: usize,
}

impl RestoreReport {
    fn empty(status: RestoreStatus) -> Self {
        Self {
            status,
            workspaces: 0,
            tabs: 0,
        }
    }
}

/// Saves workspace URLs across browser restarts and reopens them
#[derive(Clone)]
pub struct SessionSnapshotManager {
    database: Arc<Database>,
    host: Arc<dyn BrowserHost>,
    registry: WorkspaceRegistry,
    groups: TabGroupSynchronizer,
}

impl SessionSnapshotManager {
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        host: Arc<dyn BrowserHost>,
        registry: WorkspaceRegistry,
        groups: TabGroupSynchronizer,
    ) -> Self {
        Self {
            database,
            host,
            registry,
            groups,
        }
    }

    /// Snapshot the live URLs of every workspace
    ///
    /// Returns `None` when session persistence is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if settings or workspaces cannot be read, or the
    /// snapshot cannot be written
    pub async fn save(&self, now: DateTime<Utc>) -> EngineResult<Option<SessionSnapshot>> {
        if !self.database.get_settings()?.session_persistence {
            log::debug!("Session persistence disabled; not saving");
            return Ok(None);
        }

        let mut workspaces = BTreeMap::new();
        for workspace in self.registry.list()? {
            if workspace.tab_ids.is_empty() {
                continue;
            }

            let mut urls = Vec::new();
            for tab_id in &workspace.tab_ids {
                match self.host.tab_url(*tab_id).await {
                    Ok(Some(url)) if is_restorable_url(&url) => urls.push(url),
                    Ok(_) => {}
                    Err(e) => log::debug!("Skipping tab {tab_id} in snapshot: {e}"),
                }
                if urls.len() == MAX_SNAPSHOT_URLS {
                    break;
                }
            }
            if urls.is_empty() {
                continue;
            }

            workspaces.insert(
                workspace.id.clone(),
                SnapshotWorkspace {
                    name: workspace.name,
                    project_signature: workspace.project_signature,
                    tech_stack: workspace.tech_stack,
                    color: workspace.color,
                    created_at: workspace.created_at,
                    urls,
                },
            );
        }

        let snapshot = SessionSnapshot {
            timestamp: now,
            workspaces,
        };
        self.database.save_last_session(&snapshot)?;
        log::info!("Saved session with {} workspaces", snapshot.workspaces.len());
        Ok(Some(snapshot))
    }

    /// Reopen the last snapshot in background tabs and regroup them
    ///
    /// A stale or unreadable snapshot is discarded without error. A restored
    /// snapshot is consumed so the next startup does not open it again.
    ///
    /// # Errors
    ///
    /// Returns an error if settings cannot be read or restored workspaces
    /// cannot be written
    pub async fn restore(&self, now: DateTime<Utc>) -> EngineResult<RestoreReport> {
        if !self.database.get_settings()?.session_persistence {
            return Ok(RestoreReport::empty(RestoreStatus::Disabled));
        }

        let snapshot = match self.database.load_last_session() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(RestoreReport::empty(RestoreStatus::NoSnapshot)),
            Err(e) => {
                log::warn!("Discarding unreadable session snapshot: {e:#}");
                self.database.discard_last_session()?;
                return Ok(RestoreReport::empty(RestoreStatus::Invalid));
            }
        };

        if now - snapshot.timestamp > Duration::hours(SNAPSHOT_MAX_AGE_HOURS) {
            log::info!("Discarding session snapshot from {}", snapshot.timestamp);
            self.database.discard_last_session()?;
            return Ok(RestoreReport::empty(RestoreStatus::Stale));
        }

        let mut report = RestoreReport::empty(RestoreStatus::Restored);
        for (workspace_id, saved) in &snapshot.workspaces {
            let mut tab_ids = Vec::new();
            for url in saved.urls.iter().take(MAX_SNAPSHOT_URLS) {
                match self.host.create_tab(url, false).await {
                    Ok(tab_id) => tab_ids.push(tab_id),
                    Err(e) => log::warn!("Could not reopen {url}: {e}"),
                }
            }
            if tab_ids.is_empty() {
                continue;
            }

            self.registry
                .merge_restored(workspace_id, saved, &tab_ids, now)?;
            self.groups.reconcile(workspace_id).await?;
            report.workspaces += 1;
            report.tabs += tab_ids.len();
        }

        self.database.discard_last_session()?;
        if report.tabs > 0 {
            let notification = Notification {
                kind: NotificationKind::SessionRestored,
                title: "Session restored".to_string(),
                message: format!(
                    "Reopened {} tabs across {} workspaces",
                    report.tabs, report.workspaces
                ),
            };
            if let Err(e) = self.host.notify(notification).await {
                log::warn!("Failed to send restore notification: {e}");
            }
        }
        log::info!(
            "Restored {} tabs into {} workspaces",
            report.tabs,
            report.workspaces
        );
        Ok(report)
    }
}
