use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabscope_detector::ProjectSignal;
use tabscope_storage::{ContextSwitchEvent, Database, Settings, TabId, Workspace, WorkspaceId};

use crate::analytics::{AnalyticsAggregator, AnalyticsReport, TimeRange};
use crate::error::EngineResult;
use crate::focus::FocusStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TabStatus {
    Loading,
    Complete,
}

/// Lifecycle notifications pushed by the browsing host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostEvent {
    /// Browser (re)started; previous tab ids are meaningless
    Startup,
    /// The host process woke the engine after suspension
    Wake,
    TabCreated {
        tab_id: TabId,
        #[serde(default)]
        url: Option<String>,
    },
    TabUpdated {
        tab_id: TabId,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        status: Option<TabStatus>,
    },
    TabActivated {
        tab_id: TabId,
    },
    TabRemoved {
        tab_id: TabId,
    },
    AlarmFired {
        name: String,
    },
}

/// Operations the UI can invoke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    GetWorkspaces,
    SwitchToWorkspace {
        workspace_id: WorkspaceId,
    },
    CreateWorkspace {
        signal: ProjectSignal,
    },
    DeleteWorkspace {
        workspace_id: WorkspaceId,
    },
    GetAnalytics {
        #[serde(default)]
        time_range: TimeRange,
    },
    SaveCurrentSession,
    ToggleFocusMode,
    GetFocusStatus,
    /// Fire-and-forget report from the page-observation script
    ProjectDetected {
        signal: ProjectSignal,
        url: String,
        tab_id: TabId,
    },
    ExportAnalyticsData,
    ClearAllData,
    GetSettings,
    UpdateSettings {
        settings: Settings,
    },
}

impl Request {
    /// Action name as it appears on the wire, for logging
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::GetWorkspaces => "getWorkspaces",
            Self::SwitchToWorkspace { .. } => "switchToWorkspace",
            Self::CreateWorkspace { .. } => "createWorkspace",
            Self::DeleteWorkspace { .. } => "deleteWorkspace",
            Self::GetAnalytics { .. } => "getAnalytics",
            Self::SaveCurrentSession => "saveCurrentSession",
            Self::ToggleFocusMode => "toggleFocusMode",
            Self::GetFocusStatus => "getFocusStatus",
            Self::ProjectDetected { .. } => "projectDetected",
            Self::ExportAnalyticsData => "exportAnalyticsData",
            Self::ClearAllData => "clearAllData",
            Self::GetSettings => "getSettings",
            Self::UpdateSettings { .. } => "updateSettings",
        }
    }
}

/// Everything the engine knows, for `exportAnalyticsData`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub exported_at: DateTime<Utc>,
    pub workspaces: Vec<Workspace>,
    pub context_switches: Vec<ContextSwitchEvent>,
    pub analytics: AnalyticsReport,
    pub settings: Settings,
}

impl ExportDocument {
    /// Snapshot the store, with a 90-day report
    ///
    /// # Errors
    ///
    /// Returns an error if any record cannot be read
    pub fn collect(
        database: &Database,
        analytics: &AnalyticsAggregator,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        Ok(Self {
            exported_at: now,
            workspaces: database.load_workspaces()?.into_values().collect(),
            context_switches: database.load_switch_events()?,
            analytics: analytics.report(database, now, TimeRange::Quarter)?,
            settings: database.get_settings()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Response {
    Workspaces(Vec<Workspace>),
    Switched {
        workspace_id: WorkspaceId,
        tab_id: Option<TabId>,
    },
    WorkspaceCreated {
        workspace_id: WorkspaceId,
        /// `false` when a workspace with the same signature already existed
        created: bool,
    },
    WorkspaceDeleted {
        workspace_id: WorkspaceId,
        closed_tabs: usize,
    },
    Analytics(Box<AnalyticsReport>),
    SessionSaved {
        saved: bool,
        workspaces: usize,
    },
    Focus(FocusStatus),
    Export(Box<ExportDocument>),
    Cleared,
    Settings(Settings),
    Ack,
}
