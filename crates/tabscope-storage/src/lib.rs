pub mod db;
pub mod migrations;
pub mod models;

pub use db::{keys, Database, SWITCH_RETENTION_DAYS};
pub use models::{
    ContextSwitchEvent, FocusRecord, GroupColor, GroupId, RuntimeState, SessionSnapshot, Settings,
    SnapshotWorkspace, TabId, Workspace, WorkspaceId, WorkspaceMap, MAX_SNAPSHOT_URLS,
};
