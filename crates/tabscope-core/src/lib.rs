//! Workspace engine: groups browser tabs into project workspaces, records
//! context switches, runs focus mode and snapshots sessions.

pub mod analytics;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod focus;
pub mod host;
pub mod messages;
pub mod registry;
pub mod session_snapshot;
pub mod switch_log;
pub mod tab_groups;

#[cfg(test)]
mod test_support;

pub use analytics::{AnalyticsAggregator, AnalyticsReport, TimeRange};
pub use bridge::{run_bridge, NativeHost};
pub use config::TabscopeConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult, ErrorCode, RequestError};
pub use focus::FocusStatus;
pub use host::{BlockRule, BrowserHost, HostError, HostResult, Notification, NotificationKind};
pub use messages::{ExportDocument, HostEvent, Request, Response, TabStatus};
