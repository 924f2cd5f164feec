
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tabscope_detector::{
    PageObservation, ProjectSignal, ProjectSignalClassifier, CONTENT_SCRIPT_THRESHOLD,
    MAX_CONFIDENCE,
};
use tabscope_storage::{Database, TabId, WorkspaceId};

use crate::analytics::{AnalyticsAggregator, AnalyticsReport, TimeRange};
use crate::error::{EngineError, EngineResult, RequestError};
use crate::focus::{FocusModeController, FOCUS_BREAK_ALARM};
use crate::host::{BrowserHost, HostError};
use crate::messages::{ExportDocument, HostEvent, Request, Response, TabStatus};
use crate::registry::WorkspaceRegistry;
use crate::session_snapshot::SessionSnapshotManager;
use crate::switch_log::ContextSwitchLog;
use crate::tab_groups::TabGroupSynchronizer;

/// Host alarm driving the periodic session save
pub const SESSION_AUTOSAVE_ALARM: &str = "session-autosave";

/// Context object wiring every component to one store and one host
///
/// Built once per process. Holds no state of its own beyond the component
/// handles; everything else is re-read from the store on each call.
pub struct Engine {
    database: Arc<Database>,
    host: Arc<dyn BrowserHost>,
    classifier: ProjectSignalClassifier,
    registry: WorkspaceRegistry,
    switches: ContextSwitchLog,
    groups: TabGroupSynchronizer,
    sessions: SessionSnapshotManager,
    focus: FocusModeController,
    analytics: AnalyticsAggregator,
}

impl Engine {
    #[must_use]
    pub fn new(database: Arc<Database>, host: Arc<dyn BrowserHost>) -> Self {
        let registry = WorkspaceRegistry::new(database.clone(), host.clone());
        let groups = TabGroupSynchronizer::new(registry.clone(), host.clone());
        let sessions = SessionSnapshotManager::new(
            database.clone(),
            host.clone(),
            registry.clone(),
            groups.clone(),
        );

        Self {
            classifier: ProjectSignalClassifier::new(),
            switches: ContextSwitchLog::new(database.clone()),
            focus: FocusModeController::new(database.clone(), host.clone()),
            analytics: AnalyticsAggregator::default(),
            registry,
            groups,
            sessions,
            database,
            host,
        }
    }

    // ==================== Host Events ====================

    /// Process one host event; failures are logged, never returned
    pub async fn handle_event(&self, event: HostEvent) {
        self.handle_event_at(event, Utc::now()).await;
    }

    pub async fn handle_event_at(&self, event: HostEvent, now: DateTime<Utc>) {
        let description = format!("{event:?}");
        if let Err(e) = self.dispatch_event(event, now).await {
            log::error!("Failed to handle event {description}: {e}");
        }
    }

    async fn dispatch_event(&self, event: HostEvent, now: DateTime<Utc>) -> EngineResult<()> {
        match event {
            HostEvent::Startup => {
                self.on_startup(now).await;
                Ok(())
            }
            HostEvent::Wake => {
                self.on_wake(now).await;
                Ok(())
            }
            HostEvent::TabCreated { tab_id, .. } => {
                log::debug!("Tab {tab_id} created");
                Ok(())
            }
            HostEvent::TabUpdated {
                tab_id,
                url,
                status: Some(TabStatus::Complete),
            } => self.on_page_loaded(tab_id, url, now).await,
            HostEvent::TabUpdated { .. } => Ok(()),
            HostEvent::TabActivated { tab_id } => self.on_tab_activated(tab_id, now).await,
            HostEvent::TabRemoved { tab_id } => {
                if let Some(id) = self.registry.remove_tab(tab_id)? {
                    log::debug!("Tab {tab_id} closed; removed from {id}");
                }
                Ok(())
            }
            HostEvent::AlarmFired { name } => self.on_alarm(&name, now).await,
        }
    }

    async fn on_startup(&self, now: DateTime<Utc>) {
        log::info!("Browser startup");
        if let Err(e) = self.focus.reset_on_startup().await {
            log::error!("Failed to reset focus mode: {e}");
        }
        if let Err(e) = self.forget_active_workspace() {
            log::error!("Failed to reset active workspace: {e}");
        }
        if let Err(e) = self.registry.prune_missing_tabs().await {
            log::error!("Failed to prune stale tabs: {e}");
        }
        match self.sessions.restore(now).await {
            Ok(report) => log::info!("Session restore: {:?}", report.status),
            Err(e) => log::error!("Session restore failed: {e}"),
        }
        if let Err(e) = self.rearm_autosave(now).await {
            log::error!("Failed to arm session autosave: {e}");
        }
    }

    async fn on_wake(&self, now: DateTime<Utc>) {
        log::debug!("Wake at {now}");
        if let Err(e) = self.focus.rearm(now).await {
            log::error!("Failed to re-arm focus reminder: {e}");
        }
        if let Err(e) = self.rearm_autosave(now).await {
            log::error!("Failed to re-arm session autosave: {e}");
        }
    }

    async fn on_page_loaded(
        &self,
        tab_id: TabId,
        url: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let observation = match self.host.observe_page(tab_id).await {
            Ok(Some(observation)) => Some(observation),
            Ok(None) => None,
            Err(HostError::TabNotFound(_)) => {
                self.registry.remove_tab(tab_id)?;
                return Ok(());
            }
            Err(e) => {
                log::debug!("Page observation failed for tab {tab_id}: {e}");
                None
            }
        };
        let Some(observation) =
            observation.or_else(|| url.as_deref().map(|u| PageObservation::from_url(u, "")))
        else {
            return Ok(());
        };

        let threshold = self.database.get_settings()?.detection_threshold;
        let Some(signal) = self.classifier.classify_at(&observation, threshold) else {
            return Ok(());
        };
        self.assign_and_group(&signal, tab_id, now).await?;
        Ok(())
    }

    async fn on_tab_activated(&self, tab_id: TabId, now: DateTime<Utc>) -> EngineResult<()> {
        let url = match self.host.tab_url(tab_id).await {
            Ok(url) => url.unwrap_or_default(),
            Err(e) => {
                log::debug!("No URL for activated tab {tab_id}: {e}");
                String::new()
            }
        };
        if !url.is_empty() {
            self.focus.check_activation(&url).await?;
        }

        // Untracked browsing leaves the active workspace unchanged
        let Some(workspace_id) = self.registry.find_for_tab(tab_id)? else {
            return Ok(());
        };
        self.enter_workspace(&workspace_id, &url, now)
    }

    async fn on_alarm(&self, name: &str, now: DateTime<Utc>) -> EngineResult<()> {
        match name {
            FOCUS_BREAK_ALARM => {
                self.focus.on_alarm(now).await?;
            }
            SESSION_AUTOSAVE_ALARM => self.rearm_autosave(now).await?,
            other => log::warn!("Ignoring unknown alarm '{other}'"),
        }
        Ok(())
    }

    // ==================== UI Requests ====================

    /// Process one UI request
    ///
    /// # Errors
    ///
    /// Returns a [`RequestError`] describing why the request was rejected
    pub async fn handle_request(&self, request: Request) -> Result<Response, RequestError> {
        self.handle_request_at(request, Utc::now()).await
    }

    /// # Errors
    ///
    /// Returns a [`RequestError`] describing why the request was rejected
    pub async fn handle_request_at(
        &self,
        request: Request,
        now: DateTime<Utc>,
    ) -> Result<Response, RequestError> {
        let action = request.action();
        log::debug!("Handling {action}");
        self.dispatch_request(request, now).await.map_err(|e| {
            log::warn!("{action} failed: {e}");
            RequestError::from(e)
        })
    }

    async fn dispatch_request(&self, request: Request, now: DateTime<Utc>) -> EngineResult<Response> {
        match request {
            Request::GetWorkspaces => Ok(Response::Workspaces(self.registry.list()?)),
            Request::SwitchToWorkspace { workspace_id } => {
                self.switch_to_workspace(workspace_id, now).await
            }
            Request::CreateWorkspace { signal } => self.create_workspace(&signal, now),
            Request::DeleteWorkspace { workspace_id } => self.delete_workspace(workspace_id).await,
            Request::GetAnalytics { time_range } => Ok(Response::Analytics(Box::new(
                self.analytics_report(now, time_range)?,
            ))),
            Request::SaveCurrentSession => {
                let snapshot = self.sessions.save(now).await?;
                Ok(Response::SessionSaved {
                    saved: snapshot.is_some(),
                    workspaces: snapshot.map_or(0, |s| s.workspaces.len()),
                })
            }
            Request::ToggleFocusMode => Ok(Response::Focus(self.focus.toggle(now).await?)),
            Request::GetFocusStatus => Ok(Response::Focus(self.focus.status()?)),
            Request::ProjectDetected {
                mut signal,
                url,
                tab_id,
            } => {
                if !signal.confidence.is_finite() {
                    return Err(EngineError::InvalidRequest(
                        "projectDetected confidence must be a finite number".to_string(),
                    ));
                }
                signal.confidence = signal.confidence.clamp(0.0, MAX_CONFIDENCE);
                if signal.confidence > CONTENT_SCRIPT_THRESHOLD {
                    self.assign_and_group(&signal, tab_id, now).await?;
                } else {
                    log::debug!("Ignoring weak signal for {url} ({:.2})", signal.confidence);
                }
                Ok(Response::Ack)
            }
            Request::ExportAnalyticsData => Ok(Response::Export(Box::new(self.export(now)?))),
            Request::ClearAllData => self.clear_all_data().await,
            Request::GetSettings => Ok(Response::Settings(self.database.get_settings()?)),
            Request::UpdateSettings { settings } => {
                let saved = self.database.update_settings(&settings)?;
                self.rearm_autosave(now).await?;
                log::info!("Settings updated");
                Ok(Response::Settings(saved))
            }
        }
    }

    async fn switch_to_workspace(
        &self,
        workspace_id: WorkspaceId,
        now: DateTime<Utc>,
    ) -> EngineResult<Response> {
        let workspace = self
            .registry
            .get(&workspace_id)?
            .ok_or_else(|| EngineError::WorkspaceNotFound(workspace_id.clone()))?;

        let mut activated = None;
        for tab_id in &workspace.tab_ids {
            match self.host.activate_tab(*tab_id).await {
                Ok(()) => {
                    activated = Some(*tab_id);
                    break;
                }
                Err(HostError::TabNotFound(_)) => {
                    log::warn!("Tab {tab_id} of {workspace_id} is gone");
                    self.registry.remove_tab(*tab_id)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(tab_id) = activated {
            let url = self
                .host
                .tab_url(tab_id)
                .await
                .ok()
                .flatten()
                .unwrap_or_default();
            self.enter_workspace(&workspace_id, &url, now)?;
        }

        Ok(Response::Switched {
            workspace_id,
            tab_id: activated,
        })
    }

    fn create_workspace(&self, signal: &ProjectSignal, now: DateTime<Utc>) -> EngineResult<Response> {
        let signature = signal.project_signature.as_ref().ok_or_else(|| {
            EngineError::InvalidRequest("createWorkspace requires a project signature".to_string())
        })?;

        if let Some(workspace_id) = self.registry.find_for_signature(signature)? {
            return Ok(Response::WorkspaceCreated {
                workspace_id,
                created: false,
            });
        }
        let workspace_id = self.registry.create_workspace(signal, now)?;
        Ok(Response::WorkspaceCreated {
            workspace_id,
            created: true,
        })
    }

    async fn delete_workspace(&self, workspace_id: WorkspaceId) -> EngineResult<Response> {
        let removed = self.registry.delete(&workspace_id).await?;

        let mut runtime = self.database.load_runtime()?;
        if runtime.active_workspace.as_ref() == Some(&workspace_id) {
            runtime.active_workspace = None;
            self.database.save_runtime(&runtime)?;
        }

        Ok(Response::WorkspaceDeleted {
            workspace_id,
            closed_tabs: removed.tab_ids.len(),
        })
    }

    async fn clear_all_data(&self) -> EngineResult<Response> {
        self.focus.disable().await?;
        if let Err(e) = self.host.clear_alarm(SESSION_AUTOSAVE_ALARM).await {
            log::warn!("Failed to clear autosave alarm: {e}");
        }
        self.database.clear()?;
        log::info!("All data cleared");
        Ok(Response::Cleared)
    }

    // ==================== Shared Paths ====================

    /// Current analytics over all stored workspaces and switches
    ///
    /// # Errors
    ///
    /// Returns an error if workspaces or the switch log cannot be read
    pub fn analytics_report(&self, now: DateTime<Utc>, range: TimeRange) -> EngineResult<AnalyticsReport> {
        self.analytics.report(&self.database, now, range)
    }

    /// Full data export with a 90-day report
    ///
    /// # Errors
    ///
    /// Returns an error if any record cannot be read
    pub fn export(&self, now: DateTime<Utc>) -> EngineResult<ExportDocument> {
        ExportDocument::collect(&self.database, &self.analytics, now)
    }

    async fn assign_and_group(
        &self,
        signal: &ProjectSignal,
        tab_id: TabId,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let Some(workspace_id) = self.registry.assign_signal(signal, tab_id, now)? else {
            return Ok(());
        };
        self.groups.reconcile(&workspace_id).await?;
        Ok(())
    }

    /// Make `workspace_id` the active workspace, logging the transition
    fn enter_workspace(
        &self,
        workspace_id: &WorkspaceId,
        url: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let mut runtime = self.database.load_runtime()?;
        self.switches
            .record(runtime.active_workspace.as_ref(), workspace_id, url, now)?;
        self.registry.touch(workspace_id, now)?;

        if runtime.active_workspace.as_ref() != Some(workspace_id) {
            runtime.active_workspace = Some(workspace_id.clone());
            self.database.save_runtime(&runtime)?;
        }
        Ok(())
    }

    fn forget_active_workspace(&self) -> EngineResult<()> {
        let mut runtime = self.database.load_runtime()?;
        if runtime.active_workspace.take().is_some() {
            self.database.save_runtime(&runtime)?;
        }
        Ok(())
    }

    /// Keep the autosave deadline and its alarm in step with settings
    ///
    /// An overdue deadline saves the session before the next one is armed.
    async fn rearm_autosave(&self, now: DateTime<Utc>) -> EngineResult<()> {
        let settings = self.database.get_settings()?;
        let mut runtime = self.database.load_runtime()?;

        if settings.autosave_interval_minutes == 0 || !settings.session_persistence {
            if runtime.autosave_due_at.take().is_some() {
                self.database.save_runtime(&runtime)?;
                if let Err(e) = self.host.clear_alarm(SESSION_AUTOSAVE_ALARM).await {
                    log::warn!("Failed to clear autosave alarm: {e}");
                }
                log::info!("Session autosave disabled");
            }
            return Ok(());
        }

        let interval = Duration::minutes(i64::from(settings.autosave_interval_minutes));
        let due = match runtime.autosave_due_at {
            Some(due) if due > now && due <= now + interval => due,
            Some(due) if due <= now => {
                self.sessions.save(now).await?;
                now + interval
            }
            _ => now + interval,
        };

        // The save above does not touch the runtime record
        runtime.autosave_due_at = Some(due);
        self.database.save_runtime(&runtime)?;
        if let Err(e) = self.host.schedule_alarm(SESSION_AUTOSAVE_ALARM, due).await {
            log::warn!("Failed to schedule session autosave: {e}");
        }
        Ok(())
    }
}
