use std::sync::Arc;
use tabscope_storage::{GroupId, WorkspaceId};

use crate::error::EngineResult;
use crate::host::{BrowserHost, HostError};
use crate::registry::WorkspaceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Fewer than two tabs, or the workspace is gone
    Skipped,
    Created(GroupId),
    Updated(GroupId),
    /// The host refused; the next reconcile retries
    Failed,
}

/// Mirrors workspace membership into the host's native tab groups
#[derive(Clone)]
pub struct TabGroupSynchronizer {
    registry: WorkspaceRegistry,
    host: Arc<dyn BrowserHost>,
}

impl TabGroupSynchronizer {
    #[must_use]
    pub fn new(registry: WorkspaceRegistry, host: Arc<dyn BrowserHost>) -> Self {
        Self { registry, host }
    }

    /// Bring the native group of one workspace in line with its tabs
    ///
    /// Vanished tabs are pruned from the workspace and the rest are grouped.
    /// A stored group the host no longer accepts is replaced by a new one.
    ///
    /// # Errors
    ///
    /// Returns an error only for storage failures; host failures are logged
    pub async fn reconcile(&self, workspace_id: &WorkspaceId) -> EngineResult<ReconcileOutcome> {
        loop {
            let Some(workspace) = self.registry.get(workspace_id)? else {
                return Ok(ReconcileOutcome::Skipped);
            };
            if workspace.tab_ids.len() < 2 {
                return Ok(ReconcileOutcome::Skipped);
            }

            match self
                .host
                .group_tabs(&workspace.tab_ids, workspace.tab_group_id)
                .await
            {
                Ok(group) if workspace.tab_group_id == Some(group) => {
                    return Ok(ReconcileOutcome::Updated(group));
                }
                Ok(group) => {
                    if let Err(e) = self
                        .host
                        .update_group(group, &workspace.name, workspace.color)
                        .await
                    {
                        log::warn!("Failed to label group {group} for {workspace_id}: {e}");
                    }
                    self.registry.set_group(workspace_id, Some(group))?;
                    log::debug!(
                        "Grouped {} tabs of {workspace_id} as {group}",
                        workspace.tab_ids.len()
                    );
                    return Ok(ReconcileOutcome::Created(group));
                }
                Err(HostError::TabNotFound(tab_id)) => {
                    log::warn!("Tab {tab_id} vanished; pruning it from {workspace_id}");
                    if self.registry.remove_tab(tab_id)?.is_none() {
                        // Tab was not ours; nothing left to prune, so stop
                        return Ok(ReconcileOutcome::Failed);
                    }
                }
                Err(HostError::GroupRejected(reason)) if workspace.tab_group_id.is_some() => {
                    log::warn!("Group of {workspace_id} rejected ({reason}); regrouping");
                    self.registry.set_group(workspace_id, None)?;
                }
                Err(e) => {
                    log::warn!("Failed to group tabs of {workspace_id}: {e}");
                    return Ok(ReconcileOutcome::Failed);
                }
            }
        }
    }

    /// Reconcile every workspace; a failure in one never blocks the others
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace list cannot be loaded
    pub async fn reconcile_all(&self) -> EngineResult<Vec<(WorkspaceId, ReconcileOutcome)>> {
        let mut outcomes = Vec::new();
        for workspace in self.registry.list()? {
            match self.reconcile(&workspace.id).await {
                Ok(outcome) => outcomes.push((workspace.id, outcome)),
                Err(e) => {
                    log::error!("Reconcile of {} failed: {e}", workspace.id);
                    outcomes.push((workspace.id, ReconcileOutcome::Failed));
                }
            }
        }
        Ok(outcomes)
    }
}
