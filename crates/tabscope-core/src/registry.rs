use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tabscope_detector::{ProjectSignal, ProjectSignature};
use tabscope_storage::{
    Database, GroupColor, GroupId, SnapshotWorkspace, TabId, Workspace, WorkspaceId, WorkspaceMap,
};

use crate::error::{EngineError, EngineResult};
use crate::host::{BrowserHost, HostError};

/// Owns the set of workspaces and which tabs belong to them.
///
/// Every operation reads the persisted map, applies the change and writes it
/// back, so no in-memory copy can go stale across process suspension.
#[derive(Clone)]
pub struct WorkspaceRegistry {
    database: Arc<Database>,
    host: Arc<dyn BrowserHost>,
}

impl WorkspaceRegistry {
    #[must_use]
    pub fn new(database: Arc<Database>, host: Arc<dyn BrowserHost>) -> Self {
        Self { database, host }
    }

    /// All workspaces in creation order
    ///
    /// # Errors
    ///
    /// Returns an error if the workspaces cannot be loaded
    pub fn list(&self) -> EngineResult<Vec<Workspace>> {
        Ok(self.database.load_workspaces()?.into_values().collect())
    }

    /// # Errors
    ///
    /// Returns an error if the workspaces cannot be loaded
    pub fn get(&self, id: &WorkspaceId) -> EngineResult<Option<Workspace>> {
        Ok(self.database.load_workspaces()?.remove(id))
    }

    /// Exact signature match; the first (oldest) workspace wins
    ///
    /// # Errors
    ///
    /// Returns an error if the workspaces cannot be loaded
    pub fn find_for_signature(
        &self,
        signature: &ProjectSignature,
    ) -> EngineResult<Option<WorkspaceId>> {
        let workspaces = self.database.load_workspaces()?;
        Ok(find_signature_in(&workspaces, signature))
    }

    /// # Errors
    ///
    /// Returns an error if the workspaces cannot be loaded
    pub fn find_for_tab(&self, tab_id: TabId) -> EngineResult<Option<WorkspaceId>> {
        let workspaces = self.database.load_workspaces()?;
        Ok(find_tab_in(&workspaces, tab_id))
    }

    /// Create a workspace for a signal with a fresh id and a random color
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the signal carries no signature, or a
    /// storage error if the write fails
    pub fn create_workspace(
        &self,
        signal: &ProjectSignal,
        now: DateTime<Utc>,
    ) -> EngineResult<WorkspaceId> {
        let mut workspaces = self.database.load_workspaces()?;
        let id = create_in(&mut workspaces, signal, now)?;
        self.database.save_workspaces(&workspaces)?;
        log::info!("Created workspace {id} for {:?}", signal.project_signature);
        Ok(id)
    }

    /// Add a tab to a workspace, moving it out of any other workspace
    ///
    /// Returns `false` when the tab was already a member.
    ///
    /// # Errors
    ///
    /// Returns `WorkspaceNotFound` for an unknown id, or a storage error
    pub fn assign_tab(
        &self,
        workspace_id: &WorkspaceId,
        tab_id: TabId,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let mut workspaces = self.database.load_workspaces()?;
        let added = assign_in(&mut workspaces, workspace_id, tab_id, now)?;
        self.database.save_workspaces(&workspaces)?;
        Ok(added)
    }

    /// Assignment path for a detected signal: reuse the workspace holding the
    /// signature, create one only when none exists, then assign the tab
    ///
    /// Returns `None` for signals without a signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspaces cannot be loaded or saved
    pub fn assign_signal(
        &self,
        signal: &ProjectSignal,
        tab_id: TabId,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<WorkspaceId>> {
        let Some(signature) = &signal.project_signature else {
            log::debug!("Ignoring signal without signature for tab {tab_id}");
            return Ok(None);
        };

        let mut workspaces = self.database.load_workspaces()?;
        let id = match find_signature_in(&workspaces, signature) {
            Some(id) => id,
            None => {
                let id = create_in(&mut workspaces, signal, now)?;
                log::info!("Created workspace {id} for {signature}");
                id
            }
        };

        if let Some(workspace) = workspaces.get_mut(&id) {
            workspace.tech_stack.extend(signal.tech_stack.iter().cloned());
        }
        assign_in(&mut workspaces, &id, tab_id, now)?;
        self.database.save_workspaces(&workspaces)?;
        Ok(Some(id))
    }

    /// Remove a tab from whichever workspace holds it
    ///
    /// # Errors
    ///
    /// Returns an error if the workspaces cannot be loaded or saved
    pub fn remove_tab(&self, tab_id: TabId) -> EngineResult<Option<WorkspaceId>> {
        let mut workspaces = self.database.load_workspaces()?;
        let removed_from = remove_in(&mut workspaces, tab_id);
        if removed_from.is_some() {
            self.database.save_workspaces(&workspaces)?;
        }
        Ok(removed_from)
    }

    /// Mark a workspace active at `now`
    ///
    /// # Errors
    ///
    /// Returns an error if the workspaces cannot be loaded or saved
    pub fn touch(&self, workspace_id: &WorkspaceId, now: DateTime<Utc>) -> EngineResult<()> {
        let mut workspaces = self.database.load_workspaces()?;
        if let Some(workspace) = workspaces.get_mut(workspace_id) {
            workspace.touch(now);
            self.database.save_workspaces(&workspaces)?;
        }
        Ok(())
    }

    /// Record the native group handle of a workspace
    ///
    /// # Errors
    ///
    /// Returns an error if the workspaces cannot be loaded or saved
    pub fn set_group(
        &self,
        workspace_id: &WorkspaceId,
        group_id: Option<GroupId>,
    ) -> EngineResult<()> {
        let mut workspaces = self.database.load_workspaces()?;
        if let Some(workspace) = workspaces.get_mut(workspace_id) {
            workspace.tab_group_id = group_id;
            self.database.save_workspaces(&workspaces)?;
        }
        Ok(())
    }

    /// Merge tabs reopened from a snapshot into the workspace with the same
    /// id, creating it from the snapshot metadata when absent
    ///
    /// # Errors
    ///
    /// Returns an error if the workspaces cannot be loaded or saved
    pub fn merge_restored(
        &self,
        workspace_id: &WorkspaceId,
        snapshot: &SnapshotWorkspace,
        tab_ids: &[TabId],
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let mut workspaces = self.database.load_workspaces()?;
        workspaces.entry(workspace_id.clone()).or_insert_with(|| {
            let mut workspace = Workspace::new(
                workspace_id.clone(),
                snapshot.name.clone(),
                snapshot.project_signature.clone(),
                snapshot.color,
                now,
            );
            workspace.created_at = snapshot.created_at;
            workspace.tech_stack.clone_from(&snapshot.tech_stack);
            workspace
        });
        for tab_id in tab_ids {
            assign_in(&mut workspaces, workspace_id, *tab_id, now)?;
        }
        self.database.save_workspaces(&workspaces)?;
        Ok(())
    }

    /// Drop tab ids the host no longer knows about (e.g. after a browser restart)
    ///
    /// # Errors
    ///
    /// Returns an error if the workspaces cannot be loaded or saved
    pub async fn prune_missing_tabs(&self) -> EngineResult<usize> {
        let workspaces = self.database.load_workspaces()?;
        let mut missing = Vec::new();
        for tab_id in workspaces.values().flat_map(|w| w.tab_ids.iter().copied()) {
            match self.host.tab_url(tab_id).await {
                Ok(_) => {}
                Err(HostError::TabNotFound(_)) => missing.push(tab_id),
                Err(e) => log::warn!("Could not check tab {tab_id}: {e}"),
            }
        }

        if missing.is_empty() {
            return Ok(0);
        }

        // Re-read so the write does not clobber changes made while awaiting the host
        let mut workspaces = self.database.load_workspaces()?;
        for tab_id in &missing {
            remove_in(&mut workspaces, *tab_id);
        }
        self.database.save_workspaces(&workspaces)?;
        log::info!("Pruned {} stale tab ids", missing.len());
        Ok(missing.len())
    }

    /// Delete a workspace: release its group, close its tabs, drop the record
    ///
    /// Host failures are logged; the record is removed regardless.
    ///
    /// # Errors
    ///
    /// Returns `WorkspaceNotFound` for an unknown id, or a storage error
    pub async fn delete(&self, workspace_id: &WorkspaceId) -> EngineResult<Workspace> {
        let workspace = self
            .get(workspace_id)?
            .ok_or_else(|| EngineError::WorkspaceNotFound(workspace_id.clone()))?;

        if workspace.tab_group_id.is_some() {
            if let Err(e) = self.host.ungroup_tabs(&workspace.tab_ids).await {
                log::warn!("Failed to release tab group of {workspace_id}: {e}");
            }
        }
        if !workspace.tab_ids.is_empty() {
            if let Err(e) = self.host.close_tabs(&workspace.tab_ids).await {
                log::warn!("Failed to close tabs of {workspace_id}: {e}");
            }
        }

        let mut workspaces = self.database.load_workspaces()?;
        workspaces.remove(workspace_id);
        self.database.save_workspaces(&workspaces)?;
        log::info!("Deleted workspace {workspace_id} ({})", workspace.name);
        Ok(workspace)
    }
}

fn find_signature_in(
    workspaces: &WorkspaceMap,
    signature: &ProjectSignature,
) -> Option<WorkspaceId> {
    workspaces
        .values()
        .find(|w| &w.project_signature == signature)
        .map(|w| w.id.clone())
}

fn find_tab_in(workspaces: &WorkspaceMap, tab_id: TabId) -> Option<WorkspaceId> {
    workspaces
        .values()
        .find(|w| w.contains_tab(tab_id))
        .map(|w| w.id.clone())
}

fn create_in(
    workspaces: &mut WorkspaceMap,
    signal: &ProjectSignal,
    now: DateTime<Utc>,
) -> EngineResult<WorkspaceId> {
    let signature = signal.project_signature.clone().ok_or_else(|| {
        EngineError::InvalidRequest("signal has no project signature".to_string())
    })?;

    let mut id = WorkspaceId::generate(now);
    while workspaces.contains_key(&id) {
        id = WorkspaceId::generate(now);
    }

    let color = *GroupColor::PALETTE
        .choose(&mut rand::thread_rng())
        .unwrap_or(&GroupColor::Grey);
    let mut workspace = Workspace::new(id.clone(), signature.display_name(), signature, color, now);
    workspace.tech_stack.clone_from(&signal.tech_stack);
    workspaces.insert(id.clone(), workspace);
    Ok(id)
}

fn assign_in(
    workspaces: &mut WorkspaceMap,
    workspace_id: &WorkspaceId,
    tab_id: TabId,
    now: DateTime<Utc>,
) -> EngineResult<bool> {
    if !workspaces.contains_key(workspace_id) {
        return Err(EngineError::WorkspaceNotFound(workspace_id.clone()));
    }

    for (id, workspace) in workspaces.iter_mut() {
        if id != workspace_id && workspace.remove_tab(tab_id) {
            log::debug!("Moved tab {tab_id} out of {id}");
        }
    }

    let Some(workspace) = workspaces.get_mut(workspace_id) else {
        return Err(EngineError::WorkspaceNotFound(workspace_id.clone()));
    };
    let added = workspace.add_tab(tab_id);
    workspace.touch(now);
    Ok(added)
}

fn remove_in(workspaces: &mut WorkspaceMap, tab_id: TabId) -> Option<WorkspaceId> {
    workspaces
        .values_mut()
        .find_map(|w| w.remove_tab(tab_id).then(|| w.id.clone()))
}
