use anyhow::Result;

use crate::models::WorkspaceMap;

use super::{keys, Database};

impl Database {
    /// Load all workspaces (empty when nothing is stored)
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the record is corrupted
    pub fn load_workspaces(&self) -> Result<WorkspaceMap> {
        Ok(self.get_record(keys::WORKSPACES)?.unwrap_or_default())
    }

    /// Overwrite the workspaces record
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails
    pub fn save_workspaces(&self, workspaces: &WorkspaceMap) -> Result<()> {
        self.put_record(keys::WORKSPACES, workspaces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GroupColor, Workspace, WorkspaceId};
    use chrono::Utc;
    use tabscope_detector::ProjectSignature;

    #[test]
    fn test_workspaces_round_trip_through_store() {
        let db = Database::in_memory().unwrap();
        assert!(db.load_workspaces().unwrap().is_empty());

        let mut ws = Workspace::new(
            WorkspaceId::from("ws_1"),
            "shop".to_string(),
            ProjectSignature::localhost(3000),
            GroupColor::Green,
            Utc::now(),
        );
        ws.add_tab(3);
        ws.add_tab(1);

        let mut map = WorkspaceMap::new();
        map.insert(ws.id.clone(), ws.clone());
        db.save_workspaces(&map).unwrap();

        let loaded = db.load_workspaces().unwrap();
        assert_eq!(loaded.get(&ws.id), Some(&ws));
        assert_eq!(loaded[&ws.id].tab_ids, vec![3, 1]);
    }
}
