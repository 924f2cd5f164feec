use anyhow::Result;

use crate::models::ContextSwitchEvent;

use super::{keys, Database};

/// Events older than this are dropped when the log is written
pub const SWITCH_RETENTION_DAYS: i64 = 90;

impl Database {
    /// Load the context-switch log in append order
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the record is corrupted
    pub fn load_switch_events(&self) -> Result<Vec<ContextSwitchEvent>> {
        Ok(self.get_record(keys::CONTEXT_SWITCHES)?.unwrap_or_default())
    }

    /// Overwrite the context-switch log
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails
    pub fn save_switch_events(&self, events: &[ContextSwitchEvent]) -> Result<()> {
        self.put_record(keys::CONTEXT_SWITCHES, &events)
    }
}
