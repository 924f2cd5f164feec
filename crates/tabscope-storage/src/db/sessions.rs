use anyhow::Result;

use crate::models::SessionSnapshot;

use super::{keys, Database};

impl Database {
    /// Load the last session snapshot, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the snapshot does not decode
    pub fn load_last_session(&self) -> Result<Option<SessionSnapshot>> {
        self.get_record(keys::LAST_SESSION)
    }

    /// Replace the last session snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails
    pub fn save_last_session(&self, snapshot: &SessionSnapshot) -> Result<()> {
        self.put_record(keys::LAST_SESSION, snapshot)
    }

    /// Drop the last session snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub fn discard_last_session(&self) -> Result<()> {
        self.remove(keys::LAST_SESSION)
    }
}
