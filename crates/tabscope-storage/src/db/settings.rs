use anyhow::Result;

use crate::models::{RuntimeState, Settings};

use super::{keys, Database};

impl Database {
    /// Load user settings, falling back to defaults when absent or unreadable
    ///
    /// # Errors
    ///
    /// Returns an error if the read itself fails
    pub fn get_settings(&self) -> Result<Settings> {
        let values = self.get(&[keys::SETTINGS])?;
        let settings = match values.get(keys::SETTINGS) {
            Some(value) => serde_json::from_value::<Settings>(value.clone()).unwrap_or_else(|e| {
                log::warn!("Stored settings are invalid, using defaults: {e}");
                Settings::default()
            }),
            None => Settings::default(),
        };
        Ok(settings)
    }

    /// Save user settings (normalized first)
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails
    pub fn update_settings(&self, settings: &Settings) -> Result<Settings> {
        let normalized = settings.clone().normalized();
        self.put_record(keys::SETTINGS, &normalized)?;
        Ok(normalized)
    }

    /// Load engine runtime state (default when absent)
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the record is corrupted
    pub fn load_runtime(&self) -> Result<RuntimeState> {
        Ok(self.get_record(keys::RUNTIME)?.unwrap_or_default())
    }

    /// Overwrite engine runtime state
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails
    pub fn save_runtime(&self, state: &RuntimeState) -> Result<()> {
        self.put_record(keys::RUNTIME, state)
    }
}
