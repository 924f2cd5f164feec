use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_HOST_CALL_TIMEOUT_SECS: u64 = 10;

/// Get the local data directory for tabscope.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("tabscope");
    Ok(path)
}

/// Process-level configuration read from `<data_dir>/config.toml`
///
/// User preferences live in the stored settings record, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabscopeConfig {
    /// Database file; `None` uses the default location
    pub db_path: Option<PathBuf>,
    /// How long a host call may stay unanswered in bridge mode
    pub host_call_timeout_secs: u64,
    /// Bridge-mode log file; `None` uses `<data_dir>/bridge.log`
    pub log_file: Option<PathBuf>,
}

impl Default for TabscopeConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            host_call_timeout_secs: DEFAULT_HOST_CALL_TIMEOUT_SECS,
            log_file: None,
        }
    }
}

impl TabscopeConfig {
    /// Load from the data directory, falling back to defaults when the file
    /// does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory is unknown or the file is not valid TOML
    pub fn load() -> Result<Self> {
        Self::load_from(&get_data_dir()?.join(CONFIG_FILE_NAME))
    }

    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Bridge-mode log destination
    ///
    /// # Errors
    ///
    /// Returns an error if no log file is configured and the data directory is unknown
    pub fn log_file_path(&self) -> Result<PathBuf> {
        match &self.log_file {
            Some(path) => Ok(path.clone()),
            None => Ok(get_data_dir()?.join("bridge.log")),
        }
    }
}
