//! Persisted key-value store split into record-specific modules.
//!
//! Every logical record (workspaces, context switches, last session,
//! settings, runtime state) is one JSON value under its own key. Writes
//! replace a value wholesale; the last writer wins.

mod context_switches;
mod helpers;
mod sessions;
mod settings;
mod workspaces;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::migrations;

pub use context_switches::SWITCH_RETENTION_DAYS;

/// Keys of the persisted records
pub mod keys {
    pub const WORKSPACES: &str = "workspaces";
    pub const CONTEXT_SWITCHES: &str = "contextSwitches";
    pub const LAST_SESSION: &str = "lastSession";
    pub const SETTINGS: &str = "settings";
    pub const RUNTIME: &str = "runtime";

    pub const ALL: [&str; 5] = [WORKSPACES, CONTEXT_SWITCHES, LAST_SESSION, SETTINGS, RUNTIME];
}

/// Database connection wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation, connection opening, or schema initialization fails
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = db_path.unwrap_or_else(Self::default_db_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&path).context("Failed to open database connection")?;
        let db = Self::from_connection(conn)?;
        log::info!("Database initialized at: {}", path.display());
        Ok(db)
    }

    /// Open a private in-memory database
    ///
    /// # Errors
    ///
    /// Returns an error if schema initialization fails
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrations::init_schema(&conn)?;
        migrations::insert_default_settings(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get default database path
    #[must_use]
    pub fn default_db_path() -> PathBuf {
        let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("tabscope");
        path.push("tabscope.db");
        path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    // ==================== Key-Value Primitives ====================

    /// Read the given keys; missing keys are absent from the result
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored value is not valid JSON
    pub fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT value FROM kv_store WHERE key = ?1")?;
        let mut found = HashMap::new();

        for key in keys {
            let raw: Option<String> = stmt
                .query_row(params![key], |row| row.get(0))
                .optional()?;
            if let Some(raw) = raw {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("Stored value for '{key}' is not valid JSON"))?;
                found.insert((*key).to_string(), value);
            }
        }

        Ok(found)
    }

    /// Write all entries in one transaction, replacing existing values
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails
    pub fn set(&self, entries: &[(&str, Value)]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value.to_string(), now],
            )?;
        }
        tx.commit().context("Failed to commit key-value write")?;
        Ok(())
    }

    /// Delete one key
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub fn remove(&self, key: &str) -> Result<()> {
        self.lock()?
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Delete every record, then restore default settings
    ///
    /// # Errors
    ///
    /// Returns an error if the delete or the settings re-insert fails
    pub fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM kv_store", [])?;
        migrations::insert_default_settings(&conn)?;
        log::info!("Cleared {deleted} stored records");
        Ok(())
    }

    /// Read and decode one record
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the value does not decode as `T`
    pub fn get_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut values = self.get(&[key])?;
        values
            .remove(key)
            .map(|value| helpers::decode(key, value))
            .transpose()
    }

    /// Encode and overwrite one record
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails
    pub fn put_record<T: Serialize>(&self, key: &str, record: &T) -> Result<()> {
        let value = helpers::encode(key, record)?;
        self.set(&[(key, value)])
    }

    /// Dump every record as a JSON object, for export
    ///
    /// # Errors
    ///
    /// Returns an error if a read fails
    pub fn dump(&self) -> Result<serde_json::Map<String, Value>> {
        let values = self.get(&keys::ALL)?;
        Ok(values.into_iter().collect())
    }
}
