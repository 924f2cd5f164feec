use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};

use crate::db::keys;
use crate::models::Settings;

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize database schema
///
/// # Errors
///
/// Returns an error if table creation or the version update fails
pub fn init_schema(conn: &Connection) -> Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    // Key-value records - each value is one JSON document overwritten as a whole
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    if version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        log::info!("Migrated schema from version {version} to {SCHEMA_VERSION}");
    }

    Ok(())
}

/// Insert default settings if none are stored yet
///
/// # Errors
///
/// Returns an error if serialization or the insert fails
pub fn insert_default_settings(conn: &Connection) -> Result<()> {
    let value = serde_json::to_string(&Settings::default_settings())?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)",
        params![keys::SETTINGS, value, Utc::now().to_rfc3339()],
    )?;
    if inserted > 0 {
        log::info!("Inserted default settings");
    }
    Ok(())
}
