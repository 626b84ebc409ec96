// crates/fleetgate-store-sqlite/src/schema.rs
// ============================================================================
// Module: SQLite Schema
// Description: Table definitions and version bootstrap for the Rule Store.
// Purpose: Create or validate the on-disk schema before any query runs.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! One flat schema version, created on first open. There is no migration
//! ladder yet because Fleetgate has shipped only this one shape; a future
//! schema change should grow a `match` arm here rather than rewrite this
//! function.

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::error::SqliteStoreError;

/// Current schema version.
const SCHEMA_VERSION: i64 = 1;

/// Creates the schema if absent, or validates the existing version.
pub(crate) fn initialize(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE instances (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    host TEXT NOT NULL,
                    platform TEXT NOT NULL,
                    port INTEGER NOT NULL,
                    active INTEGER NOT NULL,
                    last_seen TEXT
                );
                CREATE TABLE groups (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    group_type TEXT NOT NULL
                );
                CREATE TABLE tags (
                    id TEXT NOT NULL,
                    category TEXT NOT NULL,
                    PRIMARY KEY (id, category)
                );
                CREATE TABLE plugins (
                    id TEXT PRIMARY KEY,
                    platform TEXT NOT NULL,
                    version_source TEXT NOT NULL,
                    config_files_json TEXT NOT NULL,
                    parent TEXT
                );
                CREATE TABLE group_members (
                    group_id TEXT NOT NULL,
                    instance_id TEXT NOT NULL,
                    PRIMARY KEY (group_id, instance_id)
                );
                CREATE INDEX idx_group_members_instance ON group_members (instance_id);
                CREATE TABLE tag_members (
                    tag_id TEXT NOT NULL,
                    instance_id TEXT NOT NULL,
                    PRIMARY KEY (tag_id, instance_id)
                );
                CREATE INDEX idx_tag_members_instance ON tag_members (instance_id);
                CREATE TABLE variables (
                    scope_kind TEXT NOT NULL,
                    scope_selector TEXT NOT NULL,
                    name TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (scope_kind, scope_selector, name)
                );
                CREATE TABLE rules (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    scope_kind TEXT NOT NULL,
                    scope_selector TEXT NOT NULL,
                    config_type TEXT NOT NULL,
                    plugin TEXT,
                    file TEXT NOT NULL,
                    config_key TEXT NOT NULL,
                    value_json TEXT NOT NULL,
                    value_type TEXT NOT NULL,
                    active INTEGER NOT NULL,
                    updated_at TEXT NOT NULL,
                    security_sensitive INTEGER NOT NULL
                );
                CREATE INDEX idx_rules_target ON rules (config_type, plugin, file, config_key);
                CREATE INDEX idx_rules_scope ON rules (scope_kind, scope_selector);",
            )?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::Corrupt(format!(
                "unsupported schema version: {value} (expected {SCHEMA_VERSION})"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}
