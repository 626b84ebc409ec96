// crates/fleetgate-store-sqlite/src/config.rs
// ============================================================================
// Module: SQLite Store Configuration
// Description: Connection and durability settings for the Rule Store.
// Purpose: Expose the `SQLite` pragmas operators tune without leaking rusqlite types.
// Dependencies: serde
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;

/// `SQLite` journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended; allows concurrent readers).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` synchronous mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced, recommended under WAL).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Default busy timeout, in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default writer queue depth.
const fn default_writer_queue_capacity() -> usize {
    1_024
}

/// Returns the default max operations per write batch.
const fn default_batch_max_ops() -> usize {
    64
}

/// Returns the default max aggregate bytes per write batch.
const fn default_batch_max_bytes() -> usize {
    512 * 1024
}

/// Returns the default max time a batch waits for more writes, in milliseconds.
const fn default_batch_max_wait_ms() -> u64 {
    2
}

/// Returns the default number of pooled read-only connections.
const fn default_read_pool_size() -> usize {
    4
}

/// Configuration for the `SQLite`-backed Rule Store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Bounded depth of the writer command queue.
    #[serde(default = "default_writer_queue_capacity")]
    pub writer_queue_capacity: usize,
    /// Max writes committed together in one transaction.
    #[serde(default = "default_batch_max_ops")]
    pub batch_max_ops: usize,
    /// Max aggregate payload bytes committed together in one transaction.
    #[serde(default = "default_batch_max_bytes")]
    pub batch_max_bytes: usize,
    /// Max time the writer waits for a batch to fill before committing early, in milliseconds.
    #[serde(default = "default_batch_max_wait_ms")]
    pub batch_max_wait_ms: u64,
    /// Number of pooled read-only connections, selected round-robin.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}
