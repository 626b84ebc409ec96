// crates/fleetgate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Fleetgate SQLite Store Library
// Description: Public API surface for the SQLite-backed Rule Store.
// Purpose: Expose SqliteRuleStore and its configuration to the Controller
//          and CLI without leaking rusqlite or schema internals.
// Dependencies: crate::{config, convert, error, schema, snapshot, store}
// ============================================================================

//! ## Overview
//! Implements [`fleetgate_core::interfaces::RuleStore`] against a local
//! `SQLite` database under WAL: writes are queued to a single background
//! writer thread that batches them into one transaction per commit, and
//! reads are served round-robin from a pool of read-only connections so a
//! long scan never blocks a write or vice versa. Snapshots materialize
//! every row into an in-memory view inside one read transaction rather than
//! holding a transaction open for the duration of a scan.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod convert;
mod error;
mod schema;
mod snapshot;
mod store;

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::SqliteStoreError;
pub use store::SqliteRuleStore;
