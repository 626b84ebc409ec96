// crates/fleetgate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Rule Store
// Description: Durable RuleStore backed by SQLite WAL.
// Purpose: Persist the policy/registry schema and materialize read-stable
//          snapshots for the Resolver and Drift Engine.
// Dependencies: fleetgate-core, rusqlite, serde_json, time
// ============================================================================

//! ## Overview
//! Writes do not take a connection directly. They are packaged into a
//! [`WriterEnvelope`] and sent over a bounded `mpsc` queue to a single
//! background thread, which drains it in batches (bounded by op count,
//! aggregate byte size, or max wait time) and commits each batch as one
//! transaction. Reads never touch the write connection: they are served
//! round-robin from a pool of read-only connections, so a long-running scan
//! cannot stall a pending write and vice versa.
//!
//! [`RuleStore::snapshot`] does not hand out a live connection either: it
//! materializes every row into an in-memory [`crate::snapshot::InMemorySnapshot`]
//! inside one read transaction on a pooled connection, so the Resolver and
//! Drift Engine see a point-in-time view without holding a transaction open
//! for the duration of a scan.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::SyncSender;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use fleetgate_core::ConfigRule;
use fleetgate_core::ConfigTarget;
use fleetgate_core::ConfigVariable;
use fleetgate_core::GroupId;
use fleetgate_core::Instance;
use fleetgate_core::InstanceGroup;
use fleetgate_core::InstanceId;
use fleetgate_core::NewConfigRule;
use fleetgate_core::Plugin;
use fleetgate_core::PluginId;
use fleetgate_core::RuleFilter;
use fleetgate_core::RuleId;
use fleetgate_core::RuleSnapshot;
use fleetgate_core::RuleStore;
use fleetgate_core::StoreError;
use fleetgate_core::Tag;
use fleetgate_core::TagId;
use fleetgate_core::Timestamp;
use fleetgate_core::VariableScope;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::params;

use crate::config::SqliteStoreConfig;
use crate::convert::config_type_from_str;
use crate::convert::config_type_to_str;
use crate::convert::group_type_to_str;
use crate::convert::platform_from_str;
use crate::convert::platform_to_str;
use crate::convert::scope_from_columns;
use crate::convert::scope_to_columns;
use crate::convert::value_type_from_str;
use crate::convert::value_type_to_str;
use crate::convert::variable_scope_to_columns;
use crate::error::SqliteStoreError;
use crate::schema;
use crate::snapshot::InMemorySnapshot;

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed [`RuleStore`].
#[derive(Clone)]
pub struct SqliteRuleStore {
    writer: SyncSender<WriterEnvelope>,
    read_connections: Arc<Vec<Mutex<Connection>>>,
    read_cursor: Arc<AtomicUsize>,
}

impl SqliteRuleStore {
    /// Opens (creating if absent) a `SQLite`-backed Rule Store.
    ///
    /// Spawns the background writer thread and fills the read pool before
    /// returning, so every handle this returns is immediately usable.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened,
    /// configured, or schema-initialized.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        ensure_parent_dir(&config.path)?;
        let mut write_connection = open_connection(config)?;
        schema::initialize(&mut write_connection)?;

        let pool_size = config.read_pool_size.max(1);
        let mut read_connections = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            read_connections.push(Mutex::new(open_read_connection(config)?));
        }

        let (sender, receiver) = mpsc::sync_channel(config.writer_queue_capacity.max(1));
        let batch_max_ops = config.batch_max_ops.max(1);
        let batch_max_bytes = config.batch_max_bytes.max(1);
        let batch_max_wait = Duration::from_millis(config.batch_max_wait_ms);
        thread::Builder::new()
            .name("fleetgate-sqlite-writer".to_string())
            .spawn(move || run_writer(write_connection, receiver, batch_max_ops, batch_max_bytes, batch_max_wait))
            .map_err(|err| SqliteStoreError::Io(err.to_string()))?;

        Ok(Self {
            writer: sender,
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Enqueues a write and blocks until the writer thread has committed (or
    /// failed to commit) the batch it landed in.
    fn submit_write<T>(
        &self,
        estimated_bytes: usize,
        build: impl FnOnce(mpsc::Sender<Result<T, SqliteStoreError>>) -> WriterOp,
    ) -> Result<T, SqliteStoreError> {
        let (response_tx, response_rx) = mpsc::channel();
        let op = build(response_tx);
        let envelope = WriterEnvelope { estimated_bytes, op };
        self.writer
            .send(envelope)
            .map_err(|_| SqliteStoreError::Db("sqlite writer thread is gone".to_string()))?;
        response_rx
            .recv()
            .map_err(|_| SqliteStoreError::Db("sqlite writer thread dropped its response".to_string()))?
    }

    /// Returns the next pooled read-only connection, chosen round-robin.
    fn read_connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % self.read_connections.len();
        self.read_connections[index]
            .lock()
            .map_err(|_| SqliteStoreError::Db("read connection mutex poisoned".to_string()))
    }
}

/// Ensures the parent directory for the store file exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) else {
        return Ok(());
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Opens the writer connection and applies the configured durability pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(connection)
}

/// Opens a read-only pooled connection against the same database file.
///
/// `SQLite`'s journal mode is a database-level property, so a read-only
/// connection observes WAL commits made by the writer connection without
/// re-applying any pragma that requires write access.
fn open_read_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(connection)
}

// ============================================================================
// SECTION: RuleStore
// ============================================================================

impl RuleStore for SqliteRuleStore {
    fn put_rule(&self, rule: NewConfigRule) -> Result<RuleId, StoreError> {
        self.put_rule_inner(rule).map_err(StoreError::from)
    }

    fn deactivate_rule(&self, id: RuleId) -> Result<(), StoreError> {
        self.deactivate_rule_inner(id).map_err(StoreError::from)
    }

    fn get_rules(&self, filter: &RuleFilter) -> Result<Vec<ConfigRule>, StoreError> {
        self.get_rules_inner(filter).map_err(StoreError::from)
    }

    fn set_variable(&self, variable: ConfigVariable) -> Result<(), StoreError> {
        self.set_variable_inner(&variable).map_err(StoreError::from)
    }

    fn get_variables(&self, scope: &VariableScope) -> Result<Vec<ConfigVariable>, StoreError> {
        self.get_variables_inner(scope).map_err(StoreError::from)
    }

    fn add_group_member(&self, group: &GroupId, instance: &InstanceId) -> Result<(), StoreError> {
        self.add_group_member_inner(group, instance).map_err(StoreError::from)
    }

    fn add_tag_member(&self, tag: &TagId, instance: &InstanceId) -> Result<(), StoreError> {
        self.add_tag_member_inner(tag, instance).map_err(StoreError::from)
    }

    fn upsert_instance(&self, instance: Instance) -> Result<(), StoreError> {
        self.upsert_instance_inner(&instance).map_err(StoreError::from)
    }

    fn deactivate_instance(&self, id: &InstanceId) -> Result<(), StoreError> {
        self.deactivate_instance_inner(id).map_err(StoreError::from)
    }

    fn put_plugin(&self, plugin: Plugin) -> Result<(), StoreError> {
        self.put_plugin_inner(&plugin).map_err(StoreError::from)
    }

    fn put_group(&self, group: InstanceGroup) -> Result<(), StoreError> {
        self.put_group_inner(&group).map_err(StoreError::from)
    }

    fn put_tag(&self, tag: Tag) -> Result<(), StoreError> {
        self.put_tag_inner(&tag).map_err(StoreError::from)
    }

    fn snapshot(&self) -> Result<Arc<dyn RuleSnapshot>, StoreError> {
        let snapshot = self.materialize_snapshot().map_err(StoreError::from)?;
        Ok(Arc::new(snapshot))
    }
}

// ============================================================================
// SECTION: Writer queue
// ============================================================================

/// One write, queued for the background writer thread.
struct WriterEnvelope {
    estimated_bytes: usize,
    op: WriterOp,
}

/// A single queued write operation, carrying its own response channel.
enum WriterOp {
    PutRule { payload: PutRulePayload, response: mpsc::Sender<Result<RuleId, SqliteStoreError>> },
    DeactivateRule { id: RuleId, response: mpsc::Sender<Result<(), SqliteStoreError>> },
    SetVariable { payload: SetVariablePayload, response: mpsc::Sender<Result<(), SqliteStoreError>> },
    AddGroupMember {
        group: GroupId,
        instance: InstanceId,
        response: mpsc::Sender<Result<(), SqliteStoreError>>,
    },
    AddTagMember {
        tag: TagId,
        instance: InstanceId,
        response: mpsc::Sender<Result<(), SqliteStoreError>>,
    },
    UpsertInstance { payload: UpsertInstancePayload, response: mpsc::Sender<Result<(), SqliteStoreError>> },
    DeactivateInstance { id: InstanceId, response: mpsc::Sender<Result<(), SqliteStoreError>> },
    PutPlugin { payload: PutPluginPayload, response: mpsc::Sender<Result<(), SqliteStoreError>> },
    PutGroup { group: InstanceGroup, response: mpsc::Sender<Result<(), SqliteStoreError>> },
    PutTag { tag: Tag, response: mpsc::Sender<Result<(), SqliteStoreError>> },
}

/// Prepared, already-validated payload for a `put_rule` write.
struct PutRulePayload {
    scope_kind: String,
    scope_selector: String,
    config_type: &'static str,
    plugin: Option<String>,
    file: String,
    config_key: String,
    value_json: String,
    value_type: &'static str,
    updated_at_text: String,
    security_sensitive: bool,
}

/// Prepared payload for a `set_variable` write.
struct SetVariablePayload {
    scope_kind: String,
    scope_selector: String,
    name: String,
    value: String,
}

/// Prepared payload for an `upsert_instance` write.
struct UpsertInstancePayload {
    id: String,
    name: String,
    host: String,
    platform: &'static str,
    port: u16,
    active: bool,
    last_seen: Option<String>,
}

/// Prepared payload for a `put_plugin` write.
struct PutPluginPayload {
    id: String,
    platform: &'static str,
    version_source: String,
    config_files_json: String,
    parent: Option<String>,
}

/// Outcome of applying one [`WriterOp`] against the transaction, before the
/// batch's commit result is known.
enum WriterOutcome {
    RuleId(Result<RuleId, SqliteStoreError>),
    Unit(Result<(), SqliteStoreError>),
}

/// Runs on the dedicated writer thread for the life of the store. Drains
/// the queue in batches bounded by op count, aggregate byte size, or max
/// wait time, and commits each batch as a single transaction.
fn run_writer(
    mut connection: Connection,
    receiver: Receiver<WriterEnvelope>,
    batch_max_ops: usize,
    batch_max_bytes: usize,
    batch_max_wait: Duration,
) {
    loop {
        let Ok(first) = receiver.recv() else {
            return;
        };
        let mut bytes = first.estimated_bytes;
        let mut batch = vec![first];
        let deadline = Instant::now() + batch_max_wait;
        while batch.len() < batch_max_ops && bytes < batch_max_bytes {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match receiver.recv_timeout(deadline - now) {
                Ok(envelope) => {
                    bytes += envelope.estimated_bytes;
                    batch.push(envelope);
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        execute_batch(&mut connection, batch);
    }
}

/// Applies and commits one batch, then dispatches each queued write's
/// result (overridden to the commit error if the commit itself failed).
fn execute_batch(connection: &mut Connection, batch: Vec<WriterEnvelope>) {
    let tx = match connection.transaction() {
        Ok(tx) => tx,
        Err(err) => {
            let err = SqliteStoreError::from(err);
            for envelope in batch {
                let outcome = dummy_outcome(&envelope.op, &err);
                respond(envelope.op, outcome, Some(&err));
            }
            return;
        }
    };
    let mut pending = Vec::with_capacity(batch.len());
    for envelope in batch {
        let outcome = apply_op(&tx, &envelope.op);
        pending.push((envelope.op, outcome));
    }
    let commit_err = tx.commit().err().map(SqliteStoreError::from);
    for (op, outcome) in pending {
        respond(op, outcome, commit_err.as_ref());
    }
}

/// Builds an `Err` outcome shaped like what `op` would have returned, used
/// when the transaction never opened.
fn dummy_outcome(op: &WriterOp, err: &SqliteStoreError) -> WriterOutcome {
    match op {
        WriterOp::PutRule { .. } => WriterOutcome::RuleId(Err(err.clone())),
        _ => WriterOutcome::Unit(Err(err.clone())),
    }
}

/// Overrides a successful per-op result with the commit error when the
/// batch's transaction failed to commit; leaves a per-op failure as-is.
fn override_on_commit_failure<T>(
    result: Result<T, SqliteStoreError>,
    commit_err: Option<&SqliteStoreError>,
) -> Result<T, SqliteStoreError> {
    match (result, commit_err) {
        (Ok(value), None) => Ok(value),
        (Err(err), _) => Err(err),
        (Ok(_), Some(err)) => Err(err.clone()),
    }
}

fn respond(op: WriterOp, outcome: WriterOutcome, commit_err: Option<&SqliteStoreError>) {
    match (op, outcome) {
        (WriterOp::PutRule { response, .. }, WriterOutcome::RuleId(result)) => {
            let _ = response.send(override_on_commit_failure(result, commit_err));
        }
        (WriterOp::DeactivateRule { response, .. }, WriterOutcome::Unit(result))
        | (WriterOp::SetVariable { response, .. }, WriterOutcome::Unit(result))
        | (WriterOp::AddGroupMember { response, .. }, WriterOutcome::Unit(result))
        | (WriterOp::AddTagMember { response, .. }, WriterOutcome::Unit(result))
        | (WriterOp::UpsertInstance { response, .. }, WriterOutcome::Unit(result))
        | (WriterOp::DeactivateInstance { response, .. }, WriterOutcome::Unit(result))
        | (WriterOp::PutPlugin { response, .. }, WriterOutcome::Unit(result))
        | (WriterOp::PutGroup { response, .. }, WriterOutcome::Unit(result))
        | (WriterOp::PutTag { response, .. }, WriterOutcome::Unit(result)) => {
            let _ = response.send(override_on_commit_failure(result, commit_err));
        }
        (WriterOp::PutRule { .. }, WriterOutcome::Unit(_)) => {
            unreachable!("put_rule always produces a RuleId outcome")
        }
        (
            WriterOp::DeactivateRule { .. }
            | WriterOp::SetVariable { .. }
            | WriterOp::AddGroupMember { .. }
            | WriterOp::AddTagMember { .. }
            | WriterOp::UpsertInstance { .. }
            | WriterOp::DeactivateInstance { .. }
            | WriterOp::PutPlugin { .. }
            | WriterOp::PutGroup { .. }
            | WriterOp::PutTag { .. },
            WriterOutcome::RuleId(_),
        ) => unreachable!("apply_op never produces a RuleId outcome for this op"),
    }
}

/// Executes one op's SQL against the shared transaction, without knowing
/// yet whether the batch as a whole will commit.
fn apply_op(tx: &rusqlite::Transaction<'_>, op: &WriterOp) -> WriterOutcome {
    match op {
        WriterOp::PutRule { payload, .. } => WriterOutcome::RuleId(insert_rule(tx, payload)),
        WriterOp::DeactivateRule { id, .. } => WriterOutcome::Unit(deactivate_rule_sql(tx, *id)),
        WriterOp::SetVariable { payload, .. } => WriterOutcome::Unit(set_variable_sql(tx, payload)),
        WriterOp::AddGroupMember { group, instance, .. } => {
            WriterOutcome::Unit(add_group_member_sql(tx, group, instance))
        }
        WriterOp::AddTagMember { tag, instance, .. } => {
            WriterOutcome::Unit(add_tag_member_sql(tx, tag, instance))
        }
        WriterOp::UpsertInstance { payload, .. } => WriterOutcome::Unit(upsert_instance_sql(tx, payload)),
        WriterOp::DeactivateInstance { id, .. } => WriterOutcome::Unit(deactivate_instance_sql(tx, id)),
        WriterOp::PutPlugin { payload, .. } => WriterOutcome::Unit(put_plugin_sql(tx, payload)),
        WriterOp::PutGroup { group, .. } => WriterOutcome::Unit(put_group_sql(tx, group)),
        WriterOp::PutTag { tag, .. } => WriterOutcome::Unit(put_tag_sql(tx, tag)),
    }
}

fn insert_rule(tx: &rusqlite::Transaction<'_>, payload: &PutRulePayload) -> Result<RuleId, SqliteStoreError> {
    tx.execute(
        "INSERT INTO rules (
            scope_kind, scope_selector, config_type, plugin, file, config_key,
            value_json, value_type, active, updated_at, security_sensitive
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10)",
        params![
            payload.scope_kind,
            payload.scope_selector,
            payload.config_type,
            payload.plugin,
            payload.file,
            payload.config_key,
            payload.value_json,
            payload.value_type,
            payload.updated_at_text,
            payload.security_sensitive,
        ],
    )?;
    let row_id = tx.last_insert_rowid();
    let raw = u64::try_from(row_id)
        .map_err(|_| SqliteStoreError::Corrupt("negative rule rowid".to_string()))?;
    RuleId::from_raw(raw).ok_or_else(|| SqliteStoreError::Corrupt("zero rule rowid".to_string()))
}

fn deactivate_rule_sql(tx: &rusqlite::Transaction<'_>, id: RuleId) -> Result<(), SqliteStoreError> {
    let row_id = i64::try_from(id.get())
        .map_err(|_| SqliteStoreError::Corrupt("rule id out of range".to_string()))?;
    let affected = tx.execute("UPDATE rules SET active = 0 WHERE id = ?1", params![row_id])?;
    if affected == 0 {
        return Err(SqliteStoreError::NotFound(format!("rule {}", id.get())));
    }
    Ok(())
}

fn set_variable_sql(
    tx: &rusqlite::Transaction<'_>,
    payload: &SetVariablePayload,
) -> Result<(), SqliteStoreError> {
    tx.execute(
        "INSERT INTO variables (scope_kind, scope_selector, name, value)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(scope_kind, scope_selector, name) DO UPDATE SET value = excluded.value",
        params![payload.scope_kind, payload.scope_selector, payload.name, payload.value],
    )?;
    Ok(())
}

fn add_group_member_sql(
    tx: &rusqlite::Transaction<'_>,
    group: &GroupId,
    instance: &InstanceId,
) -> Result<(), SqliteStoreError> {
    tx.execute(
        "INSERT OR IGNORE INTO group_members (group_id, instance_id) VALUES (?1, ?2)",
        params![group.as_str(), instance.as_str()],
    )?;
    Ok(())
}

fn add_tag_member_sql(
    tx: &rusqlite::Transaction<'_>,
    tag: &TagId,
    instance: &InstanceId,
) -> Result<(), SqliteStoreError> {
    tx.execute(
        "INSERT OR IGNORE INTO tag_members (tag_id, instance_id) VALUES (?1, ?2)",
        params![tag.as_str(), instance.as_str()],
    )?;
    Ok(())
}

fn upsert_instance_sql(
    tx: &rusqlite::Transaction<'_>,
    payload: &UpsertInstancePayload,
) -> Result<(), SqliteStoreError> {
    tx.execute(
        "INSERT INTO instances (id, name, host, platform, port, active, last_seen)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            host = excluded.host,
            platform = excluded.platform,
            port = excluded.port,
            active = excluded.active,
            last_seen = excluded.last_seen",
        params![
            payload.id,
            payload.name,
            payload.host,
            payload.platform,
            payload.port,
            payload.active,
            payload.last_seen,
        ],
    )?;
    Ok(())
}

fn deactivate_instance_sql(
    tx: &rusqlite::Transaction<'_>,
    id: &InstanceId,
) -> Result<(), SqliteStoreError> {
    let affected = tx.execute("UPDATE instances SET active = 0 WHERE id = ?1", params![id.as_str()])?;
    if affected == 0 {
        return Err(SqliteStoreError::NotFound(format!("instance {id}")));
    }
    Ok(())
}

fn put_plugin_sql(
    tx: &rusqlite::Transaction<'_>,
    payload: &PutPluginPayload,
) -> Result<(), SqliteStoreError> {
    tx.execute(
        "INSERT INTO plugins (id, platform, version_source, config_files_json, parent)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            platform = excluded.platform,
            version_source = excluded.version_source,
            config_files_json = excluded.config_files_json,
            parent = excluded.parent",
        params![
            payload.id,
            payload.platform,
            payload.version_source,
            payload.config_files_json,
            payload.parent,
        ],
    )?;
    Ok(())
}

fn put_group_sql(tx: &rusqlite::Transaction<'_>, group: &InstanceGroup) -> Result<(), SqliteStoreError> {
    tx.execute(
        "INSERT INTO groups (id, name, group_type) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, group_type = excluded.group_type",
        params![group.id.as_str(), group.name, group_type_to_str(group.group_type)],
    )?;
    Ok(())
}

fn put_tag_sql(tx: &rusqlite::Transaction<'_>, tag: &Tag) -> Result<(), SqliteStoreError> {
    tx.execute(
        "INSERT INTO tags (id, category) VALUES (?1, ?2)
         ON CONFLICT(id, category) DO NOTHING",
        params![tag.id.as_str(), tag.category],
    )?;
    Ok(())
}

// ============================================================================
// SECTION: Writes (public entry points)
// ============================================================================

impl SqliteRuleStore {
    fn put_rule_inner(&self, rule: NewConfigRule) -> Result<RuleId, SqliteStoreError> {
        if !validate_literal_shape(&rule.value, rule.value_type) {
            return Err(SqliteStoreError::Invalid(format!(
                "value does not match declared type {:?}",
                rule.value_type
            )));
        }
        let value_json = serde_json::to_string(&rule.value)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let (scope_kind, scope_selector) = scope_to_columns(&rule.scope);
        let updated_at = Timestamp::from_offset_date_time(time::OffsetDateTime::now_utc());
        let updated_at_text =
            updated_at.to_rfc3339().map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let payload = PutRulePayload {
            scope_kind: scope_kind.to_string(),
            scope_selector,
            config_type: config_type_to_str(rule.target.config_type),
            plugin: rule.target.plugin.as_ref().map(|plugin| plugin.as_str().to_string()),
            file: rule.target.file,
            config_key: rule.target.key,
            value_json,
            value_type: value_type_to_str(rule.value_type),
            updated_at_text,
            security_sensitive: rule.security_sensitive,
        };
        let estimated_bytes = payload.value_json.len() + payload.file.len() + payload.config_key.len() + 64;
        self.submit_write(estimated_bytes, |response| WriterOp::PutRule { payload, response })
    }

    fn deactivate_rule_inner(&self, id: RuleId) -> Result<(), SqliteStoreError> {
        self.submit_write(32, |response| WriterOp::DeactivateRule { id, response })
    }

    fn set_variable_inner(&self, variable: &ConfigVariable) -> Result<(), SqliteStoreError> {
        let (scope_kind, scope_selector) = variable_scope_to_columns(&variable.scope);
        let payload = SetVariablePayload {
            scope_kind: scope_kind.to_string(),
            scope_selector,
            name: variable.name.as_str().to_string(),
            value: variable.value.clone(),
        };
        let estimated_bytes = payload.name.len() + payload.value.len() + 32;
        self.submit_write(estimated_bytes, |response| WriterOp::SetVariable { payload, response })
    }

    fn add_group_member_inner(
        &self,
        group: &GroupId,
        instance: &InstanceId,
    ) -> Result<(), SqliteStoreError> {
        let group = group.clone();
        let instance = instance.clone();
        self.submit_write(48, |response| WriterOp::AddGroupMember { group, instance, response })
    }

    fn add_tag_member_inner(&self, tag: &TagId, instance: &InstanceId) -> Result<(), SqliteStoreError> {
        let tag = tag.clone();
        let instance = instance.clone();
        self.submit_write(48, |response| WriterOp::AddTagMember { tag, instance, response })
    }

    fn upsert_instance_inner(&self, instance: &Instance) -> Result<(), SqliteStoreError> {
        let last_seen = instance
            .last_seen
            .map(Timestamp::to_rfc3339)
            .transpose()
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let payload = UpsertInstancePayload {
            id: instance.id.as_str().to_string(),
            name: instance.name.clone(),
            host: instance.host.as_str().to_string(),
            platform: platform_to_str(instance.platform),
            port: instance.port,
            active: instance.active,
            last_seen,
        };
        let estimated_bytes = payload.id.len() + payload.name.len() + payload.host.len() + 48;
        self.submit_write(estimated_bytes, |response| WriterOp::UpsertInstance { payload, response })
    }

    fn deactivate_instance_inner(&self, id: &InstanceId) -> Result<(), SqliteStoreError> {
        let id = id.clone();
        self.submit_write(32, |response| WriterOp::DeactivateInstance { id, response })
    }

    fn put_plugin_inner(&self, plugin: &Plugin) -> Result<(), SqliteStoreError> {
        let config_files_json = serde_json::to_string(&plugin.config_files)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let payload = PutPluginPayload {
            id: plugin.id.as_str().to_string(),
            platform: platform_to_str(plugin.platform),
            version_source: plugin.version_source.clone(),
            config_files_json,
            parent: plugin.parent.as_ref().map(|parent| parent.as_str().to_string()),
        };
        let estimated_bytes = payload.id.len() + payload.config_files_json.len() + 48;
        self.submit_write(estimated_bytes, |response| WriterOp::PutPlugin { payload, response })
    }

    fn put_group_inner(&self, group: &InstanceGroup) -> Result<(), SqliteStoreError> {
        let group = group.clone();
        let estimated_bytes = group.id.as_str().len() + group.name.len() + 32;
        self.submit_write(estimated_bytes, |response| WriterOp::PutGroup { group, response })
    }

    fn put_tag_inner(&self, tag: &Tag) -> Result<(), SqliteStoreError> {
        let tag = tag.clone();
        let estimated_bytes = tag.id.as_str().len() + tag.category.len() + 32;
        self.submit_write(estimated_bytes, |response| WriterOp::PutTag { tag, response })
    }
}

/// Checks that a rule's literal value is structurally compatible with its
/// declared type, deferring full coercion (and `{{NAME}}` substitution) to
/// the Resolver. A string literal is always accepted for scalar types since
/// it may carry an unresolved variable placeholder.
fn validate_literal_shape(value: &serde_json::Value, value_type: fleetgate_core::ValueType) -> bool {
    use fleetgate_core::ValueType;
    match value_type {
        ValueType::String | ValueType::Int | ValueType::Float | ValueType::Bool => {
            value.is_string() || value.is_number() || value.is_boolean()
        }
        ValueType::List => value.is_array() || value.is_string(),
        ValueType::Map => value.is_object() || value.is_string(),
        ValueType::Required | ValueType::Optional => true,
    }
}

// ============================================================================
// SECTION: Reads
// ============================================================================

impl SqliteRuleStore {
    fn get_rules_inner(&self, filter: &RuleFilter) -> Result<Vec<ConfigRule>, SqliteStoreError> {
        let guard = self.read_connection()?;
        let mut sql = String::from(
            "SELECT id, scope_kind, scope_selector, config_type, plugin, file, config_key,
                    value_json, value_type, active, updated_at, security_sensitive
             FROM rules WHERE 1 = 1",
        );
        if filter.active_only {
            sql.push_str(" AND active = 1");
        }
        if filter.plugin.is_some() {
            sql.push_str(" AND plugin = ?1");
        }
        if filter.file.is_some() {
            sql.push_str(if filter.plugin.is_some() { " AND file = ?2" } else { " AND file = ?1" });
        }
        let mut stmt = guard.prepare(&sql)?;
        let rows: Vec<RawRuleRow> = match (&filter.plugin, &filter.file) {
            (Some(plugin), Some(file)) => stmt
                .query_map(params![plugin.as_str(), file], map_rule_row)?
                .collect::<Result<_, _>>()?,
            (Some(plugin), None) => {
                stmt.query_map(params![plugin.as_str()], map_rule_row)?.collect::<Result<_, _>>()?
            }
            (None, Some(file)) => {
                stmt.query_map(params![file], map_rule_row)?.collect::<Result<_, _>>()?
            }
            (None, None) => stmt.query_map(params![], map_rule_row)?.collect::<Result<_, _>>()?,
        };
        drop(stmt);
        drop(guard);
        rows.into_iter().map(build_config_rule).collect()
    }

    fn get_variables_inner(
        &self,
        scope: &VariableScope,
    ) -> Result<Vec<ConfigVariable>, SqliteStoreError> {
        let (scope_kind, scope_selector) = variable_scope_to_columns(scope);
        let guard = self.read_connection()?;
        let mut stmt = guard.prepare(
            "SELECT name, value FROM variables WHERE scope_kind = ?1 AND scope_selector = ?2",
        )?;
        let rows = stmt
            .query_map(params![scope_kind, scope_selector], |row| {
                let name: String = row.get(0)?;
                let value: String = row.get(1)?;
                Ok((name, value))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(guard);
        Ok(rows
            .into_iter()
            .map(|(name, value)| ConfigVariable {
                scope: scope.clone(),
                name: fleetgate_core::VariableName::new(name),
                value,
            })
            .collect())
    }
}

/// Raw columns pulled from the `rules` table before type conversion.
struct RawRuleRow {
    id: i64,
    scope_kind: String,
    scope_selector: String,
    config_type: String,
    plugin: Option<String>,
    file: String,
    config_key: String,
    value_json: String,
    value_type: String,
    active: bool,
    updated_at: String,
    security_sensitive: bool,
}

fn map_rule_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRuleRow> {
    Ok(RawRuleRow {
        id: row.get(0)?,
        scope_kind: row.get(1)?,
        scope_selector: row.get(2)?,
        config_type: row.get(3)?,
        plugin: row.get(4)?,
        file: row.get(5)?,
        config_key: row.get(6)?,
        value_json: row.get(7)?,
        value_type: row.get(8)?,
        active: row.get(9)?,
        updated_at: row.get(10)?,
        security_sensitive: row.get(11)?,
    })
}

pub(crate) fn build_config_rule(raw: RawRuleRow) -> Result<ConfigRule, SqliteStoreError> {
    let id_raw = u64::try_from(raw.id)
        .map_err(|_| SqliteStoreError::Corrupt("negative rule id".to_string()))?;
    let id = RuleId::from_raw(id_raw)
        .ok_or_else(|| SqliteStoreError::Corrupt("zero rule id".to_string()))?;
    let scope = scope_from_columns(&raw.scope_kind, &raw.scope_selector)?;
    let config_type = config_type_from_str(&raw.config_type)?;
    let value: serde_json::Value = serde_json::from_str(&raw.value_json)
        .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
    let value_type = value_type_from_str(&raw.value_type)?;
    let updated_at = Timestamp::parse_rfc3339(&raw.updated_at)
        .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
    Ok(ConfigRule {
        id,
        scope,
        target: ConfigTarget {
            config_type,
            plugin: raw.plugin.map(PluginId::new),
            file: raw.file,
            key: raw.config_key,
        },
        value,
        value_type,
        active: raw.active,
        updated_at,
        security_sensitive: raw.security_sensitive,
    })
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

impl SqliteRuleStore {
    fn materialize_snapshot(&self) -> Result<InMemorySnapshot, SqliteStoreError> {
        let mut guard = self.read_connection()?;
        let tx = guard.transaction()?;

        let instances = load_instances(&tx)?;
        let group_members = load_memberships(&tx, "group_members", "group_id")?;
        let tag_members = load_memberships(&tx, "tag_members", "tag_id")?;
        let plugins = load_plugins(&tx)?;
        let variables = load_variables(&tx)?;
        let rules = load_rules(&tx)?;
        let baseline_files = plugins
            .values()
            .map(|plugin| (plugin.id.clone(), plugin.config_files.clone()))
            .collect();

        tx.commit()?;
        drop(guard);

        Ok(InMemorySnapshot::new(instances, group_members, tag_members, plugins, variables, rules, baseline_files))
    }
}

fn load_instances(
    tx: &rusqlite::Transaction<'_>,
) -> Result<std::collections::HashMap<InstanceId, Instance>, SqliteStoreError> {
    let mut stmt =
        tx.prepare("SELECT id, name, host, platform, port, active, last_seen FROM instances")?;
    let rows = stmt
        .query_map(params![], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let host: String = row.get(2)?;
            let platform: String = row.get(3)?;
            let port: i64 = row.get(4)?;
            let active: bool = row.get(5)?;
            let last_seen: Option<String> = row.get(6)?;
            Ok((id, name, host, platform, port, active, last_seen))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = std::collections::HashMap::new();
    for (id, name, host, platform, port, active, last_seen) in rows {
        let instance = Instance {
            id: InstanceId::new(id.clone()),
            name,
            host: fleetgate_core::HostId::new(host),
            platform: platform_from_str(&platform)?,
            port: u16::try_from(port)
                .map_err(|_| SqliteStoreError::Corrupt(format!("invalid port for instance {id}")))?,
            active,
            last_seen: last_seen
                .map(|text| Timestamp::parse_rfc3339(&text))
                .transpose()
                .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?,
        };
        out.insert(InstanceId::new(id), instance);
    }
    Ok(out)
}

fn load_memberships(
    tx: &rusqlite::Transaction<'_>,
    table: &str,
    key_column: &str,
) -> Result<std::collections::HashMap<InstanceId, Vec<String>>, SqliteStoreError> {
    let sql = format!("SELECT instance_id, {key_column} FROM {table}");
    let mut stmt = tx.prepare(&sql)?;
    let rows = stmt
        .query_map(params![], |row| {
            let instance_id: String = row.get(0)?;
            let key: String = row.get(1)?;
            Ok((instance_id, key))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out: std::collections::HashMap<InstanceId, Vec<String>> =
        std::collections::HashMap::new();
    for (instance_id, key) in rows {
        out.entry(InstanceId::new(instance_id)).or_default().push(key);
    }
    Ok(out)
}

fn load_plugins(
    tx: &rusqlite::Transaction<'_>,
) -> Result<std::collections::HashMap<PluginId, Plugin>, SqliteStoreError> {
    let mut stmt =
        tx.prepare("SELECT id, platform, version_source, config_files_json, parent FROM plugins")?;
    let rows = stmt
        .query_map(params![], |row| {
            let id: String = row.get(0)?;
            let platform: String = row.get(1)?;
            let version_source: String = row.get(2)?;
            let config_files_json: String = row.get(3)?;
            let parent: Option<String> = row.get(4)?;
            Ok((id, platform, version_source, config_files_json, parent))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = std::collections::HashMap::new();
    for (id, platform, version_source, config_files_json, parent) in rows {
        let config_files: Vec<String> = serde_json::from_str(&config_files_json)
            .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
        let plugin = Plugin {
            id: PluginId::new(id.clone()),
            platform: platform_from_str(&platform)?,
            version_source,
            config_files,
            parent: parent.map(PluginId::new),
        };
        out.insert(PluginId::new(id), plugin);
    }
    Ok(out)
}

fn load_variables(
    tx: &rusqlite::Transaction<'_>,
) -> Result<Vec<ConfigVariable>, SqliteStoreError> {
    let mut stmt = tx.prepare("SELECT scope_kind, scope_selector, name, value FROM variables")?;
    let rows = stmt
        .query_map(params![], |row| {
            let scope_kind: String = row.get(0)?;
            let scope_selector: String = row.get(1)?;
            let name: String = row.get(2)?;
            let value: String = row.get(3)?;
            Ok((scope_kind, scope_selector, name, value))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(scope_kind, scope_selector, name, value)| {
            Ok(ConfigVariable {
                scope: crate::convert::variable_scope_from_columns(&scope_kind, &scope_selector)?,
                name: fleetgate_core::VariableName::new(name),
                value,
            })
        })
        .collect()
}

fn load_rules(tx: &rusqlite::Transaction<'_>) -> Result<Vec<ConfigRule>, SqliteStoreError> {
    let mut stmt = tx.prepare(
        "SELECT id, scope_kind, scope_selector, config_type, plugin, file, config_key,
                value_json, value_type, active, updated_at, security_sensitive
         FROM rules WHERE active = 1",
    )?;
    let rows: Vec<RawRuleRow> = stmt.query_map(params![], map_rule_row)?.collect::<Result<_, _>>()?;
    rows.into_iter().map(build_config_rule).collect()
}
