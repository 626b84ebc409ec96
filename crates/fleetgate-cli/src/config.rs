// crates/fleetgate-cli/src/config.rs
// ============================================================================
// Module: Fleetgate CLI Configuration Loading
// Description: TOML loading and Controller assembly shared by every
//              controller-facing subcommand.
// Purpose: Turn a Settings file on disk into a ready-to-use Controller the
//          same way `controller serve` does, so one-shot commands (resolve,
//          drift scan, rule put, deploy plan) see the exact same fleet a
//          running controller process would.
// Dependencies: fleetgate-core, fleetgate-controller, fleetgate-store-sqlite
// ============================================================================

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fleetgate_agent::config::AgentConfig;
use fleetgate_core::AgentClient;
use fleetgate_core::HostId;
use fleetgate_core::RuleStore;
use fleetgate_core::config::Settings;
use fleetgate_controller::Controller;
use fleetgate_controller::HttpAgentClient;
use fleetgate_store_sqlite::SqliteRuleStore;
use fleetgate_store_sqlite::config::SqliteStoreConfig;

use crate::CliError;

/// Reads and parses a [`Settings`] TOML file.
///
/// # Errors
///
/// Returns [`CliError`] if the file cannot be read or fails to parse.
pub fn load_settings(path: &Path) -> Result<Settings, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| CliError::new(format!("failed to read settings file {}: {err}", path.display())))?;
    Settings::parse_toml(&text).map_err(|err| CliError::new(format!("failed to parse settings file {}: {err}", path.display())))
}

/// Reads and parses an [`AgentConfig`] TOML file.
///
/// # Errors
///
/// Returns [`CliError`] if the file cannot be read or fails to parse.
pub fn load_agent_config(path: &Path) -> Result<AgentConfig, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| CliError::new(format!("failed to read agent config {}: {err}", path.display())))?;
    toml::from_str(&text).map_err(|err| CliError::new(format!("failed to parse agent config {}: {err}", path.display())))
}

/// Parses `settings.rule_store_dsn` into a [`SqliteStoreConfig`]. Only the
/// `sqlite://` scheme is recognized (§6: the Rule Store backend this
/// implementation ships).
///
/// # Errors
///
/// Returns [`CliError`] if the DSN does not use the `sqlite://` scheme.
fn sqlite_config_from_dsn(dsn: &str) -> Result<SqliteStoreConfig, CliError> {
    let path = dsn
        .strip_prefix("sqlite://")
        .ok_or_else(|| CliError::new(format!("unsupported rule store dsn (expected sqlite://...): {dsn}")))?;
    Ok(SqliteStoreConfig {
        path: path.into(),
        busy_timeout_ms: 5_000,
        journal_mode: Default::default(),
        sync_mode: Default::default(),
        writer_queue_capacity: 1_024,
        batch_max_ops: 64,
        batch_max_bytes: 512 * 1024,
        batch_max_wait_ms: 2,
        read_pool_size: 4,
    })
}

/// Builds a ready-to-use [`Controller`] from `settings`: opens the SQLite
/// Rule Store and builds one [`HttpAgentClient`] per configured agent.
///
/// # Errors
///
/// Returns [`CliError`] if the rule store cannot be opened or an agent
/// client cannot be constructed.
pub fn build_controller(settings: &Settings) -> Result<Arc<Controller>, CliError> {
    let sqlite_config = sqlite_config_from_dsn(&settings.rule_store_dsn)?;
    let store = SqliteRuleStore::open(&sqlite_config).map_err(|err| CliError::new(format!("failed to open rule store: {err}")))?;
    let store: Arc<dyn RuleStore> = Arc::new(store);

    let rpc_deadline = Duration::from_secs(settings.deployment.rpc_deadline_s);
    let mut agents: HashMap<HostId, Arc<dyn AgentClient>> = HashMap::new();
    for endpoint in &settings.agents {
        let client = HttpAgentClient::new(endpoint.host.clone(), endpoint.endpoint.clone(), rpc_deadline)
            .map_err(|err| CliError::new(format!("failed to build agent client for host {}: {err}", endpoint.host)))?;
        agents.insert(endpoint.host.clone(), Arc::new(client));
    }

    Ok(Arc::new(Controller::new(store, agents)))
}
