// crates/fleetgate-agent/src/config.rs
// ============================================================================
// Module: Fleetgate Agent Configuration
// Description: Per-host, per-instance settings loaded once at agent startup.
// Purpose: Describe the instance roots and restart command this agent
//          manages, without embedding a TOML/JSON parser dependency here.
// Dependencies: fleetgate-core, serde
// ============================================================================

//! ## Overview
//! An agent is started with one [`AgentConfig`] per host (§4.5): the
//! instances it owns, where their config trees live on disk, where it keeps
//! its own backup/restart state, and the opaque restart command template it
//! runs per instance. The CLI binary owns TOML parsing and deserializes this
//! struct directly the way it deserializes [`fleetgate_core::config::Settings`].

use std::path::PathBuf;

use fleetgate_core::HostId;
use fleetgate_core::InstanceId;
use serde::Deserialize;

/// One instance this agent manages locally.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentInstanceConfig {
    /// Instance identifier, matching the Controller's registry.
    pub id: InstanceId,
    /// Root directory containing this instance's config tree.
    pub root: PathBuf,
}

/// Settings for one running agent process.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Host this agent runs on.
    pub host: HostId,
    /// Agent build/version string reported on `GET /status`.
    pub version: String,
    /// Instances this agent manages.
    pub instances: Vec<AgentInstanceConfig>,
    /// Directory the agent keeps backup manifests and the restart flag in.
    pub state_dir: PathBuf,
    /// Opaque restart command template; `{instance}` is replaced with the
    /// target instance id before the command is run through a shell.
    pub restart_command: String,
    /// Address the RPC server binds (e.g. `0.0.0.0:9090`).
    pub bind_addr: String,
}
