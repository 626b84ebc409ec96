// crates/fleetgate-core/src/config.rs
// ============================================================================
// Module: Fleetgate Settings
// Description: Typed configuration loaded once at binary startup.
// Purpose: Provide a single recognized-options surface for rule store DSN,
//          agent endpoints, scheduler cadence, and deployment/codec tuning.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! There is no process-wide settings singleton. A binary (the controller, an
//! agent, or the CLI) loads one [`Settings`] value at startup and threads it
//! explicitly into the constructors that need it. Every nested struct rejects
//! unknown keys, so a typo in a config file fails fast at startup rather than
//! silently falling back to a default (§6).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;

use crate::identifiers::HostId;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Top-level recognized settings (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Connection string for the Rule Store backend.
    pub rule_store_dsn: String,
    /// Known agents this controller reaches.
    pub agents: Vec<AgentEndpoint>,
    /// Scheduler cadence.
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Deployment orchestrator tuning.
    pub deployment: DeploymentSettings,
    /// Codec parsing/emission tuning.
    #[serde(default)]
    pub codec: CodecSettings,
}

impl Settings {
    /// Parses settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns a [`toml::de::Error`] when `text` is malformed or carries an
    /// unrecognized key.
    pub fn parse_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// One agent this controller is configured to reach.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentEndpoint {
    /// Host this agent runs on.
    pub host: HostId,
    /// Agent-local RPC endpoint (e.g. `http://127.0.0.1:9090`).
    pub endpoint: String,
    /// Shared credential presented on every outbound RPC call.
    pub credential: String,
}

/// Scheduler cadence (§4.9), all in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSettings {
    /// Interval between discovery sweeps.
    #[serde(default = "default_discovery_s")]
    pub discovery_s: u64,
    /// Interval between full drift scans.
    #[serde(default = "default_drift_scan_s")]
    pub drift_scan_s: u64,
    /// Interval between agent heartbeat checks.
    #[serde(default = "default_heartbeat_s")]
    pub heartbeat_s: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            discovery_s: default_discovery_s(),
            drift_scan_s: default_drift_scan_s(),
            heartbeat_s: default_heartbeat_s(),
        }
    }
}

const fn default_discovery_s() -> u64 {
    60
}

const fn default_drift_scan_s() -> u64 {
    3600
}

const fn default_heartbeat_s() -> u64 {
    30
}

/// Deployment orchestrator tuning (§4.7).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentSettings {
    /// Maximum instances deployed to concurrently within one deployment.
    pub parallel_instances: u32,
    /// Deadline, in seconds, for every outbound agent RPC call.
    pub rpc_deadline_s: u64,
    /// Days a completed deployment's backup manifest is retained.
    pub backup_retention_days: u32,
}

/// Codec parsing/emission tuning (§4.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodecSettings {
    /// Accept (and strip) a UTF-8 BOM on parse.
    #[serde(default = "default_accept_bom")]
    pub accept_bom: bool,
    /// Preserve bare IPv4-literal scalars as strings rather than YAML's
    /// implicit-typing coercion (§4.1 edge case).
    #[serde(default = "default_preserve_ip_as_string")]
    pub preserve_ip_as_string: bool,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self { accept_bom: default_accept_bom(), preserve_ip_as_string: default_preserve_ip_as_string() }
    }
}

const fn default_accept_bom() -> bool {
    true
}

const fn default_preserve_ip_as_string() -> bool {
    true
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::*;

    #[test]
    fn parses_minimal_settings_with_scheduler_defaults() {
        let text = r#"
            rule_store_dsn = "sqlite://fleetgate.db"
            agents = [{ host = "hetzner", endpoint = "http://127.0.0.1:9090", credential = "secret" }]

            [deployment]
            parallel_instances = 4
            rpc_deadline_s = 10
            backup_retention_days = 30
        "#;
        let settings = Settings::parse_toml(text).expect("parses");
        assert_eq!(settings.scheduler.discovery_s, 60);
        assert_eq!(settings.scheduler.drift_scan_s, 3600);
        assert_eq!(settings.scheduler.heartbeat_s, 30);
        assert!(settings.codec.accept_bom);
        assert_eq!(settings.agents[0].host, HostId::new("hetzner"));
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let text = r#"
            rule_store_dsn = "sqlite://fleetgate.db"
            agents = []
            unknown_key = true

            [deployment]
            parallel_instances = 1
            rpc_deadline_s = 10
            backup_retention_days = 7
        "#;
        assert!(Settings::parse_toml(text).is_err());
    }
}
