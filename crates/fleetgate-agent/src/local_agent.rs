// crates/fleetgate-agent/src/local_agent.rs
// ============================================================================
// Module: Fleetgate Local Agent
// Description: Filesystem- and process-control-backed implementation of
//              AgentClient, running on the same host as the instances it
//              manages.
// Purpose: Give both the in-process RPC server and tests one place that
//          implements status/read/write/restart/rollback against real files.
// Dependencies: fleetgate-core
// ============================================================================

//! ## Overview
//! `LocalAgent` is the Agent side of the Controller<->Agent protocol (§4.5,
//! §6): it reads and writes one instance's config tree, records backup
//! manifest entries the first time a deployment touches a file, and tracks
//! which instances have a pending restart. Writes to the same underlying
//! file are serialized by a single mutex, the same "one writer at a time"
//! discipline the Rule Store uses over its `SQLite` connection.

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use fleetgate_core::AgentClient;
use fleetgate_core::AgentError;
use fleetgate_core::AgentInstanceStatus;
use fleetgate_core::AgentStatus;
use fleetgate_core::BackupManifestEntry;
use fleetgate_core::DEFAULT_HASH_ALGORITHM;
use fleetgate_core::DeploymentId;
use fleetgate_core::HashDigest;
use fleetgate_core::InstanceId;
use fleetgate_core::hash_bytes;
use tracing::info;

use crate::config::AgentConfig;
use crate::error::AgentLocalError;
use crate::fs_util::atomic_write;
use crate::manifest;
use crate::process;
use crate::restart_state;

/// A running agent's local view of its configured instances.
pub struct LocalAgent {
    config: AgentConfig,
    write_lock: Mutex<()>,
}

impl LocalAgent {
    /// Creates a local agent from its configuration.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self { config, write_lock: Mutex::new(()) }
    }

    /// Returns this agent's configuration.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Resolves `instance`'s configured root, or `None` if it is not one of
    /// this agent's instances.
    fn instance_root(&self, instance: &InstanceId) -> Option<&Path> {
        self.config.instances.iter().find(|entry| &entry.id == instance).map(|entry| entry.root.as_path())
    }

    fn resolve_file(&self, instance: &InstanceId, file: &str) -> Result<PathBuf, AgentLocalError> {
        let root =
            self.instance_root(instance).ok_or_else(|| AgentLocalError::UnknownInstance(instance.to_string()))?;
        Ok(root.join(file))
    }

    fn status_inner(&self) -> Result<AgentStatus, AgentLocalError> {
        let flagged = restart_state::load(&self.config.state_dir)?;
        let instances = self
            .config
            .instances
            .iter()
            .map(|entry| AgentInstanceStatus { id: entry.id.clone(), active: entry.root.is_dir() })
            .collect();
        Ok(AgentStatus {
            host: self.config.host.clone(),
            version: self.config.version.clone(),
            instances,
            needs_restart: flagged.into_iter().collect(),
        })
    }

    fn read_config_inner(&self, instance: &InstanceId, file: &str) -> Result<Vec<u8>, AgentLocalError> {
        let path = self.resolve_file(instance, file)?;
        fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                AgentLocalError::FileNotFound(path.display().to_string())
            } else {
                AgentLocalError::Filesystem { path: path.display().to_string(), source }
            }
        })
    }

    fn write_config_inner(
        &self,
        instance: &InstanceId,
        file: &str,
        bytes: &[u8],
        deployment_id: DeploymentId,
    ) -> Result<HashDigest, AgentLocalError> {
        let path = self.resolve_file(instance, file)?;
        let _guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let prior_bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(AgentLocalError::Filesystem { path: path.display().to_string(), source }),
        };
        let entry = BackupManifestEntry {
            deployment_id,
            instance: instance.clone(),
            path: file.to_string(),
            prior_digest: hash_bytes(DEFAULT_HASH_ALGORITHM, &prior_bytes),
            prior_bytes,
        };
        manifest::record_if_absent(&self.config.state_dir, entry)?;

        atomic_write(&path, bytes)
            .map_err(|source| AgentLocalError::Filesystem { path: path.display().to_string(), source })?;
        restart_state::mark(&self.config.state_dir, instance)?;
        info!(instance = %instance, file, deployment_id = deployment_id.get(), "wrote config file");
        Ok(hash_bytes(DEFAULT_HASH_ALGORITHM, bytes))
    }

    fn restart_inner(&self, instance: Option<&InstanceId>) -> Result<(), AgentLocalError> {
        let targets: Vec<InstanceId> = match instance {
            Some(id) => vec![id.clone()],
            None => self.config.instances.iter().map(|entry| entry.id.clone()).collect(),
        };
        for target in &targets {
            process::restart_instance(&self.config.restart_command, target)?;
            restart_state::clear(&self.config.state_dir, target)?;
        }
        Ok(())
    }

    fn rollback_inner(&self, deployment_id: DeploymentId) -> Result<(), AgentLocalError> {
        let entries = manifest::load(&self.config.state_dir, deployment_id)?;
        if entries.is_empty() {
            return Err(AgentLocalError::NoSuchDeployment(deployment_id.get().to_string()));
        }
        let _guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for entry in &entries {
            let path = self.resolve_file(&entry.instance, &entry.path)?;
            atomic_write(&path, &entry.prior_bytes)
                .map_err(|source| AgentLocalError::Filesystem { path: path.display().to_string(), source })?;
            restart_state::clear(&self.config.state_dir, &entry.instance)?;
        }
        manifest::clear(&self.config.state_dir, deployment_id)?;
        info!(deployment_id = deployment_id.get(), files = entries.len(), "rolled back deployment");
        Ok(())
    }
}

impl AgentClient for LocalAgent {
    fn status(&self) -> Result<AgentStatus, AgentError> {
        self.status_inner().map_err(AgentError::from)
    }

    fn read_config(&self, instance: &InstanceId, file: &str) -> Result<Vec<u8>, AgentError> {
        self.read_config_inner(instance, file).map_err(AgentError::from)
    }

    fn write_config(
        &self,
        instance: &InstanceId,
        file: &str,
        bytes: &[u8],
        deployment_id: DeploymentId,
    ) -> Result<HashDigest, AgentError> {
        self.write_config_inner(instance, file, bytes, deployment_id).map_err(AgentError::from)
    }

    fn restart(&self, instance: Option<&InstanceId>) -> Result<(), AgentError> {
        self.restart_inner(instance).map_err(AgentError::from)
    }

    fn rollback(&self, deployment_id: DeploymentId) -> Result<(), AgentError> {
        self.rollback_inner(deployment_id).map_err(AgentError::from)
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use std::num::NonZeroU64;

    use fleetgate_core::HostId;

    use super::*;
    use crate::config::AgentInstanceConfig;

    fn test_agent() -> (tempfile::TempDir, LocalAgent) {
        let dir = tempfile::tempdir().expect("tempdir");
        let instance_root = dir.path().join("DEV01");
        fs::create_dir_all(&instance_root).expect("create instance root");
        let config = AgentConfig {
            host: HostId::new("hetzner"),
            version: "test".to_string(),
            instances: vec![AgentInstanceConfig { id: InstanceId::new("DEV01"), root: instance_root }],
            state_dir: dir.path().join("state"),
            restart_command: "true".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
        };
        (dir, LocalAgent::new(config))
    }

    #[test]
    fn status_reports_configured_active_instance() {
        let (_dir, agent) = test_agent();
        let status = agent.status().expect("status");
        assert_eq!(status.instances.len(), 1);
        assert!(status.instances[0].active);
        assert!(status.needs_restart.is_empty());
    }

    #[test]
    fn write_then_read_round_trips_and_flags_restart() {
        let (_dir, agent) = test_agent();
        let instance = InstanceId::new("DEV01");
        let deployment_id = DeploymentId::new(NonZeroU64::new(1).expect("nonzero"));
        agent.write_config(&instance, "server.properties", b"motd=hi", deployment_id).expect("write");
        let bytes = agent.read_config(&instance, "server.properties").expect("read");
        assert_eq!(bytes, b"motd=hi");
        let status = agent.status().expect("status");
        assert_eq!(status.needs_restart, vec![instance]);
    }

    #[test]
    fn rollback_restores_prior_bytes_and_clears_manifest() {
        let (_dir, agent) = test_agent();
        let instance = InstanceId::new("DEV01");
        let first_deployment = DeploymentId::new(NonZeroU64::new(1).expect("nonzero"));
        let second_deployment = DeploymentId::new(NonZeroU64::new(2).expect("nonzero"));
        agent.write_config(&instance, "server.properties", b"motd=before", first_deployment).expect("seed write");
        agent.restart(Some(&instance)).expect("restart clears flag");
        agent.write_config(&instance, "server.properties", b"motd=after", second_deployment).expect("deploy write");

        agent.rollback(second_deployment).expect("rollback");
        let bytes = agent.read_config(&instance, "server.properties").expect("read");
        assert_eq!(bytes, b"motd=before");
        let status = agent.status().expect("status");
        assert!(!status.needs_restart.contains(&instance), "rollback must clear needs_restart, not set it");

        let second_rollback = agent.rollback(second_deployment);
        assert!(matches!(second_rollback, Err(AgentError::NotFound(_))));
    }

    #[test]
    fn read_unknown_instance_is_not_found() {
        let (_dir, agent) = test_agent();
        let result = agent.read_config(&InstanceId::new("MISSING"), "server.properties");
        assert!(matches!(result, Err(AgentError::NotFound(_))));
    }
}
