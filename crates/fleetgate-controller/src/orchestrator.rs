// crates/fleetgate-controller/src/orchestrator.rs
// ============================================================================
// Module: Fleetgate Deployment Orchestrator
// Description: Plan/execute/rollback state machine driving Agent RPC calls
//              to apply a change set (§4.7).
// Purpose: Turn a set of (instance, target) requests into resolved writes,
//          verify them, restart the affected instances, and roll back
//          cleanly on any failure along the way.
// Dependencies: fleetgate-core, fleetgate-codec
// ============================================================================

//! ## Overview
//! The orchestrator never leaves a file half-written: `fleetgate-agent`'s
//! `write_config` is itself atomic (temp file + fsync + rename), and this
//! module's own atomicity is at the deployment level — if any step from
//! `plan` through `restart` fails, every agent already touched in this
//! deployment is asked to `rollback` before the deployment reaches a
//! terminal state (§4.7, §8 scenario 4). Backup capture is not a separate
//! RPC: `fleetgate-agent::LocalAgent::write_config` records the prior-bytes
//! manifest entry as part of the same atomic write call, so this
//! orchestrator's `BackedUp` state is a bookkeeping marker, not a distinct
//! agent round-trip.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::Mutex;

use fleetgate_codec::Format;
use fleetgate_codec::emit;
use fleetgate_codec::parse;
use fleetgate_core::AgentClient;
use fleetgate_core::AgentError;
use fleetgate_core::DeploymentId;
use fleetgate_core::HostId;
use fleetgate_core::InstanceId;
use fleetgate_core::ResolveQuery;
use fleetgate_core::RuleSnapshot;
use fleetgate_core::RuleStore;
use fleetgate_core::Timestamp;
use fleetgate_core::resolve;
use fleetgate_core::values_equal;
use tracing::info;
use tracing::warn;

use crate::deployment::ChangeRequest;
use crate::deployment::Deployment;
use crate::deployment::DeploymentState;
use crate::deployment::InstanceOutcome;
use crate::deployment::PlannedChange;
use crate::error::OrchestratorError;

/// Current wall-clock time, stamped onto a newly planned deployment.
fn now() -> Timestamp {
    Timestamp::from_offset_date_time(time::OffsetDateTime::now_utc())
}

/// Plans and executes deployments against a fixed set of per-host agents.
pub struct Orchestrator {
    store: Arc<dyn RuleStore>,
    agents: HashMap<HostId, Arc<dyn AgentClient>>,
    deployments: Mutex<HashMap<DeploymentId, Deployment>>,
    next_id: Mutex<NonZeroU64>,
}

impl Orchestrator {
    /// Builds an orchestrator over `store` and one [`AgentClient`] per host.
    #[must_use]
    pub fn new(store: Arc<dyn RuleStore>, agents: HashMap<HostId, Arc<dyn AgentClient>>) -> Self {
        Self { store, agents, deployments: Mutex::new(HashMap::new()), next_id: Mutex::new(NonZeroU64::MIN) }
    }

    /// Returns the next sequential deployment id.
    fn allocate_id(&self) -> DeploymentId {
        let mut guard = self.next_id.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let raw = *guard;
        *guard = raw.checked_add(1).unwrap_or(NonZeroU64::MAX);
        DeploymentId::new(raw)
    }

    /// Looks up the agent client for the host running `instance`.
    fn agent_for_instance(&self, snapshot: &dyn RuleSnapshot, instance: &InstanceId) -> Result<Arc<dyn AgentClient>, OrchestratorError> {
        let record = snapshot.instance(instance).ok_or_else(|| OrchestratorError::UnknownInstance(instance.clone()))?;
        self.agents.get(&record.host).cloned().ok_or_else(|| OrchestratorError::NoAgentForHost(record.host))
    }

    /// Resolves every request's expected value, rejecting the whole plan on
    /// the first target with no active rule, a resolution error, or a
    /// platform mismatch (§4.7, §8 scenario 6).
    ///
    /// # Errors
    ///
    /// See [`OrchestratorError`] variants raised during planning.
    pub fn plan(&self, requests: Vec<ChangeRequest>) -> Result<Deployment, OrchestratorError> {
        let snapshot = self.store.snapshot().map_err(|err| OrchestratorError::Agent {
            host: HostId::new("rule-store"),
            source: AgentError::Io(err.to_string()),
        })?;
        let mut changes = Vec::with_capacity(requests.len());
        for request in requests {
            let instance =
                snapshot.instance(&request.instance).ok_or_else(|| OrchestratorError::UnknownInstance(request.instance.clone()))?;
            if let Some(plugin_id) = &request.target.plugin
                && let Some(plugin) = snapshot.plugin(plugin_id)
                && plugin.platform != instance.platform
            {
                return Err(OrchestratorError::PlatformMismatch { instance: request.instance, target: request.target });
            }
            let query = ResolveQuery { instance: request.instance.clone(), target: request.target.clone() };
            let Some(resolved) = resolve(&query, snapshot.as_ref())? else {
                return Err(OrchestratorError::NoActiveRule { instance: request.instance, target: request.target });
            };
            changes.push(PlannedChange { instance: request.instance, target: request.target, expected: resolved.value });
        }
        let deployment = Deployment {
            id: self.allocate_id(),
            state: DeploymentState::Planned,
            changes,
            outcomes: Vec::new(),
            created_at: now(),
        };
        self.deployments.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(deployment.id, deployment.clone());
        Ok(deployment)
    }

    /// Returns a snapshot copy of a previously planned or executed deployment.
    #[must_use]
    pub fn get(&self, id: DeploymentId) -> Option<Deployment> {
        self.deployments.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(&id).cloned()
    }

    /// Persists `deployment`'s current state and returns it back to the caller.
    fn store_deployment(&self, deployment: Deployment) -> Deployment {
        self.deployments
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(deployment.id, deployment.clone());
        deployment
    }

    /// Executes a planned deployment: write every touched file, verify it,
    /// restart the touched instances, and roll back on any failure (§4.7).
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NoSuchDeployment`] if `id` was never
    /// planned. Failures during execution are recorded on the returned
    /// deployment's `state` and `outcomes` rather than returned as `Err`, so
    /// the caller always sees the full per-instance disposition (§4.6).
    pub fn execute(&self, id: DeploymentId) -> Result<Deployment, OrchestratorError> {
        let mut deployment = self.get(id).ok_or(OrchestratorError::NoSuchDeployment(id))?;
        if deployment.state != DeploymentState::Planned {
            return Err(OrchestratorError::NotPlanned(id));
        }

        let snapshot = self.store.snapshot().map_err(|err| OrchestratorError::Agent {
            host: HostId::new("rule-store"),
            source: AgentError::Io(err.to_string()),
        })?;

        deployment.state = DeploymentState::BackedUp;
        let files = deployment.touched_files();
        let mut touched_hosts: Vec<HostId> = Vec::new();

        deployment.state = DeploymentState::Writing;
        for (instance, file) in &files {
            let agent = match self.agent_for_instance(snapshot.as_ref(), instance) {
                Ok(agent) => agent,
                Err(err) => return Ok(self.fail(deployment, DeploymentState::FailedWrite, &touched_hosts, &err.to_string())),
            };
            let host = snapshot.instance(instance).map(|record| record.host);
            if let Some(host) = &host
                && !touched_hosts.contains(host)
            {
                touched_hosts.push(host.clone());
            }

            let current = match agent.read_config(instance, file) {
                Ok(bytes) => bytes,
                Err(AgentError::NotFound(_)) => Vec::new(),
                Err(err) => return Ok(self.fail(deployment, DeploymentState::FailedWrite, &touched_hosts, &err.to_string())),
            };
            let Some(format) = Format::from_extension(file) else {
                return Ok(self.fail(
                    deployment,
                    DeploymentState::FailedWrite,
                    &touched_hosts,
                    &format!("no recognized codec format for {file}"),
                ));
            };
            let mut tree = if current.is_empty() {
                fleetgate_codec::DocumentTree::new(serde_json::Value::Object(serde_json::Map::new()))
            } else {
                match parse(&current, format, file) {
                    Ok(tree) => tree,
                    Err(err) => {
                        return Ok(self.fail(deployment, DeploymentState::FailedWrite, &touched_hosts, &err.to_string()));
                    }
                }
            };
            for change in deployment.changes.iter().filter(|change| &change.instance == instance && &change.target.file == file) {
                if let Err(err) = tree.set(&change.target.key, change.expected.clone()) {
                    return Ok(self.fail(deployment, DeploymentState::FailedWrite, &touched_hosts, &err.to_string()));
                }
            }
            let bytes = match emit(&tree, format, file) {
                Ok(bytes) => bytes,
                Err(err) => return Ok(self.fail(deployment, DeploymentState::FailedWrite, &touched_hosts, &err.to_string())),
            };
            if let Err(err) = agent.write_config(instance, file, &bytes, id) {
                return Ok(self.fail(deployment, DeploymentState::FailedWrite, &touched_hosts, &err.to_string()));
            }
        }

        deployment.state = DeploymentState::Verified;
        for change in deployment.changes.clone() {
            let agent = match self.agent_for_instance(snapshot.as_ref(), &change.instance) {
                Ok(agent) => agent,
                Err(err) => return Ok(self.fail(deployment, DeploymentState::FailedVerify, &touched_hosts, &err.to_string())),
            };
            let Some(format) = Format::from_extension(&change.target.file) else {
                return Ok(self.fail(deployment, DeploymentState::FailedVerify, &touched_hosts, "unrecognized format"));
            };
            let bytes = match agent.read_config(&change.instance, &change.target.file) {
                Ok(bytes) => bytes,
                Err(err) => return Ok(self.fail(deployment, DeploymentState::FailedVerify, &touched_hosts, &err.to_string())),
            };
            let tree = match parse(&bytes, format, &change.target.file) {
                Ok(tree) => tree,
                Err(err) => return Ok(self.fail(deployment, DeploymentState::FailedVerify, &touched_hosts, &err.to_string())),
            };
            let actual = tree.descend(&change.target.key).ok().flatten().cloned().unwrap_or(serde_json::Value::Null);
            if !values_equal(&actual, &change.expected) {
                warn!(instance = %change.instance, file = %change.target.file, key = %change.target.key, "deployment verify mismatch");
                return Ok(self.fail(
                    deployment,
                    DeploymentState::FailedVerify,
                    &touched_hosts,
                    &format!("expected {:?}, observed {:?}", change.expected, actual),
                ));
            }
        }

        deployment.state = DeploymentState::RestartPending;
        for instance in deployment.touched_instances() {
            let agent = match self.agent_for_instance(snapshot.as_ref(), &instance) {
                Ok(agent) => agent,
                Err(err) => return Ok(self.fail(deployment, DeploymentState::FailedRestart, &touched_hosts, &err.to_string())),
            };
            if let Err(err) = agent.restart(Some(&instance)) {
                deployment.state = DeploymentState::FailedRestart;
                deployment.outcomes.push((instance, InstanceOutcome::Failed(err.to_string())));
                return Ok(self.store_deployment(deployment));
            }
        }
        deployment.state = DeploymentState::Restarted;

        for instance in deployment.touched_instances() {
            deployment.outcomes.push((instance, InstanceOutcome::Completed));
        }
        deployment.state = DeploymentState::Completed;
        info!(deployment_id = id.get(), "deployment completed");
        Ok(self.store_deployment(deployment))
    }

    /// Manually rolls back a deployment (`POST /deployments/{id}/rollback`),
    /// independent of the automatic rollback path inside `execute`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NoSuchDeployment`] if `id` was never
    /// planned.
    pub fn rollback(&self, id: DeploymentId) -> Result<Deployment, OrchestratorError> {
        let mut deployment = self.get(id).ok_or(OrchestratorError::NoSuchDeployment(id))?;
        let snapshot = self.store.snapshot().map_err(|err| OrchestratorError::Agent {
            host: HostId::new("rule-store"),
            source: AgentError::Io(err.to_string()),
        })?;
        let hosts: Vec<HostId> =
            deployment.touched_instances().into_iter().filter_map(|instance| snapshot.instance(&instance).map(|record| record.host)).collect();
        deployment.state = DeploymentState::RollingBack;
        Ok(self.finish_rollback(deployment, &hosts))
    }

    /// Records `failure_state`, logs `detail`, and rolls back every touched
    /// host before persisting the deployment as `RolledBack`.
    fn fail(&self, mut deployment: Deployment, failure_state: DeploymentState, touched_hosts: &[HostId], detail: &str) -> Deployment {
        warn!(deployment_id = deployment.id.get(), state = ?failure_state, detail, "deployment failed, rolling back");
        deployment.state = failure_state;
        deployment.state = DeploymentState::RollingBack;
        self.finish_rollback(deployment, touched_hosts)
    }

    /// Calls `rollback` on every agent in `touched_hosts`, best-effort, then
    /// marks every touched instance rolled back and persists the deployment.
    fn finish_rollback(&self, mut deployment: Deployment, touched_hosts: &[HostId]) -> Deployment {
        for host in touched_hosts {
            if let Some(agent) = self.agents.get(host)
                && let Err(err) = agent.rollback(deployment.id)
            {
                warn!(host = %host, deployment_id = deployment.id.get(), error = %err, "rollback call failed");
            }
        }
        for instance in deployment.touched_instances() {
            deployment.outcomes.push((instance, InstanceOutcome::RolledBack));
        }
        deployment.state = DeploymentState::RolledBack;
        self.store_deployment(deployment)
    }
}
