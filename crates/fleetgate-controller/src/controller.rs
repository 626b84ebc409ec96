// crates/fleetgate-controller/src/controller.rs
// ============================================================================
// Module: Fleetgate Controller
// Description: Ties the Rule Store, agent fleet, and Deployment Orchestrator
//              together behind one synchronous API (§4.6).
// Purpose: Give the HTTP API and Scheduler a single entry point for every
//          operation an operator or a scheduled task can trigger.
// Dependencies: fleetgate-core, fleetgate-codec
// ============================================================================

//! ## Overview
//! `Controller` holds no async state of its own: every method here blocks on
//! SQLite and agent RPC calls the same way `fleetgate-agent::LocalAgent`
//! does, and the async surface (`api.rs`, `scheduler.rs`) wraps calls into
//! it with `tokio::task::spawn_blocking`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use fleetgate_codec::Format;
use fleetgate_codec::parse;
use fleetgate_core::AgentClient;
use fleetgate_core::AgentError;
use fleetgate_core::ConfigRule;
use fleetgate_core::ConfigType;
use fleetgate_core::DeploymentId;
use fleetgate_core::DriftItem;
use fleetgate_core::ExpectedFile;
use fleetgate_core::GroupId;
use fleetgate_core::HostId;
use fleetgate_core::Instance;
use fleetgate_core::InstanceGroup;
use fleetgate_core::InstanceId;
use fleetgate_core::NewConfigRule;
use fleetgate_core::Plugin;
use fleetgate_core::PluginId;
use fleetgate_core::ResolveQuery;
use fleetgate_core::ResolvedValue;
use fleetgate_core::RuleFilter;
use fleetgate_core::RuleId;
use fleetgate_core::RuleSnapshot;
use fleetgate_core::RuleStore;
use fleetgate_core::Scope;
use fleetgate_core::Tag;
use fleetgate_core::TagId;
use fleetgate_core::Timestamp;
use fleetgate_core::resolve;
use fleetgate_core::scan_instance;
use tracing::warn;

use crate::deployment::ChangeRequest;
use crate::deployment::Deployment;
use crate::error::ControllerError;
use crate::orchestrator::Orchestrator;

/// Current wall-clock time, used for drift scan stamps and heartbeat bookkeeping.
fn now() -> Timestamp {
    Timestamp::from_offset_date_time(time::OffsetDateTime::now_utc())
}

/// Ties the Rule Store, agent fleet, and Orchestrator together (§4.6).
///
/// Controller-local, in-memory state is intentionally limited to two things
/// the Rule Store's schema has no table for: heartbeat miss counters and the
/// Orchestrator's own deployment records (see the design ledger).
pub struct Controller {
    store: Arc<dyn RuleStore>,
    agents: HashMap<HostId, Arc<dyn AgentClient>>,
    orchestrator: Orchestrator,
    misses: Mutex<HashMap<HostId, u32>>,
}

impl Controller {
    /// Builds a controller over `store` and one [`AgentClient`] per host.
    #[must_use]
    pub fn new(store: Arc<dyn RuleStore>, agents: HashMap<HostId, Arc<dyn AgentClient>>) -> Self {
        let orchestrator = Orchestrator::new(Arc::clone(&store), agents.clone());
        Self { store, agents, orchestrator, misses: Mutex::new(HashMap::new()) }
    }

    /// Resolves a single `(instance, target)` query (§4.3, `GET /resolve`).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] if a snapshot cannot be taken, or
    /// [`ControllerError::Resolution`] on an ambiguous rule or failed
    /// substitution/coercion.
    pub fn resolve(&self, query: &ResolveQuery) -> Result<Option<ResolvedValue>, ControllerError> {
        let snapshot = self.store.snapshot()?;
        Ok(resolve(query, snapshot.as_ref())?)
    }

    /// Lists every instance the registry currently knows about
    /// (`GET /instances`).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] if a snapshot cannot be taken.
    pub fn list_instances(&self) -> Result<Vec<Instance>, ControllerError> {
        Ok(self.store.snapshot()?.instances())
    }

    /// Inserts a new rule (`POST /rules`).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] when the rule's value fails to
    /// parse as its declared type.
    pub fn set_rule(&self, rule: NewConfigRule) -> Result<RuleId, ControllerError> {
        Ok(self.store.put_rule(rule)?)
    }

    /// Deactivates a rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] when `id` does not exist.
    pub fn deactivate_rule(&self, id: RuleId) -> Result<(), ControllerError> {
        Ok(self.store.deactivate_rule(id)?)
    }

    /// Lists rules matching `filter` (`GET /rules`).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] on underlying storage failure.
    pub fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<ConfigRule>, ControllerError> {
        Ok(self.store.get_rules(filter)?)
    }

    /// Registers an instance or updates its registry row directly, bypassing
    /// discovery (`PUT /instances`, see the design ledger's discovery-scope
    /// decision: a host an agent newly reports still needs this call once).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] on underlying storage failure.
    pub fn register_instance(&self, instance: Instance) -> Result<(), ControllerError> {
        Ok(self.store.upsert_instance(instance)?)
    }

    /// Upserts a plugin catalog entry (`PUT /plugins`, §4.8).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] on underlying storage failure.
    pub fn put_plugin(&self, plugin: Plugin) -> Result<(), ControllerError> {
        Ok(self.store.put_plugin(plugin)?)
    }

    /// Upserts an instance group's metadata (`PUT /groups`).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] on underlying storage failure.
    pub fn put_group(&self, group: InstanceGroup) -> Result<(), ControllerError> {
        Ok(self.store.put_group(group)?)
    }

    /// Adds `instance` to `group` (`POST /groups/{id}/members`).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] if this would create a membership
    /// cycle.
    pub fn add_group_member(&self, group: &GroupId, instance: &InstanceId) -> Result<(), ControllerError> {
        Ok(self.store.add_group_member(group, instance)?)
    }

    /// Upserts a tag's metadata (`PUT /tags`).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] on underlying storage failure.
    pub fn put_tag(&self, tag: Tag) -> Result<(), ControllerError> {
        Ok(self.store.put_tag(tag)?)
    }

    /// Assigns `tag` to `instance` (`POST /tags/{id}/members`).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] on underlying storage failure.
    pub fn add_tag_member(&self, tag: &TagId, instance: &InstanceId) -> Result<(), ControllerError> {
        Ok(self.store.add_tag_member(tag, instance)?)
    }

    /// Plans a deployment for `requests` without executing it
    /// (`POST /deployments`).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Orchestrator`] on any planning failure.
    pub fn plan_deployment(&self, requests: Vec<ChangeRequest>) -> Result<Deployment, ControllerError> {
        Ok(self.orchestrator.plan(requests)?)
    }

    /// Executes a previously planned deployment (`POST /deployments/{id}/execute`).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Orchestrator`] if `id` is unknown or not
    /// in the `Planned` state.
    pub fn execute_deployment(&self, id: DeploymentId) -> Result<Deployment, ControllerError> {
        Ok(self.orchestrator.execute(id)?)
    }

    /// Manually rolls back a deployment (`POST /deployments/{id}/rollback`).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Orchestrator`] if `id` is unknown.
    pub fn rollback_deployment(&self, id: DeploymentId) -> Result<Deployment, ControllerError> {
        Ok(self.orchestrator.rollback(id)?)
    }

    /// Returns a previously planned or executed deployment's current state.
    #[must_use]
    pub fn get_deployment(&self, id: DeploymentId) -> Option<Deployment> {
        self.orchestrator.get(id)
    }

    /// Runs a drift scan for one instance (`GET /drift?instance=`, §4.4).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::UnknownInstance`] when `instance_id` is not
    /// registered, or [`ControllerError::Store`] if a snapshot cannot be
    /// taken.
    pub fn scan_drift(&self, instance_id: &InstanceId) -> Result<Vec<DriftItem>, ControllerError> {
        let snapshot = self.store.snapshot()?;
        let instance = snapshot.instance(instance_id).ok_or_else(|| ControllerError::UnknownInstance(instance_id.clone()))?;
        let expected = expected_files_for_instance(&instance, snapshot.as_ref());
        let Some(agent) = self.agents.get(&instance.host) else {
            warn!(instance = %instance_id, host = %instance.host, "drift scan: no agent configured for host");
            return Ok(scan_instance(instance_id, &expected, &HashMap::new(), snapshot.as_ref(), now()));
        };

        let mut observed = HashMap::new();
        for file in &expected {
            match agent.read_config(instance_id, &file.file) {
                Ok(bytes) => {
                    let Some(format) = Format::from_extension(&file.file) else {
                        warn!(file = %file.file, "drift scan: no recognized codec format");
                        continue;
                    };
                    match parse(&bytes, format, &file.file) {
                        Ok(tree) => {
                            observed.insert(file.file.clone(), tree);
                        }
                        Err(err) => warn!(file = %file.file, error = %err, "drift scan: parse failed"),
                    }
                }
                Err(AgentError::NotFound(_)) => {}
                Err(err) => return Err(ControllerError::Agent(err)),
            }
        }
        Ok(scan_instance(instance_id, &expected, &observed, snapshot.as_ref(), now()))
    }

    /// Runs a drift scan across every active instance the registry knows about.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] if a snapshot cannot be taken.
    pub fn scan_drift_all(&self) -> Result<Vec<DriftItem>, ControllerError> {
        let snapshot = self.store.snapshot()?;
        let mut items = Vec::new();
        for instance in snapshot.instances() {
            if !instance.active {
                continue;
            }
            items.extend(self.scan_drift(&instance.id)?);
        }
        Ok(items)
    }

    /// Reconciles the registry's `active`/`last_seen` state against every
    /// configured agent's reported instance list (§4.9 discovery sweep).
    ///
    /// Agents report only an id and an `active` flag; an id the registry
    /// does not already know is logged and skipped rather than registered,
    /// since a brand-new instance's name, platform, and port are only
    /// supplied by an operator (see the design ledger).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Store`] if a snapshot or write fails.
    pub fn discover(&self) -> Result<(), ControllerError> {
        let snapshot = self.store.snapshot()?;
        for (host, agent) in &self.agents {
            let status = match agent.status() {
                Ok(status) => status,
                Err(err) => {
                    warn!(%host, error = %err, "discovery: agent unreachable");
                    continue;
                }
            };
            for reported in &status.instances {
                let Some(mut instance) = snapshot.instance(&reported.id) else {
                    warn!(instance = %reported.id, %host, "discovery: unregistered instance reported, skipping");
                    continue;
                };
                instance.active = reported.active;
                if reported.active {
                    instance.last_seen = Some(now());
                }
                self.store.upsert_instance(instance)?;
            }
        }
        Ok(())
    }

    /// Pings every configured agent and returns the hosts now considered
    /// unreachable (two consecutive failures, §4.9).
    #[must_use]
    pub fn heartbeat(&self) -> Vec<HostId> {
        let mut unreachable = Vec::new();
        let mut misses = self.misses.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for (host, agent) in &self.agents {
            match agent.status() {
                Ok(_) => {
                    misses.remove(host);
                }
                Err(err) => {
                    let count = misses.entry(host.clone()).or_insert(0);
                    *count += 1;
                    warn!(%host, error = %err, misses = *count, "heartbeat: agent call failed");
                    if *count >= 2 {
                        unreachable.push(host.clone());
                    }
                }
            }
        }
        unreachable
    }
}

/// Returns every config file a drift scan should expect for `instance`: the
/// union of every rule target at a scope applying to it, folded with each
/// referenced plugin's declared baseline files (§4.4).
fn expected_files_for_instance(instance: &Instance, snapshot: &dyn RuleSnapshot) -> Vec<ExpectedFile> {
    let groups = snapshot.groups_for_instance(&instance.id);
    let tags = snapshot.tags_for_instance(&instance.id);
    let mut scopes = vec![Scope::Global, Scope::Server(instance.host.clone()), Scope::Instance(instance.id.clone())];
    scopes.extend(groups.into_iter().map(Scope::Group));
    scopes.extend(tags.into_iter().map(Scope::Tag));

    let mut files: Vec<ExpectedFile> = Vec::new();
    let mut plugins_seen: Vec<PluginId> = Vec::new();
    for scope in &scopes {
        for rule in snapshot.rules_for_scope(scope) {
            if let Some(plugin_id) = &rule.target.plugin {
                let Some(plugin) = snapshot.plugin(plugin_id) else { continue };
                if plugin.platform != instance.platform {
                    continue;
                }
                if !plugins_seen.contains(plugin_id) {
                    plugins_seen.push(plugin_id.clone());
                }
            }
            let entry = ExpectedFile { config_type: rule.target.config_type, plugin: rule.target.plugin.clone(), file: rule.target.file.clone() };
            if !files.contains(&entry) {
                files.push(entry);
            }
        }
    }
    for plugin_id in &plugins_seen {
        for file in snapshot.baseline_files(plugin_id) {
            let entry = ExpectedFile { config_type: ConfigType::Plugin, plugin: Some(plugin_id.clone()), file };
            if !files.contains(&entry) {
                files.push(entry);
            }
        }
    }
    files
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
    use fleetgate_core::ConfigTarget;
    use fleetgate_core::ConfigVariable;
    use fleetgate_core::InstanceGroup;
    use fleetgate_core::Plugin;
    use fleetgate_core::StoreError;
    use fleetgate_core::Tag;
    use fleetgate_core::ValueType;
    use fleetgate_core::VariableScope;
    use fleetgate_core::GroupId;
    use fleetgate_core::TagId;
    use fleetgate_core::VariableName;
    use fleetgate_core::interfaces::RuleFilter;
    use fleetgate_core::model::ConfigRule;
    use fleetgate_core::model::Platform;
    use serde_json::json;
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering;

    struct FakeStore {
        instances: Mutex<HashMap<InstanceId, Instance>>,
        rules: Mutex<Vec<ConfigRule>>,
        next_rule: AtomicU64,
    }

    impl FakeStore {
        fn new(instances: Vec<Instance>) -> Self {
            Self {
                instances: Mutex::new(instances.into_iter().map(|instance| (instance.id.clone(), instance)).collect()),
                rules: Mutex::new(Vec::new()),
                next_rule: AtomicU64::new(1),
            }
        }
    }

    struct FakeSnapshot {
        instances: HashMap<InstanceId, Instance>,
        rules: Vec<ConfigRule>,
    }

    impl RuleSnapshot for FakeSnapshot {
        fn rules_for_target(&self, target: &ConfigTarget) -> Vec<ConfigRule> {
            self.rules.iter().filter(|rule| &rule.target == target && rule.active).cloned().collect()
        }

        fn rules_for_scope(&self, scope: &Scope) -> Vec<ConfigRule> {
            self.rules.iter().filter(|rule| &rule.scope == scope && rule.active).cloned().collect()
        }

        fn instance(&self, id: &InstanceId) -> Option<Instance> {
            self.instances.get(id).cloned()
        }

        fn instances(&self) -> Vec<Instance> {
            self.instances.values().cloned().collect()
        }

        fn groups_for_instance(&self, _instance: &InstanceId) -> Vec<GroupId> {
            Vec::new()
        }

        fn tags_for_instance(&self, _instance: &InstanceId) -> Vec<TagId> {
            Vec::new()
        }

        fn plugin(&self, _id: &PluginId) -> Option<Plugin> {
            None
        }

        fn variable(&self, _scope: &VariableScope, _name: &VariableName) -> Option<ConfigVariable> {
            None
        }

        fn baseline_files(&self, _plugin: &PluginId) -> Vec<String> {
            Vec::new()
        }
    }

    impl RuleStore for FakeStore {
        fn put_rule(&self, rule: NewConfigRule) -> Result<RuleId, StoreError> {
            let id = RuleId::from_raw(self.next_rule.fetch_add(1, Ordering::SeqCst)).ok_or_else(|| StoreError::Io("exhausted".to_string()))?;
            self.rules.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(ConfigRule {
                id,
                scope: rule.scope,
                target: rule.target,
                value: rule.value,
                value_type: rule.value_type,
                active: true,
                updated_at: now(),
                security_sensitive: rule.security_sensitive,
            });
            Ok(id)
        }

        fn deactivate_rule(&self, id: RuleId) -> Result<(), StoreError> {
            let mut rules = self.rules.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let rule = rules.iter_mut().find(|rule| rule.id == id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            rule.active = false;
            Ok(())
        }

        fn get_rules(&self, _filter: &RuleFilter) -> Result<Vec<ConfigRule>, StoreError> {
            Ok(self.rules.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone())
        }

        fn set_variable(&self, _variable: ConfigVariable) -> Result<(), StoreError> {
            Ok(())
        }

        fn get_variables(&self, _scope: &VariableScope) -> Result<Vec<ConfigVariable>, StoreError> {
            Ok(Vec::new())
        }

        fn add_group_member(&self, _group: &GroupId, _instance: &InstanceId) -> Result<(), StoreError> {
            Ok(())
        }

        fn add_tag_member(&self, _tag: &TagId, _instance: &InstanceId) -> Result<(), StoreError> {
            Ok(())
        }

        fn upsert_instance(&self, instance: Instance) -> Result<(), StoreError> {
            self.instances.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(instance.id.clone(), instance);
            Ok(())
        }

        fn deactivate_instance(&self, id: &InstanceId) -> Result<(), StoreError> {
            let mut instances = self.instances.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let instance = instances.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            instance.active = false;
            Ok(())
        }

        fn put_plugin(&self, _plugin: Plugin) -> Result<(), StoreError> {
            Ok(())
        }

        fn put_group(&self, _group: InstanceGroup) -> Result<(), StoreError> {
            Ok(())
        }

        fn put_tag(&self, _tag: Tag) -> Result<(), StoreError> {
            Ok(())
        }

        fn snapshot(&self) -> Result<Arc<dyn RuleSnapshot>, StoreError> {
            Ok(Arc::new(FakeSnapshot {
                instances: self.instances.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone(),
                rules: self.rules.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone(),
            }))
        }
    }

    fn smp101() -> Instance {
        Instance {
            id: InstanceId::new("SMP101"),
            name: "SMP101".to_string(),
            host: HostId::new("hetzner"),
            platform: Platform::Paper,
            port: 25565,
            active: true,
            last_seen: None,
        }
    }

    #[test]
    fn set_rule_then_resolve_round_trips() {
        let store: Arc<dyn RuleStore> = Arc::new(FakeStore::new(vec![smp101()]));
        let controller = Controller::new(store, HashMap::new());
        let target = ConfigTarget { config_type: ConfigType::Standard, plugin: None, file: "server.properties".to_string(), key: "motd".to_string() };
        controller
            .set_rule(NewConfigRule { scope: Scope::Global, target: target.clone(), value: json!("hi"), value_type: ValueType::String, security_sensitive: false })
            .expect("sets rule");
        let resolved = controller
            .resolve(&ResolveQuery { instance: InstanceId::new("SMP101"), target })
            .expect("resolves")
            .expect("has a value");
        assert_eq!(resolved.value, json!("hi"));
    }

    #[test]
    fn scan_drift_reports_missing_file_with_no_agent() {
        let store: Arc<dyn RuleStore> = Arc::new(FakeStore::new(vec![smp101()]));
        let controller = Controller::new(store, HashMap::new());
        let target = ConfigTarget { config_type: ConfigType::Standard, plugin: None, file: "server.properties".to_string(), key: "motd".to_string() };
        controller
            .set_rule(NewConfigRule { scope: Scope::Global, target, value: json!("hi"), value_type: ValueType::String, security_sensitive: false })
            .expect("sets rule");
        let items = controller.scan_drift(&InstanceId::new("SMP101")).expect("scans");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].classification, fleetgate_core::DriftClassification::Missing);
    }

    #[test]
    fn heartbeat_marks_host_unreachable_after_two_misses() {
        struct AlwaysFails;
        impl AgentClient for AlwaysFails {
            fn status(&self) -> Result<fleetgate_core::AgentStatus, AgentError> {
                Err(AgentError::Unreachable("down".to_string()))
            }

            fn read_config(&self, _instance: &InstanceId, _file: &str) -> Result<Vec<u8>, AgentError> {
                Err(AgentError::Unreachable("down".to_string()))
            }

            fn write_config(&self, _instance: &InstanceId, _file: &str, _bytes: &[u8], _deployment_id: DeploymentId) -> Result<fleetgate_core::HashDigest, AgentError> {
                Err(AgentError::Unreachable("down".to_string()))
            }

            fn restart(&self, _instance: Option<&InstanceId>) -> Result<(), AgentError> {
                Err(AgentError::Unreachable("down".to_string()))
            }

            fn rollback(&self, _deployment_id: DeploymentId) -> Result<(), AgentError> {
                Err(AgentError::Unreachable("down".to_string()))
            }
        }

        let store: Arc<dyn RuleStore> = Arc::new(FakeStore::new(vec![smp101()]));
        let mut agents: HashMap<HostId, Arc<dyn AgentClient>> = HashMap::new();
        agents.insert(HostId::new("hetzner"), Arc::new(AlwaysFails));
        let controller = Controller::new(store, agents);
        assert!(controller.heartbeat().is_empty());
        assert_eq!(controller.heartbeat(), vec![HostId::new("hetzner")]);
    }
}
