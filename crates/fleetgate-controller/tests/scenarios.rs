// fleetgate-controller/tests/scenarios.rs
// ============================================================================
// Module: Fleetgate End-to-End Scenario Tests
// Description: The six literal end-to-end scenarios against an in-process
//              Agent double, rather than a real agent or rule store.
// Purpose: Exercise Controller, Orchestrator, and Drift Engine together the
//          way an operator's CLI or API call would, not unit by unit.
// Dependencies: fleetgate-core, fleetgate-codec, fleetgate-controller
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use fleetgate_codec::Format;
use fleetgate_codec::emit;
use fleetgate_codec::parse;
use fleetgate_controller::ChangeRequest;
use fleetgate_controller::Controller;
use fleetgate_controller::DeploymentState;
use fleetgate_core::AgentClient;
use fleetgate_core::AgentError;
use fleetgate_core::AgentStatus;
use fleetgate_core::ConfigRule;
use fleetgate_core::ConfigTarget;
use fleetgate_core::ConfigType;
use fleetgate_core::ConfigVariable;
use fleetgate_core::DeploymentId;
use fleetgate_core::DriftClassification;
use fleetgate_core::GroupId;
use fleetgate_core::HashDigest;
use fleetgate_core::HostId;
use fleetgate_core::Instance;
use fleetgate_core::InstanceGroup;
use fleetgate_core::InstanceId;
use fleetgate_core::NewConfigRule;
use fleetgate_core::Plugin;
use fleetgate_core::PluginId;
use fleetgate_core::Platform;
use fleetgate_core::RuleFilter;
use fleetgate_core::RuleId;
use fleetgate_core::RuleSnapshot;
use fleetgate_core::RuleStore;
use fleetgate_core::Scope;
use fleetgate_core::StoreError;
use fleetgate_core::Tag;
use fleetgate_core::TagId;
use fleetgate_core::ValueType;
use fleetgate_core::VariableScope;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: In-Process Rule Store Double
// ============================================================================

struct FakeStore {
    instances: Mutex<HashMap<InstanceId, Instance>>,
    rules: Mutex<Vec<ConfigRule>>,
    groups: Mutex<HashMap<InstanceId, Vec<GroupId>>>,
    tags: Mutex<HashMap<InstanceId, Vec<TagId>>>,
    plugins: Mutex<HashMap<PluginId, Plugin>>,
    next_rule: Mutex<u64>,
}

impl FakeStore {
    fn new(instances: Vec<Instance>) -> Self {
        Self {
            instances: Mutex::new(instances.into_iter().map(|instance| (instance.id.clone(), instance)).collect()),
            rules: Mutex::new(Vec::new()),
            groups: Mutex::new(HashMap::new()),
            tags: Mutex::new(HashMap::new()),
            plugins: Mutex::new(HashMap::new()),
            next_rule: Mutex::new(1),
        }
    }

    fn tag(&self, instance: &InstanceId, tag: TagId) {
        self.tags.lock().expect("lock tags").entry(instance.clone()).or_default().push(tag);
    }
}

struct FakeSnapshot {
    instances: HashMap<InstanceId, Instance>,
    rules: Vec<ConfigRule>,
    groups: HashMap<InstanceId, Vec<GroupId>>,
    tags: HashMap<InstanceId, Vec<TagId>>,
    plugins: HashMap<PluginId, Plugin>,
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

    fn groups_for_instance(&self, instance: &InstanceId) -> Vec<GroupId> {
        self.groups.get(instance).cloned().unwrap_or_default()
    }

    fn tags_for_instance(&self, instance: &InstanceId) -> Vec<TagId> {
        self.tags.get(instance).cloned().unwrap_or_default()
    }

    fn plugin(&self, id: &PluginId) -> Option<Plugin> {
        self.plugins.get(id).cloned()
    }

    fn variable(&self, _scope: &VariableScope, _name: &fleetgate_core::VariableName) -> Option<ConfigVariable> {
        None
    }

    fn baseline_files(&self, _plugin: &PluginId) -> Vec<String> {
        Vec::new()
    }
}

impl RuleStore for FakeStore {
    fn put_rule(&self, rule: NewConfigRule) -> Result<RuleId, StoreError> {
        let mut next = self.next_rule.lock().expect("lock next_rule");
        let id = RuleId::from_raw(*next).ok_or_else(|| StoreError::Io("exhausted".to_string()))?;
        *next += 1;
        self.rules.lock().expect("lock rules").push(ConfigRule {
            id,
            scope: rule.scope,
            target: rule.target,
            value: rule.value,
            value_type: rule.value_type,
            active: true,
            updated_at: fleetgate_core::Timestamp::from_offset_date_time(time::OffsetDateTime::now_utc()),
            security_sensitive: rule.security_sensitive,
        });
        Ok(id)
    }

    fn deactivate_rule(&self, id: RuleId) -> Result<(), StoreError> {
        let mut rules = self.rules.lock().expect("lock rules");
        let rule = rules.iter_mut().find(|rule| rule.id == id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        rule.active = false;
        Ok(())
    }

    fn get_rules(&self, _filter: &RuleFilter) -> Result<Vec<ConfigRule>, StoreError> {
        Ok(self.rules.lock().expect("lock rules").clone())
    }

    fn set_variable(&self, _variable: ConfigVariable) -> Result<(), StoreError> {
        Ok(())
    }

    fn get_variables(&self, _scope: &VariableScope) -> Result<Vec<ConfigVariable>, StoreError> {
        Ok(Vec::new())
    }

    fn add_group_member(&self, group: &GroupId, instance: &InstanceId) -> Result<(), StoreError> {
        self.groups.lock().expect("lock groups").entry(instance.clone()).or_default().push(group.clone());
        Ok(())
    }

    fn add_tag_member(&self, tag: &TagId, instance: &InstanceId) -> Result<(), StoreError> {
        self.tags.lock().expect("lock tags").entry(instance.clone()).or_default().push(tag.clone());
        Ok(())
    }

    fn upsert_instance(&self, instance: Instance) -> Result<(), StoreError> {
        self.instances.lock().expect("lock instances").insert(instance.id.clone(), instance);
        Ok(())
    }

    fn deactivate_instance(&self, id: &InstanceId) -> Result<(), StoreError> {
        let mut instances = self.instances.lock().expect("lock instances");
        let instance = instances.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        instance.active = false;
        Ok(())
    }

    fn put_plugin(&self, plugin: Plugin) -> Result<(), StoreError> {
        self.plugins.lock().expect("lock plugins").insert(plugin.id.clone(), plugin);
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
            instances: self.instances.lock().expect("lock instances").clone(),
            rules: self.rules.lock().expect("lock rules").clone(),
            groups: self.groups.lock().expect("lock groups").clone(),
            tags: self.tags.lock().expect("lock tags").clone(),
            plugins: self.plugins.lock().expect("lock plugins").clone(),
        }))
    }
}

// ============================================================================
// SECTION: In-Process Agent Double
// ============================================================================

/// An in-memory stand-in for `fleetgate-agent`'s RPC surface (§4.5): holds
/// raw file bytes per `(instance, file)`, counts restart/rollback calls, and
/// can simulate a verify-time read-back lie for scenario 4.
struct FakeAgent {
    files: Mutex<HashMap<(InstanceId, String), Vec<u8>>>,
    read_counts: Mutex<HashMap<(InstanceId, String), u32>>,
    lie_after_nth_read: Mutex<Option<((InstanceId, String), u32, Vec<u8>)>>,
    restarts: Mutex<Vec<InstanceId>>,
    rollbacks: Mutex<Vec<DeploymentId>>,
    /// Mirrors `LocalAgent`'s `needs_restart` invariant (§4.5): set on a
    /// successful write, cleared on a successful restart or rollback of the
    /// write that set it.
    needs_restart: Mutex<std::collections::HashSet<InstanceId>>,
    /// Which instances a deployment wrote to, so `rollback` knows whose
    /// `needs_restart` flag to clear.
    deployment_instances: Mutex<HashMap<DeploymentId, Vec<InstanceId>>>,
}

impl FakeAgent {
    fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            read_counts: Mutex::new(HashMap::new()),
            lie_after_nth_read: Mutex::new(None),
            restarts: Mutex::new(Vec::new()),
            rollbacks: Mutex::new(Vec::new()),
            needs_restart: Mutex::new(std::collections::HashSet::new()),
            deployment_instances: Mutex::new(HashMap::new()),
        }
    }

    fn seed(&self, instance: &InstanceId, file: &str, bytes: Vec<u8>) {
        self.files.lock().expect("lock files").insert((instance.clone(), file.to_string()), bytes);
    }

    fn bytes(&self, instance: &InstanceId, file: &str) -> Vec<u8> {
        self.files.lock().expect("lock files").get(&(instance.clone(), file.to_string())).cloned().expect("file was written")
    }

    /// Causes every `nth`-and-later `read_config` call for `(instance, file)`
    /// to return `lie` instead of the true stored bytes (§8 scenario 4).
    fn lie_on_verify(&self, instance: &InstanceId, file: &str, nth: u32, lie: Vec<u8>) {
        *self.lie_after_nth_read.lock().expect("lock lie") = Some(((instance.clone(), file.to_string()), nth, lie));
    }
}

impl AgentClient for FakeAgent {
    fn status(&self) -> Result<AgentStatus, AgentError> {
        let needs_restart = self.needs_restart.lock().expect("lock needs_restart").iter().cloned().collect();
        Ok(AgentStatus { host: HostId::new("test-host"), version: "test".to_string(), instances: Vec::new(), needs_restart })
    }

    fn read_config(&self, instance: &InstanceId, file: &str) -> Result<Vec<u8>, AgentError> {
        let key = (instance.clone(), file.to_string());
        let mut counts = self.read_counts.lock().expect("lock read_counts");
        let count = counts.entry(key.clone()).or_insert(0);
        *count += 1;
        let current_count = *count;
        drop(counts);

        if let Some((lie_key, nth, lie)) = self.lie_after_nth_read.lock().expect("lock lie").as_ref()
            && lie_key == &key
            && current_count >= *nth
        {
            return Ok(lie.clone());
        }

        self.files.lock().expect("lock files").get(&key).cloned().ok_or_else(|| AgentError::NotFound(file.to_string()))
    }

    fn write_config(&self, instance: &InstanceId, file: &str, bytes: &[u8], deployment_id: DeploymentId) -> Result<HashDigest, AgentError> {
        self.files.lock().expect("lock files").insert((instance.clone(), file.to_string()), bytes.to_vec());
        self.needs_restart.lock().expect("lock needs_restart").insert(instance.clone());
        self.deployment_instances.lock().expect("lock deployment_instances").entry(deployment_id).or_default().push(instance.clone());
        Ok(HashDigest::new(fleetgate_core::DEFAULT_HASH_ALGORITHM, bytes))
    }

    fn restart(&self, instance: Option<&InstanceId>) -> Result<(), AgentError> {
        if let Some(instance) = instance {
            self.restarts.lock().expect("lock restarts").push(instance.clone());
            self.needs_restart.lock().expect("lock needs_restart").remove(instance);
        }
        Ok(())
    }

    fn rollback(&self, deployment_id: DeploymentId) -> Result<(), AgentError> {
        self.rollbacks.lock().expect("lock rollbacks").push(deployment_id);
        if let Some(instances) = self.deployment_instances.lock().expect("lock deployment_instances").get(&deployment_id) {
            let mut needs_restart = self.needs_restart.lock().expect("lock needs_restart");
            for instance in instances {
                needs_restart.remove(instance);
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn host() -> HostId {
    HostId::new("hetzner")
}

fn smp101() -> Instance {
    Instance { id: InstanceId::new("SMP101"), name: "SMP101".to_string(), host: host(), platform: Platform::Paper, port: 25565, active: true, last_seen: None }
}

fn crea01() -> Instance {
    Instance { id: InstanceId::new("CREA01"), name: "CREA01".to_string(), host: host(), platform: Platform::Paper, port: 25566, active: true, last_seen: None }
}

fn elitemobs_config_target(key: &str) -> ConfigTarget {
    ConfigTarget { config_type: ConfigType::Plugin, plugin: Some(PluginId::new("EliteMobs")), file: "plugins/EliteMobs/config.yml".to_string(), key: key.to_string() }
}

fn vault_config_target(key: &str) -> ConfigTarget {
    ConfigTarget { config_type: ConfigType::Plugin, plugin: Some(PluginId::new("Vault")), file: "plugins/Vault/config.yml".to_string(), key: key.to_string() }
}

fn elitemobs_plugin() -> Plugin {
    Plugin { id: PluginId::new("EliteMobs"), platform: Platform::Paper, version_source: "test".to_string(), config_files: vec!["config.yml".to_string()], parent: None }
}

fn vault_plugin() -> Plugin {
    Plugin { id: PluginId::new("Vault"), platform: Platform::Paper, version_source: "test".to_string(), config_files: vec!["config.yml".to_string()], parent: None }
}

fn yaml_bytes(pairs: &[(&str, Value)]) -> Vec<u8> {
    let mut tree = fleetgate_codec::DocumentTree::new(Value::Object(serde_json::Map::new()));
    for (key, value) in pairs {
        tree.set(key, value.clone()).expect("set fixture key");
    }
    emit(&tree, Format::Yaml, "config.yml").expect("emit fixture yaml")
}

fn controller_with(store: FakeStore, agents: Vec<(HostId, Arc<FakeAgent>)>) -> (Arc<Controller>, HashMap<HostId, Arc<FakeAgent>>) {
    let fakes: HashMap<HostId, Arc<FakeAgent>> = agents.into_iter().collect();
    let clients: HashMap<HostId, Arc<dyn AgentClient>> = fakes.iter().map(|(host, agent)| (host.clone(), Arc::clone(agent) as Arc<dyn AgentClient>)).collect();
    (Arc::new(Controller::new(Arc::new(store), clients)), fakes)
}

// ============================================================================
// SECTION: Scenario 1 - Universal Rule Applies
// ============================================================================

#[test]
fn scenario_1_universal_rule_applies_with_no_drift() {
    let store = FakeStore::new(vec![smp101()]);
    store.put_plugin(elitemobs_plugin()).expect("register plugin");
    store
        .put_rule(NewConfigRule {
            scope: Scope::Global,
            target: elitemobs_config_target("language"),
            value: json!("english"),
            value_type: ValueType::String,
            security_sensitive: false,
        })
        .expect("set universal rule");

    let agent = Arc::new(FakeAgent::new());
    agent.seed(&smp101().id, "plugins/EliteMobs/config.yml", yaml_bytes(&[("language", json!("english"))]));
    let (controller, _agents) = controller_with(store, vec![(host(), agent)]);

    let items = controller.scan_drift(&smp101().id).expect("scan drift");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].classification, DriftClassification::None);
}

// ============================================================================
// SECTION: Scenario 2 - Tag Override Produces Unexpected Drift
// ============================================================================

#[test]
fn scenario_2_tag_override_produces_unexpected_drift() {
    let store = FakeStore::new(vec![crea01()]);
    store.put_plugin(vault_plugin()).expect("register plugin");
    store
        .put_rule(NewConfigRule {
            scope: Scope::Tag(TagId::new("creative")),
            target: vault_config_target("economy.enabled"),
            value: json!(false),
            value_type: ValueType::Bool,
            security_sensitive: false,
        })
        .expect("set tag rule");
    store.tag(&crea01().id, TagId::new("creative"));

    let agent = Arc::new(FakeAgent::new());
    agent.seed(&crea01().id, "plugins/Vault/config.yml", yaml_bytes(&[("economy.enabled", json!(true))]));
    let (controller, _agents) = controller_with(store, vec![(host(), agent)]);

    let items = controller.scan_drift(&crea01().id).expect("scan drift");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].classification, DriftClassification::UnexpectedDrift);
    assert_eq!(items[0].expected, Some(json!(false)));
    assert_eq!(items[0].actual, Some(json!(true)));
}

// ============================================================================
// SECTION: Scenario 3 - Deployment and Restart Completes
// ============================================================================

#[test]
fn scenario_3_deployment_completes_and_clears_needs_restart() {
    let store = FakeStore::new(vec![crea01()]);
    store
        .put_rule(NewConfigRule {
            scope: Scope::Tag(TagId::new("creative")),
            target: vault_config_target("economy.enabled"),
            value: json!(false),
            value_type: ValueType::Bool,
            security_sensitive: false,
        })
        .expect("set tag rule");
    store.tag(&crea01().id, TagId::new("creative"));

    let agent = Arc::new(FakeAgent::new());
    agent.seed(&crea01().id, "plugins/Vault/config.yml", yaml_bytes(&[("economy.enabled", json!(true))]));
    let (controller, agents) = controller_with(store, vec![(host(), Arc::clone(&agent))]);

    let plan = controller
        .plan_deployment(vec![ChangeRequest { instance: crea01().id, target: vault_config_target("economy.enabled") }])
        .expect("plan deployment");
    let executed = controller.execute_deployment(plan.id).expect("execute deployment");

    assert_eq!(executed.state, DeploymentState::Completed);
    let tree = parse(&agent.bytes(&crea01().id, "plugins/Vault/config.yml"), Format::Yaml, "config.yml").expect("parse written file");
    assert_eq!(tree.descend("economy.enabled").expect("descend"), Some(&json!(false)));
    assert_eq!(*agents.get(&host()).expect("agent present").restarts.lock().expect("lock restarts"), vec![crea01().id]);
}

// ============================================================================
// SECTION: Scenario 4 - Rollback on Verify Failure
// ============================================================================

#[test]
fn scenario_4_rolls_back_when_verify_read_back_disagrees() {
    let store = FakeStore::new(vec![crea01()]);
    store
        .put_rule(NewConfigRule {
            scope: Scope::Tag(TagId::new("creative")),
            target: vault_config_target("economy.enabled"),
            value: json!(false),
            value_type: ValueType::Bool,
            security_sensitive: false,
        })
        .expect("set tag rule");
    store.tag(&crea01().id, TagId::new("creative"));

    let agent = Arc::new(FakeAgent::new());
    let file = "plugins/Vault/config.yml";
    let prior_bytes = yaml_bytes(&[("economy.enabled", json!(true))]);
    agent.seed(&crea01().id, file, prior_bytes.clone());
    // First read_config call is the orchestrator's pre-write read of current
    // bytes; the second is its verify read-back. Lying starting at the 2nd
    // call simulates a verify read that disagrees with what was truly
    // written (§8 scenario 4), without touching the pre-write read.
    agent.lie_on_verify(&crea01().id, file, 2, prior_bytes);
    let (controller, agents) = controller_with(store, vec![(host(), Arc::clone(&agent))]);

    let plan = controller
        .plan_deployment(vec![ChangeRequest { instance: crea01().id, target: vault_config_target("economy.enabled") }])
        .expect("plan deployment");
    let executed = controller.execute_deployment(plan.id).expect("execute deployment");

    assert_eq!(executed.state, DeploymentState::RolledBack);
    let agent = agents.get(&host()).expect("agent present");
    assert_eq!(*agent.rollbacks.lock().expect("lock rollbacks"), vec![plan.id]);
    let status = agent.status().expect("status");
    assert!(!status.needs_restart.contains(&crea01().id), "rollback must clear needs_restart, not set it");
}

// ============================================================================
// SECTION: Scenario 5 - Malformed YAML Shape Mismatch
// ============================================================================

#[test]
fn scenario_5_malformed_yaml_produces_shape_mismatch_and_scan_continues() {
    let store = FakeStore::new(vec![smp101()]);
    store.put_plugin(elitemobs_plugin()).expect("register plugin");
    for key in ["a", "b", "c"] {
        store
            .put_rule(NewConfigRule {
                scope: Scope::Global,
                target: elitemobs_config_target(key),
                value: json!("x"),
                value_type: ValueType::String,
                security_sensitive: false,
            })
            .expect("set rule");
    }
    store
        .put_rule(NewConfigRule {
            scope: Scope::Global,
            target: ConfigTarget { config_type: ConfigType::Standard, plugin: None, file: "server.properties".to_string(), key: "motd".to_string() },
            value: json!("hi"),
            value_type: ValueType::String,
            security_sensitive: false,
        })
        .expect("set rule");

    let agent = Arc::new(FakeAgent::new());
    // Top-level list, not a map: every dotted-key descend on this file fails
    // shape checks (§8 scenario 5).
    agent.seed(&smp101().id, "plugins/EliteMobs/config.yml", b"- one\n- two\n".to_vec());
    agent.seed(&smp101().id, "server.properties", b"motd=hi\n".to_vec());
    let (controller, _agents) = controller_with(store, vec![(host(), agent)]);

    let items = controller.scan_drift(&smp101().id).expect("scan drift");
    let elitemobs_items: Vec<_> = items.iter().filter(|item| item.file == "plugins/EliteMobs/config.yml").collect();
    assert_eq!(elitemobs_items.len(), 3);
    assert!(elitemobs_items.iter().all(|item| item.classification == DriftClassification::UnexpectedDrift));
    assert!(elitemobs_items.iter().all(|item| item.reason.as_deref() == Some("shape_mismatch")));

    let other_items: Vec<_> = items.iter().filter(|item| item.file == "server.properties").collect();
    assert_eq!(other_items.len(), 1);
    assert_eq!(other_items[0].classification, DriftClassification::None);
}

// ============================================================================
// SECTION: Scenario 6 - Platform Isolation
// ============================================================================

#[test]
fn scenario_6_platform_mismatch_is_inert_for_resolve_and_rejected_for_planning() {
    let store = FakeStore::new(vec![smp101()]);
    let velocity_plugin = PluginId::new("VelocityMotd");
    store
        .put_plugin(Plugin { id: velocity_plugin.clone(), platform: Platform::Velocity, version_source: "test".to_string(), config_files: vec!["config.yml".to_string()], parent: None })
        .expect("register plugin");
    let target = ConfigTarget { config_type: ConfigType::Plugin, plugin: Some(velocity_plugin.clone()), file: "config.yml".to_string(), key: "motd".to_string() };
    store
        .put_rule(NewConfigRule { scope: Scope::Global, target: target.clone(), value: json!("hi"), value_type: ValueType::String, security_sensitive: false })
        .expect("set velocity rule");

    let (controller, _agents) = controller_with(store, vec![(host(), Arc::new(FakeAgent::new()))]);

    let resolved = controller.resolve(&fleetgate_core::ResolveQuery { instance: smp101().id, target: target.clone() }).expect("resolve");
    assert_eq!(resolved, None);

    let plan_result = controller.plan_deployment(vec![ChangeRequest { instance: smp101().id, target }]);
    assert!(plan_result.is_err());
    let message = plan_result.expect_err("expected platform mismatch").to_string();
    assert!(message.contains("platform mismatch"), "unexpected error message: {message}");
}
