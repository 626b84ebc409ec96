// crates/fleetgate-store-sqlite/src/snapshot.rs
// ============================================================================
// Module: SQLite In-Memory Snapshot
// Description: Materialized, read-stable view of the Rule Store for the
//              Resolver and Drift Engine.
// Purpose: Implement RuleSnapshot without holding a SQLite transaction open
//          for the lifetime of a query or scan.
// Dependencies: fleetgate-core
// ============================================================================

//! ## Overview
//! `RuleStore::snapshot` copies every row needed by the Resolver and Drift
//! Engine into plain Rust collections inside one transaction, then hands out
//! this struct. Reads against it never touch `SQLite` again, so a long scan
//! cannot be invalidated by a concurrent write and never blocks one either.

use std::collections::HashMap;

use fleetgate_core::ConfigRule;
use fleetgate_core::ConfigTarget;
use fleetgate_core::ConfigVariable;
use fleetgate_core::GroupId;
use fleetgate_core::Instance;
use fleetgate_core::InstanceId;
use fleetgate_core::Plugin;
use fleetgate_core::PluginId;
use fleetgate_core::RuleSnapshot;
use fleetgate_core::Scope;
use fleetgate_core::TagId;
use fleetgate_core::VariableName;
use fleetgate_core::VariableScope;

/// A fully materialized, read-stable snapshot of the Rule Store.
pub(crate) struct InMemorySnapshot {
    instances: HashMap<InstanceId, Instance>,
    group_members: HashMap<InstanceId, Vec<String>>,
    tag_members: HashMap<InstanceId, Vec<String>>,
    plugins: HashMap<PluginId, Plugin>,
    variables: Vec<ConfigVariable>,
    rules: Vec<ConfigRule>,
    baseline_files: HashMap<PluginId, Vec<String>>,
}

impl InMemorySnapshot {
    #[allow(clippy::too_many_arguments, reason = "one field per constructed collection, no natural grouping")]
    pub(crate) fn new(
        instances: HashMap<InstanceId, Instance>,
        group_members: HashMap<InstanceId, Vec<String>>,
        tag_members: HashMap<InstanceId, Vec<String>>,
        plugins: HashMap<PluginId, Plugin>,
        variables: Vec<ConfigVariable>,
        rules: Vec<ConfigRule>,
        baseline_files: HashMap<PluginId, Vec<String>>,
    ) -> Self {
        Self { instances, group_members, tag_members, plugins, variables, rules, baseline_files }
    }
}

impl RuleSnapshot for InMemorySnapshot {
    fn rules_for_target(&self, target: &ConfigTarget) -> Vec<ConfigRule> {
        self.rules.iter().filter(|rule| &rule.target == target).cloned().collect()
    }

    fn rules_for_scope(&self, scope: &Scope) -> Vec<ConfigRule> {
        self.rules.iter().filter(|rule| &rule.scope == scope).cloned().collect()
    }

    fn instance(&self, id: &InstanceId) -> Option<Instance> {
        self.instances.get(id).cloned()
    }

    fn instances(&self) -> Vec<Instance> {
        self.instances.values().cloned().collect()
    }

    fn groups_for_instance(&self, instance: &InstanceId) -> Vec<GroupId> {
        self.group_members
            .get(instance)
            .map(|ids| ids.iter().map(|id| GroupId::new(id.as_str())).collect())
            .unwrap_or_default()
    }

    fn tags_for_instance(&self, instance: &InstanceId) -> Vec<TagId> {
        self.tag_members
            .get(instance)
            .map(|ids| ids.iter().map(|id| TagId::new(id.as_str())).collect())
            .unwrap_or_default()
    }

    fn plugin(&self, id: &PluginId) -> Option<Plugin> {
        self.plugins.get(id).cloned()
    }

    fn variable(&self, scope: &VariableScope, name: &VariableName) -> Option<ConfigVariable> {
        self.variables.iter().find(|variable| &variable.scope == scope && &variable.name == name).cloned()
    }

    fn baseline_files(&self, plugin: &PluginId) -> Vec<String> {
        self.baseline_files.get(plugin).cloned().unwrap_or_default()
    }
}
