// crates/fleetgate-core/src/interfaces.rs
// ============================================================================
// Module: Fleetgate Interfaces
// Description: Backend-agnostic interfaces for rule persistence and agent RPC.
// Purpose: Define the contract surfaces the Resolver, Drift Engine, and
//          Controller integrate through, without embedding a storage or
//          transport backend.
// Dependencies: crate::model, crate::identifiers
// ============================================================================

//! ## Overview
//! Interfaces define how the Resolver and Drift Engine read policy state
//! (`RuleStore` / `RuleSnapshot`) and how the Controller reaches agents
//! (`AgentClient`), without embedding SQLite or HTTP details into
//! `fleetgate-core`. Implementations must fail closed: a snapshot that
//! cannot be produced, or an agent call that cannot be completed, is an
//! error, never a silent empty result.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::hashing::HashDigest;
use crate::identifiers::DeploymentId;
use crate::identifiers::GroupId;
use crate::identifiers::HostId;
use crate::identifiers::InstanceId;
use crate::identifiers::PluginId;
use crate::identifiers::RuleId;
use crate::identifiers::TagId;
use crate::identifiers::VariableName;
use crate::model::ConfigRule;
use crate::model::ConfigTarget;
use crate::model::ConfigVariable;
use crate::model::Instance;
use crate::model::InstanceGroup;
use crate::model::Plugin;
use crate::model::Scope;
use crate::model::Tag;
use crate::model::ValueType;
use crate::model::VariableScope;

// ============================================================================
// SECTION: Resolution Errors
// ============================================================================

/// Errors raised while resolving a query to an effective value (§4.3, §7).
///
/// # Invariants
/// - Fatal for the single resolve; a deployment plan aborts if encountered
///   during planning.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// A `{{NAME}}` placeholder had no binding at any fallback scope.
    #[error("undefined variable: {0}")]
    UndefinedVariable(VariableName),
    /// The substituted literal could not coerce into the rule's declared type.
    #[error("value does not coerce into declared type {value_type:?}: {literal}")]
    TypeMismatch {
        /// Declared type the literal failed to coerce into.
        value_type: ValueType,
        /// Literal text that failed to coerce.
        literal: String,
    },
    /// Two or more candidate rules tied on priority and specificity and
    /// `updated_at`; resolution fails hard rather than guessing (§3).
    #[error("ambiguous rule for target {target:?}")]
    AmbiguousRule {
        /// The target that could not be resolved unambiguously.
        target: ConfigTarget,
    },
}

// ============================================================================
// SECTION: Rule Snapshot
// ============================================================================

/// A point-in-time, read-stable view of the Rule Store (§4.2's `snapshot()`).
///
/// A snapshot is handed to the Resolver and Drift Engine for the duration of
/// one query or one scan, so concurrent writers never produce a half-applied
/// view mid-evaluation.
pub trait RuleSnapshot: Send + Sync {
    /// Returns every active rule whose target equals `target`, regardless of
    /// scope (the Resolver narrows this by instance membership itself).
    fn rules_for_target(&self, target: &ConfigTarget) -> Vec<ConfigRule>;

    /// Returns every active rule of any target in scope `scope`, used by the
    /// Deployment Orchestrator's planning step to check for an active rule
    /// at the requested value.
    fn rules_for_scope(&self, scope: &Scope) -> Vec<ConfigRule>;

    /// Looks up an instance by id.
    fn instance(&self, id: &InstanceId) -> Option<Instance>;

    /// Lists every instance the registry currently knows about, active or
    /// not, for the Controller's discovery merge and scheduled drift scans.
    fn instances(&self) -> Vec<Instance>;

    /// Returns the groups containing `instance`.
    fn groups_for_instance(&self, instance: &InstanceId) -> Vec<GroupId>;

    /// Returns the tags assigned to `instance`.
    fn tags_for_instance(&self, instance: &InstanceId) -> Vec<TagId>;

    /// Looks up a plugin by id, folding addon plugins are resolved by the
    /// caller via [`Plugin::parent`].
    fn plugin(&self, id: &PluginId) -> Option<Plugin>;

    /// Looks up a config variable binding at an exact scope.
    fn variable(&self, scope: &VariableScope, name: &VariableName) -> Option<ConfigVariable>;

    /// Lists the declared baseline config files for a plugin (§4.4's
    /// "declared baseline files for its deployed plugins").
    fn baseline_files(&self, plugin: &PluginId) -> Vec<String>;
}

// ============================================================================
// SECTION: Rule Store
// ============================================================================

/// Errors raised by a [`RuleStore`] implementation.
///
/// # Invariants
/// - Variants are stable for programmatic handling by the Controller.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying storage I/O failed.
    #[error("rule store io error: {0}")]
    Io(String),
    /// Stored data failed an integrity or shape check on load.
    #[error("rule store data corrupt: {0}")]
    Corrupt(String),
    /// A write would violate a structural invariant (e.g. a membership
    /// cycle, or a rule value that fails to parse as its declared type).
    #[error("rule store rejected write: {0}")]
    Invalid(String),
    /// The referenced row does not exist.
    #[error("rule store row not found: {0}")]
    NotFound(String),
}

/// A filter over [`get_rules`](RuleStore::get_rules) results.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    /// Restrict to rules targeting this plugin, when set.
    pub plugin: Option<PluginId>,
    /// Restrict to rules at this file, when set.
    pub file: Option<String>,
    /// Restrict to active rules only.
    pub active_only: bool,
}

/// A not-yet-persisted rule, submitted to [`RuleStore::put_rule`].
#[derive(Debug, Clone)]
pub struct NewConfigRule {
    /// Scope this rule applies at.
    pub scope: Scope,
    /// What this rule targets.
    pub target: ConfigTarget,
    /// Literal value, pre variable-substitution.
    pub value: serde_json::Value,
    /// Declared type the literal must coerce into.
    pub value_type: ValueType,
    /// Drift on this key is elevated to `error` severity.
    pub security_sensitive: bool,
}

/// Ordered, persistent repository of rules, variables, instances, tags,
/// groups, and their memberships (§4.2).
///
/// Concurrency: implementations must serialize writers on a single logical
/// transaction and give readers ([`snapshot`](RuleStore::snapshot)) a
/// point-in-time view.
pub trait RuleStore: Send + Sync {
    /// Inserts a new rule, returning its assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when `value` fails to parse as
    /// `value_type`.
    fn put_rule(&self, rule: NewConfigRule) -> Result<RuleId, StoreError>;

    /// Deactivates a rule. Deactivation never deletes the row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when `id` does not exist.
    fn deactivate_rule(&self, id: RuleId) -> Result<(), StoreError>;

    /// Lists rules matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on underlying storage failure.
    fn get_rules(&self, filter: &RuleFilter) -> Result<Vec<ConfigRule>, StoreError>;

    /// Sets (inserts or overwrites) a variable binding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on underlying storage failure.
    fn set_variable(&self, variable: ConfigVariable) -> Result<(), StoreError>;

    /// Lists variable bindings at an exact scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on underlying storage failure.
    fn get_variables(&self, scope: &VariableScope) -> Result<Vec<ConfigVariable>, StoreError>;

    /// Adds `instance` to `group`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] if this would create a membership
    /// cycle (§9: validated on write).
    fn add_group_member(&self, group: &GroupId, instance: &InstanceId) -> Result<(), StoreError>;

    /// Assigns `tag` to `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on underlying storage failure.
    fn add_tag_member(&self, tag: &TagId, instance: &InstanceId) -> Result<(), StoreError>;

    /// Upserts an instance's registry row (called by discovery).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on underlying storage failure.
    fn upsert_instance(&self, instance: Instance) -> Result<(), StoreError>;

    /// Marks an instance inactive without deleting its historical drift
    /// items (§3 invariant).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when `id` does not exist.
    fn deactivate_instance(&self, id: &InstanceId) -> Result<(), StoreError>;

    /// Upserts a plugin catalog entry (Registry, §4.8).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on underlying storage failure.
    fn put_plugin(&self, plugin: Plugin) -> Result<(), StoreError>;

    /// Upserts an instance group's metadata (membership is separate, via
    /// [`add_group_member`](RuleStore::add_group_member)).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on underlying storage failure.
    fn put_group(&self, group: InstanceGroup) -> Result<(), StoreError>;

    /// Upserts a tag's metadata (membership is separate, via
    /// [`add_tag_member`](RuleStore::add_tag_member)).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on underlying storage failure.
    fn put_tag(&self, tag: Tag) -> Result<(), StoreError>;

    /// Takes a point-in-time, read-stable snapshot for resolver/drift use.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the snapshot cannot be materialized.
    fn snapshot(&self) -> Result<Arc<dyn RuleSnapshot>, StoreError>;
}

// ============================================================================
// SECTION: Agent Client
// ============================================================================

/// Errors raised by an [`AgentClient`] implementation (§7).
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent could not be reached within the RPC deadline.
    #[error("agent unreachable: {0}")]
    Unreachable(String),
    /// The agent reported a local file I/O failure.
    #[error("agent io error: {0}")]
    Io(String),
    /// The requested instance or file does not exist on the agent.
    #[error("agent reported not found: {0}")]
    NotFound(String),
    /// The process-control helper invocation failed.
    #[error("agent process control failed: {0}")]
    ProcessControl(String),
}

/// Per-instance status reported by an agent's `GET /status` (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInstanceStatus {
    /// Instance identifier.
    pub id: InstanceId,
    /// Whether discovery currently observes this instance.
    pub active: bool,
}

/// The full status payload an agent reports (§4.5, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStatus {
    /// Host this agent runs on.
    pub host: HostId,
    /// Agent build/version string.
    pub version: String,
    /// Instances the agent currently observes.
    pub instances: Vec<AgentInstanceStatus>,
    /// Instances with a pending, uncommitted restart.
    pub needs_restart: Vec<InstanceId>,
}

/// Transport-neutral view of one host's agent (§4.5, §6). The current
/// implementation reaches agents over JSON-over-HTTP; tests may substitute
/// an in-process double.
pub trait AgentClient: Send + Sync {
    /// Fetches the agent's current status.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Unreachable`] if the agent does not respond
    /// within its RPC deadline.
    fn status(&self) -> Result<AgentStatus, AgentError>;

    /// Reads a config file's raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NotFound`] when the file does not exist.
    fn read_config(&self, instance: &InstanceId, file: &str) -> Result<Vec<u8>, AgentError>;

    /// Atomically replaces a config file's bytes, recording a backup
    /// manifest entry and setting the instance's `needs_restart` flag.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Io`] on write failure; no partial write occurs.
    fn write_config(
        &self,
        instance: &InstanceId,
        file: &str,
        bytes: &[u8],
        deployment_id: DeploymentId,
    ) -> Result<HashDigest, AgentError>;

    /// Restarts one instance, or every instance when `instance` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ProcessControl`] when the restart helper fails.
    fn restart(&self, instance: Option<&InstanceId>) -> Result<(), AgentError>;

    /// Restores every file touched by `deployment_id` to its pre-deployment
    /// bytes, clearing only that deployment's backup entries.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Io`] on restore failure.
    fn rollback(&self, deployment_id: DeploymentId) -> Result<(), AgentError>;
}
