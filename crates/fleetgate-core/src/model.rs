// crates/fleetgate-core/src/model.rs
// ============================================================================
// Module: Fleetgate Data Model
// Description: Canonical policy, registry, and drift schema.
// Purpose: Provide stable, serializable types shared by the Resolver, Drift
//          Engine, Rule Store, Agent, and Controller.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Fleetgate's data model defines the policy entities (rules, variables,
//! scopes), the registry entities (instances, hosts, groups, tags, plugins),
//! and the drift/backup records produced by scans and deployments. These
//! types are the canonical source of truth for the Rule Store schema, the
//! Agent/Controller RPC wire formats, and the CLI's JSON output.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::hashing::HashDigest;
use crate::identifiers::GroupId;
use crate::identifiers::HostId;
use crate::identifiers::InstanceId;
use crate::identifiers::PluginId;
use crate::identifiers::RuleId;
use crate::identifiers::TagId;
use crate::identifiers::VariableName;
use crate::identifiers::DeploymentId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Registry Entities
// ============================================================================

/// Disjoint server platforms. A rule targeting a plugin on a platform other
/// than the instance's platform is inert (§4.8) rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Spigot/Paper-derived server platform.
    Paper,
    /// Velocity proxy platform.
    Velocity,
    /// Geyser bedrock-bridge platform.
    Geyser,
}

/// A single managed game-server process with its own config tree.
///
/// # Invariants
/// - `id` is unique within the registry and never destroyed implicitly; see
///   [`Instance::active`] for the soft-deactivation lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Short operator-facing identifier (e.g. `DEV01`).
    pub id: InstanceId,
    /// Friendly display name.
    pub name: String,
    /// Physical host this instance runs on.
    pub host: HostId,
    /// Server platform.
    pub platform: Platform,
    /// Network port the instance listens on.
    pub port: u16,
    /// Whether discovery currently observes this instance.
    pub active: bool,
    /// Timestamp of the most recent discovery observation, if any.
    pub last_seen: Option<Timestamp>,
}

/// The physical machine running one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    /// Logical host identifier.
    pub id: HostId,
    /// Agent-local RPC endpoint (e.g. `http://127.0.0.1:9090`).
    pub agent_endpoint: String,
    /// Opaque process-control command string, loaded from settings.
    pub process_control_command: String,
}

/// Classification of an [`InstanceGroup`]'s membership source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    /// Membership derived from host binding.
    Physical,
    /// Membership derived from gameplay classification.
    Logical,
    /// Membership derived from prod/dev environment classification.
    Administrative,
}

/// A named set of instances.
///
/// # Invariants
/// - Group-of-groups is not supported; membership is instance-to-group only
///   (§9, cyclic references between instance and group are disallowed by
///   construction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceGroup {
    /// Group identifier.
    pub id: GroupId,
    /// Display name.
    pub name: String,
    /// Membership source classification.
    pub group_type: GroupType,
}

/// A keyed classification assigned to instances many-to-many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag identifier, unique within `category`.
    pub id: TagId,
    /// Category the tag is grouped under (e.g. `gamemode`).
    pub category: String,
}

/// A plugin's catalog entry.
///
/// # Invariants
/// - When `parent` is `Some`, this plugin's config files fold into the
///   parent's for resolution and drift purposes (§4.8 addon-to-parent
///   folding).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    /// Canonical plugin name.
    pub id: PluginId,
    /// Platform this plugin runs on.
    pub platform: Platform,
    /// Version-source metadata (update-channel identifier, external to this
    /// crate's responsibilities; stored opaquely).
    pub version_source: String,
    /// Relative paths of config files this plugin owns.
    pub config_files: Vec<String>,
    /// Parent plugin, if this plugin is declared as an addon.
    pub parent: Option<PluginId>,
}

// ============================================================================
// SECTION: Policy Entities
// ============================================================================

/// The kind of config target a rule addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    /// A plugin-owned config file.
    Plugin,
    /// A platform-level config file (`plugin = NULL`).
    Standard,
    /// A datapack requirement, not a config-file leaf.
    Datapack,
}

/// The declared type of a config key's leaf value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// UTF-8 string scalar.
    String,
    /// Signed integer scalar.
    Int,
    /// Floating-point scalar.
    Float,
    /// Boolean scalar.
    Bool,
    /// Ordered sequence.
    List,
    /// Keyed map.
    Map,
    /// Datapack requirement: must be present.
    Required,
    /// Datapack requirement: absence is tolerated.
    Optional,
}

/// `(config_type, plugin?, file, key)` — identifies what a rule or drift item
/// is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigTarget {
    /// Kind of target.
    pub config_type: ConfigType,
    /// Owning plugin, `None` for `Standard` targets.
    pub plugin: Option<PluginId>,
    /// Config file relative path.
    pub file: String,
    /// Dotted key path into the file.
    pub key: String,
}

/// The scope a rule or variable applies at, carrying the scoped entity's
/// selector where applicable.
///
/// # Invariants
/// - Priority is strictly determined by variant, per [`Scope::priority`];
///   `PLAYER_OVERRIDE` and `REGION`/`WORLD` scopes are intentionally absent
///   from this enum (§9 open-question resolution: out of the core).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "selector", rename_all = "snake_case")]
pub enum Scope {
    /// Applies to every instance.
    Global,
    /// Applies to every instance on one host.
    Server(HostId),
    /// Applies to every instance in one group.
    Group(GroupId),
    /// Applies to every instance carrying one tag.
    Tag(TagId),
    /// Applies to exactly one instance.
    Instance(InstanceId),
}

impl Scope {
    /// Returns the priority number for this scope; lower wins (§3).
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Instance(_) => 1,
            Self::Group(_) => 2,
            Self::Tag(_) => 3,
            Self::Server(_) => 4,
            Self::Global => 5,
        }
    }

    /// Returns a stable specificity rank used to break priority ties
    /// (`most-specific selector` in §3); higher is more specific.
    #[must_use]
    pub const fn specificity(&self) -> u8 {
        // Inverse of priority: instance scope is both highest priority and
        // most specific, so the two rankings coincide for this closed enum.
        5 - self.priority()
    }
}

/// The central policy entity: a scoped declaration of an expected value for
/// a config target.
///
/// # Invariants
/// - `value` must parse successfully into `value_type` (enforced by the Rule
///   Store on insert, not by this type itself).
/// - `active = false` marks a deactivated rule; deactivation never deletes
///   the row (audit trail).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRule {
    /// Rule identifier, assigned by the Rule Store.
    pub id: RuleId,
    /// Scope this rule applies at.
    pub scope: Scope,
    /// What this rule targets.
    pub target: ConfigTarget,
    /// Literal value, pre variable-substitution. Scalar values are JSON
    /// strings/numbers/bools; list/map values substitute element-wise.
    pub value: Value,
    /// Declared type the literal must coerce into.
    pub value_type: ValueType,
    /// Whether this rule currently participates in resolution.
    pub active: bool,
    /// When this rule was last inserted or edited.
    pub updated_at: Timestamp,
    /// Drift on this key is elevated to `error` severity rather than `warning`.
    pub security_sensitive: bool,
}

/// A named indirection resolvable at scope `{GLOBAL, SERVER, INSTANCE}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableScope {
    /// Resolves for every instance.
    Global,
    /// Resolves for every instance on one host.
    Server(HostId),
    /// Resolves for exactly one instance.
    Instance(InstanceId),
}

/// A config variable binding, substituted into rule values at `{{NAME}}`
/// sites (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigVariable {
    /// Scope this binding applies at.
    pub scope: VariableScope,
    /// Variable name, without `{{` `}}` delimiters.
    pub name: VariableName,
    /// Literal replacement text.
    pub value: String,
}

// ============================================================================
// SECTION: Drift Entities
// ============================================================================

/// Classification of an observed value relative to its resolved expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftClassification {
    /// Observed value equals the resolved expected value.
    None,
    /// Deviation is sanctioned by a narrower-scope rule.
    DocumentedVariance,
    /// Deviation is not sanctioned by any rule.
    UnexpectedDrift,
    /// An expected file or key is absent from the observed configuration.
    Missing,
    /// An observed key has no corresponding expectation.
    Extra,
}

/// Severity assigned to a drift item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; no operator action implied.
    Info,
    /// Deviation worth operator attention.
    Warning,
    /// Deviation requiring prompt operator attention (security-sensitive
    /// keys, or missing required datapacks).
    Error,
}

/// A single observed-vs-expected comparison result produced by a scan.
///
/// # Invariants
/// - `expected` is `Some` iff `classification != Extra` (§3).
/// - Immutable once emitted; a later scan produces a new item, never an edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftItem {
    /// Instance this item was observed on.
    pub instance: InstanceId,
    /// Kind of target.
    pub config_type: ConfigType,
    /// Owning plugin, if any.
    pub plugin: Option<PluginId>,
    /// Config file relative path.
    pub file: String,
    /// Dotted key path, or empty for file-level `MISSING` items.
    pub key: String,
    /// Resolved expected value, absent only for `EXTRA` items.
    pub expected: Option<Value>,
    /// Observed value, absent for `MISSING` items.
    pub actual: Option<Value>,
    /// Classification of this comparison.
    pub classification: DriftClassification,
    /// Severity of this item.
    pub severity: Severity,
    /// When this item was produced.
    pub detected_at: Timestamp,
    /// Short machine-readable reason (e.g. `shape_mismatch`), when relevant.
    pub reason: Option<String>,
}

// ============================================================================
// SECTION: Backup & Deployment Entities
// ============================================================================

/// Per-file prior-state record captured before a deployment writes to it.
///
/// # Invariants
/// - Append-only within a deployment; never mutated after capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifestEntry {
    /// Deployment that captured this entry.
    pub deployment_id: DeploymentId,
    /// Instance the file belongs to.
    pub instance: InstanceId,
    /// Config file relative path.
    pub path: String,
    /// File bytes prior to the deployment's write.
    pub prior_bytes: Vec<u8>,
    /// Digest of `prior_bytes`, for integrity verification on rollback.
    pub prior_digest: HashDigest,
}
