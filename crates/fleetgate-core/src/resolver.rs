// crates/fleetgate-core/src/resolver.rs
// ============================================================================
// Module: Fleetgate Policy Resolver
// Description: Pure resolution of (instance, target) queries against a rule
//              snapshot, with variable substitution and type coercion.
// Purpose: Select the single highest-priority applicable rule for a query.
// Dependencies: crate::model, crate::interfaces
// ============================================================================

//! ## Overview
//! The Resolver is a pure function of `(query, snapshot)` (§4.3): given the
//! same rule snapshot, the same query always produces the same resolved
//! value or the same error. It never mutates the snapshot and never reads
//! wall-clock time; its signature structurally rules out non-determinism.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::interfaces::ResolutionError;
use crate::interfaces::RuleSnapshot;
use crate::identifiers::InstanceId;
use crate::identifiers::PluginId;
use crate::identifiers::RuleId;
use crate::identifiers::VariableName;
use crate::model::ConfigRule;
use crate::model::ConfigTarget;
use crate::model::ConfigType;
use crate::model::Scope;
use crate::model::ValueType;
use crate::model::VariableScope;

// ============================================================================
// SECTION: Query & Result
// ============================================================================

/// A resolution query: `(instance, target)` from §4.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveQuery {
    /// Instance the query is scoped to.
    pub instance: InstanceId,
    /// Target this query asks about.
    pub target: ConfigTarget,
}

impl ResolveQuery {
    /// Builds a query for a plugin-owned config key.
    #[must_use]
    pub fn for_plugin(instance: InstanceId, plugin: PluginId, file: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            instance,
            target: ConfigTarget {
                config_type: ConfigType::Plugin,
                plugin: Some(plugin),
                file: file.into(),
                key: key.into(),
            },
        }
    }

    /// Builds a query for a platform-level (`plugin = NULL`) config key.
    #[must_use]
    pub fn for_standard(instance: InstanceId, file: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            instance,
            target: ConfigTarget {
                config_type: ConfigType::Standard,
                plugin: None,
                file: file.into(),
                key: key.into(),
            },
        }
    }
}

/// The outcome of resolving a query to an effective value.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedValue {
    /// The rule that won resolution.
    pub rule_id: RuleId,
    /// The rule's scope, carried through for drift classification.
    pub scope: Scope,
    /// Whether this key is flagged security-sensitive.
    pub security_sensitive: bool,
    /// Fully substituted, type-coerced value.
    pub value: Value,
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves `query` against `snapshot`.
///
/// Returns `Ok(None)` when no active rule applies — including the platform
/// isolation case (§4.8): a plugin-targeting rule whose plugin's platform
/// does not match the instance's platform never reaches the candidate set.
///
/// # Errors
///
/// Returns [`ResolutionError::AmbiguousRule`] when two or more candidates
/// tie on priority, specificity, and `updated_at` (§3); returns
/// [`ResolutionError::UndefinedVariable`] or
/// [`ResolutionError::TypeMismatch`] when substitution or coercion fails.
pub fn resolve(
    query: &ResolveQuery,
    snapshot: &dyn RuleSnapshot,
) -> Result<Option<ResolvedValue>, ResolutionError> {
    let Some(instance) = snapshot.instance(&query.instance) else {
        return Ok(None);
    };

    if let Some(plugin_id) = &query.target.plugin
        && let Some(plugin) = snapshot.plugin(plugin_id)
        && plugin.platform != instance.platform
    {
        return Ok(None);
    }

    let candidates = collect_candidates(query, &instance, snapshot);
    let Some(winner) = pick_winner(&candidates, &query.target)? else {
        return Ok(None);
    };

    let substituted = substitute_variables(&winner.value, &query.instance, &instance.host, snapshot)?;
    let coerced = coerce(&substituted, winner.value_type)?;

    Ok(Some(ResolvedValue {
        rule_id: winner.id,
        scope: winner.scope.clone(),
        security_sensitive: winner.security_sensitive,
        value: coerced,
    }))
}

/// Collects every active rule whose scope applies to `instance` (§4.3 step 1).
///
/// Exposed at `pub(crate)` so the Drift Engine can reuse the same candidate
/// set when deciding between `DocumentedVariance` and `UnexpectedDrift`.
pub(crate) fn collect_candidates(
    query: &ResolveQuery,
    instance: &crate::model::Instance,
    snapshot: &dyn RuleSnapshot,
) -> Vec<ConfigRule> {
    let groups = snapshot.groups_for_instance(&query.instance);
    let tags = snapshot.tags_for_instance(&query.instance);

    snapshot
        .rules_for_target(&query.target)
        .into_iter()
        .filter(|rule| scope_applies(&rule.scope, &query.instance, &instance.host, &groups, &tags))
        .collect()
}

/// Returns true when `scope` applies to the given instance/host/membership.
fn scope_applies(
    scope: &Scope,
    instance: &InstanceId,
    host: &crate::identifiers::HostId,
    groups: &[crate::identifiers::GroupId],
    tags: &[crate::identifiers::TagId],
) -> bool {
    match scope {
        Scope::Global => true,
        Scope::Server(server_host) => server_host == host,
        Scope::Group(group) => groups.contains(group),
        Scope::Tag(tag) => tags.contains(tag),
        Scope::Instance(scoped_instance) => scoped_instance == instance,
    }
}

/// Picks the single winning rule from the candidate set (§3 tie-break).
fn pick_winner<'a>(
    candidates: &'a [ConfigRule],
    target: &ConfigTarget,
) -> Result<Option<&'a ConfigRule>, ResolutionError> {
    let Some(best_priority) = candidates.iter().map(|rule| rule.scope.priority()).min() else {
        return Ok(None);
    };
    let strongest: Vec<&ConfigRule> =
        candidates.iter().filter(|rule| rule.scope.priority() == best_priority).collect();

    if strongest.len() == 1 {
        return Ok(Some(strongest[0]));
    }

    let best_specificity = strongest.iter().map(|rule| rule.scope.specificity()).max().unwrap_or(0);
    let most_specific: Vec<&ConfigRule> =
        strongest.into_iter().filter(|rule| rule.scope.specificity() == best_specificity).collect();

    if most_specific.len() == 1 {
        return Ok(Some(most_specific[0]));
    }

    let latest_updated_at = most_specific.iter().map(|rule| rule.updated_at).max();
    let Some(latest_updated_at) = latest_updated_at else {
        return Ok(None);
    };
    let newest: Vec<&ConfigRule> =
        most_specific.into_iter().filter(|rule| rule.updated_at == latest_updated_at).collect();

    match newest.as_slice() {
        [only] => Ok(Some(only)),
        _ => Err(ResolutionError::AmbiguousRule { target: target.clone() }),
    }
}

// ============================================================================
// SECTION: Variable Substitution
// ============================================================================

/// Substitutes every `{{NAME}}` placeholder in `literal`, recursing
/// element-wise into lists and maps (§4.3 step 3).
pub(crate) fn substitute_variables(
    literal: &Value,
    instance: &InstanceId,
    host: &crate::identifiers::HostId,
    snapshot: &dyn RuleSnapshot,
) -> Result<Value, ResolutionError> {
    match literal {
        Value::String(text) => substitute_in_string(text, instance, host, snapshot).map(Value::String),
        Value::Array(items) => items
            .iter()
            .map(|item| substitute_variables(item, instance, host, snapshot))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), substitute_variables(value, instance, host, snapshot)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Replaces every `{{NAME}}` occurrence in `text` with its resolved binding.
fn substitute_in_string(
    text: &str,
    instance: &InstanceId,
    host: &crate::identifiers::HostId,
    snapshot: &dyn RuleSnapshot,
) -> Result<String, ResolutionError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start..].find("}}") else {
            out.push_str(rest);
            rest = "";
            break;
        };
        out.push_str(&rest[..start]);
        let name_text = rest[start + 2..start + end].trim();
        let name = VariableName::new(name_text);
        let value = lookup_variable(&name, instance, host, snapshot)
            .ok_or_else(|| ResolutionError::UndefinedVariable(name.clone()))?;
        out.push_str(&value);
        rest = &rest[start + end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Looks up a variable binding with fallback `INSTANCE -> SERVER -> GLOBAL`.
fn lookup_variable(
    name: &VariableName,
    instance: &InstanceId,
    host: &crate::identifiers::HostId,
    snapshot: &dyn RuleSnapshot,
) -> Option<String> {
    snapshot
        .variable(&VariableScope::Instance(instance.clone()), name)
        .or_else(|| snapshot.variable(&VariableScope::Server(host.clone()), name))
        .or_else(|| snapshot.variable(&VariableScope::Global, name))
        .map(|binding| binding.value)
}

// ============================================================================
// SECTION: Type Coercion
// ============================================================================

/// Coerces a substituted literal into its declared type (§4.3 step 4).
fn coerce(value: &Value, value_type: ValueType) -> Result<Value, ResolutionError> {
    let mismatch = || ResolutionError::TypeMismatch { value_type, literal: value.to_string() };

    match value_type {
        ValueType::String => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        ValueType::Int => match value {
            Value::Number(number) if number.as_i64().is_some() || is_zero_fraction_float(number) => {
                Ok(Value::Number(number.clone()))
            }
            Value::String(text) => text.trim().parse::<i64>().map(Value::from).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ValueType::Float => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(text) => text.trim().parse::<f64>().map(Value::from).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ValueType::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(text) => match text.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        ValueType::List => match value {
            Value::Array(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        ValueType::Map => match value {
            Value::Object(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        ValueType::Required | ValueType::Optional => Ok(value.clone()),
    }
}

/// Returns true for a JSON number written as a float with a zero fraction
/// (e.g. `8080.0`), which coerces into `Int` under the §3 equality ruling.
fn is_zero_fraction_float(number: &serde_json::Number) -> bool {
    number.as_f64().is_some_and(|f| f.fract() == 0.0)
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
    use crate::identifiers::GroupId;
    use crate::identifiers::HostId;
    use crate::identifiers::TagId;
    use crate::model::ConfigVariable;
    use crate::model::Instance;
    use crate::model::Platform;
    use crate::model::Plugin;
    use crate::time::Timestamp;
    use std::collections::HashMap;

    struct FakeSnapshot {
        instances: HashMap<InstanceId, Instance>,
        rules: Vec<ConfigRule>,
        groups: HashMap<InstanceId, Vec<GroupId>>,
        tags: HashMap<InstanceId, Vec<TagId>>,
        plugins: HashMap<PluginId, Plugin>,
        variables: Vec<ConfigVariable>,
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

        fn variable(&self, scope: &VariableScope, name: &VariableName) -> Option<ConfigVariable> {
            self.variables.iter().find(|v| &v.scope == scope && &v.name == name).cloned()
        }

        fn baseline_files(&self, _plugin: &PluginId) -> Vec<String> {
            Vec::new()
        }
    }

    fn ts() -> Timestamp {
        Timestamp::parse_rfc3339("2026-08-01T00:00:00Z").expect("parse")
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
    fn universal_rule_resolves_with_no_override() {
        let target = ConfigTarget {
            config_type: ConfigType::Plugin,
            plugin: Some(PluginId::new("EliteMobs")),
            file: "config.yml".to_string(),
            key: "language".to_string(),
        };
        let snapshot = FakeSnapshot {
            instances: HashMap::from([(InstanceId::new("SMP101"), smp101())]),
            rules: vec![ConfigRule {
                id: RuleId::from_raw(1).expect("nonzero"),
                scope: Scope::Global,
                target: target.clone(),
                value: Value::String("english".to_string()),
                value_type: ValueType::String,
                active: true,
                updated_at: ts(),
                security_sensitive: false,
            }],
            groups: HashMap::new(),
            tags: HashMap::new(),
            plugins: HashMap::new(),
            variables: Vec::new(),
        };
        let query = ResolveQuery { instance: InstanceId::new("SMP101"), target };
        let resolved = resolve(&query, &snapshot).expect("resolves").expect("some");
        assert_eq!(resolved.value, Value::String("english".to_string()));
    }

    #[test]
    fn tag_scope_outranks_global_scope() {
        let target = ConfigTarget {
            config_type: ConfigType::Plugin,
            plugin: Some(PluginId::new("Vault")),
            file: "config.yml".to_string(),
            key: "economy.enabled".to_string(),
        };
        let snapshot = FakeSnapshot {
            instances: HashMap::from([(InstanceId::new("CREA01"), Instance { id: InstanceId::new("CREA01"), ..smp101() })]),
            rules: vec![
                ConfigRule {
                    id: RuleId::from_raw(1).expect("nonzero"),
                    scope: Scope::Global,
                    target: target.clone(),
                    value: Value::Bool(true),
                    value_type: ValueType::Bool,
                    active: true,
                    updated_at: ts(),
                    security_sensitive: false,
                },
                ConfigRule {
                    id: RuleId::from_raw(2).expect("nonzero"),
                    scope: Scope::Tag(TagId::new("creative")),
                    target: target.clone(),
                    value: Value::Bool(false),
                    value_type: ValueType::Bool,
                    active: true,
                    updated_at: ts(),
                    security_sensitive: false,
                },
            ],
            groups: HashMap::new(),
            tags: HashMap::from([(InstanceId::new("CREA01"), vec![TagId::new("creative")])]),
            plugins: HashMap::new(),
            variables: Vec::new(),
        };
        let query = ResolveQuery { instance: InstanceId::new("CREA01"), target };
        let resolved = resolve(&query, &snapshot).expect("resolves").expect("some");
        assert_eq!(resolved.value, Value::Bool(false));
        assert_eq!(resolved.rule_id, RuleId::from_raw(2).expect("nonzero"));
    }

    #[test]
    fn platform_mismatch_resolves_to_none() {
        let target = ConfigTarget {
            config_type: ConfigType::Plugin,
            plugin: Some(PluginId::new("VelocityOnly")),
            file: "velocity.toml".to_string(),
            key: "bind".to_string(),
        };
        let snapshot = FakeSnapshot {
            instances: HashMap::from([(InstanceId::new("SMP101"), smp101())]),
            rules: vec![ConfigRule {
                id: RuleId::from_raw(1).expect("nonzero"),
                scope: Scope::Global,
                target: target.clone(),
                value: Value::String("0.0.0.0:25577".to_string()),
                value_type: ValueType::String,
                active: true,
                updated_at: ts(),
                security_sensitive: false,
            }],
            groups: HashMap::new(),
            tags: HashMap::new(),
            plugins: HashMap::from([(
                PluginId::new("VelocityOnly"),
                Plugin {
                    id: PluginId::new("VelocityOnly"),
                    platform: Platform::Velocity,
                    version_source: String::new(),
                    config_files: vec!["velocity.toml".to_string()],
                    parent: None,
                },
            )]),
            variables: Vec::new(),
        };
        let query = ResolveQuery { instance: InstanceId::new("SMP101"), target };
        assert_eq!(resolve(&query, &snapshot).expect("resolves"), None);
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let target = ConfigTarget {
            config_type: ConfigType::Standard,
            plugin: None,
            file: "server.properties".to_string(),
            key: "motd".to_string(),
        };
        let snapshot = FakeSnapshot {
            instances: HashMap::from([(InstanceId::new("SMP101"), smp101())]),
            rules: vec![ConfigRule {
                id: RuleId::from_raw(1).expect("nonzero"),
                scope: Scope::Global,
                target: target.clone(),
                value: Value::String("{{UNBOUND}}".to_string()),
                value_type: ValueType::String,
                active: true,
                updated_at: ts(),
                security_sensitive: false,
            }],
            groups: HashMap::new(),
            tags: HashMap::new(),
            plugins: HashMap::new(),
            variables: Vec::new(),
        };
        let query = ResolveQuery { instance: InstanceId::new("SMP101"), target };
        assert!(matches!(resolve(&query, &snapshot), Err(ResolutionError::UndefinedVariable(_))));
    }

    #[test]
    fn int_type_accepts_zero_fraction_float() {
        assert_eq!(coerce(&Value::from(8080.0), ValueType::Int).expect("coerces"), Value::from(8080.0));
    }
}
