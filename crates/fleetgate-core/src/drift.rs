// crates/fleetgate-core/src/drift.rs
// ============================================================================
// Module: Fleetgate Drift Detection Engine
// Description: Compares observed config documents against resolved expectations.
// Purpose: Produce immutable DriftItem records per instance scan.
// Dependencies: crate::resolver, crate::equality, fleetgate-codec
// ============================================================================

//! ## Overview
//! For each instance, the Drift Engine walks every expected config file,
//! resolves the expected value for each key the Rule Store declares against
//! that file, and compares it to what was actually observed (§4.4). A
//! malformed file or an unresolvable key is recorded as a drift item and the
//! scan moves on — a single bad file never aborts the whole pass.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;

use fleetgate_codec::DocumentTree;
use serde_json::Value;

use crate::equality::values_equal;
use crate::identifiers::InstanceId;
use crate::identifiers::PluginId;
use crate::interfaces::ResolutionError;
use crate::interfaces::RuleSnapshot;
use crate::model::ConfigRule;
use crate::model::ConfigTarget;
use crate::model::ConfigType;
use crate::model::DriftClassification;
use crate::model::DriftItem;
use crate::model::Scope;
use crate::model::Severity;
use crate::resolver;
use crate::resolver::ResolveQuery;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Scan Input
// ============================================================================

/// One file the scan expects to exist for an instance, independent of
/// whether any rule currently targets a key within it (§4.4: the union of
/// rule targets and declared baseline files).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFile {
    /// Kind of target this file holds.
    pub config_type: ConfigType,
    /// Owning plugin, `None` for `Standard` files.
    pub plugin: Option<PluginId>,
    /// Config file relative path.
    pub file: String,
}

/// Runs a drift scan for one instance against observed documents.
///
/// `observed` maps each expected file's relative path to its successfully
/// parsed tree; a file absent from this map (whether never read or
/// unparsable) is treated as missing (§4.4).
///
/// # Errors
///
/// This function does not fail on a per-file or per-key basis — malformed
/// input surfaces as a `DriftItem`, never as a `Result::Err` — so it has no
/// error return; callers that need scan-level failure (e.g. the instance
/// itself is unknown) should check that before calling.
#[must_use]
pub fn scan_instance(
    instance: &InstanceId,
    expected_files: &[ExpectedFile],
    observed: &HashMap<String, DocumentTree>,
    snapshot: &dyn RuleSnapshot,
    now: Timestamp,
) -> Vec<DriftItem> {
    let Some(instance_record) = snapshot.instance(instance) else {
        return Vec::new();
    };
    let groups = snapshot.groups_for_instance(instance);
    let tags = snapshot.tags_for_instance(instance);

    let mut items = Vec::new();
    for expected in expected_files {
        let Some(tree) = observed.get(&expected.file) else {
            items.push(missing_file_item(instance, expected, now));
            continue;
        };

        let keys = expected_keys_for_file(expected, instance, &instance_record.host, &groups, &tags, snapshot);
        let mut seen_observed_prefixes = BTreeSet::new();
        for key in &keys {
            items.push(scan_key(instance, expected, key, tree, snapshot, now));
            seen_observed_prefixes.insert(key.clone());
        }

        for observed_key in tree.leaf_keys() {
            if !seen_observed_prefixes.contains(&observed_key) {
                items.push(extra_item(instance, expected, &observed_key, tree, now));
            }
        }
    }
    items
}

// ============================================================================
// SECTION: Per-File Helpers
// ============================================================================

fn missing_file_item(instance: &InstanceId, expected: &ExpectedFile, now: Timestamp) -> DriftItem {
    DriftItem {
        instance: instance.clone(),
        config_type: expected.config_type,
        plugin: expected.plugin.clone(),
        file: expected.file.clone(),
        key: String::new(),
        expected: None,
        actual: None,
        classification: DriftClassification::Missing,
        severity: Severity::Warning,
        detected_at: now,
        reason: Some("file_missing".to_string()),
    }
}

fn extra_item(instance: &InstanceId, expected: &ExpectedFile, key: &str, tree: &DocumentTree, now: Timestamp) -> DriftItem {
    let actual = tree.descend(key).ok().flatten().cloned();
    DriftItem {
        instance: instance.clone(),
        config_type: expected.config_type,
        plugin: expected.plugin.clone(),
        file: expected.file.clone(),
        key: key.to_string(),
        expected: None,
        actual,
        classification: DriftClassification::Extra,
        severity: Severity::Info,
        detected_at: now,
        reason: None,
    }
}

/// Returns the distinct keys any active rule targets at `expected`'s file,
/// across every scope that applies to `instance` (§4.4: "every rule target at
/// file F that resolves for this instance").
fn expected_keys_for_file(
    expected: &ExpectedFile,
    instance: &InstanceId,
    host: &crate::identifiers::HostId,
    groups: &[crate::identifiers::GroupId],
    tags: &[crate::identifiers::TagId],
    snapshot: &dyn RuleSnapshot,
) -> Vec<String> {
    let mut scopes = vec![Scope::Global, Scope::Server(host.clone()), Scope::Instance(instance.clone())];
    scopes.extend(groups.iter().cloned().map(Scope::Group));
    scopes.extend(tags.iter().cloned().map(Scope::Tag));

    let mut keys = BTreeSet::new();
    for scope in scopes {
        for rule in snapshot.rules_for_scope(&scope) {
            if rule.target.config_type == expected.config_type
                && rule.target.plugin == expected.plugin
                && rule.target.file == expected.file
            {
                keys.insert(rule.target.key.clone());
            }
        }
    }
    keys.into_iter().collect()
}

// ============================================================================
// SECTION: Per-Key Comparison
// ============================================================================

fn scan_key(
    instance: &InstanceId,
    expected: &ExpectedFile,
    key: &str,
    tree: &DocumentTree,
    snapshot: &dyn RuleSnapshot,
    now: Timestamp,
) -> DriftItem {
    let target = ConfigTarget {
        config_type: expected.config_type,
        plugin: expected.plugin.clone(),
        file: expected.file.clone(),
        key: key.to_string(),
    };
    let query = ResolveQuery { instance: instance.clone(), target: target.clone() };

    let resolved = match resolver::resolve(&query, snapshot) {
        Ok(resolved) => resolved,
        Err(error) => return resolution_error_item(instance, expected, key, &error, now),
    };

    let Some(resolved) = resolved else {
        // No active rule targets this key even though it was enumerated as
        // expected (a rule was deactivated between enumeration and resolve);
        // nothing to compare against.
        return extra_item(instance, expected, key, tree, now);
    };

    match tree.descend(key) {
        Err(mismatch) => shape_mismatch_item(instance, expected, key, &resolved.value, resolved.security_sensitive, &mismatch, now),
        Ok(None) => key_missing_item(instance, expected, key, &resolved.value, resolved.security_sensitive, now),
        Ok(Some(actual)) => {
            if values_equal(actual, &resolved.value) {
                none_item(instance, expected, key, &resolved.value, actual, now)
            } else {
                let instance_record = snapshot_instance(instance, snapshot);
                let candidates = resolver::collect_candidates(&query, &instance_record, snapshot);
                classify_mismatch(instance, expected, key, &resolved.value, actual, &candidates, &instance_record, snapshot, now)
            }
        }
    }
}

fn snapshot_instance(instance: &InstanceId, snapshot: &dyn RuleSnapshot) -> crate::model::Instance {
    // `resolve` has already validated the instance exists by the time a key
    // is being scanned, so this lookup is infallible in practice; fall back
    // to a placeholder rather than panicking if the registry changed mid-scan.
    snapshot.instance(instance).unwrap_or_else(|| crate::model::Instance {
        id: instance.clone(),
        name: String::new(),
        host: crate::identifiers::HostId::new(""),
        platform: crate::model::Platform::Paper,
        port: 0,
        active: false,
        last_seen: None,
    })
}

#[allow(clippy::too_many_arguments, reason = "drift classification needs the full comparison context")]
fn classify_mismatch(
    instance: &InstanceId,
    expected: &ExpectedFile,
    key: &str,
    expected_value: &Value,
    actual: &Value,
    candidates: &[ConfigRule],
    instance_record: &crate::model::Instance,
    snapshot: &dyn RuleSnapshot,
    now: Timestamp,
) -> DriftItem {
    let has_broad_rule = candidates.iter().any(|rule| matches!(rule.scope, Scope::Global | Scope::Server(_)));
    let has_deviating_narrow_rule = candidates.iter().any(|rule| {
        matches!(rule.scope, Scope::Instance(_) | Scope::Group(_) | Scope::Tag(_))
            && resolver::substitute_variables(&rule.value, instance, &instance_record.host, snapshot)
                .is_ok_and(|substituted| values_equal(actual, &substituted))
    });

    let security_sensitive = candidates.iter().any(|rule| rule.security_sensitive);
    let (classification, severity, reason) = if has_broad_rule && has_deviating_narrow_rule {
        (DriftClassification::DocumentedVariance, Severity::Info, Some("documented_variance".to_string()))
    } else if security_sensitive {
        (DriftClassification::UnexpectedDrift, Severity::Error, None)
    } else {
        (DriftClassification::UnexpectedDrift, Severity::Warning, None)
    };

    DriftItem {
        instance: instance.clone(),
        config_type: expected.config_type,
        plugin: expected.plugin.clone(),
        file: expected.file.clone(),
        key: key.to_string(),
        expected: Some(expected_value.clone()),
        actual: Some(actual.clone()),
        classification,
        severity,
        detected_at: now,
        reason,
    }
}

fn none_item(instance: &InstanceId, expected: &ExpectedFile, key: &str, expected_value: &Value, actual: &Value, now: Timestamp) -> DriftItem {
    DriftItem {
        instance: instance.clone(),
        config_type: expected.config_type,
        plugin: expected.plugin.clone(),
        file: expected.file.clone(),
        key: key.to_string(),
        expected: Some(expected_value.clone()),
        actual: Some(actual.clone()),
        classification: DriftClassification::None,
        severity: Severity::Info,
        detected_at: now,
        reason: None,
    }
}

fn shape_mismatch_item(
    instance: &InstanceId,
    expected: &ExpectedFile,
    key: &str,
    expected_value: &Value,
    security_sensitive: bool,
    _mismatch: &fleetgate_codec::ShapeMismatch,
    now: Timestamp,
) -> DriftItem {
    DriftItem {
        instance: instance.clone(),
        config_type: expected.config_type,
        plugin: expected.plugin.clone(),
        file: expected.file.clone(),
        key: key.to_string(),
        expected: Some(expected_value.clone()),
        actual: None,
        classification: DriftClassification::UnexpectedDrift,
        severity: if security_sensitive { Severity::Error } else { Severity::Warning },
        detected_at: now,
        reason: Some("shape_mismatch".to_string()),
    }
}

fn key_missing_item(
    instance: &InstanceId,
    expected: &ExpectedFile,
    key: &str,
    expected_value: &Value,
    security_sensitive: bool,
    now: Timestamp,
) -> DriftItem {
    DriftItem {
        instance: instance.clone(),
        config_type: expected.config_type,
        plugin: expected.plugin.clone(),
        file: expected.file.clone(),
        key: key.to_string(),
        expected: Some(expected_value.clone()),
        actual: None,
        classification: DriftClassification::UnexpectedDrift,
        severity: if security_sensitive { Severity::Error } else { Severity::Warning },
        detected_at: now,
        reason: Some("key_missing".to_string()),
    }
}

fn resolution_error_item(
    instance: &InstanceId,
    expected: &ExpectedFile,
    key: &str,
    error: &ResolutionError,
    now: Timestamp,
) -> DriftItem {
    let reason = match error {
        ResolutionError::UndefinedVariable(_) => "undefined_variable",
        ResolutionError::TypeMismatch { .. } => "type_mismatch",
        ResolutionError::AmbiguousRule { .. } => "ambiguous_rule",
    };
    DriftItem {
        instance: instance.clone(),
        config_type: expected.config_type,
        plugin: expected.plugin.clone(),
        file: expected.file.clone(),
        key: key.to_string(),
        expected: Some(Value::String(error.to_string())),
        actual: None,
        classification: DriftClassification::UnexpectedDrift,
        severity: Severity::Warning,
        detected_at: now,
        reason: Some(reason.to_string()),
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

    use super::*;
    use crate::identifiers::GroupId;
    use crate::identifiers::HostId;
    use crate::identifiers::RuleId;
    use crate::identifiers::TagId;
    use crate::identifiers::VariableName;
    use crate::model::ConfigVariable;
    use crate::model::Instance;
    use crate::model::Platform;
    use crate::model::Plugin;
    use crate::model::ValueType;
    use crate::model::VariableScope;
    use serde_json::json;

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
    fn missing_file_emits_file_level_item() {
        let snapshot = FakeSnapshot { instances: HashMap::from([(InstanceId::new("SMP101"), smp101())]), rules: Vec::new() };
        let expected = vec![ExpectedFile { config_type: ConfigType::Standard, plugin: None, file: "server.properties".to_string() }];
        let items = scan_instance(&InstanceId::new("SMP101"), &expected, &HashMap::new(), &snapshot, ts());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].classification, DriftClassification::Missing);
    }

    #[test]
    fn matching_value_classifies_as_none() {
        let target = ConfigTarget {
            config_type: ConfigType::Standard,
            plugin: None,
            file: "server.properties".to_string(),
            key: "max-players".to_string(),
        };
        let snapshot = FakeSnapshot {
            instances: HashMap::from([(InstanceId::new("SMP101"), smp101())]),
            rules: vec![ConfigRule {
                id: RuleId::from_raw(1).expect("nonzero"),
                scope: Scope::Global,
                target: target.clone(),
                value: json!(20),
                value_type: ValueType::Int,
                active: true,
                updated_at: ts(),
                security_sensitive: false,
            }],
        };
        let expected = vec![ExpectedFile { config_type: ConfigType::Standard, plugin: None, file: "server.properties".to_string() }];
        let observed = HashMap::from([("server.properties".to_string(), DocumentTree::new(json!({"max-players": 20.0})))]);
        let items = scan_instance(&InstanceId::new("SMP101"), &expected, &observed, &snapshot, ts());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].classification, DriftClassification::None);
    }

    #[test]
    fn mismatched_value_classifies_as_unexpected_drift() {
        let target = ConfigTarget {
            config_type: ConfigType::Standard,
            plugin: None,
            file: "server.properties".to_string(),
            key: "max-players".to_string(),
        };
        let snapshot = FakeSnapshot {
            instances: HashMap::from([(InstanceId::new("SMP101"), smp101())]),
            rules: vec![ConfigRule {
                id: RuleId::from_raw(1).expect("nonzero"),
                scope: Scope::Global,
                target: target.clone(),
                value: json!(20),
                value_type: ValueType::Int,
                active: true,
                updated_at: ts(),
                security_sensitive: true,
            }],
        };
        let expected = vec![ExpectedFile { config_type: ConfigType::Standard, plugin: None, file: "server.properties".to_string() }];
        let observed = HashMap::from([("server.properties".to_string(), DocumentTree::new(json!({"max-players": 40})))]);
        let items = scan_instance(&InstanceId::new("SMP101"), &expected, &observed, &snapshot, ts());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].classification, DriftClassification::UnexpectedDrift);
        assert_eq!(items[0].severity, Severity::Error);
    }

    #[test]
    fn shape_mismatch_does_not_abort_remaining_keys() {
        let target_a = ConfigTarget { config_type: ConfigType::Standard, plugin: None, file: "config.yml".to_string(), key: "a".to_string() };
        let target_b = ConfigTarget { config_type: ConfigType::Standard, plugin: None, file: "config.yml".to_string(), key: "a.nested".to_string() };
        let snapshot = FakeSnapshot {
            instances: HashMap::from([(InstanceId::new("SMP101"), smp101())]),
            rules: vec![
                ConfigRule {
                    id: RuleId::from_raw(1).expect("nonzero"),
                    scope: Scope::Global,
                    target: target_a,
                    value: json!("x"),
                    value_type: ValueType::String,
                    active: true,
                    updated_at: ts(),
                    security_sensitive: false,
                },
                ConfigRule {
                    id: RuleId::from_raw(2).expect("nonzero"),
                    scope: Scope::Global,
                    target: target_b,
                    value: json!("y"),
                    value_type: ValueType::String,
                    active: true,
                    updated_at: ts(),
                    security_sensitive: false,
                },
            ],
        };
        let expected = vec![ExpectedFile { config_type: ConfigType::Standard, plugin: None, file: "config.yml".to_string() }];
        let observed = HashMap::from([("config.yml".to_string(), DocumentTree::new(json!({"a": "not-a-map"})))]);
        let items = scan_instance(&InstanceId::new("SMP101"), &expected, &observed, &snapshot, ts());
        assert_eq!(items.len(), 2);
        assert!(items.iter().any(|item| item.reason.as_deref() == Some("shape_mismatch")));
    }
}
