// crates/fleetgate-store-sqlite/src/convert.rs
// ============================================================================
// Module: SQLite Column Conversions
// Description: Maps Fleetgate model enums and scopes to and from SQLite columns.
// Purpose: Keep SQL text in store.rs/snapshot.rs free of ad-hoc string matching.
// Dependencies: fleetgate-core
// ============================================================================

//! ## Overview
//! `rusqlite` has no native enum binding, so every Fleetgate enum that
//! crosses into a column is given a stable lowercase text tag here. Scopes
//! and variable scopes split into a `(kind, selector)` column pair since
//! `Scope::Global` carries no selector.

use fleetgate_core::ConfigType;
use fleetgate_core::GroupId;
use fleetgate_core::GroupType;
use fleetgate_core::HostId;
use fleetgate_core::InstanceId;
use fleetgate_core::Platform;
use fleetgate_core::Scope;
use fleetgate_core::TagId;
use fleetgate_core::ValueType;
use fleetgate_core::VariableScope;

use crate::error::SqliteStoreError;

/// Splits a [`Scope`] into its `(kind, selector)` column pair.
#[must_use]
pub(crate) fn scope_to_columns(scope: &Scope) -> (&'static str, String) {
    match scope {
        Scope::Global => ("global", String::new()),
        Scope::Server(host) => ("server", host.as_str().to_string()),
        Scope::Group(group) => ("group", group.as_str().to_string()),
        Scope::Tag(tag) => ("tag", tag.as_str().to_string()),
        Scope::Instance(instance) => ("instance", instance.as_str().to_string()),
    }
}

/// Rebuilds a [`Scope`] from its `(kind, selector)` column pair.
pub(crate) fn scope_from_columns(kind: &str, selector: &str) -> Result<Scope, SqliteStoreError> {
    match kind {
        "global" => Ok(Scope::Global),
        "server" => Ok(Scope::Server(HostId::new(selector))),
        "group" => Ok(Scope::Group(GroupId::new(selector))),
        "tag" => Ok(Scope::Tag(TagId::new(selector))),
        "instance" => Ok(Scope::Instance(InstanceId::new(selector))),
        other => Err(SqliteStoreError::Corrupt(format!("unknown scope kind: {other}"))),
    }
}

/// Splits a [`VariableScope`] into its `(kind, selector)` column pair.
#[must_use]
pub(crate) fn variable_scope_to_columns(scope: &VariableScope) -> (&'static str, String) {
    match scope {
        VariableScope::Global => ("global", String::new()),
        VariableScope::Server(host) => ("server", host.as_str().to_string()),
        VariableScope::Instance(instance) => ("instance", instance.as_str().to_string()),
    }
}

/// Rebuilds a [`VariableScope`] from its `(kind, selector)` column pair.
pub(crate) fn variable_scope_from_columns(
    kind: &str,
    selector: &str,
) -> Result<VariableScope, SqliteStoreError> {
    match kind {
        "global" => Ok(VariableScope::Global),
        "server" => Ok(VariableScope::Server(HostId::new(selector))),
        "instance" => Ok(VariableScope::Instance(InstanceId::new(selector))),
        other => Err(SqliteStoreError::Corrupt(format!("unknown variable scope kind: {other}"))),
    }
}

/// Returns the column tag for a [`Platform`].
#[must_use]
pub(crate) const fn platform_to_str(platform: Platform) -> &'static str {
    match platform {
        Platform::Paper => "paper",
        Platform::Velocity => "velocity",
        Platform::Geyser => "geyser",
    }
}

/// Parses a [`Platform`] column tag.
pub(crate) fn platform_from_str(text: &str) -> Result<Platform, SqliteStoreError> {
    match text {
        "paper" => Ok(Platform::Paper),
        "velocity" => Ok(Platform::Velocity),
        "geyser" => Ok(Platform::Geyser),
        other => Err(SqliteStoreError::Corrupt(format!("unknown platform: {other}"))),
    }
}

/// Returns the column tag for a [`ValueType`].
#[must_use]
pub(crate) const fn value_type_to_str(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::String => "string",
        ValueType::Int => "int",
        ValueType::Float => "float",
        ValueType::Bool => "bool",
        ValueType::List => "list",
        ValueType::Map => "map",
        ValueType::Required => "required",
        ValueType::Optional => "optional",
    }
}

/// Parses a [`ValueType`] column tag.
pub(crate) fn value_type_from_str(text: &str) -> Result<ValueType, SqliteStoreError> {
    match text {
        "string" => Ok(ValueType::String),
        "int" => Ok(ValueType::Int),
        "float" => Ok(ValueType::Float),
        "bool" => Ok(ValueType::Bool),
        "list" => Ok(ValueType::List),
        "map" => Ok(ValueType::Map),
        "required" => Ok(ValueType::Required),
        "optional" => Ok(ValueType::Optional),
        other => Err(SqliteStoreError::Corrupt(format!("unknown value type: {other}"))),
    }
}

/// Returns the column tag for a [`ConfigType`].
#[must_use]
pub(crate) const fn config_type_to_str(config_type: ConfigType) -> &'static str {
    match config_type {
        ConfigType::Plugin => "plugin",
        ConfigType::Standard => "standard",
        ConfigType::Datapack => "datapack",
    }
}

/// Parses a [`ConfigType`] column tag.
pub(crate) fn config_type_from_str(text: &str) -> Result<ConfigType, SqliteStoreError> {
    match text {
        "plugin" => Ok(ConfigType::Plugin),
        "standard" => Ok(ConfigType::Standard),
        "datapack" => Ok(ConfigType::Datapack),
        other => Err(SqliteStoreError::Corrupt(format!("unknown config type: {other}"))),
    }
}

/// Returns the column tag for a [`GroupType`].
#[must_use]
pub(crate) const fn group_type_to_str(group_type: GroupType) -> &'static str {
    match group_type {
        GroupType::Physical => "physical",
        GroupType::Logical => "logical",
        GroupType::Administrative => "administrative",
    }
}

/// Parses a [`GroupType`] column tag.
pub(crate) fn group_type_from_str(text: &str) -> Result<GroupType, SqliteStoreError> {
    match text {
        "physical" => Ok(GroupType::Physical),
        "logical" => Ok(GroupType::Logical),
        "administrative" => Ok(GroupType::Administrative),
        other => Err(SqliteStoreError::Corrupt(format!("unknown group type: {other}"))),
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

    #[test]
    fn scope_round_trips_through_columns() {
        let scope = Scope::Group(GroupId::new("survival"));
        let (kind, selector) = scope_to_columns(&scope);
        assert_eq!(scope_from_columns(kind, &selector).expect("rebuild"), scope);
    }

    #[test]
    fn global_scope_has_empty_selector() {
        let (kind, selector) = scope_to_columns(&Scope::Global);
        assert_eq!(kind, "global");
        assert_eq!(selector, "");
    }
}
