// crates/fleetgate-core/src/identifiers.rs
// ============================================================================
// Module: Fleetgate Identifiers
// Description: Canonical opaque identifiers for instances, hosts, and policy entities.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Fleetgate.
//! Short-code identifiers (instances, hosts, groups, tags, plugins) are
//! opaque operator-authored strings. Sequentially assigned identifiers
//! (rules, deployments) enforce a non-zero, 1-based invariant at
//! construction boundaries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: String Identifier Macro
// ============================================================================

macro_rules! string_identifier {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        ///
        /// # Invariants
        /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a new ", stringify!($name), ".")]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_identifier!(InstanceId, "Short identifier for a managed game-server instance (e.g. `DEV01`).");
string_identifier!(HostId, "Logical identifier for a physical host running one agent.");
string_identifier!(GroupId, "Identifier for an instance group.");
string_identifier!(TagId, "Identifier for a tag, unique within its category.");
string_identifier!(PluginId, "Canonical plugin name.");
string_identifier!(VariableName, "Name of a config variable, without the `{{` `}}` delimiters.");

// ============================================================================
// SECTION: Sequential Identifier Macro
// ============================================================================

macro_rules! sequential_identifier {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        ///
        /// # Invariants
        /// - Always >= 1 (non-zero, 1-based).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(NonZeroU64);

        impl $name {
            #[doc = concat!("Creates a new ", stringify!($name), " from a non-zero value.")]
            #[must_use]
            pub const fn new(id: NonZeroU64) -> Self {
                Self(id)
            }

            #[doc = concat!("Creates a ", stringify!($name), " from a raw value (returns `None` if zero).")]
            #[must_use]
            pub fn from_raw(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map(Self)
            }

            /// Returns the raw identifier value (always >= 1).
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.get().fmt(f)
            }
        }
    };
}

sequential_identifier!(RuleId, "Identifier for a config rule, assigned by the Rule Store on insert.");
sequential_identifier!(DeploymentId, "Identifier for a deployment, assigned by the Controller on plan creation.");
