// crates/fleetgate-core/src/lib.rs
// ============================================================================
// Module: Fleetgate Core Library
// Description: Public API surface for the Fleetgate core.
// Purpose: Expose the data model, interfaces, resolver, drift engine, and
//          ambient config/identifier/hashing/time support.
// Dependencies: crate::{config, drift, equality, hashing, identifiers,
//               interfaces, model, resolver, time}
// ============================================================================

//! ## Overview
//! Fleetgate core is backend-agnostic: it defines the policy data model, the
//! Resolver, and the Drift Engine against the [`interfaces::RuleSnapshot`]
//! and [`interfaces::RuleStore`] traits, without embedding a storage or RPC
//! implementation. `fleetgate-store-sqlite`, `fleetgate-agent`, and
//! `fleetgate-controller` implement those traits and the transport layers
//! around them.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod drift;
pub mod equality;
pub mod hashing;
pub mod identifiers;
pub mod interfaces;
pub mod model;
pub mod resolver;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AgentEndpoint;
pub use config::CodecSettings;
pub use config::DeploymentSettings;
pub use config::SchedulerSettings;
pub use config::Settings;
pub use drift::ExpectedFile;
pub use drift::scan_instance;
pub use equality::values_equal;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::hash_bytes;
pub use hashing::hash_canonical_json;
pub use identifiers::DeploymentId;
pub use identifiers::GroupId;
pub use identifiers::HostId;
pub use identifiers::InstanceId;
pub use identifiers::PluginId;
pub use identifiers::RuleId;
pub use identifiers::TagId;
pub use identifiers::VariableName;
pub use interfaces::AgentClient;
pub use interfaces::AgentError;
pub use interfaces::AgentInstanceStatus;
pub use interfaces::AgentStatus;
pub use interfaces::NewConfigRule;
pub use interfaces::ResolutionError;
pub use interfaces::RuleFilter;
pub use interfaces::RuleSnapshot;
pub use interfaces::RuleStore;
pub use interfaces::StoreError;
pub use model::BackupManifestEntry;
pub use model::ConfigRule;
pub use model::ConfigTarget;
pub use model::ConfigType;
pub use model::ConfigVariable;
pub use model::DriftClassification;
pub use model::DriftItem;
pub use model::GroupType;
pub use model::Host;
pub use model::Instance;
pub use model::InstanceGroup;
pub use model::Platform;
pub use model::Plugin;
pub use model::Scope;
pub use model::Severity;
pub use model::Tag;
pub use model::ValueType;
pub use model::VariableScope;
pub use resolver::ResolveQuery;
pub use resolver::ResolvedValue;
pub use resolver::resolve;
pub use time::Timestamp;
