// crates/fleetgate-controller/src/error.rs
// ============================================================================
// Module: Fleetgate Controller Errors
// Description: Error types for the Deployment Orchestrator and Controller.
// Purpose: Give every fallible controller operation a concrete, named error
//          type instead of a raw Debug dump or anyhow.
// Dependencies: fleetgate-core, thiserror
// ============================================================================

//! ## Overview
//! `OrchestratorError` covers the Deployment Orchestrator's planning and
//! execution failures (§4.7, §7); `ControllerError` wraps it alongside rule
//! store and agent errors for the Controller's broader surface (§4.6).

use fleetgate_core::AgentError;
use fleetgate_core::ConfigTarget;
use fleetgate_core::DeploymentId;
use fleetgate_core::HostId;
use fleetgate_core::InstanceId;
use fleetgate_core::ResolutionError;
use fleetgate_core::StoreError;
use thiserror::Error;

/// Errors raised while planning or executing a deployment (§4.7, §7).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// `plan` referenced an instance the registry does not know about.
    #[error("unknown instance: {0}")]
    UnknownInstance(InstanceId),
    /// A plan target has no active rule at all, so there is nothing to deploy.
    #[error("no active rule for target on {instance}: {target:?}")]
    NoActiveRule {
        /// Instance the target was requested for.
        instance: InstanceId,
        /// Target with no resolvable expectation.
        target: ConfigTarget,
    },
    /// A plan target names a plugin whose platform does not match the
    /// instance's platform (§4.8, §8 scenario 6).
    #[error("platform mismatch deploying to {instance}: {target:?}")]
    PlatformMismatch {
        /// Instance the target was requested for.
        instance: InstanceId,
        /// Target whose plugin platform conflicts with the instance.
        target: ConfigTarget,
    },
    /// Resolution failed while planning (undefined variable, type mismatch,
    /// or an ambiguous rule); the whole plan aborts (§4.7).
    #[error("resolution failed during planning: {0}")]
    Resolution(#[from] ResolutionError),
    /// The deployment id does not exist.
    #[error("no such deployment: {0}")]
    NoSuchDeployment(DeploymentId),
    /// `execute` was called on a deployment that is not in the `Planned`
    /// state (already executed, or still mid-execution).
    #[error("deployment {0} is not in the planned state")]
    NotPlanned(DeploymentId),
    /// The config codec could not parse or re-emit a touched file.
    #[error("codec failure on {instance}/{file}: {detail}")]
    Codec {
        /// Instance the file belongs to.
        instance: InstanceId,
        /// Config file relative path.
        file: String,
        /// Parse/emit failure detail.
        detail: String,
    },
    /// The agent responsible for `host` could not be reached or reported a
    /// local failure; the orchestrator rolls back every agent already
    /// touched in this deployment.
    #[error("agent error on host {host}: {source}")]
    Agent {
        /// Host the failing agent call targeted.
        host: HostId,
        /// Underlying agent error.
        #[source]
        source: AgentError,
    },
    /// Verification read back a value that does not match the resolved
    /// expectation (§4.7 step 3, §8 scenario 4).
    #[error("verification mismatch on {instance}/{file}/{key}")]
    VerifyMismatch {
        /// Instance the mismatch was observed on.
        instance: InstanceId,
        /// Config file relative path.
        file: String,
        /// Dotted key path.
        key: String,
    },
    /// No [`fleetgate_core::AgentClient`] is configured for `host`.
    #[error("no agent configured for host {0}")]
    NoAgentForHost(HostId),
}

/// Errors raised by the Controller's broader surface (§4.6, §7).
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The Rule Store failed to read or write.
    #[error("rule store error: {0}")]
    Store(#[from] StoreError),
    /// An agent call failed outside the orchestrator's rollback-covered path
    /// (e.g. discovery, heartbeat, or a drift scan read).
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),
    /// Resolving a single query failed.
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),
    /// A deployment plan or execution failed.
    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),
    /// The caller referenced an instance unknown to the registry.
    #[error("unknown instance: {0}")]
    UnknownInstance(InstanceId),
}
