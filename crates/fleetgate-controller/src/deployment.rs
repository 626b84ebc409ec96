// crates/fleetgate-controller/src/deployment.rs
// ============================================================================
// Module: Fleetgate Deployment Model
// Description: The Deployment Orchestrator's state machine and record types
//              (§4.7).
// Purpose: Give plan/execute a concrete, inspectable record of one
//          deployment's change set, state, and per-instance outcomes.
// Dependencies: fleetgate-core
// ============================================================================

//! ## Overview
//! A deployment touches one or more `(instance, file, key)` targets. Its
//! state machine is linear on the happy path
//! (`Drafted -> Planned -> BackedUp -> Writing -> Verified -> RestartPending
//! -> Restarted -> Completed`) with a rollback branch
//! (`RollingBack -> RolledBack`) and four terminal failure states, one per
//! stage that can fail (§4.7). Deployments are controller-local state: the
//! Rule Store persists policy, not deployment history (see the design
//! ledger for why).

use fleetgate_core::ConfigTarget;
use fleetgate_core::DeploymentId;
use fleetgate_core::InstanceId;
use fleetgate_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// A single `(instance, target)` a deployment intends to set to its
/// resolved expected value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Instance the change applies to.
    pub instance: InstanceId,
    /// Target being set.
    pub target: ConfigTarget,
}

/// One target, expanded during planning with its resolved expected value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedChange {
    /// Instance the change applies to.
    pub instance: InstanceId,
    /// Target being set.
    pub target: ConfigTarget,
    /// Fully substituted, type-coerced value the Resolver produced.
    pub expected: Value,
}

/// The deployment state machine (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    /// Change set submitted, not yet planned.
    Drafted,
    /// Every target resolved to an expected value; ready to execute.
    Planned,
    /// Prior bytes captured for every file about to be written.
    BackedUp,
    /// Writes issued to every touched agent.
    Writing,
    /// Every touched file was read back and matched its expectation.
    Verified,
    /// Restart issued, awaiting agent confirmation.
    RestartPending,
    /// Every touched instance restarted successfully.
    Restarted,
    /// Terminal success: writes verified, restarts confirmed.
    Completed,
    /// Terminal failure: planning could not resolve every target.
    FailedPlan,
    /// Terminal failure: a write call failed.
    FailedWrite,
    /// Terminal failure: a read-back did not match its expectation.
    FailedVerify,
    /// Terminal failure: a restart call failed after a successful, verified
    /// write (files remain correct; no rollback follows this state, §4.7).
    FailedRestart,
    /// Recovery in progress: restoring every touched agent's backup.
    RollingBack,
    /// Terminal recovery: every touched file restored to pre-deployment bytes.
    RolledBack,
}

/// Final disposition recorded for one instance touched by a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceOutcome {
    /// Every write, verification, and restart for this instance succeeded.
    Completed,
    /// The deployment rolled back; this instance's files were restored.
    RolledBack,
    /// A write, verify, or restart call to this instance's agent failed.
    Failed(String),
    /// The instance's host agent could not be reached.
    Unreachable(String),
}

/// One deployment: its change set, current state, and per-instance outcomes.
///
/// # Invariants
/// - `outcomes` never hides a partial failure behind an aggregate success
///   (§4.6): every instance named in `changes` gets an entry once the
///   deployment reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Identifier assigned at plan time.
    pub id: DeploymentId,
    /// Current state machine position.
    pub state: DeploymentState,
    /// Targets this deployment resolved and intends to (or did) write.
    pub changes: Vec<PlannedChange>,
    /// Per-instance final disposition, populated once `state` is terminal.
    pub outcomes: Vec<(InstanceId, InstanceOutcome)>,
    /// When this deployment was planned.
    pub created_at: Timestamp,
}

impl Deployment {
    /// Returns the distinct instances this deployment's changes touch, in
    /// first-seen order.
    #[must_use]
    pub fn touched_instances(&self) -> Vec<InstanceId> {
        let mut seen = Vec::new();
        for change in &self.changes {
            if !seen.contains(&change.instance) {
                seen.push(change.instance.clone());
            }
        }
        seen
    }

    /// Returns the distinct `(instance, file)` pairs this deployment's
    /// changes touch, in first-seen order.
    #[must_use]
    pub fn touched_files(&self) -> Vec<(InstanceId, String)> {
        let mut seen = Vec::new();
        for change in &self.changes {
            let key = (change.instance.clone(), change.target.file.clone());
            if !seen.contains(&key) {
                seen.push(key);
            }
        }
        seen
    }
}
