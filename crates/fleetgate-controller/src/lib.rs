// crates/fleetgate-controller/src/lib.rs
// ============================================================================
// Module: Fleetgate Controller
// Description: Deployment orchestration, drift scanning, discovery, and the
//              HTTP control-plane surface for a Fleetgate fleet.
// Purpose: Wire the Rule Store and the agent fleet into one blocking
//          Controller, an async Scheduler, and an axum API.
// Dependencies: fleetgate-core, fleetgate-codec, base64, axum, reqwest, tokio
// ============================================================================

//! ## Overview
//! Fleetgate Controller is the control-plane half of the system: it holds no
//! authority over config values itself (that is the Rule Store and the
//! Resolver, both in `fleetgate-core`) but drives every agent-facing
//! operation — deployments, drift scans, discovery, heartbeats — and exposes
//! them over HTTP for operators and the CLI.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod api;
pub mod controller;
pub mod deployment;
pub mod error;
pub mod http_agent_client;
pub mod orchestrator;
pub mod scheduler;
pub mod wire;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use controller::Controller;
pub use deployment::ChangeRequest;
pub use deployment::Deployment;
pub use deployment::DeploymentState;
pub use deployment::InstanceOutcome;
pub use deployment::PlannedChange;
pub use error::ControllerError;
pub use error::OrchestratorError;
pub use http_agent_client::HttpAgentClient;
pub use orchestrator::Orchestrator;
pub use scheduler::Scheduler;
pub use scheduler::SchedulerHandle;
