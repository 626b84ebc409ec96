// crates/fleetgate-agent/src/error.rs
// ============================================================================
// Module: Fleetgate Agent Errors
// Description: Local error type for filesystem, process-control, and wire
//              failures inside the agent, mapped up into fleetgate-core's
//              transport-neutral AgentError at the trait boundary.
// Purpose: Keep path/exit-code/serde detail out of the shared AgentError
//          enum while still surfacing it in agent-local logs.
// Dependencies: fleetgate-core, serde_json, thiserror
// ============================================================================

use fleetgate_core::AgentError;
use thiserror::Error;

/// Errors raised by the local agent implementation, before being folded into
/// [`AgentError`] at the [`fleetgate_core::AgentClient`] boundary.
#[derive(Debug, Error)]
pub enum AgentLocalError {
    /// A filesystem read or write failed.
    #[error("agent filesystem error at {path}: {source}")]
    Filesystem {
        /// Path the failing operation touched.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The requested instance is not in this agent's configured instance set.
    #[error("unknown instance: {0}")]
    UnknownInstance(String),
    /// The requested config file does not exist under the instance's root.
    #[error("config file not found: {0}")]
    FileNotFound(String),
    /// A persisted state file (backup manifest, restart flag) failed to
    /// parse.
    #[error("agent state corrupt at {path}: {source}")]
    StateCorrupt {
        /// Path of the offending state file.
        path: String,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
    /// No backup manifest exists for the requested deployment.
    #[error("no backup manifest for deployment {0}")]
    NoSuchDeployment(String),
    /// The process-control helper exited non-zero or could not be spawned.
    #[error("process control command failed for {instance}: {detail}")]
    ProcessControl {
        /// Instance the command was run for.
        instance: String,
        /// Exit status or spawn failure detail.
        detail: String,
    },
    /// The RPC server could not bind its listening address.
    #[error("agent rpc server failed to bind {addr}: {detail}")]
    Bind {
        /// Address the server attempted to bind.
        addr: String,
        /// Underlying bind failure detail.
        detail: String,
    },
}

impl From<AgentLocalError> for AgentError {
    fn from(err: AgentLocalError) -> Self {
        match err {
            AgentLocalError::Filesystem { path, source } => {
                Self::Io(format!("{path}: {source}"))
            }
            AgentLocalError::UnknownInstance(id) => Self::NotFound(format!("instance {id}")),
            AgentLocalError::FileNotFound(file) => Self::NotFound(format!("file {file}")),
            AgentLocalError::StateCorrupt { path, source } => {
                Self::Io(format!("state file {path} corrupt: {source}"))
            }
            AgentLocalError::NoSuchDeployment(id) => Self::NotFound(format!("deployment {id}")),
            AgentLocalError::ProcessControl { instance, detail } => {
                Self::ProcessControl(format!("{instance}: {detail}"))
            }
            AgentLocalError::Bind { addr, detail } => Self::Io(format!("bind {addr}: {detail}")),
        }
    }
}
