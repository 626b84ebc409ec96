// crates/fleetgate-agent/src/process.rs
// ============================================================================
// Module: Fleetgate Agent Process Control
// Description: Runs the operator-supplied restart command for one instance.
// Purpose: Turn an opaque shell command template into a restart outcome,
//          the way `Host::process_control_command` is documented to be used.
// Dependencies: fleetgate-core, std::process
// ============================================================================

use std::process::Command;

use fleetgate_core::InstanceId;
use tracing::warn;

use crate::error::AgentLocalError;

/// Runs `command_template` for `instance` through a shell, substituting the
/// literal token `{instance}` with the instance id.
///
/// # Errors
///
/// Returns [`AgentLocalError::ProcessControl`] if the command cannot be
/// spawned or exits non-zero.
pub(crate) fn restart_instance(command_template: &str, instance: &InstanceId) -> Result<(), AgentLocalError> {
    let command = command_template.replace("{instance}", instance.as_str());
    let output = Command::new("sh").arg("-c").arg(&command).output().map_err(|source| {
        AgentLocalError::ProcessControl { instance: instance.to_string(), detail: source.to_string() }
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(instance = %instance, status = %output.status, stderr = %stderr, "restart command failed");
        return Err(AgentLocalError::ProcessControl {
            instance: instance.to_string(),
            detail: format!("exit status {}: {}", output.status, stderr.trim()),
        });
    }
    Ok(())
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
    fn substitutes_instance_token_and_succeeds() {
        let instance = InstanceId::new("DEV01");
        restart_instance("test \"{instance}\" = \"DEV01\"", &instance).expect("command succeeds");
    }

    #[test]
    fn nonzero_exit_is_reported_as_process_control_error() {
        let instance = InstanceId::new("DEV01");
        let result = restart_instance("exit 7", &instance);
        assert!(matches!(result, Err(AgentLocalError::ProcessControl { .. })));
    }
}
