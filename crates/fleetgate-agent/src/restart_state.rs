// crates/fleetgate-agent/src/restart_state.rs
// ============================================================================
// Module: Fleetgate Agent Restart State
// Description: Persisted set of instances with an uncommitted config write.
// Purpose: Survive an agent restart so `needs_restart` in `GET /status`
//          stays accurate across a crash or redeploy of the agent itself.
// Dependencies: fleetgate-core, serde_json
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use fleetgate_core::InstanceId;

use crate::error::AgentLocalError;
use crate::fs_util::atomic_write;

/// Returns the restart-flag file path under `state_dir`.
fn flag_path(state_dir: &Path) -> PathBuf {
    state_dir.join("needs_restart.json")
}

/// Loads the set of instances currently flagged as needing a restart.
pub(crate) fn load(state_dir: &Path) -> Result<BTreeSet<InstanceId>, AgentLocalError> {
    let path = flag_path(state_dir);
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let text = fs::read_to_string(&path)
        .map_err(|source| AgentLocalError::Filesystem { path: path.display().to_string(), source })?;
    serde_json::from_str(&text)
        .map_err(|source| AgentLocalError::StateCorrupt { path: path.display().to_string(), source })
}

/// Adds `instance` to the restart set.
pub(crate) fn mark(state_dir: &Path, instance: &InstanceId) -> Result<(), AgentLocalError> {
    let mut flagged = load(state_dir)?;
    flagged.insert(instance.clone());
    save(state_dir, &flagged)
}

/// Removes `instance` from the restart set, if present.
pub(crate) fn clear(state_dir: &Path, instance: &InstanceId) -> Result<(), AgentLocalError> {
    let mut flagged = load(state_dir)?;
    flagged.remove(instance);
    save(state_dir, &flagged)
}

/// Persists the restart set atomically.
fn save(state_dir: &Path, flagged: &BTreeSet<InstanceId>) -> Result<(), AgentLocalError> {
    let path = flag_path(state_dir);
    let text = serde_json::to_vec_pretty(flagged)
        .map_err(|source| AgentLocalError::StateCorrupt { path: path.display().to_string(), source })?;
    atomic_write(&path, &text).map_err(|source| AgentLocalError::Filesystem { path: path.display().to_string(), source })
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
    fn mark_then_load_reflects_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let instance = InstanceId::new("DEV01");
        mark(dir.path(), &instance).expect("mark");
        assert!(load(dir.path()).expect("load").contains(&instance));
    }

    #[test]
    fn clear_removes_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let instance = InstanceId::new("DEV01");
        mark(dir.path(), &instance).expect("mark");
        clear(dir.path(), &instance).expect("clear");
        assert!(!load(dir.path()).expect("load").contains(&instance));
    }
}
