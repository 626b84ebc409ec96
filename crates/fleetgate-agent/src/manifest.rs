// crates/fleetgate-agent/src/manifest.rs
// ============================================================================
// Module: Fleetgate Agent Backup Manifests
// Description: Per-deployment record of pre-write file bytes, persisted as
//              one JSON file per deployment under the agent's state directory.
// Purpose: Let rollback restore every file a deployment touched, and let a
//          deployment's manifest be cleared independently of any other's.
// Dependencies: fleetgate-core, serde_json
// ============================================================================

//! ## Overview
//! `write_config` captures a file's prior bytes the first time a deployment
//! touches it (`§4.6`: a deployment's backup is append-only and never
//! overwritten by a later write to the same file within that deployment).
//! Each deployment's entries live in their own `<deployment_id>.json` file so
//! `rollback` can restore and delete one deployment's manifest without
//! touching any other in-flight deployment's backups.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use fleetgate_core::BackupManifestEntry;
use fleetgate_core::DeploymentId;

use crate::error::AgentLocalError;
use crate::fs_util::atomic_write;

/// Returns the manifest file path for `deployment_id` under `state_dir`.
fn manifest_path(state_dir: &Path, deployment_id: DeploymentId) -> PathBuf {
    state_dir.join("backups").join(format!("{}.json", deployment_id.get()))
}

/// Loads a deployment's manifest, or an empty list if none exists yet.
pub(crate) fn load(state_dir: &Path, deployment_id: DeploymentId) -> Result<Vec<BackupManifestEntry>, AgentLocalError> {
    let path = manifest_path(state_dir, deployment_id);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(&path)
        .map_err(|source| AgentLocalError::Filesystem { path: path.display().to_string(), source })?;
    serde_json::from_str(&text)
        .map_err(|source| AgentLocalError::StateCorrupt { path: path.display().to_string(), source })
}

/// Appends `entry` to its deployment's manifest, unless an entry for the same
/// `(instance, path)` is already recorded (first write wins the backup).
pub(crate) fn record_if_absent(state_dir: &Path, entry: BackupManifestEntry) -> Result<(), AgentLocalError> {
    let mut entries = load(state_dir, entry.deployment_id)?;
    let already_captured =
        entries.iter().any(|existing| existing.instance == entry.instance && existing.path == entry.path);
    if already_captured {
        return Ok(());
    }
    entries.push(entry.clone());
    write_manifest(state_dir, entry.deployment_id, &entries)
}

/// Removes a deployment's manifest entirely, once its files have been
/// restored by [`rollback`](crate::local_agent::LocalAgent::rollback).
pub(crate) fn clear(state_dir: &Path, deployment_id: DeploymentId) -> Result<(), AgentLocalError> {
    let path = manifest_path(state_dir, deployment_id);
    if path.exists() {
        fs::remove_file(&path)
            .map_err(|source| AgentLocalError::Filesystem { path: path.display().to_string(), source })?;
    }
    Ok(())
}

/// Persists a deployment's manifest atomically.
fn write_manifest(
    state_dir: &Path,
    deployment_id: DeploymentId,
    entries: &[BackupManifestEntry],
) -> Result<(), AgentLocalError> {
    let path = manifest_path(state_dir, deployment_id);
    let text = serde_json::to_vec_pretty(entries)
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

    use std::num::NonZeroU64;

    use fleetgate_core::DEFAULT_HASH_ALGORITHM;
    use fleetgate_core::HashDigest;
    use fleetgate_core::InstanceId;
    use fleetgate_core::hash_bytes;

    use super::*;

    fn sample_entry(deployment_id: DeploymentId) -> BackupManifestEntry {
        BackupManifestEntry {
            deployment_id,
            instance: InstanceId::new("DEV01"),
            path: "server.properties".to_string(),
            prior_bytes: b"motd=old".to_vec(),
            prior_digest: HashDigest::new(DEFAULT_HASH_ALGORITHM, b"motd=old"),
        }
    }

    #[test]
    fn record_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let deployment_id = DeploymentId::new(NonZeroU64::new(1).expect("nonzero"));
        record_if_absent(dir.path(), sample_entry(deployment_id)).expect("record");
        let loaded = load(dir.path(), deployment_id).expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].prior_digest, hash_bytes(DEFAULT_HASH_ALGORITHM, b"motd=old"));
    }

    #[test]
    fn second_write_to_same_file_does_not_overwrite_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let deployment_id = DeploymentId::new(NonZeroU64::new(1).expect("nonzero"));
        record_if_absent(dir.path(), sample_entry(deployment_id)).expect("first record");
        let mut second = sample_entry(deployment_id);
        second.prior_bytes = b"motd=should-not-land".to_vec();
        record_if_absent(dir.path(), second).expect("second record");
        let loaded = load(dir.path(), deployment_id).expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].prior_bytes, b"motd=old");
    }

    #[test]
    fn clear_removes_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let deployment_id = DeploymentId::new(NonZeroU64::new(1).expect("nonzero"));
        record_if_absent(dir.path(), sample_entry(deployment_id)).expect("record");
        clear(dir.path(), deployment_id).expect("clear");
        assert!(load(dir.path(), deployment_id).expect("load").is_empty());
    }
}
