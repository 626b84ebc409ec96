// crates/fleetgate-agent/src/fs_util.rs
// ============================================================================
// Module: Fleetgate Agent Filesystem Helpers
// Description: Atomic file write discipline shared by config writes and
//              persisted agent state (backup manifests, restart flags).
// Purpose: Guarantee a reader never observes a partially written file.
// Dependencies: std::fs
// ============================================================================

use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

/// Writes `bytes` to `path` by writing a sibling `.tmp` file and renaming it
/// over `path`, so a crash mid-write leaves the old contents (or nothing) in
/// place, never a truncated file.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = sibling_tmp_path(path);
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Returns the `.tmp` path used as the write target before the atomic rename.
fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
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
    fn atomic_write_creates_file_and_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("server.properties");
        atomic_write(&path, b"motd=hello").expect("write");
        assert_eq!(fs::read(&path).expect("read"), b"motd=hello");
        assert!(!sibling_tmp_path(&path).exists());
    }

    #[test]
    fn atomic_write_overwrites_existing_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("server.properties");
        atomic_write(&path, b"first").expect("write");
        atomic_write(&path, b"second").expect("write");
        assert_eq!(fs::read(&path).expect("read"), b"second");
    }
}
