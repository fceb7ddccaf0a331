//! Run-scoped directories for observation artifacts

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const ARTIFACTS_DIR: &str = "artifacts";
const WRITE_CHECK_FILE: &str = ".slimbox-write-check";

/// Left in the run directory by a previous monitoring session
const STALE_VOLUME_ENTRIES: &[&str] = &["monitor.done"];
/// Left in the artifact location by a previous run
const STALE_ARTIFACT_ENTRIES: &[&str] = &[
    "creport.json",
    "files.json",
    "files",
    "Dockerfile",
    "Dockerfile.fat",
];

/// Local paths used by one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirs {
    /// Mounted into the instrumented container
    pub local_volume_path: PathBuf,
    /// Where observation artifacts and builder inputs live
    pub artifact_location: PathBuf,
}

/// Creates `<state_path>/<image id>/artifacts` and checks that it is writable
///
/// The directory is keyed by image ID, so output of an earlier run on the same
/// image is removed first. Data seen by later phases always comes from the
/// current monitoring session.
pub fn prepare_run_dirs(state_path: &Path, image_id: &str) -> Result<RunDirs> {
    let local_volume_path = state_path.join(sanitize_image_id(image_id));
    let artifact_location = local_volume_path.join(ARTIFACTS_DIR);

    fs::create_dir_all(&artifact_location).with_context(|| {
        format!(
            "Failed to create artifact directory {}",
            artifact_location.display()
        )
    })?;

    clear_stale(&local_volume_path, STALE_VOLUME_ENTRIES)?;
    clear_stale(&artifact_location, STALE_ARTIFACT_ENTRIES)?;

    let probe = artifact_location.join(WRITE_CHECK_FILE);
    fs::write(&probe, b"").with_context(|| {
        format!(
            "Artifact directory {} is not writable",
            artifact_location.display()
        )
    })?;
    fs::remove_file(&probe)
        .with_context(|| format!("Failed to remove {}", probe.display()))?;

    debug!(
        volume = %local_volume_path.display(),
        artifacts = %artifact_location.display(),
        "Prepared run directories"
    );

    Ok(RunDirs {
        local_volume_path,
        artifact_location,
    })
}

/// Deletes the whole artifact location.
///
/// Everything under it goes, not only the copied `files` tree.
pub fn remove_artifacts(artifact_location: &Path) -> Result<()> {
    fs::remove_dir_all(artifact_location).with_context(|| {
        format!(
            "Failed to remove artifacts at {}",
            artifact_location.display()
        )
    })
}

fn clear_stale(dir: &Path, entries: &[&str]) -> Result<()> {
    for name in entries {
        let path = dir.join(name);
        let removed = match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path),
            Ok(_) => fs::remove_file(&path),
            Err(_) => continue,
        };
        removed.with_context(|| format!("Failed to remove stale {}", path.display()))?;
        debug!(path = %path.display(), "Removed output of a previous run");
    }
    Ok(())
}

fn sanitize_image_id(image_id: &str) -> String {
    image_id
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_creates_artifact_location() {
        let state = TempDir::new().unwrap();
        let dirs = prepare_run_dirs(state.path(), "sha256:abc123").unwrap();

        assert_eq!(dirs.local_volume_path, state.path().join("sha256_abc123"));
        assert_eq!(
            dirs.artifact_location,
            state.path().join("sha256_abc123").join("artifacts")
        );
        assert!(dirs.artifact_location.is_dir());
        assert!(!dirs.artifact_location.join(WRITE_CHECK_FILE).exists());
    }

    #[test]
    fn test_prepare_clears_previous_run() {
        let state = TempDir::new().unwrap();
        let first = prepare_run_dirs(state.path(), "abc").unwrap();
        let artifacts = &first.artifact_location;
        fs::write(first.local_volume_path.join("monitor.done"), "").unwrap();
        fs::write(artifacts.join("creport.json"), "{}").unwrap();
        fs::write(artifacts.join("files.json"), "[]").unwrap();
        fs::write(artifacts.join("Dockerfile"), "FROM scratch").unwrap();
        fs::write(artifacts.join("Dockerfile.fat"), "CMD [\"x\"]").unwrap();
        fs::create_dir_all(artifacts.join("files/etc")).unwrap();
        fs::write(artifacts.join("files/etc/hosts"), "x").unwrap();
        fs::write(artifacts.join("notes.txt"), "kept").unwrap();

        let second = prepare_run_dirs(state.path(), "abc").unwrap();

        assert_eq!(first, second);
        assert!(!second.local_volume_path.join("monitor.done").exists());
        for stale in ["creport.json", "files.json", "files", "Dockerfile", "Dockerfile.fat"] {
            assert!(
                !second.artifact_location.join(stale).exists(),
                "{} survived",
                stale
            );
        }
        assert!(second.artifact_location.join("notes.txt").exists());
    }

    #[test]
    fn test_prepare_fails_when_state_path_is_a_file() {
        let state = TempDir::new().unwrap();
        let file = state.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();

        assert!(prepare_run_dirs(&file, "abc").is_err());
    }

    #[test]
    fn test_remove_artifacts_removes_whole_tree() {
        let state = TempDir::new().unwrap();
        let dirs = prepare_run_dirs(state.path(), "abc").unwrap();
        fs::create_dir_all(dirs.artifact_location.join("files/etc")).unwrap();
        fs::write(dirs.artifact_location.join("files/etc/hosts"), "x").unwrap();
        fs::write(dirs.artifact_location.join("creport.json"), "{}").unwrap();

        remove_artifacts(&dirs.artifact_location).unwrap();

        assert!(!dirs.artifact_location.exists());
        assert!(dirs.local_volume_path.exists());
    }

    #[test]
    fn test_remove_missing_artifacts_fails() {
        let state = TempDir::new().unwrap();
        assert!(remove_artifacts(&state.path().join("missing")).is_err());
    }
}
