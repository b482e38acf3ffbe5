//! High-level mount operations.

use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::mount::MountConfig;
use crate::vfs::RamFs;
use crate::FsError;

/// Ensures the mount point directory exists.
pub fn prepare_mount_point(mount_point: &Path) -> Result<(), FsError> {
    if !mount_point.exists() {
        std::fs::create_dir_all(mount_point)
            .map_err(|e| FsError::Mount(format!("Failed to create mount point: {}", e)))?;
    }
    if !mount_point.is_dir() {
        return Err(FsError::Mount(format!(
            "Mount point is not a directory: {}",
            mount_point.display()
        )));
    }
    Ok(())
}

/// Mounts the filesystem and serves requests until it is unmounted.
pub fn mount(fs: RamFs, config: &MountConfig) -> Result<(), FsError> {
    prepare_mount_point(config.path())?;

    info!(mount_point = %config.path().display(), "Mounting ramdisk");
    fuser::mount2(fs, config.path(), &config.options())
        .map_err(|e| FsError::Mount(format!("FUSE mount failed: {}", e)))?;

    info!(mount_point = %config.path().display(), "Ramdisk unmounted");
    Ok(())
}

/// Unmounts a filesystem.
pub fn unmount(mount_point: &Path) -> Result<(), FsError> {
    // Use fusermount to unmount
    let output = Command::new("fusermount")
        .arg("-u")
        .arg(mount_point)
        .output()
        .map_err(|e| FsError::Unmount(format!("Failed to run fusermount: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FsError::Unmount(format!("fusermount failed: {}", stderr)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("mnt");

        prepare_mount_point(&target).unwrap();
        assert!(target.is_dir());
        // Idempotent.
        prepare_mount_point(&target).unwrap();
    }

    #[test]
    fn test_prepare_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("file");
        std::fs::write(&target, b"x").unwrap();

        assert!(matches!(prepare_mount_point(&target), Err(FsError::Mount(_))));
    }
}
