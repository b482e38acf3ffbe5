//! Mount configuration.

use std::path::{Path, PathBuf};

use fuser::MountOption;

/// Default filesystem name shown in the mount table.
pub const DEFAULT_FS_NAME: &str = "ramdisk";

/// Mount configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    /// Mount point path
    pub mount_point: PathBuf,
    /// Filesystem name shown in the mount table
    pub fs_name: String,
    /// Allow other users to access
    pub allow_other: bool,
    /// Unmount automatically when the process exits
    pub auto_unmount: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from("/mnt/fusemnt"),
            fs_name: DEFAULT_FS_NAME.to_string(),
            allow_other: false,
            auto_unmount: false,
        }
    }
}

impl MountConfig {
    /// Creates a configuration for the given mount point.
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
            ..Default::default()
        }
    }

    /// Returns the mount path.
    pub fn path(&self) -> &Path {
        &self.mount_point
    }

    /// Returns the FUSE mount options.
    pub fn options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::RW,
            MountOption::FSName(self.fs_name.clone()),
            MountOption::Subtype(DEFAULT_FS_NAME.to_string()),
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let config = MountConfig::new("/tmp/ram");
        assert_eq!(config.path(), Path::new("/tmp/ram"));

        let options = config.options();
        assert!(options.contains(&MountOption::RW));
        assert!(options.contains(&MountOption::FSName("ramdisk".to_string())));
        assert!(!options.contains(&MountOption::AllowOther));
        assert!(!options.contains(&MountOption::AutoUnmount));
    }

    #[test]
    fn test_optional_flags() {
        let config = MountConfig {
            allow_other: true,
            auto_unmount: true,
            ..MountConfig::new("/tmp/ram")
        };
        let options = config.options();
        assert!(options.contains(&MountOption::AllowOther));
        assert!(options.contains(&MountOption::AutoUnmount));
    }
}
