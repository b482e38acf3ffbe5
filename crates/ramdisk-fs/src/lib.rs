//! Ramdisk Filesystem - in-memory FUSE filesystem.
//!
//! Provides:
//! - A flat namespace of in-memory files with per-instance inode allocation
//! - Offset-based reads and writes with hole filling
//! - File lifecycle events published on a [`ramdisk_bus::EventBus`]
//! - FUSE bindings and mount helpers

#![warn(missing_docs, rust_2018_idioms)]

pub mod event;
pub mod file;
pub mod inode;
pub mod mount;
pub mod namespace;
pub mod ops;
pub mod storage;
pub mod vfs;

pub use event::{EventKind, FsEvent, FsEventBus, FsListener};
pub use file::{FileEntry, FileInfo};
pub use inode::{InodeAllocator, InodeId, InodeType};
pub use mount::MountConfig;
pub use namespace::{DirEntry, Namespace};
pub use storage::MAX_FILE_SIZE;
pub use vfs::RamFs;

use ramdisk_bus::BusError;
use thiserror::Error;

/// Filesystem errors.
#[derive(Debug, Error)]
pub enum FsError {
    /// No entry with this name or inode
    #[error("Not found: {0}")]
    NotFound(String),

    /// An entry with this name already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Empty file name
    #[error("Invalid name")]
    InvalidName,

    /// Write access requested on a read-only entry
    #[error("Permission denied")]
    PermissionDenied,

    /// Unknown file handle
    #[error("Bad file handle: {0}")]
    BadHandle(u64),

    /// Negative read or write offset
    #[error("Invalid offset: {0}")]
    InvalidOffset(i64),

    /// Write or truncation would exceed the maximum file size
    #[error("File too large")]
    FileTooLarge,

    /// Memory for file contents could not be allocated
    #[error("No space left for file contents")]
    NoSpace,

    /// Mount failed
    #[error("Mount failed: {0}")]
    Mount(String),

    /// Unmount failed
    #[error("Unmount failed: {0}")]
    Unmount(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Event bus error
    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),
}

impl FsError {
    /// Returns the errno reported to the kernel for this error.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::InvalidName | FsError::InvalidOffset(_) => libc::EINVAL,
            FsError::PermissionDenied => libc::EACCES,
            FsError::BadHandle(_) => libc::EBADF,
            FsError::FileTooLarge => libc::EFBIG,
            FsError::NoSpace => libc::ENOSPC,
            FsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            FsError::Mount(_) | FsError::Unmount(_) | FsError::Bus(_) => libc::EIO,
        }
    }
}
