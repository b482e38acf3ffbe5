//! Inode identifiers and allocation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Inode identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InodeId(pub u64);

impl InodeId {
    /// Root directory inode ID (FUSE convention).
    pub const ROOT: InodeId = InodeId(1);

    /// Returns true for the root directory.
    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

impl From<u64> for InodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<InodeId> for u64 {
    fn from(id: InodeId) -> u64 {
        id.0
    }
}

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues strictly increasing inode IDs above the root.
///
/// Each filesystem instance owns its allocator, so IDs are unique per
/// instance and never reused.
#[derive(Debug)]
pub struct InodeAllocator {
    next: AtomicU64,
}

impl InodeAllocator {
    /// Creates an allocator whose first ID follows the root.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(InodeId::ROOT.0 + 1),
        }
    }

    /// Returns the next inode ID.
    pub fn next(&self) -> InodeId {
        InodeId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InodeAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Inode types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    /// Regular file
    File,
    /// Directory (only the root)
    Directory,
}

impl InodeType {
    /// Converts to the FUSE file type.
    pub fn to_file_type(self) -> fuser::FileType {
        match self {
            InodeType::File => fuser::FileType::RegularFile,
            InodeType::Directory => fuser::FileType::Directory,
        }
    }
}
