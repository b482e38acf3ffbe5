//! File records.

use std::fmt;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::inode::{InodeId, InodeType};
use crate::storage;
use crate::FsError;

/// Permission bits of a writable file.
pub const WRITABLE_MODE: u16 = 0o666;
/// Permission bits of a read-only file.
pub const READ_ONLY_MODE: u16 = 0o555;

/// Block size reported to the kernel.
const BLOCK_SIZE: u32 = 4096;

struct Contents {
    data: Vec<u8>,
    modified: SystemTime,
}

/// A stored file: immutable identity plus a lock-protected byte buffer.
///
/// Records are shared as `Arc<FileEntry>`; events carry the same reference,
/// so metadata read by a listener is the current state, not a snapshot.
pub struct FileEntry {
    inode: InodeId,
    name: String,
    writable: bool,
    created: SystemTime,
    contents: RwLock<Contents>,
}

/// Point-in-time metadata of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Inode ID
    pub inode: InodeId,
    /// File name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Whether the file accepts writes
    pub writable: bool,
}

impl FileEntry {
    pub(crate) fn new(inode: InodeId, name: String, writable: bool, data: Vec<u8>) -> Self {
        let now = SystemTime::now();
        Self {
            inode,
            name,
            writable,
            created: now,
            contents: RwLock::new(Contents {
                data,
                modified: now,
            }),
        }
    }

    /// Returns the inode ID.
    pub fn inode(&self) -> InodeId {
        self.inode
    }

    /// Returns the file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the file accepts writes.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Returns the creation time.
    pub fn created(&self) -> SystemTime {
        self.created
    }

    /// Returns the time of the last write.
    pub fn modified(&self) -> SystemTime {
        self.contents.read().modified
    }

    /// Returns the size in bytes.
    pub fn size(&self) -> u64 {
        self.contents.read().data.len() as u64
    }

    /// Returns the permission bits.
    pub fn mode(&self) -> u16 {
        if self.writable {
            WRITABLE_MODE
        } else {
            READ_ONLY_MODE
        }
    }

    /// Reads up to `len` bytes at `offset`. Empty at or past the end.
    pub fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        let contents = self.contents.read();
        storage::read_at(&contents.data, offset, len).to_vec()
    }

    /// Returns a copy of the whole buffer.
    pub fn contents(&self) -> Vec<u8> {
        self.contents.read().data.clone()
    }

    /// Writes `payload` at `offset` and refreshes the modification time.
    ///
    /// Writes to one file are serialized; concurrent writers never
    /// interleave within a single call. A failed write changes nothing.
    pub fn write(&self, offset: usize, payload: &[u8]) -> Result<usize, FsError> {
        let mut contents = self.contents.write();
        let written = storage::write_at(&mut contents.data, offset, payload)?;
        contents.modified = SystemTime::now();
        Ok(written)
    }

    /// Resizes the file to `size` bytes.
    pub fn truncate(&self, size: usize) -> Result<(), FsError> {
        let mut contents = self.contents.write();
        storage::truncate(&mut contents.data, size)?;
        contents.modified = SystemTime::now();
        Ok(())
    }

    /// Returns the current metadata.
    pub fn info(&self) -> FileInfo {
        FileInfo {
            inode: self.inode,
            name: self.name.clone(),
            size: self.size(),
            writable: self.writable,
        }
    }

    /// Converts to FUSE file attributes.
    pub fn to_file_attr(&self) -> fuser::FileAttr {
        let (size, modified) = {
            let contents = self.contents.read();
            (contents.data.len() as u64, contents.modified)
        };

        fuser::FileAttr {
            ino: self.inode.0,
            size,
            blocks: size.div_ceil(512),
            atime: modified,
            mtime: modified,
            ctime: self.created,
            crtime: self.created,
            kind: InodeType::File.to_file_type(),
            perm: self.mode(),
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntry")
            .field("inode", &self.inode)
            .field("name", &self.name)
            .field("size", &self.size())
            .field("writable", &self.writable)
            .finish()
    }
}

/// Attributes of the root directory.
pub fn root_attr(created: SystemTime, uid: u32, gid: u32) -> fuser::FileAttr {
    fuser::FileAttr {
        ino: InodeId::ROOT.0,
        size: 0,
        blocks: 0,
        atime: created,
        mtime: created,
        ctime: created,
        crtime: created,
        kind: InodeType::Directory.to_file_type(),
        perm: READ_ONLY_MODE,
        nlink: 2,
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}
