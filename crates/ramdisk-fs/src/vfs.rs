//! Filesystem facade with FUSE bindings.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::event::{FsEvent, FsEventBus};
use crate::file::{self, FileEntry};
use crate::inode::InodeId;
use crate::namespace::{DirEntry, Namespace};
use crate::FsError;

/// TTL for cached attributes.
const TTL: Duration = Duration::from_secs(1);

/// An open file handle.
#[derive(Debug, Clone, Copy)]
struct OpenHandle {
    inode: InodeId,
    read: bool,
    write: bool,
}

/// In-memory filesystem served over FUSE.
///
/// Every method works without a mounted kernel session; the
/// [`Filesystem`] impl only translates requests and replies.
pub struct RamFs {
    /// The single directory
    namespace: Arc<Namespace>,
    /// Open file handles
    handles: RwLock<HashMap<u64, OpenHandle>>,
    /// Next file handle
    next_handle: AtomicU64,
    /// Root directory timestamps
    mounted_at: SystemTime,
}

impl RamFs {
    /// Creates a filesystem over an existing namespace.
    pub fn new(namespace: Arc<Namespace>) -> Self {
        Self {
            namespace,
            handles: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            mounted_at: SystemTime::now(),
        }
    }

    /// Creates a filesystem with a fresh namespace publishing to `bus`.
    pub fn with_bus(bus: &FsEventBus) -> Self {
        Self::new(Arc::new(Namespace::new(bus.publisher())))
    }

    /// Returns the namespace.
    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    /// Returns the root directory attributes.
    pub fn root_attr(&self) -> FileAttr {
        file::root_attr(self.mounted_at, 0, 0)
    }

    /// Looks up a file by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<FileEntry>, FsError> {
        self.namespace
            .lookup(name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))
    }

    /// Returns attributes of the root or a file.
    pub fn getattr(&self, inode: InodeId) -> Result<FileAttr, FsError> {
        if inode.is_root() {
            return Ok(self.root_attr());
        }
        Ok(self.entry(inode)?.to_file_attr())
    }

    /// Lists the directory.
    pub fn readdir(&self) -> Vec<DirEntry> {
        self.namespace.list()
    }

    /// Creates a file and opens it read-write.
    pub fn create(&self, name: &str) -> Result<(Arc<FileEntry>, u64), FsError> {
        let file = self.namespace.create(name)?;
        let fh = self.allocate_handle(file.inode(), true, true);
        Ok((file, fh))
    }

    /// Opens a file. Write access requires a writable file.
    pub fn open(&self, inode: InodeId, flags: i32) -> Result<u64, FsError> {
        let file = self.entry(inode)?;
        let (read, write) = access_mode(flags);

        if write && !file.is_writable() {
            return Err(FsError::PermissionDenied);
        }

        let fh = self.allocate_handle(inode, read, write);
        self.namespace.emit(FsEvent::Opened(file));
        Ok(fh)
    }

    /// Reads up to `size` bytes at `offset` through a handle.
    pub fn read(&self, fh: u64, offset: i64, size: u32) -> Result<Vec<u8>, FsError> {
        let handle = self.handle(fh)?;
        if !handle.read {
            return Err(FsError::PermissionDenied);
        }
        let offset = to_offset(offset)?;
        let file = self.entry(handle.inode)?;

        let data = file.read(offset, size as usize);
        self.namespace.emit(FsEvent::Read(file));
        Ok(data)
    }

    /// Writes `data` at `offset` through a handle.
    pub fn write(&self, fh: u64, offset: i64, data: &[u8]) -> Result<usize, FsError> {
        let handle = self.handle(fh)?;
        if !handle.write {
            return Err(FsError::PermissionDenied);
        }
        let offset = to_offset(offset)?;
        let file = self.entry(handle.inode)?;

        let written = file.write(offset, data)?;
        self.namespace.emit(FsEvent::Written(file));
        Ok(written)
    }

    /// Resizes a file, zero-filling when it grows.
    pub fn truncate(&self, inode: InodeId, size: u64) -> Result<FileAttr, FsError> {
        let file = self.entry(inode)?;
        if !file.is_writable() {
            return Err(FsError::PermissionDenied);
        }
        let size = usize::try_from(size).map_err(|_| FsError::FileTooLarge)?;

        file.truncate(size)?;
        debug!(ino = inode.0, size = size, "Truncated file");
        self.namespace.emit(FsEvent::Written(file.clone()));
        Ok(file.to_file_attr())
    }

    /// Releases a handle.
    pub fn release(&self, fh: u64) -> Result<(), FsError> {
        let handle = self
            .handles
            .write()
            .remove(&fh)
            .ok_or(FsError::BadHandle(fh))?;
        let file = self.entry(handle.inode)?;
        self.namespace.emit(FsEvent::Closed(file));
        Ok(())
    }

    /// Signals unmount to listeners.
    pub fn unmount(&self) {
        info!(files = self.namespace.len(), "Unmounting ramdisk");
        self.namespace.emit(FsEvent::Unmount);
    }

    /// Returns the number of open handles.
    pub fn open_handles(&self) -> usize {
        self.handles.read().len()
    }

    fn entry(&self, inode: InodeId) -> Result<Arc<FileEntry>, FsError> {
        self.namespace
            .lookup_by_inode(inode)
            .ok_or_else(|| FsError::NotFound(format!("inode {}", inode)))
    }

    fn handle(&self, fh: u64) -> Result<OpenHandle, FsError> {
        self.handles
            .read()
            .get(&fh)
            .copied()
            .ok_or(FsError::BadHandle(fh))
    }

    fn allocate_handle(&self, inode: InodeId, read: bool, write: bool) -> u64 {
        let fh = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles
            .write()
            .insert(fh, OpenHandle { inode, read, write });
        fh
    }
}

/// Splits open flags into (read, write) access.
fn access_mode(flags: i32) -> (bool, bool) {
    let mode = flags & libc::O_ACCMODE;
    (mode != libc::O_WRONLY, mode != libc::O_RDONLY)
}

fn to_offset(offset: i64) -> Result<usize, FsError> {
    usize::try_from(offset).map_err(|_| FsError::InvalidOffset(offset))
}

impl Filesystem for RamFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = name.to_string_lossy();
        debug!(parent = parent, name = %name, "lookup");

        if !InodeId(parent).is_root() {
            reply.error(libc::ENOENT);
            return;
        }

        match RamFs::lookup(self, &name) {
            Ok(file) => reply.entry(&TTL, &file.to_file_attr(), 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        debug!(ino = ino, "getattr");

        match RamFs::getattr(self, InodeId(ino)) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    // Size changes truncate or extend the file. Other attribute changes are
    // accepted and ignored.
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!(ino = ino, size = ?size, "setattr");

        let result = match size {
            Some(_) if InodeId(ino).is_root() => {
                reply.error(libc::EISDIR);
                return;
            }
            Some(size) => RamFs::truncate(self, InodeId(ino), size),
            None => RamFs::getattr(self, InodeId(ino)),
        };

        match result {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!(ino = ino, offset = offset, "readdir");

        if !InodeId(ino).is_root() {
            let errno = if self.namespace.lookup_by_inode(InodeId(ino)).is_some() {
                libc::ENOTDIR
            } else {
                libc::ENOENT
            };
            reply.error(errno);
            return;
        }

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ino, FileType::Directory, "..".to_string()),
        ];
        entries.extend(
            RamFs::readdir(self)
                .into_iter()
                .map(|entry| (entry.inode.0, entry.kind.to_file_type(), entry.name)),
        );

        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }

        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!(ino = ino, flags = flags, "open");

        if InodeId(ino).is_root() {
            reply.error(libc::EISDIR);
            return;
        }

        match RamFs::open(self, InodeId(ino), flags) {
            Ok(fh) => reply.opened(fh, fuser::consts::FOPEN_DIRECT_IO),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!(ino = ino, fh = fh, offset = offset, size = size, "read");

        match RamFs::read(self, fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!(
            ino = ino,
            fh = fh,
            offset = offset,
            size = data.len(),
            "write"
        );

        match RamFs::write(self, fh, offset, data) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!(ino = ino, fh = fh, "release");

        match RamFs::release(self, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let name = name.to_string_lossy();
        debug!(parent = parent, name = %name, mode = mode, "create");

        if !InodeId(parent).is_root() {
            reply.error(libc::ENOENT);
            return;
        }

        match RamFs::create(self, &name) {
            Ok((file, fh)) => reply.created(&TTL, &file.to_file_attr(), 0, fh, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn destroy(&mut self) {
        self.unmount();
    }
}
