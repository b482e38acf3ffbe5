//! Flat namespace of file records.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use ramdisk_bus::Publisher;
use tracing::{debug, trace};

use crate::event::FsEvent;
use crate::file::FileEntry;
use crate::inode::{InodeAllocator, InodeId, InodeType};
use crate::FsError;

/// A directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name
    pub name: String,
    /// Inode ID
    pub inode: InodeId,
    /// Entry type
    pub kind: InodeType,
}

#[derive(Default)]
struct Entries {
    /// Records in insertion order
    files: Vec<Arc<FileEntry>>,
    by_name: HashMap<String, usize>,
    by_inode: HashMap<InodeId, usize>,
}

/// The single directory of the filesystem.
///
/// Owns every record. Lookups and listings share a read lock; creation
/// takes the write lock so the existence check and insert are atomic.
pub struct Namespace {
    inodes: InodeAllocator,
    entries: RwLock<Entries>,
    events: Publisher<FsEvent>,
}

impl Namespace {
    /// Creates an empty namespace publishing to `events`.
    pub fn new(events: Publisher<FsEvent>) -> Self {
        Self {
            inodes: InodeAllocator::new(),
            entries: RwLock::new(Entries::default()),
            events,
        }
    }

    /// Looks up a record by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<FileEntry>> {
        let entries = self.entries.read();
        entries
            .by_name
            .get(name)
            .map(|&index| entries.files[index].clone())
    }

    /// Looks up a record by inode.
    pub fn lookup_by_inode(&self, inode: InodeId) -> Option<Arc<FileEntry>> {
        let entries = self.entries.read();
        entries
            .by_inode
            .get(&inode)
            .map(|&index| entries.files[index].clone())
    }

    /// Creates an empty writable file.
    pub fn create(&self, name: &str) -> Result<Arc<FileEntry>, FsError> {
        self.insert(name, true, Vec::new())
    }

    /// Creates a read-only file with fixed contents.
    pub fn create_read_only(&self, name: &str, contents: Vec<u8>) -> Result<Arc<FileEntry>, FsError> {
        self.insert(name, false, contents)
    }

    fn insert(&self, name: &str, writable: bool, data: Vec<u8>) -> Result<Arc<FileEntry>, FsError> {
        if name.is_empty() {
            return Err(FsError::InvalidName);
        }

        let mut entries = self.entries.write();
        if entries.by_name.contains_key(name) {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        let file = Arc::new(FileEntry::new(
            self.inodes.next(),
            name.to_string(),
            writable,
            data,
        ));
        let index = entries.files.len();
        entries.files.push(file.clone());
        entries.by_name.insert(name.to_string(), index);
        entries.by_inode.insert(file.inode(), index);

        // Queued under the lock: nobody can open the file before its
        // Created event is in the FIFO.
        self.emit(FsEvent::Created(file.clone()));
        drop(entries);

        debug!(name = name, inode = file.inode().0, writable, "Created file");
        Ok(file)
    }

    /// Lists all entries in insertion order.
    pub fn list(&self) -> Vec<DirEntry> {
        self.entries
            .read()
            .files
            .iter()
            .map(|file| DirEntry {
                name: file.name().to_string(),
                inode: file.inode(),
                kind: InodeType::File,
            })
            .collect()
    }

    /// Returns the number of files.
    pub fn len(&self) -> usize {
        self.entries.read().files.len()
    }

    /// Returns true if there are no files.
    pub fn is_empty(&self) -> bool {
        self.entries.read().files.is_empty()
    }

    /// Returns the event publisher.
    pub fn publisher(&self) -> &Publisher<FsEvent> {
        &self.events
    }

    /// Publishes an event. A closed bus does not fail the operation.
    pub(crate) fn emit(&self, event: FsEvent) {
        let subject = event.subject();
        if self.events.publish(event).is_err() {
            trace!(subject, "Event bus closed, dropping event");
        }
    }
}
