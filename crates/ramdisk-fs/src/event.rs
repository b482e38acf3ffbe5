//! File lifecycle events.

use std::fmt;
use std::sync::Arc;

use ramdisk_bus::{EventBus, Listener};

use crate::file::FileEntry;

/// Event bus carrying filesystem events.
pub type FsEventBus = EventBus<FsEvent>;

/// Listener for filesystem events.
pub type FsListener = Listener<FsEvent>;

/// A file lifecycle occurrence.
///
/// File events carry a shared reference to the record, so metadata read at
/// delivery time may be newer than at emission.
#[derive(Debug, Clone)]
pub enum FsEvent {
    /// A file was created
    Created(Arc<FileEntry>),
    /// A file was opened
    Opened(Arc<FileEntry>),
    /// A file was read
    Read(Arc<FileEntry>),
    /// A file was written
    Written(Arc<FileEntry>),
    /// A file handle was released
    Closed(Arc<FileEntry>),
    /// The filesystem is being unmounted
    Unmount,
}

/// Discriminant of [`FsEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`FsEvent::Created`]
    Created,
    /// See [`FsEvent::Opened`]
    Opened,
    /// See [`FsEvent::Read`]
    Read,
    /// See [`FsEvent::Written`]
    Written,
    /// See [`FsEvent::Closed`]
    Closed,
    /// See [`FsEvent::Unmount`]
    Unmount,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [EventKind; 6] = [
        EventKind::Created,
        EventKind::Opened,
        EventKind::Read,
        EventKind::Written,
        EventKind::Closed,
        EventKind::Unmount,
    ];

    /// Returns the subject string used in logs.
    pub fn subject(&self) -> &'static str {
        match self {
            EventKind::Created => "file.created",
            EventKind::Opened => "file.opened",
            EventKind::Read => "file.read",
            EventKind::Written => "file.written",
            EventKind::Closed => "file.closed",
            EventKind::Unmount => "fs.unmount",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subject())
    }
}

impl FsEvent {
    /// Returns the event kind.
    pub fn kind(&self) -> EventKind {
        match self {
            FsEvent::Created(_) => EventKind::Created,
            FsEvent::Opened(_) => EventKind::Opened,
            FsEvent::Read(_) => EventKind::Read,
            FsEvent::Written(_) => EventKind::Written,
            FsEvent::Closed(_) => EventKind::Closed,
            FsEvent::Unmount => EventKind::Unmount,
        }
    }

    /// Returns the affected file, if any.
    pub fn file(&self) -> Option<&Arc<FileEntry>> {
        match self {
            FsEvent::Created(file)
            | FsEvent::Opened(file)
            | FsEvent::Read(file)
            | FsEvent::Written(file)
            | FsEvent::Closed(file) => Some(file),
            FsEvent::Unmount => None,
        }
    }

    /// Returns the subject string used in logs.
    pub fn subject(&self) -> &'static str {
        self.kind().subject()
    }

    /// Returns true for the unmount signal.
    pub fn is_unmount(&self) -> bool {
        matches!(self, FsEvent::Unmount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::InodeId;

    #[test]
    fn test_kind_and_file() {
        let file = Arc::new(FileEntry::new(InodeId(5), "f".to_string(), true, Vec::new()));

        let event = FsEvent::Written(file.clone());
        assert_eq!(event.kind(), EventKind::Written);
        assert_eq!(event.subject(), "file.written");
        assert_eq!(event.file().map(|f| f.inode()), Some(InodeId(5)));

        assert!(FsEvent::Unmount.file().is_none());
        assert!(FsEvent::Unmount.is_unmount());
    }

    #[test]
    fn test_event_reflects_current_metadata() {
        let file = Arc::new(FileEntry::new(InodeId(5), "f".to_string(), true, Vec::new()));
        let event = FsEvent::Created(file.clone());

        file.write(0, b"later").unwrap();
        assert_eq!(event.file().unwrap().size(), 5);
    }

    #[test]
    fn test_subjects_unique() {
        let mut subjects: Vec<_> = EventKind::ALL.iter().map(|k| k.subject()).collect();
        subjects.sort();
        subjects.dedup();
        assert_eq!(subjects.len(), EventKind::ALL.len());
    }
}
