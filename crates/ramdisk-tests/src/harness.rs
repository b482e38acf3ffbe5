//! Test harness pairing a filesystem with its event bus.

use std::sync::Arc;
use std::time::Duration;

use ramdisk_bus::BusConfig;
use ramdisk_fs::{FileEntry, FsEvent, FsEventBus, FsListener, InodeId, RamFs};
use tracing::debug;

/// How long a harness waits for a single event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// A filesystem and the bus it publishes to.
pub struct TestFs {
    /// Event bus
    pub bus: FsEventBus,
    /// Filesystem facade
    pub fs: Arc<RamFs>,
}

impl TestFs {
    /// Creates a harness on the current tokio runtime.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Creates a harness with a custom bus configuration.
    pub fn with_config(config: BusConfig) -> Self {
        let bus = FsEventBus::new(config);
        let fs = Arc::new(RamFs::with_bus(&bus));
        Self { bus, fs }
    }

    /// Registers a listener.
    pub fn listener(&self) -> FsListener {
        self.bus.subscribe().expect("bus is running")
    }

    /// Creates a file, writes `data` at offset 0 and closes it.
    pub fn write_file(&self, name: &str, data: &[u8]) -> Arc<FileEntry> {
        let (file, fh) = self.fs.create(name).expect("create");
        self.fs.write(fh, 0, data).expect("write");
        self.fs.release(fh).expect("release");
        file
    }

    /// Opens `inode` read-only, reads everything and closes it.
    pub fn read_file(&self, inode: InodeId) -> Vec<u8> {
        let fh = self.fs.open(inode, libc::O_RDONLY).expect("open");
        let data = self.fs.read(fh, 0, u32::MAX).expect("read");
        self.fs.release(fh).expect("release");
        data
    }

    /// Receives exactly `count` events, panicking on timeout.
    pub async fn collect(listener: &mut FsListener, count: usize) -> Vec<FsEvent> {
        let mut events = Vec::with_capacity(count);
        while events.len() < count {
            match listener.recv_timeout(EVENT_TIMEOUT).await {
                Some(event) => events.push(event),
                None => panic!(
                    "listener {} timed out after {} of {} events",
                    listener.id(),
                    events.len(),
                    count
                ),
            }
        }
        debug!(listener = listener.id(), count, "Collected events");
        events
    }
}

impl Default for TestFs {
    fn default() -> Self {
        Self::new()
    }
}
