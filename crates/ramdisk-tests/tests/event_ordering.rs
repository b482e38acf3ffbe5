//! Event delivery tests.
//!
//! Covers:
//! - Lifecycle events for a single file
//! - Identical global order across listeners under concurrent producers
//! - Created preceding every other event of the same file
//! - No replay for late listeners
//! - Slow listeners not blocking others, with bounded buffering

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ramdisk_bus::BusConfig;
use ramdisk_fs::{EventKind, FsEvent, InodeId};
use ramdisk_tests::TestFs;

/// Initialize tracing for tests.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ramdisk_bus=debug,ramdisk_tests=debug")
        .with_test_writer()
        .try_init();
}

fn signature(events: &[FsEvent]) -> Vec<(EventKind, Option<InodeId>)> {
    events
        .iter()
        .map(|e| (e.kind(), e.file().map(|f| f.inode())))
        .collect()
}

#[tokio::test]
async fn test_file_lifecycle_notifications() {
    init_tracing();
    let t = TestFs::new();
    let mut listener = t.listener();

    let (file, fh) = t.fs.create("b1.txt").unwrap();
    t.fs.write(fh, 0, b"test").unwrap();
    assert_eq!(t.fs.read(fh, 0, 4).unwrap(), b"test");
    t.fs.release(fh).unwrap();

    let events = TestFs::collect(&mut listener, 4).await;
    let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Created,
            EventKind::Written,
            EventKind::Read,
            EventKind::Closed
        ]
    );
    assert!(events
        .iter()
        .all(|e| e.file().map(|f| f.inode()) == Some(file.inode())));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_listeners_agree_on_order() {
    init_tracing();
    let t = TestFs::new();
    let mut first = t.listener();
    let mut second = t.listener();

    const THREADS: usize = 6;
    const FILES: usize = 10;
    const EVENTS_PER_FILE: usize = 6;

    let producers: Vec<_> = (0..THREADS)
        .map(|thread| {
            let fs = Arc::clone(&t.fs);
            std::thread::spawn(move || {
                for n in 0..FILES {
                    let (file, fh) = fs.create(&format!("t{}-f{}", thread, n)).unwrap();
                    fs.write(fh, 0, b"payload").unwrap();
                    fs.release(fh).unwrap();

                    let fh = fs.open(file.inode(), libc::O_RDONLY).unwrap();
                    fs.read(fh, 0, 7).unwrap();
                    fs.release(fh).unwrap();
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    let total = THREADS * FILES * EVENTS_PER_FILE;
    let a = TestFs::collect(&mut first, total).await;
    let b = TestFs::collect(&mut second, total).await;
    assert_eq!(signature(&a), signature(&b));

    // Created is the first event seen for every file.
    let mut seen: HashMap<InodeId, Vec<EventKind>> = HashMap::new();
    for (kind, inode) in signature(&a) {
        seen.entry(inode.unwrap()).or_default().push(kind);
    }
    assert_eq!(seen.len(), THREADS * FILES);
    for kinds in seen.values() {
        assert_eq!(
            kinds,
            &vec![
                EventKind::Created,
                EventKind::Written,
                EventKind::Closed,
                EventKind::Opened,
                EventKind::Read,
                EventKind::Closed,
            ]
        );
    }
}

#[tokio::test]
async fn test_late_listener_gets_no_backfill() {
    init_tracing();
    let t = TestFs::new();

    for i in 0..5 {
        t.write_file(&format!("early-{}", i), b"x");
    }

    let mut late = t.listener();
    let file = t.write_file("late", b"y");

    let events = TestFs::collect(&mut late, 3).await;
    assert!(events
        .iter()
        .all(|e| e.file().map(|f| f.inode()) == Some(file.inode())));
    assert_eq!(events[0].kind(), EventKind::Created);
    assert!(late.recv_timeout(Duration::from_millis(100)).await.is_none());
}

#[tokio::test]
async fn test_stalled_listener_does_not_block_others() {
    init_tracing();
    let t = TestFs::with_config(BusConfig::with_listener_capacity(1));
    let mut stalled = t.listener();
    let mut active = t.listener();

    for i in 0..20 {
        t.write_file(&format!("f{}", i), b"data");
    }

    let events = TestFs::collect(&mut active, 60).await;
    assert_eq!(events.len(), 60);
    assert_eq!(t.bus.stats().published, 60);

    // Within its backlog the stalled listener loses nothing.
    let late = TestFs::collect(&mut stalled, 60).await;
    assert_eq!(signature(&late), signature(&events));
    assert_eq!(t.bus.stats().lagged, 0);
}

#[tokio::test]
async fn test_stalled_listener_memory_is_bounded() {
    init_tracing();
    let t = TestFs::with_config(BusConfig {
        listener_capacity: 1,
        listener_backlog: 8,
    });
    let mut stalled = t.listener();
    let mut active = t.listener();

    // Three events per file; the active listener drains after each file.
    for i in 0..20 {
        t.write_file(&format!("f{}", i), b"data");
        TestFs::collect(&mut active, 3).await;
    }
    assert_eq!(active.lagged(), 0);

    let mut received = 0u64;
    while stalled
        .recv_timeout(Duration::from_millis(100))
        .await
        .is_some()
    {
        received += 1;
    }

    assert!(received <= 8 + 1 + 1);
    assert!(stalled.lagged() > 0);
    assert_eq!(received + stalled.lagged(), 60);
    assert_eq!(t.bus.stats().lagged, stalled.lagged());
}

#[tokio::test]
async fn test_metadata_read_at_delivery() {
    init_tracing();
    let t = TestFs::new();
    let mut listener = t.listener();

    let (_, fh) = t.fs.create("grow").unwrap();
    t.fs.write(fh, 0, b"12345678").unwrap();

    let events = TestFs::collect(&mut listener, 2).await;
    // The Created event references the live record, which has since grown.
    assert_eq!(events[0].kind(), EventKind::Created);
    assert_eq!(events[0].file().unwrap().size(), 8);
    t.fs.release(fh).unwrap();
}

#[tokio::test]
async fn test_unmount_reaches_listeners_then_shutdown() {
    init_tracing();
    let t = TestFs::new();
    let mut listener = t.listener();

    t.write_file("last", b"z");
    t.fs.unmount();
    t.bus.shutdown();
    t.bus.join().await.unwrap();

    let events = TestFs::collect(&mut listener, 4).await;
    assert!(events[3].is_unmount());
    assert!(listener.recv().await.is_none());

    // Operations keep working once the bus is gone; events are dropped.
    let file = t.write_file("after", b"still stored");
    assert_eq!(file.contents(), b"still stored");
}
