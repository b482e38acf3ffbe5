//! Listeners and their delivery tasks.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

/// Outcome of offering an event to a listener.
pub(crate) enum Offer {
    /// Queued for delivery
    Queued,
    /// Backlog full; the event was dropped for this listener
    Lagged,
    /// The listener is gone
    Closed,
}

/// Dispatcher-side half of a listener.
///
/// The dispatcher offers events here without waiting; the delivery task
/// moves them into the listener's bounded queue.
pub(crate) struct ListenerSlot<T> {
    id: u64,
    inbox: mpsc::Sender<T>,
    lagged: Arc<AtomicU64>,
}

impl<T> ListenerSlot<T> {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Hands an event to the delivery task without waiting.
    pub(crate) fn offer(&self, event: T) -> Offer {
        match self.inbox.try_send(event) {
            Ok(()) => Offer::Queued,
            Err(TrySendError::Full(_)) => {
                self.lagged.fetch_add(1, Ordering::Relaxed);
                Offer::Lagged
            }
            Err(TrySendError::Closed(_)) => Offer::Closed,
        }
    }
}

/// Creates the slot, the listener and the delivery task joining them.
///
/// At most `backlog + capacity + 1` events are buffered for the listener:
/// the inbox, the queue and the one event the delivery task is handing over.
pub(crate) fn channel<T>(
    id: u64,
    capacity: usize,
    backlog: usize,
) -> (ListenerSlot<T>, Listener<T>, impl Future<Output = ()> + Send + 'static)
where
    T: Send + 'static,
{
    let (inbox_tx, inbox_rx) = mpsc::channel(backlog.max(1));
    let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));
    let lagged = Arc::new(AtomicU64::new(0));

    let slot = ListenerSlot {
        id,
        inbox: inbox_tx,
        lagged: lagged.clone(),
    };
    let listener = Listener {
        id,
        rx: queue_rx,
        lagged,
    };

    (slot, listener, deliver(id, inbox_rx, queue_tx))
}

async fn deliver<T>(id: u64, mut inbox: mpsc::Receiver<T>, queue: mpsc::Sender<T>) {
    while let Some(event) = inbox.recv().await {
        if queue.send(event).await.is_err() {
            trace!(listener = id, "Listener dropped, stopping delivery");
            return;
        }
    }
    trace!(listener = id, "Delivery finished");
}

/// Receiving end of a registration.
///
/// Events arrive in publication order. A listener that falls behind by more
/// than its backlog plus queue capacity misses the newest events instead of
/// buffering without limit; [`Listener::lagged`] counts them. Dropping the
/// listener unregisters it the next time the dispatcher tries to deliver.
#[derive(Debug)]
pub struct Listener<T> {
    id: u64,
    rx: mpsc::Receiver<T>,
    lagged: Arc<AtomicU64>,
}

impl<T> Listener<T> {
    /// Returns the registration id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns how many events were dropped because this listener fell behind.
    pub fn lagged(&self) -> u64 {
        self.lagged.load(Ordering::Relaxed)
    }

    /// Receives the next event. `None` once the bus has shut down and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Receives the next event, giving up after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Returns a queued event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Blocking receive for consumers outside the async runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async context.
    pub fn blocking_recv(&mut self) -> Option<T> {
        self.rx.blocking_recv()
    }
}

#[cfg(test)]
mod tests {
    use crate::{BusConfig, EventBus};
    use std::time::Duration;

    #[tokio::test]
    async fn test_slow_listener_does_not_stall_others() {
        let bus = EventBus::new(BusConfig::with_listener_capacity(2));
        let _stalled = bus.subscribe().unwrap();
        let mut active = bus.subscribe().unwrap();

        for i in 0..32u32 {
            bus.publish(i).unwrap();
        }

        for i in 0..32u32 {
            let got = active.recv_timeout(Duration::from_secs(5)).await;
            assert_eq!(got, Some(i));
        }
    }

    #[tokio::test]
    async fn test_stalled_listener_backlog_is_bounded() {
        let config = BusConfig {
            listener_capacity: 1,
            listener_backlog: 4,
        };
        let bus = EventBus::new(config);
        let mut stalled = bus.subscribe().unwrap();
        let mut active = bus.subscribe_with_capacity(64).unwrap();

        // The active listener keeps up; the stalled one never reads.
        for i in 0..50u32 {
            bus.publish(i).unwrap();
            assert_eq!(active.recv_timeout(Duration::from_secs(5)).await, Some(i));
        }
        assert_eq!(active.lagged(), 0);

        let mut received = Vec::new();
        while let Some(event) = stalled.recv_timeout(Duration::from_millis(100)).await {
            received.push(event);
        }

        // Buffered: backlog + capacity + the event in hand-over.
        assert!(received.len() <= 6);
        assert_eq!(received.len() as u64 + stalled.lagged(), 50);
        assert_eq!(bus.stats().lagged, stalled.lagged());
        // What did arrive is still in publication order.
        assert!(received.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_dropped_listener_is_pruned() {
        let bus = EventBus::new(BusConfig::default());
        let dropped = bus.subscribe().unwrap();
        let mut kept = bus.subscribe().unwrap();
        drop(dropped);

        for i in 0..4u32 {
            bus.publish(i).unwrap();
        }
        for i in 0..4u32 {
            assert_eq!(kept.recv().await, Some(i));
        }
        assert_eq!(bus.stats().listeners, 2);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus: EventBus<u8> = EventBus::new(BusConfig::default());
        let mut listener = bus.subscribe().unwrap();
        assert_eq!(listener.try_recv(), None);
    }

    #[test]
    fn test_blocking_recv_from_plain_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let bus = EventBus::with_handle(BusConfig::default(), runtime.handle().clone());
        let mut listener = bus.subscribe().unwrap();

        let publisher = bus.publisher();
        std::thread::spawn(move || {
            publisher.publish(42u64).unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(listener.blocking_recv(), Some(42));
        assert!(listener.id() > 0);
    }
}
