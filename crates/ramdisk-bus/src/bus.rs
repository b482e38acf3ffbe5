//! Event bus: shared FIFO, dispatcher task and listener registration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::listener::{self, Listener, ListenerSlot, Offer};
use crate::{BusError, DEFAULT_LISTENER_BACKLOG, DEFAULT_LISTENER_CAPACITY};

/// Event bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Capacity of each listener's bounded queue
    pub listener_capacity: usize,
    /// Events held for a listener whose queue is full before new ones are
    /// dropped for it
    pub listener_backlog: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            listener_capacity: DEFAULT_LISTENER_CAPACITY,
            listener_backlog: DEFAULT_LISTENER_BACKLOG,
        }
    }
}

impl BusConfig {
    /// Creates a configuration with the given listener capacity.
    pub fn with_listener_capacity(listener_capacity: usize) -> Self {
        Self {
            listener_capacity,
            ..Default::default()
        }
    }
}

/// Bus statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    /// Events accepted by publishers
    pub published: u64,
    /// Events fanned out by the dispatcher
    pub dispatched: u64,
    /// Listeners registered over the bus lifetime
    pub listeners: u64,
    /// Events dropped for listeners that fell behind
    pub lagged: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    dispatched: AtomicU64,
    listeners: AtomicU64,
    lagged: AtomicU64,
}

/// Entries of the shared FIFO.
pub(crate) enum BusCommand<T> {
    /// An event to fan out
    Publish(T),
    /// A listener joining the broadcast set
    Register(ListenerSlot<T>),
    /// Stop accepting input and drain
    Shutdown,
}

/// Cloneable producer handle.
///
/// Publishing never waits on delivery and never observes listener state.
pub struct Publisher<T> {
    tx: mpsc::UnboundedSender<BusCommand<T>>,
    counters: Arc<Counters>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            counters: self.counters.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<T> Publisher<T> {
    /// Enqueues an event for delivery.
    pub fn publish(&self, event: T) -> Result<(), BusError> {
        self.tx
            .send(BusCommand::Publish(event))
            .map_err(|_| BusError::Closed)?;
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns true once the dispatcher stopped accepting events.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Decoupled pub/sub bus for a single event type.
pub struct EventBus<T> {
    config: BusConfig,
    publisher: Publisher<T>,
    runtime: Handle,
    next_listener: AtomicU64,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl<T> EventBus<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a bus whose tasks run on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(config: BusConfig) -> Self {
        Self::with_handle(config, Handle::current())
    }

    /// Creates a bus whose tasks run on the given runtime.
    pub fn with_handle(config: BusConfig, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        let dispatcher = runtime.spawn(dispatch(rx, counters.clone()));

        Self {
            config,
            publisher: Publisher { tx, counters },
            runtime,
            next_listener: AtomicU64::new(1),
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Returns a producer handle.
    pub fn publisher(&self) -> Publisher<T> {
        self.publisher.clone()
    }

    /// Publishes an event through the bus's own producer handle.
    pub fn publish(&self, event: T) -> Result<(), BusError> {
        self.publisher.publish(event)
    }

    /// Registers a listener with the configured queue capacity.
    pub fn subscribe(&self) -> Result<Listener<T>, BusError> {
        self.subscribe_with_capacity(self.config.listener_capacity)
    }

    /// Registers a listener with its own queue capacity.
    ///
    /// The dispatcher incorporates the listener before it dequeues anything
    /// published after this call returns; nothing earlier is replayed.
    pub fn subscribe_with_capacity(&self, capacity: usize) -> Result<Listener<T>, BusError> {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let (slot, listener, delivery) = listener::channel(id, capacity, self.config.listener_backlog);

        self.publisher
            .tx
            .send(BusCommand::Register(slot))
            .map_err(|_| BusError::Closed)?;
        self.runtime.spawn(delivery);
        self.publisher
            .counters
            .listeners
            .fetch_add(1, Ordering::Relaxed);

        debug!(listener = id, capacity, "Listener registered");
        Ok(listener)
    }

    /// Returns bus statistics.
    pub fn stats(&self) -> BusStats {
        let counters = &self.publisher.counters;
        BusStats {
            published: counters.published.load(Ordering::Relaxed),
            dispatched: counters.dispatched.load(Ordering::Relaxed),
            listeners: counters.listeners.load(Ordering::Relaxed),
            lagged: counters.lagged.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting events and listeners.
    ///
    /// Everything already queued is still delivered.
    pub fn shutdown(&self) {
        if self.publisher.tx.send(BusCommand::Shutdown).is_err() {
            trace!("Shutdown requested on a closed bus");
        }
    }

    /// Waits for the dispatcher to finish.
    ///
    /// A dispatcher that panicked is reported as an internal inconsistency.
    pub async fn join(&self) -> Result<(), BusError> {
        let handle = self.dispatcher.lock().take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| BusError::InternalInconsistency(format!("dispatcher failed: {}", e))),
            None => Ok(()),
        }
    }
}

/// Dispatcher loop. Blocks on the FIFO while idle.
async fn dispatch<T>(mut rx: mpsc::UnboundedReceiver<BusCommand<T>>, counters: Arc<Counters>)
where
    T: Clone + Send + 'static,
{
    let mut listeners: Vec<ListenerSlot<T>> = Vec::new();

    while let Some(command) = rx.recv().await {
        match command {
            BusCommand::Publish(event) => {
                listeners.retain(|slot| match slot.offer(event.clone()) {
                    Offer::Queued => true,
                    Offer::Lagged => {
                        counters.lagged.fetch_add(1, Ordering::Relaxed);
                        trace!(listener = slot.id(), "Listener backlog full, event dropped");
                        true
                    }
                    Offer::Closed => {
                        debug!(listener = slot.id(), "Pruned dropped listener");
                        false
                    }
                });
                counters.dispatched.fetch_add(1, Ordering::Relaxed);
            }
            BusCommand::Register(slot) => {
                trace!(listener = slot.id(), "Listener joined broadcast set");
                listeners.push(slot);
            }
            BusCommand::Shutdown => {
                debug!("Event bus shutting down");
                rx.close();
            }
        }
    }

    debug!(listeners = listeners.len(), "Dispatcher stopped");
}
