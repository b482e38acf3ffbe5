//! Ramdisk Bus - decoupled event delivery.
//!
//! Producers publish into a single shared FIFO and return immediately. One
//! dispatcher task drains the FIFO and fans each event out to every
//! registered listener. Each listener owns a bounded queue fed by its own
//! delivery task through a bounded backlog, so a stalled listener only
//! stalls itself and never grows memory without limit: once its backlog is
//! full, new events are dropped for that listener and counted as lagged.
//!
//! Registration travels through the same FIFO as events: a listener sees
//! exactly the events published after its registration call returned.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod bus;
pub mod listener;

pub use bus::{BusConfig, BusStats, EventBus, Publisher};
pub use listener::Listener;

use thiserror::Error;

/// Default capacity of a listener's bounded queue.
pub const DEFAULT_LISTENER_CAPACITY: usize = 64;

/// Default number of events held back for a listener whose queue is full.
pub const DEFAULT_LISTENER_BACKLOG: usize = 1024;

/// Errors from the event bus.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus no longer accepts events or listeners
    #[error("Event bus closed")]
    Closed,

    /// The dispatcher hit a state it cannot interpret. Indicates a defect.
    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),
}
