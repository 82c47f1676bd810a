//! Decoupled event bus for cross-component signalling.
//!
//! The cancellation controller emits via [`EventBus::emit`] and in-flight
//! poll sessions subscribe via [`EventBus::subscribe`]. Built on
//! [`tokio::sync::broadcast`] so any number of sessions can listen
//! independently; a cancel cuts their current interval wait short instead
//! of letting them sleep it out.

use tokio::sync::broadcast;

/// Events that flow through the system.
#[derive(Debug, Clone)]
pub enum Event {
    /// Cancellation was requested for a task (carries the task id).
    CancelRequested { task_id: String },
}

/// A broadcast channel that any component can emit to or subscribe from.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all current subscribers.
    /// Returns the number of receivers that will see it.
    pub fn emit(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events. Returns a receiver that yields all
    /// future events (does not replay past ones).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(16)
    }
}
