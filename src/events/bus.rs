//! # Broadcast bus for runtime events.
//!
//! The acceptor, the registration paths and the coordinator publish here;
//! callers observe through [`Server::events`](crate::Server::events).
//!
//! Publishing never blocks and never fails: with no receiver attached the event
//! is dropped, and a receiver that falls more than `capacity` events behind gets
//! `RecvError::Lagged(n)` and skips the `n` oldest.

use tokio::sync::broadcast;

use super::event::Event;

/// Runtime event channel shared by one server and its background tasks.
#[derive(Clone, Debug)]
pub struct Bus {
    sender: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus holding up to `capacity` undelivered events (min 1).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends `event` to every attached receiver.
    pub fn publish(&self, event: Event) {
        tracing::trace!(seq = event.seq, kind = ?event.kind, "runtime event");
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    /// Attaches a receiver seeing events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn receivers_only_see_later_events() {
        let bus = Bus::new(4);
        bus.publish(Event::new(EventKind::Listening));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::Stopped));

        assert_eq!(rx.try_recv().unwrap().kind, EventKind::Stopped);
        assert!(rx.try_recv().is_err());
    }
}
