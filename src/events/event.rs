//! # Runtime events emitted by the server.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Acceptor events**: listening, backoff after temporary accept errors, fatal accept errors
//! - **Registration events**: directory advertisement, withdrawal and health checks
//! - **Subscription events**: broker bindings armed and torn down
//!
//! The [`Event`] struct carries optional metadata such as the topic, node id,
//! listener address, backoff delay and error message.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use servisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::AcceptBackoff)
//!     .with_delay(Duration::from_millis(5))
//!     .with_error("connection aborted");
//!
//! assert_eq!(ev.kind, EventKind::AcceptBackoff);
//! assert_eq!(ev.delay, Some(Duration::from_millis(5)));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Acceptor ===
    /// Listener bound and accepting.
    ///
    /// Sets: `addr`
    Listening,

    /// Temporary accept error; the acceptor sleeps before retrying.
    ///
    /// Sets: `delay`, `attempt` (consecutive failures, 1-based), `error`
    AcceptBackoff,

    /// Non-temporary accept error; the acceptor loop terminated.
    ///
    /// Sets: `error`
    AcceptFailed,

    // === Registration ===
    /// Service advertised to the directory (cold or warm path).
    ///
    /// Sets: `node`
    Registered,

    /// Advertisement failed.
    ///
    /// Sets: `node`, `error`
    RegisterFailed,

    /// Service withdrawn from the directory.
    ///
    /// Sets: `node`
    Deregistered,

    /// Withdrawal failed.
    ///
    /// Sets: `node`, `error`
    DeregisterFailed,

    /// Health predicate reported the service unhealthy.
    ///
    /// Sets: `node`, `error`
    HealthCheckFailed,

    // === Subscriptions ===
    /// Subscription armed on the broker.
    ///
    /// Sets: `topic`
    Subscribed,

    /// Broker binding removed.
    ///
    /// Sets: `topic`
    Unsubscribed,

    /// Broker binding could not be removed (logged, not propagated).
    ///
    /// Sets: `topic`, `error`
    UnsubscribeFailed,

    // === Lifecycle ===
    /// Stop sequence finished.
    Stopped,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Topic, for subscription events.
    pub topic: Option<Arc<str>>,
    /// Node id, for registration events.
    pub node: Option<Arc<str>>,
    /// Listener address.
    pub addr: Option<Arc<str>>,
    /// Backoff delay.
    pub delay: Option<Duration>,
    /// Consecutive failure count (starting from 1).
    pub attempt: Option<u32>,
    /// Human-readable error.
    pub error: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            topic: None,
            node: None,
            addr: None,
            delay: None,
            attempt: None,
            error: None,
        }
    }

    /// Attaches a topic.
    #[inline]
    pub fn with_topic(mut self, topic: impl Into<Arc<str>>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Attaches a node id.
    #[inline]
    pub fn with_node(mut self, node: impl Into<Arc<str>>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Attaches a listener address.
    #[inline]
    pub fn with_addr(mut self, addr: impl Into<Arc<str>>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    /// Attaches a backoff delay.
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }

    /// Attaches a consecutive failure count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches an error message.
    #[inline]
    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string().into());
        self
    }
}
