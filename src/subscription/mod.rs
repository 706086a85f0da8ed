//! # Subscriptions: topic + ordered handlers + delivery options.
//!
//! A [`Subscription`] is registered with [`Server::subscribe`](crate::Server::subscribe)
//! and armed on the broker by the next registration cycle. Every inbound event
//! on its topic is decoded once per handler and fanned out to all of them
//! concurrently (see `dispatch`).
//!
//! ## Identity
//! Each subscription receives a [`SubscriptionId`] when it is built. Clones
//! share the id, so registering a clone of an already registered subscription
//! is rejected as a duplicate.
//!
//! ## Example
//! ```rust
//! use serde::Deserialize;
//! use servisor::{Context, EventHandler, HandlerError, Subscription};
//!
//! #[derive(Deserialize)]
//! struct Order { id: u64 }
//!
//! let sub = Subscription::builder("orders")
//!     .handler(EventHandler::func(|_ctx: Context, _o: Order| async {
//!         Ok::<(), HandlerError>(())
//!     }))
//!     .queue("billing")
//!     .build();
//!
//! assert_eq!(sub.topic(), "orders");
//! assert_eq!(sub.endpoints()[0].metadata["subscriber"], "true");
//! ```

mod dispatch;
mod handler;
mod validate;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::context::Context;
use crate::directory::Endpoint;
use crate::error::HandlerError;

pub(crate) use dispatch::Dispatcher;
pub use handler::{
    DecodeFn, EventHandler, HandlerKind, Param, Payload, Signature, SubscriberFn,
    SubscriberWrapper, TypeRef, decoder,
};
pub(crate) use validate::validate;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Delivery options of a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    /// Acknowledge automatically once handlers return (default `true`).
    pub auto_ack: bool,
    /// Consumer group.
    pub queue: Option<String>,
    /// Internal subscriptions are neither advertised nor armed.
    pub internal: bool,
    /// Context override; the server context is used when `None`.
    pub context: Option<Context>,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            auto_ack: true,
            queue: None,
            internal: false,
            context: None,
        }
    }
}

struct Inner {
    id: SubscriptionId,
    topic: String,
    handlers: Vec<EventHandler>,
    endpoints: Vec<Endpoint>,
    options: SubscriptionOptions,
}

/// Topic plus the handlers consuming it.
///
/// Cheap to clone; clones share identity.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<Inner>,
}

impl Subscription {
    /// Subscription with a single handler and default options.
    pub fn new(topic: impl Into<String>, handler: EventHandler) -> Self {
        Self::builder(topic).handler(handler).build()
    }

    /// Starts building a subscription on `topic`.
    pub fn builder(topic: impl Into<String>) -> SubscriptionBuilder {
        SubscriptionBuilder {
            topic: topic.into(),
            handlers: Vec::new(),
            options: SubscriptionOptions::default(),
        }
    }

    /// Identity.
    pub fn id(&self) -> SubscriptionId {
        self.inner.id
    }

    /// Topic.
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// Handlers, in registration order.
    pub fn handlers(&self) -> &[EventHandler] {
        &self.inner.handlers
    }

    /// Delivery options.
    pub fn options(&self) -> &SubscriptionOptions {
        &self.inner.options
    }

    /// One endpoint per handler, tagged with `topic` and `subscriber=true`.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.inner.endpoints
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("topic", &self.inner.topic)
            .field("handlers", &self.inner.handlers.len())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Builder for [`Subscription`].
pub struct SubscriptionBuilder {
    topic: String,
    handlers: Vec<EventHandler>,
    options: SubscriptionOptions,
}

impl SubscriptionBuilder {
    /// Appends a handler.
    pub fn handler(mut self, handler: EventHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Joins a consumer group.
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.options.queue = Some(queue.into());
        self
    }

    /// Hides the subscription from the directory and the broker.
    pub fn internal(mut self, internal: bool) -> Self {
        self.options.internal = internal;
        self
    }

    /// Sets the auto-acknowledge flag.
    pub fn auto_ack(mut self, auto_ack: bool) -> Self {
        self.options.auto_ack = auto_ack;
        self
    }

    /// Overrides the context used for the broker subscription and dispatch.
    pub fn context(mut self, ctx: Context) -> Self {
        self.options.context = Some(ctx);
        self
    }

    /// Finalizes the subscription and assigns its identity.
    pub fn build(self) -> Subscription {
        let endpoints = self
            .handlers
            .iter()
            .map(|h| Endpoint {
                name: h.name(),
                request: h.signature().payload().map(ToString::to_string),
                metadata: HashMap::from([
                    ("topic".to_string(), self.topic.clone()),
                    ("subscriber".to_string(), "true".to_string()),
                ]),
            })
            .collect();

        Subscription {
            inner: Arc::new(Inner {
                id: SubscriptionId::next(),
                topic: self.topic,
                handlers: self.handlers,
                endpoints,
                options: self.options,
            }),
        }
    }
}

/// Event as seen by one handler invocation.
pub struct Message {
    topic: String,
    content_type: String,
    header: Arc<HashMap<String, String>>,
    body: Bytes,
    payload: Payload,
}

impl Message {
    pub(crate) fn new(
        topic: &str,
        content_type: &str,
        header: Arc<HashMap<String, String>>,
        body: Bytes,
        payload: Payload,
    ) -> Self {
        Self {
            topic: topic.to_string(),
            content_type: content_type.to_string(),
            header,
            body,
            payload,
        }
    }

    /// Topic the event arrived on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Content type of the raw body.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Inbound headers, `Content-Type` included.
    pub fn header(&self) -> &HashMap<String, String> {
        &self.header
    }

    /// Raw body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decoded payload, if it is a `T`.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Takes the decoded payload as a `T`.
    pub fn into_payload<T: Any>(self) -> Result<T, HandlerError> {
        self.payload
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| {
                HandlerError::new(format!(
                    "payload is not a {}",
                    std::any::type_name::<T>()
                ))
            })
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("topic", &self.topic)
            .field("content_type", &self.content_type)
            .field("header", &self.header)
            .field("body", &self.body.len())
            .finish_non_exhaustive()
    }
}
