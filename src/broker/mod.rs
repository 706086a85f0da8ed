//! # Message broker contract.
//!
//! The server never implements pub/sub itself. It connects a [`Broker`] during
//! start, arms one broker subscription per [`Subscription`](crate::Subscription)
//! during registration and keeps the returned [`Binding`] until deregistration.
//!
//! ```text
//! Server::register ──► Broker::subscribe(ctx, topic, handler, opts) ──► Box<dyn Binding>
//!                                      │
//!                          BrokerEvent ▼
//!                            Dispatcher::dispatch ──► handlers (fan-out)
//!
//! Server::deregister ──► Binding::unsubscribe(ctx)   (all bindings, concurrently)
//! ```
//!
//! [`MemoryBroker`] is an in-process implementation used by default and in tests.

mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

use crate::context::Context;
use crate::error::{BrokerError, ServerError};

pub use memory::{BindingInfo, MemoryBroker};

/// One inbound event as delivered by the broker.
#[derive(Debug, Clone, Default)]
pub struct BrokerEvent {
    /// Headers, including the reserved `Content-Type` key.
    pub header: HashMap<String, String>,
    /// Raw body.
    pub body: Bytes,
}

impl BrokerEvent {
    /// Creates an event with the given content type and body.
    pub fn new(content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut header = HashMap::new();
        header.insert(crate::codec::CONTENT_TYPE.to_string(), content_type.to_string());
        Self {
            header,
            body: body.into(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }
}

/// Callback the broker invokes for every delivered event.
pub type BrokerHandler =
    Arc<dyn Fn(BrokerEvent) -> BoxFuture<'static, Result<(), ServerError>> + Send + Sync>;

/// Options passed with [`Broker::subscribe`].
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// Consumer group; each event goes to one member of the group.
    pub queue: Option<String>,
    /// Acknowledge automatically once the handler returns.
    pub auto_ack: bool,
    /// Context governing the subscription.
    pub context: Context,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            queue: None,
            auto_ack: true,
            context: Context::background(),
        }
    }
}

/// Live broker subscription.
#[async_trait]
pub trait Binding: Send + Sync + 'static {
    /// Topic this binding listens on.
    fn topic(&self) -> &str;

    /// Removes the subscription from the broker.
    async fn unsubscribe(&self, ctx: &Context) -> Result<(), BrokerError>;
}

/// Publish/subscribe transport.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Broker name, advertised in node metadata.
    fn name(&self) -> &str;

    /// Opens the broker connection.
    async fn connect(&self, ctx: &Context) -> Result<(), BrokerError>;

    /// Closes the broker connection.
    async fn disconnect(&self, ctx: &Context) -> Result<(), BrokerError>;

    /// Subscribes `handler` to `topic`.
    async fn subscribe(
        &self,
        ctx: &Context,
        topic: &str,
        handler: BrokerHandler,
        opts: SubscribeOptions,
    ) -> Result<Box<dyn Binding>, BrokerError>;
}
