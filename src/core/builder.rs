use std::sync::Arc;
use std::time::Duration;

use super::ServerConfig;
use super::health::RegisterCheck;
use super::server::Server;
use crate::broker::Broker;
use crate::codec::Codec;
use crate::context::Context;
use crate::directory::Directory;
use crate::net::ListenerSlot;
use crate::policies::BackoffPolicy;
use crate::subscription::SubscriberWrapper;

/// Builder for constructing a [`Server`].
pub struct ServerBuilder {
    cfg: ServerConfig,
}

impl ServerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: ServerConfig) -> Self {
        Self { cfg }
    }

    /// Sets the service name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.cfg.name = name.into();
        self
    }

    /// Sets the service version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.cfg.version = version.into();
        self
    }

    /// Sets the instance id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.cfg.id = id.into();
        self
    }

    /// Sets the bind address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.cfg.address = address.into();
        self
    }

    /// Sets the address advertised to the directory.
    pub fn with_advertise(mut self, advertise: impl Into<String>) -> Self {
        self.cfg.advertise = Some(advertise.into());
        self
    }

    /// Adds one node metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.cfg.metadata.insert(key.into(), value.into());
        self
    }

    /// Serves on a pre-bound socket instead of binding `address`.
    pub fn with_listener(mut self, listener: impl Into<ListenerSlot>) -> Self {
        self.cfg.listener = Some(listener.into());
        self
    }

    /// Terminates TLS on every accepted connection.
    ///
    /// Requires the `tls` feature flag.
    #[cfg(feature = "tls")]
    pub fn with_tls(mut self, tls: Arc<tokio_rustls::rustls::ServerConfig>) -> Self {
        self.cfg.tls = Some(tls);
        self
    }

    /// Caps concurrent connections (`0` = unlimited).
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.cfg.max_connections = max;
        self
    }

    /// Sets the accept-error backoff.
    pub fn with_accept_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.cfg.accept_backoff = backoff;
        self
    }

    /// Sets the heartbeat interval (`0s` = disabled).
    pub fn with_register_interval(mut self, interval: Duration) -> Self {
        self.cfg.register_interval = interval;
        self
    }

    /// Sets the directory record TTL.
    pub fn with_register_ttl(mut self, ttl: Duration) -> Self {
        self.cfg.register_ttl = ttl;
        self
    }

    /// Sets the directory attempts per registration.
    pub fn with_register_attempts(mut self, attempts: u32) -> Self {
        self.cfg.register_attempts = attempts;
        self
    }

    /// Sets the heartbeat health check.
    pub fn with_register_check(mut self, check: Arc<dyn RegisterCheck>) -> Self {
        self.cfg.register_check = check;
        self
    }

    /// Appends a subscriber wrapper; earlier wrappers run outermost.
    pub fn with_wrapper(mut self, wrapper: SubscriberWrapper) -> Self {
        self.cfg.wrappers.push(wrapper);
        self
    }

    /// Registers a codec for `content_type`.
    pub fn with_codec(mut self, content_type: impl Into<String>, codec: Arc<dyn Codec>) -> Self {
        self.cfg.codecs.insert(content_type.into(), codec);
        self
    }

    /// Sets the message broker.
    pub fn with_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.cfg.broker = broker;
        self
    }

    /// Sets the service directory.
    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.cfg.directory = directory;
        self
    }

    /// Sets the server context.
    pub fn with_context(mut self, ctx: Context) -> Self {
        self.cfg.context = ctx;
        self
    }

    /// Sets the runtime event bus capacity.
    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.cfg.bus_capacity = capacity;
        self
    }

    /// Builds a stopped server.
    pub fn build(self) -> Server {
        Server::new(self.cfg)
    }
}
