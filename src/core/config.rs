//! # Server configuration.
//!
//! Provides [`ServerConfig`], the settings of one [`Server`](crate::Server).
//!
//! Config is used in two ways:
//! 1. **Construction**: `Server::new(cfg)` or `Server::builder()`
//! 2. **Runtime updates**: `Server::init(|cfg| ...)` before (re)starting
//!
//! ## Sentinel values
//! - `max_connections = 0` → unlimited (no semaphore in front of `accept`)
//! - `register_interval = 0s` → no heartbeat ticks (register once at start)
//! - `register_ttl = 0s` → directory records never expire
//! - `register_attempts = 0` → treated as 1

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::health::{AlwaysHealthy, RegisterCheck};
use crate::broker::{Broker, MemoryBroker};
use crate::codec::{Codecs, default_codecs};
use crate::context::Context;
use crate::directory::{Directory, MemoryDirectory};
use crate::net::ListenerSlot;
use crate::policies::BackoffPolicy;
use crate::subscription::SubscriberWrapper;

/// Settings of one server.
///
/// ## Field semantics
/// - `name`, `version`, `id`: identity; the advertised node id is `{name}-{id}`
/// - `address`: bind address; overwritten with the bound address on start
/// - `advertise`: address published to the directory instead of `address`
/// - `listener`: pre-bound socket taken by the first start
/// - `register_*`: heartbeat interval, record TTL, directory attempts and health check
/// - `wrappers`: subscriber middleware; the first one is the outermost
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sprinkling sentinel
/// checks (`0`) across the codebase.
#[derive(Clone)]
pub struct ServerConfig {
    /// Service name.
    pub name: String,
    /// Service version.
    pub version: String,
    /// Instance id (UUIDv7 by default).
    pub id: String,
    /// Bind address.
    pub address: String,
    /// Address advertised to the directory, if different from `address`.
    pub advertise: Option<String>,
    /// User metadata added to the advertised node.
    pub metadata: HashMap<String, String>,

    /// Pre-bound listener.
    pub listener: Option<ListenerSlot>,
    /// TLS server configuration; connections are handshaken before serving.
    #[cfg(feature = "tls")]
    pub tls: Option<Arc<tokio_rustls::rustls::ServerConfig>>,
    /// Maximum concurrent connections (`0` = unlimited).
    pub max_connections: usize,
    /// Backoff after temporary accept errors.
    pub accept_backoff: BackoffPolicy,

    /// Heartbeat interval (`0s` = disabled).
    pub register_interval: Duration,
    /// Directory record TTL (`0s` = no expiry).
    pub register_ttl: Duration,
    /// Directory advertisement attempts per registration (min 1).
    pub register_attempts: u32,
    /// Health predicate consulted on every heartbeat tick.
    pub register_check: Arc<dyn RegisterCheck>,

    /// Subscriber middleware, outermost first.
    pub wrappers: Vec<SubscriberWrapper>,
    /// Codecs keyed by content type.
    pub codecs: Codecs,
    /// Message broker.
    pub broker: Arc<dyn Broker>,
    /// Service directory.
    pub directory: Arc<dyn Directory>,
    /// Server context, used for broker calls and as the default subscription context.
    pub context: Context,

    /// Capacity of the runtime event bus (min 1).
    pub bus_capacity: usize,
}

impl ServerConfig {
    /// Returns the connection limit as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` concurrent connections
    #[inline]
    pub fn connection_limit(&self) -> Option<usize> {
        if self.max_connections == 0 {
            None
        } else {
            Some(self.max_connections)
        }
    }

    /// Returns the heartbeat interval as an `Option`.
    #[inline]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        if self.register_interval.is_zero() {
            None
        } else {
            Some(self.register_interval)
        }
    }

    /// Returns the directory attempts clamped to a minimum of 1.
    #[inline]
    pub fn register_attempts_clamped(&self) -> u32 {
        self.register_attempts.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Advertised node id, `{name}-{id}`.
    pub fn node_id(&self) -> String {
        format!("{}-{}", self.name, self.id)
    }

    /// Address published to the directory.
    pub fn advertised_address(&self) -> &str {
        self.advertise.as_deref().unwrap_or(&self.address)
    }
}

impl Default for ServerConfig {
    /// Default configuration:
    ///
    /// - `address = "0.0.0.0:0"` (any interface, ephemeral port)
    /// - `register_interval = 30s`, `register_ttl = 90s`, `register_attempts = 3`
    /// - in-memory broker and directory, JSON codec
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            name: "servisor".to_string(),
            version: "latest".to_string(),
            id: Uuid::now_v7().to_string(),
            address: "0.0.0.0:0".to_string(),
            advertise: None,
            metadata: HashMap::new(),
            listener: None,
            #[cfg(feature = "tls")]
            tls: None,
            max_connections: 0,
            accept_backoff: BackoffPolicy::default(),
            register_interval: Duration::from_secs(30),
            register_ttl: Duration::from_secs(90),
            register_attempts: 3,
            register_check: Arc::new(AlwaysHealthy),
            wrappers: Vec::new(),
            codecs: default_codecs(),
            broker: Arc::new(MemoryBroker::new()),
            directory: Arc::new(MemoryDirectory::new()),
            context: Context::background(),
            bus_capacity: 1024,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codecs: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        codecs.sort_unstable();
        f.debug_struct("ServerConfig")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("id", &self.id)
            .field("address", &self.address)
            .field("advertise", &self.advertise)
            .field("metadata", &self.metadata)
            .field("listener", &self.listener)
            .field("max_connections", &self.max_connections)
            .field("accept_backoff", &self.accept_backoff)
            .field("register_interval", &self.register_interval)
            .field("register_ttl", &self.register_ttl)
            .field("register_attempts", &self.register_attempts)
            .field("wrappers", &self.wrappers.len())
            .field("codecs", &codecs)
            .field("broker", &self.broker.name())
            .field("directory", &self.directory.name())
            .field("bus_capacity", &self.bus_capacity)
            .finish_non_exhaustive()
    }
}
