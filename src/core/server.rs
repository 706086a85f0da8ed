//! # Server: lifecycle coordinator and public API.
//!
//! [`Server`] owns the configuration, the connection handler, the subscription
//! registry and the registration state behind a single `RwLock`. Start and
//! stop are serialized by a separate lifecycle mutex.
//!
//! ## Lifecycle
//! ```text
//! Stopped ──start()──► Starting ──ok──► Running ──stop()──► Stopping ──► Stopped
//!                          │
//!                          └──err──► Stopped (nothing left running)
//!
//! start():
//!   take pre-bound listener | bind(address) ─► apply max_connections
//!   address = bound address ─► broker.connect ─► register()
//!   spawn acceptor(listener, handler)
//!   spawn coordinator(heartbeat loop, exit token)
//!
//! stop():
//!   exit.cancel() ─► coordinator: close listener ─► join acceptor ─► deregister()
//!                                 ─► broker.disconnect ─► Stopped event
//!   await coordinator JoinHandle ─► listener-close error | disconnect error
//! ```
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use servisor::{Connection, Handler, ServeFn, Server};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), servisor::ServerError> {
//!     let server = Server::builder()
//!         .with_name("greeter")
//!         .with_address("127.0.0.1:0")
//!         .with_register_interval(Duration::ZERO)
//!         .build();
//!
//!     server
//!         .handle(Handler::new("noop", ServeFn::arc(|_c: Connection| async {})))
//!         .await;
//!
//!     server.start().await?;
//!     assert!(server.is_registered().await);
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::builder::ServerBuilder;
use super::registry::Registry;
use super::{acceptor, heartbeat, shutdown};
use crate::core::ServerConfig;
use crate::directory::Service;
use crate::error::ServerError;
use crate::events::{Bus, Event, EventKind};
use crate::handler::Handler;
use crate::net::Listener;
use crate::subscription::{Subscription, SubscriptionId, validate};

/// Lifecycle state of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not serving; `start` is allowed.
    Stopped,
    /// `start` in progress.
    Starting,
    /// Accepting connections and heartbeating.
    Running,
    /// `stop` in progress.
    Stopping,
}

/// State guarded by the server lock.
pub(crate) struct Inner {
    pub(crate) cfg: ServerConfig,
    pub(crate) handler: Option<Handler>,
    pub(crate) registry: Registry,
    pub(crate) registered: bool,
    pub(crate) record: Option<Arc<Service>>,
    pub(crate) state: ServerState,
}

/// Background tasks of a running server.
struct Running {
    exit: CancellationToken,
    coordinator: JoinHandle<Result<(), ServerError>>,
}

pub(crate) struct Shared {
    pub(crate) inner: RwLock<Inner>,
    lifecycle: Mutex<Option<Running>>,
    pub(crate) bus: Bus,
}

/// Network service host.
///
/// Cheap to clone; clones control the same server.
#[derive(Clone)]
pub struct Server {
    shared: Arc<Shared>,
}

impl Server {
    /// Creates a stopped server.
    pub fn new(cfg: ServerConfig) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        Self {
            shared: Arc::new(Shared {
                inner: RwLock::new(Inner {
                    cfg,
                    handler: None,
                    registry: Registry::default(),
                    registered: false,
                    record: None,
                    state: ServerState::Stopped,
                }),
                lifecycle: Mutex::new(None),
                bus,
            }),
        }
    }

    /// Returns a builder over the default configuration.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new(ServerConfig::default())
    }

    /// Snapshot of the current configuration.
    pub async fn options(&self) -> ServerConfig {
        self.shared.inner.read().await.cfg.clone()
    }

    /// Mutates the configuration in place.
    ///
    /// Changes to listener, broker and directory settings take effect on the
    /// next start.
    pub async fn init(&self, f: impl FnOnce(&mut ServerConfig)) {
        let mut inner = self.shared.inner.write().await;
        f(&mut inner.cfg);
    }

    /// Sets the connection handler.
    pub async fn handle(&self, handler: Handler) {
        self.shared.inner.write().await.handler = Some(handler);
    }

    /// Adds a subscription.
    ///
    /// The subscription is armed by the next cold registration.
    pub async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionId, ServerError> {
        validate(&sub)?;
        let id = self.shared.inner.write().await.registry.insert(sub)?;
        Ok(id)
    }

    /// Removes a subscription, unsubscribing its bindings first.
    pub async fn remove_subscription(&self, id: SubscriptionId) -> Result<(), ServerError> {
        let mut inner = self.shared.inner.write().await;
        let entry = inner
            .registry
            .remove(id)
            .ok_or(ServerError::NotFound(id))?;

        let ctx = entry.context(&inner.cfg.context);
        for binding in &entry.bindings {
            if let Err(err) = binding.unsubscribe(&ctx).await {
                tracing::error!(topic = %binding.topic(), error = %err, "unsubscribe failed");
                self.shared.bus.publish(
                    Event::new(EventKind::UnsubscribeFailed)
                        .with_topic(binding.topic())
                        .with_error(&err),
                );
            } else {
                self.shared
                    .bus
                    .publish(Event::new(EventKind::Unsubscribed).with_topic(binding.topic()));
            }
        }
        Ok(())
    }

    /// `(id, topic)` of every added subscription.
    pub async fn subscriptions(&self) -> Vec<(SubscriptionId, String)> {
        self.shared.inner.read().await.registry.list()
    }

    /// Advertises the service and arms subscriptions (see module docs).
    pub async fn register(&self) -> Result<(), ServerError> {
        self.shared.register().await
    }

    /// Withdraws the service and tears down subscriptions.
    pub async fn deregister(&self) -> Result<(), ServerError> {
        self.shared.deregister().await
    }

    /// Starts serving.
    ///
    /// Fails with [`ServerError::AlreadyStarted`] unless stopped and with
    /// [`ServerError::NoHandler`] when no handler is set. On failure nothing is
    /// left running.
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut lifecycle = self.shared.lifecycle.lock().await;

        let (cfg, handler) = {
            let mut inner = self.shared.inner.write().await;
            if inner.state != ServerState::Stopped || lifecycle.is_some() {
                return Err(ServerError::AlreadyStarted);
            }
            let handler = inner.handler.clone().ok_or(ServerError::NoHandler)?;
            inner.state = ServerState::Starting;
            (inner.cfg.clone(), handler)
        };

        match self.launch(cfg, handler).await {
            Ok(running) => {
                *lifecycle = Some(running);
                self.set_state(ServerState::Running).await;
                Ok(())
            }
            Err(err) => {
                self.set_state(ServerState::Stopped).await;
                Err(err)
            }
        }
    }

    async fn launch(&self, cfg: ServerConfig, handler: Handler) -> Result<Running, ServerError> {
        let listener = match cfg.listener.as_ref().and_then(|slot| slot.take()) {
            Some(bound) => Listener::from_std(bound).map_err(ServerError::Listener)?,
            None => Listener::bind(&cfg.address)
                .await
                .map_err(|e| ServerError::bind(&cfg.address, e))?,
        };
        let listener = Arc::new(listener.with_limit(cfg.connection_limit()));
        let addr = listener.local_addr().to_string();

        tracing::info!(addr = %addr, "listening");
        self.shared
            .bus
            .publish(Event::new(EventKind::Listening).with_addr(addr.as_str()));
        {
            let mut inner = self.shared.inner.write().await;
            inner.cfg.address = addr;
            inner.record = None;
        }

        cfg.broker.connect(&cfg.context).await?;

        if let Err(err) = self.shared.register().await {
            // the record may already be advertised when arming failed
            if let Err(e) = self.shared.deregister().await {
                tracing::warn!(error = %e, "withdrawal after failed start failed");
            }
            if let Err(e) = cfg.broker.disconnect(&cfg.context).await {
                tracing::warn!(error = %e, "broker disconnect failed");
            }
            return Err(err);
        }

        let serve = handler.serve_ref();
        #[cfg(feature = "tls")]
        let serve: Arc<dyn crate::handler::Serve> = match cfg.tls.clone() {
            Some(tls) => Arc::new(crate::net::TlsServe::new(tls, serve)),
            None => serve,
        };

        let exit = CancellationToken::new();
        let accept = tokio::spawn(acceptor::serve(
            Arc::clone(&listener),
            serve,
            exit.clone(),
            cfg.accept_backoff,
            self.shared.bus.clone(),
        ));
        let coordinator = tokio::spawn(heartbeat::run(
            Arc::clone(&self.shared),
            listener,
            accept,
            Arc::clone(&cfg.broker),
            cfg.context.clone(),
            exit.clone(),
        ));

        Ok(Running { exit, coordinator })
    }

    /// Stops serving and blocks until the shutdown sequence finished.
    ///
    /// Returns the listener-close error, otherwise the broker disconnect error.
    /// Directory withdrawal failures are logged only.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let mut lifecycle = self.shared.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return Err(ServerError::NotRunning);
        };
        self.set_state(ServerState::Stopping).await;

        running.exit.cancel();
        let res = match running.coordinator.await {
            Ok(res) => res,
            Err(err) => Err(ServerError::Coordinator(err.to_string())),
        };

        self.set_state(ServerState::Stopped).await;
        res
    }

    /// Starts, waits for a termination signal, then stops.
    pub async fn run(&self) -> Result<(), ServerError> {
        self.start().await?;
        if let Err(err) = shutdown::wait_for_shutdown_signal().await {
            tracing::warn!(error = %err, "signal handler unavailable; stopping");
        }
        self.stop().await
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServerState {
        self.shared.inner.read().await.state
    }

    /// `true` between a successful register and the next deregister.
    pub async fn is_registered(&self) -> bool {
        self.shared.inner.read().await.registered
    }

    /// Bind address; the bound address once started.
    pub async fn address(&self) -> String {
        self.shared.inner.read().await.cfg.address.clone()
    }

    /// Subscribes to runtime events published after this call.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    async fn set_state(&self, state: ServerState) {
        self.shared.inner.write().await.state = state;
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").finish_non_exhaustive()
    }
}
