#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::broadcast;

use servisor::directory::RegisterOptions;
use servisor::{
    Binding, Broker, BrokerError, BrokerHandler, Connection, Context, Directory, DirectoryError,
    Event, EventKind, Handler, MemoryBroker, MemoryDirectory, ServeFn, Server, ServerBuilder,
    Service, SubscribeOptions,
};

/// Collaborators shared by a test server.
pub struct Harness {
    pub broker: Arc<MemoryBroker>,
    pub directory: Arc<MemoryDirectory>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            broker: Arc::new(MemoryBroker::new()),
            directory: Arc::new(MemoryDirectory::new()),
        }
    }

    /// Loopback server with heartbeat disabled and the harness collaborators.
    pub fn builder(&self) -> ServerBuilder {
        Server::builder()
            .with_name("test")
            .with_id("1")
            .with_address("127.0.0.1:0")
            .with_register_interval(Duration::ZERO)
            .with_broker(self.broker.clone())
            .with_directory(self.directory.clone())
    }
}

/// Handler echoing every byte back until the peer closes.
pub fn echo() -> Handler {
    Handler::new(
        "echo",
        ServeFn::arc(|mut conn: Connection| async move {
            let mut buf = [0u8; 1024];
            loop {
                match conn.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => {
                        if conn.write_all(&buf[..n]).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }),
    )
}

/// Handler that drops every connection immediately.
pub fn noop() -> Handler {
    Handler::new("noop", ServeFn::arc(|_conn: Connection| async {}))
}

/// Waits up to two seconds for the next event of `kind`.
pub async fn wait_for(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(ev) if ev.kind == kind => return ev,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {kind:?}"))
}

/// Directory rejecting every call; counts attempts.
#[derive(Default)]
pub struct BrokenDirectory {
    pub registers: AtomicUsize,
    pub deregisters: AtomicUsize,
}

#[async_trait]
impl Directory for BrokenDirectory {
    fn name(&self) -> &str {
        "broken"
    }

    async fn register(
        &self,
        service: &Service,
        _opts: &RegisterOptions,
    ) -> Result<(), DirectoryError> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        Err(DirectoryError::Register {
            service: service.name.clone(),
            reason: "unreachable".into(),
        })
    }

    async fn deregister(&self, service: &Service) -> Result<(), DirectoryError> {
        self.deregisters.fetch_add(1, Ordering::SeqCst);
        Err(DirectoryError::Deregister {
            service: service.name.clone(),
            reason: "unreachable".into(),
        })
    }
}

/// Broker that connects through `inner` but refuses every subscription.
pub struct RefusingBroker {
    pub inner: Arc<MemoryBroker>,
}

#[async_trait]
impl Broker for RefusingBroker {
    fn name(&self) -> &str {
        "refusing"
    }

    async fn connect(&self, ctx: &Context) -> Result<(), BrokerError> {
        self.inner.connect(ctx).await
    }

    async fn disconnect(&self, ctx: &Context) -> Result<(), BrokerError> {
        self.inner.disconnect(ctx).await
    }

    async fn subscribe(
        &self,
        _ctx: &Context,
        topic: &str,
        _handler: BrokerHandler,
        _opts: SubscribeOptions,
    ) -> Result<Box<dyn Binding>, BrokerError> {
        Err(BrokerError::Subscribe {
            topic: topic.to_string(),
            reason: "down".into(),
        })
    }
}
