//! # Coordinator task: heartbeat loop and shutdown sequence.
//!
//! ```text
//! loop select {
//!   exit.cancelled()  ─► break
//!   tick (register_interval; never if 0)
//!       ├─ check Err + registered    ─► deregister (log failure)
//!       ├─ check Err + unregistered  ─► log, skip
//!       └─ check Ok                  ─► register (log failure)
//! }
//! close listener ─► join acceptor ─► deregister (logged) ─► broker.disconnect ─► Stopped
//! ```
//!
//! The broker disconnected on stop is the one connected by start, even if the
//! configuration was swapped in between.
//!
//! A failing health check never leads to a registration.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::server::Shared;
use crate::broker::Broker;
use crate::context::Context;
use crate::error::ServerError;
use crate::events::{Event, EventKind};
use crate::net::Listener;

pub(crate) async fn run(
    shared: Arc<Shared>,
    listener: Arc<Listener>,
    acceptor: JoinHandle<()>,
    broker: Arc<dyn Broker>,
    ctx: Context,
    exit: CancellationToken,
) -> Result<(), ServerError> {
    let interval = shared.inner.read().await.cfg.heartbeat_interval();
    let mut ticker = interval.map(new_ticker);

    loop {
        tokio::select! {
            _ = exit.cancelled() => break,
            _ = tick(&mut ticker) => beat(&shared).await,
        }
    }

    let closed = listener.close();
    if let Err(err) = acceptor.await {
        tracing::warn!(error = %err, "acceptor task failed");
    }
    drop(listener);

    if let Err(err) = shared.deregister().await {
        tracing::error!(error = %err, "deregister on stop failed");
    }

    let disconnected = broker.disconnect(&ctx).await;
    shared.bus.publish(Event::new(EventKind::Stopped));
    tracing::info!("server stopped");

    closed.map_err(ServerError::Listener)?;
    disconnected.map_err(ServerError::from)
}

fn new_ticker(period: Duration) -> Interval {
    let mut t = tokio::time::interval_at(Instant::now() + period, period);
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    t
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// One heartbeat: health check, then register or deregister.
async fn beat(shared: &Shared) {
    let (registered, check, ctx, node) = {
        let inner = shared.inner.read().await;
        (
            inner.registered,
            Arc::clone(&inner.cfg.register_check),
            inner.cfg.context.clone(),
            inner.cfg.node_id(),
        )
    };

    match check.check(&ctx).await {
        Err(err) => {
            shared.bus.publish(
                Event::new(EventKind::HealthCheckFailed)
                    .with_node(node.as_str())
                    .with_error(&err),
            );
            if registered {
                tracing::error!(node = %node, error = %err, "register check failed; deregistering");
                if let Err(err) = shared.deregister().await {
                    tracing::error!(node = %node, error = %err, "deregister failed");
                }
            } else {
                tracing::error!(node = %node, error = %err, "register check failed");
            }
        }
        Ok(()) => {
            if let Err(err) = shared.register().await {
                tracing::error!(node = %node, error = %err, "register failed");
            }
        }
    }
}
