//! # Register / Deregister.
//!
//! ```text
//! register():
//!   cached record? ──yes──► advertise(record) ──► done            (warm path)
//!        │no
//!        ▼
//!   build record (handler endpoints + subscription endpoints, topic desc)
//!   advertise(record)                       (up to register_attempts, TTL)
//!   arm every non-internal, unbound subscription on the broker
//!   registered = true; cache record                                (cold path)
//!
//! deregister():
//!   withdraw base record (always)
//!   unsubscribe every binding concurrently (failures logged)
//!   registered = false; drop cached record
//!   return the withdrawal error, if any
//! ```
//!
//! Both paths hold the exclusive server lock for their whole duration, so
//! concurrent calls serialize and a subscription is never armed twice.

use std::sync::Arc;

use crate::broker::{Binding, SubscribeOptions};
use crate::context::Context;
use crate::core::ServerConfig;
use crate::core::registry::{Registry, base_record, full_record};
use crate::core::server::Shared;
use crate::directory::{RegisterOptions, Service};
use crate::error::{DirectoryError, ServerError};
use crate::events::{Bus, Event, EventKind};
use crate::subscription::Dispatcher;

impl Shared {
    pub(crate) async fn register(&self) -> Result<(), ServerError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let node = inner.cfg.node_id();

        if let Some(record) = inner.record.clone() {
            return advertise(&inner.cfg, &record, &self.bus).await;
        }

        let record = full_record(&inner.cfg, inner.handler.as_ref(), &inner.registry);
        if !inner.registered {
            tracing::info!(node = %node, directory = %inner.cfg.directory.name(), "registering node");
        }
        advertise(&inner.cfg, &record, &self.bus).await?;

        arm(&inner.cfg, &mut inner.registry, &self.bus).await?;

        inner.registered = true;
        inner.record = Some(Arc::new(record));
        Ok(())
    }

    pub(crate) async fn deregister(&self) -> Result<(), ServerError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let record = base_record(&inner.cfg);
        let node = inner.cfg.node_id();

        tracing::info!(node = %node, "deregistering node");
        let withdrawn = inner.cfg.directory.deregister(&record).await;
        match &withdrawn {
            Ok(()) => self
                .bus
                .publish(Event::new(EventKind::Deregistered).with_node(node.as_str())),
            Err(err) => {
                tracing::error!(node = %node, error = %err, "deregister failed");
                self.bus.publish(
                    Event::new(EventKind::DeregisterFailed)
                        .with_node(node.as_str())
                        .with_error(err),
                );
            }
        }

        inner.registered = false;
        inner.record = None;
        let bindings = inner.registry.take_bindings(&inner.cfg.context);
        unbind(bindings, &self.bus).await;

        withdrawn.map_err(ServerError::from)
    }
}

/// Advertises `record`, retrying up to `register_attempts` times.
async fn advertise(cfg: &ServerConfig, record: &Service, bus: &Bus) -> Result<(), ServerError> {
    let node = cfg.node_id();
    let opts = RegisterOptions {
        ttl: cfg.register_ttl,
        context: cfg.context.clone(),
    };
    let attempts = cfg.register_attempts_clamped();

    let mut attempt = 1;
    let result: Result<(), DirectoryError> = loop {
        match cfg.directory.register(record, &opts).await {
            Ok(()) => break Ok(()),
            Err(err) if attempt >= attempts => break Err(err),
            Err(err) => {
                tracing::debug!(node = %node, attempt, error = %err, "register attempt failed");
                attempt += 1;
            }
        }
    };

    match result {
        Ok(()) => {
            bus.publish(Event::new(EventKind::Registered).with_node(node.as_str()));
            Ok(())
        }
        Err(err) => {
            bus.publish(
                Event::new(EventKind::RegisterFailed)
                    .with_node(node.as_str())
                    .with_attempt(attempt)
                    .with_error(&err),
            );
            Err(err.into())
        }
    }
}

/// Subscribes every non-internal subscription that has no binding yet.
async fn arm(cfg: &ServerConfig, registry: &mut Registry, bus: &Bus) -> Result<(), ServerError> {
    let codecs = Arc::new(cfg.codecs.clone());
    let wrappers: Arc<[_]> = cfg.wrappers.clone().into();

    for entry in registry.entries_mut().filter(|e| e.needs_arming()) {
        let ctx = entry.context(&cfg.context);
        let topic = entry.sub.topic().to_string();
        let opts = SubscribeOptions {
            queue: entry.sub.options().queue.clone(),
            auto_ack: entry.sub.options().auto_ack,
            context: ctx.clone(),
        };
        let handler = Dispatcher::new(
            entry.sub.clone(),
            Arc::clone(&codecs),
            Arc::clone(&wrappers),
            ctx.clone(),
        )
        .into_handler();

        tracing::info!(topic = %topic, "subscribing to topic");
        let binding = cfg.broker.subscribe(&ctx, &topic, handler, opts).await?;
        entry.bindings.push(binding);
        bus.publish(Event::new(EventKind::Subscribed).with_topic(topic));
    }
    Ok(())
}

/// Unsubscribes all `bindings` concurrently; failures are logged only.
async fn unbind(bindings: Vec<(Box<dyn Binding>, Context)>, bus: &Bus) {
    let unsubscribes = bindings.iter().map(|(binding, ctx)| async move {
        let topic = binding.topic();
        tracing::info!(topic = %topic, "unsubscribing from topic");
        match binding.unsubscribe(ctx).await {
            Ok(()) => bus.publish(Event::new(EventKind::Unsubscribed).with_topic(topic)),
            Err(err) => {
                tracing::error!(topic = %topic, error = %err, "unsubscribe failed");
                bus.publish(
                    Event::new(EventKind::UnsubscribeFailed)
                        .with_topic(topic)
                        .with_error(&err),
                );
            }
        }
    });
    futures::future::join_all(unsubscribes).await;
}
