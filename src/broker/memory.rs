//! In-process broker.
//!
//! Delivery rules:
//! - subscribers without a queue group each receive every event;
//! - within one queue group, events rotate round-robin over the members.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Binding, Broker, BrokerEvent, BrokerHandler, SubscribeOptions};
use crate::context::Context;
use crate::error::BrokerError;

struct Entry {
    id: u64,
    queue: Option<String>,
    auto_ack: bool,
    handler: BrokerHandler,
}

type Topics = Arc<RwLock<HashMap<String, Vec<Entry>>>>;

/// Snapshot of one active binding, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInfo {
    /// Queue group, if any.
    pub queue: Option<String>,
    /// Auto-acknowledge flag.
    pub auto_ack: bool,
}

/// In-memory [`Broker`].
#[derive(Default)]
pub struct MemoryBroker {
    connected: AtomicBool,
    next_id: AtomicU64,
    rotation: AtomicUsize,
    topics: Topics,
}

impl MemoryBroker {
    /// Creates a disconnected broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` between `connect` and `disconnect`.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Lists active bindings on `topic`.
    pub async fn bindings(&self, topic: &str) -> Vec<BindingInfo> {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| BindingInfo {
                        queue: e.queue.clone(),
                        auto_ack: e.auto_ack,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Delivers `event` to the subscribers of `topic` and waits for them.
    ///
    /// Returns the first handler failure, after every selected handler has run.
    pub async fn publish(&self, topic: &str, event: BrokerEvent) -> Result<(), BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }

        let targets = self.select(topic).await;
        let results =
            futures::future::join_all(targets.into_iter().map(|h| h(event.clone()))).await;

        match results.into_iter().find_map(Result::err) {
            Some(err) => Err(BrokerError::Handler(err.to_string())),
            None => Ok(()),
        }
    }

    async fn select(&self, topic: &str) -> Vec<BrokerHandler> {
        let topics = self.topics.read().await;
        let Some(entries) = topics.get(topic) else {
            return Vec::new();
        };

        let mut targets = Vec::new();
        let mut groups: HashMap<&str, Vec<&BrokerHandler>> = HashMap::new();
        for entry in entries {
            match entry.queue.as_deref() {
                Some(queue) => groups.entry(queue).or_default().push(&entry.handler),
                None => targets.push(Arc::clone(&entry.handler)),
            }
        }

        let turn = self.rotation.fetch_add(1, Ordering::Relaxed);
        for members in groups.values() {
            targets.push(Arc::clone(members[turn % members.len()]));
        }
        targets
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self, _ctx: &Context) -> Result<(), BrokerError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self, _ctx: &Context) -> Result<(), BrokerError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(
        &self,
        _ctx: &Context,
        topic: &str,
        handler: BrokerHandler,
        opts: SubscribeOptions,
    ) -> Result<Box<dyn Binding>, BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.topics
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(Entry {
                id,
                queue: opts.queue,
                auto_ack: opts.auto_ack,
                handler,
            });

        Ok(Box::new(MemoryBinding {
            id,
            topic: topic.to_string(),
            topics: Arc::clone(&self.topics),
        }))
    }
}

struct MemoryBinding {
    id: u64,
    topic: String,
    topics: Topics,
}

#[async_trait]
impl Binding for MemoryBinding {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn unsubscribe(&self, _ctx: &Context) -> Result<(), BrokerError> {
        let mut topics = self.topics.write().await;
        let entries = topics.get_mut(&self.topic);
        let removed = entries.is_some_and(|entries| {
            let before = entries.len();
            entries.retain(|e| e.id != self.id);
            entries.len() != before
        });

        if removed {
            Ok(())
        } else {
            Err(BrokerError::Unsubscribe {
                topic: self.topic.clone(),
                reason: "not subscribed".to_string(),
            })
        }
    }
}
