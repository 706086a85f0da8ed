//! # Subscription registry and service-record building.
//!
//! The registry owns every added [`Subscription`] together with the broker
//! [`Binding`]s created when it was armed.
//!
//! ## Rules
//! - A subscription id appears at most once.
//! - A subscription is armed at most once: bindings are only created for
//!   entries that have none.
//! - Entries keep insertion order; advertised endpoints are ordered by topic
//!   (descending, stable).
//! - The registry is always accessed under the server's exclusive lock.

use std::collections::HashMap;

use crate::broker::Binding;
use crate::context::Context;
use crate::core::ServerConfig;
use crate::directory::{Endpoint, Node, Service};
use crate::error::ValidationError;
use crate::handler::Handler;
use crate::subscription::{Subscription, SubscriptionId};

/// One added subscription.
pub(crate) struct Entry {
    pub(crate) sub: Subscription,
    pub(crate) bindings: Vec<Box<dyn Binding>>,
}

impl Entry {
    /// Context the subscription is armed and dispatched with.
    pub(crate) fn context(&self, fallback: &Context) -> Context {
        self.sub
            .options()
            .context
            .clone()
            .unwrap_or_else(|| fallback.clone())
    }

    /// Non-internal and not yet bound.
    pub(crate) fn needs_arming(&self) -> bool {
        !self.sub.options().internal && self.bindings.is_empty()
    }
}

/// Bookkeeping of added subscriptions.
#[derive(Default)]
pub(crate) struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    /// Adds `sub`; fails if its id is already present.
    pub(crate) fn insert(&mut self, sub: Subscription) -> Result<SubscriptionId, ValidationError> {
        let id = sub.id();
        if self.entries.iter().any(|e| e.sub.id() == id) {
            return Err(ValidationError::Duplicate {
                id,
                topic: sub.topic().to_string(),
            });
        }
        self.entries.push(Entry {
            sub,
            bindings: Vec::new(),
        });
        Ok(id)
    }

    /// Removes the entry with `id`, returning it with its bindings.
    pub(crate) fn remove(&mut self, id: SubscriptionId) -> Option<Entry> {
        let pos = self.entries.iter().position(|e| e.sub.id() == id)?;
        Some(self.entries.remove(pos))
    }

    /// `(id, topic)` of every entry, in insertion order.
    pub(crate) fn list(&self) -> Vec<(SubscriptionId, String)> {
        self.entries
            .iter()
            .map(|e| (e.sub.id(), e.sub.topic().to_string()))
            .collect()
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.entries.iter_mut()
    }

    /// Detaches every binding together with the context to unsubscribe it with.
    pub(crate) fn take_bindings(&mut self, fallback: &Context) -> Vec<(Box<dyn Binding>, Context)> {
        let mut out = Vec::new();
        for entry in &mut self.entries {
            let ctx = entry.context(fallback);
            out.extend(entry.bindings.drain(..).map(|b| (b, ctx.clone())));
        }
        out
    }

    /// Endpoints of non-internal subscriptions, by topic descending.
    pub(crate) fn advertised_endpoints(&self) -> Vec<Endpoint> {
        let mut subs: Vec<&Subscription> = self
            .entries
            .iter()
            .map(|e| &e.sub)
            .filter(|s| !s.options().internal)
            .collect();
        subs.sort_by(|a, b| b.topic().cmp(a.topic()));
        subs.into_iter()
            .flat_map(|s| s.endpoints().iter().cloned())
            .collect()
    }
}

/// Service record without endpoints: identity plus the single node.
pub(crate) fn base_record(cfg: &ServerConfig) -> Service {
    let mut metadata: HashMap<String, String> = cfg.metadata.clone();
    metadata.insert("protocol".into(), "tcp".into());
    metadata.insert("transport".into(), "tcp".into());
    metadata.insert("server".into(), "tcp".into());
    metadata.insert("broker".into(), cfg.broker.name().to_string());
    metadata.insert("registry".into(), cfg.directory.name().to_string());

    Service {
        name: cfg.name.clone(),
        version: cfg.version.clone(),
        metadata: HashMap::new(),
        nodes: vec![Node {
            id: cfg.node_id(),
            address: cfg.advertised_address().to_string(),
            metadata,
        }],
        endpoints: Vec::new(),
    }
}

/// Full record: handler endpoints, then subscription endpoints.
pub(crate) fn full_record(cfg: &ServerConfig, handler: Option<&Handler>, registry: &Registry) -> Service {
    let mut record = base_record(cfg);
    if let Some(h) = handler {
        record.endpoints.extend(h.endpoints());
    }
    record.endpoints.extend(registry.advertised_endpoints());
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::handler::ServeFn;
    use crate::net::Connection;
    use crate::subscription::EventHandler;

    fn sub(topic: &str) -> Subscription {
        Subscription::new(
            topic,
            EventHandler::func_payload(|_v: serde_json::Value| async {
                Ok::<(), HandlerError>(())
            }),
        )
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut reg = Registry::default();
        let s = sub("orders");
        reg.insert(s.clone()).unwrap();

        let err = reg.insert(s).unwrap_err();
        assert_eq!(err.as_label(), "validation_duplicate");
        assert_eq!(reg.list().len(), 1);
    }

    #[test]
    fn endpoints_sorted_by_topic_descending() {
        let mut reg = Registry::default();
        reg.insert(sub("alpha")).unwrap();
        reg.insert(sub("zeta")).unwrap();
        reg.insert(
            Subscription::builder("hidden")
                .handler(EventHandler::func_payload(|_v: u32| async {
                    Ok::<(), HandlerError>(())
                }))
                .internal(true)
                .build(),
        )
        .unwrap();
        reg.insert(sub("mid")).unwrap();

        let topics: Vec<String> = reg
            .advertised_endpoints()
            .into_iter()
            .map(|e| e.metadata["topic"].clone())
            .collect();
        assert_eq!(topics, ["zeta", "mid", "alpha"]);
    }

    #[test]
    fn record_lists_handler_endpoints_first() {
        let cfg = ServerConfig {
            name: "shop".into(),
            id: "7".into(),
            address: "127.0.0.1:4000".into(),
            ..ServerConfig::default()
        };
        let handler = Handler::new("rpc", ServeFn::arc(|_c: Connection| async {}))
            .endpoint("Shop.Buy", Vec::<(String, String)>::new());
        let mut reg = Registry::default();
        reg.insert(sub("orders")).unwrap();

        let record = full_record(&cfg, Some(&handler), &reg);
        let names: Vec<&str> = record.endpoints.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Shop.Buy", "Func"]);

        let node = &record.nodes[0];
        assert_eq!(node.id, "shop-7");
        assert_eq!(node.address, "127.0.0.1:4000");
        assert_eq!(node.metadata["transport"], "tcp");
        assert_eq!(node.metadata["broker"], "memory");
        assert_eq!(node.metadata["registry"], "memory");
    }

    #[test]
    fn removal_returns_entry() {
        let mut reg = Registry::default();
        let id = reg.insert(sub("orders")).unwrap();
        assert!(reg.remove(id).is_some());
        assert!(reg.remove(id).is_none());
        assert!(reg.list().is_empty());
    }
}
