use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{Directory, Node, RegisterOptions, Service};
use crate::error::DirectoryError;

struct Record {
    service: Service,
    nodes: HashMap<String, (Node, Option<Instant>)>,
}

/// In-memory [`Directory`].
///
/// Nodes registered with a non-zero TTL disappear from lookups once the TTL
/// elapses without a refresh.
#[derive(Default)]
pub struct MemoryDirectory {
    records: RwLock<HashMap<String, Record>>,
    registrations: AtomicUsize,
    deregistrations: AtomicUsize,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live record for `name`, or `None` if it has no live nodes.
    pub async fn get_service(&self, name: &str) -> Option<Service> {
        let records = self.records.read().await;
        let record = records.get(name)?;
        let now = Instant::now();

        let mut nodes: Vec<Node> = record
            .nodes
            .values()
            .filter(|(_, expires)| expires.is_none_or(|at| at > now))
            .map(|(node, _)| node.clone())
            .collect();
        if nodes.is_empty() {
            return None;
        }
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        Some(Service {
            nodes,
            ..record.service.clone()
        })
    }

    /// Number of successful `register` calls so far.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Number of successful `deregister` calls so far.
    pub fn deregistrations(&self) -> usize {
        self.deregistrations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    fn name(&self) -> &str {
        "memory"
    }

    async fn register(
        &self,
        service: &Service,
        opts: &RegisterOptions,
    ) -> Result<(), DirectoryError> {
        let now = Instant::now();
        let expires = (!opts.ttl.is_zero()).then(|| now + opts.ttl);

        let mut records = self.records.write().await;
        let record = records
            .entry(service.name.clone())
            .or_insert_with(|| Record {
                service: service.clone(),
                nodes: HashMap::new(),
            });

        record.service = Service {
            nodes: Vec::new(),
            ..service.clone()
        };
        record
            .nodes
            .retain(|_, (_, until)| until.is_none_or(|at| at > now));
        for node in &service.nodes {
            record
                .nodes
                .insert(node.id.clone(), (node.clone(), expires));
        }

        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn deregister(&self, service: &Service) -> Result<(), DirectoryError> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&service.name) {
            for node in &service.nodes {
                record.nodes.remove(&node.id);
            }
            if record.nodes.is_empty() {
                records.remove(&service.name);
            }
        }

        self.deregistrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn service(node: &str) -> Service {
        Service {
            name: "greeter".into(),
            version: "latest".into(),
            metadata: HashMap::new(),
            nodes: vec![Node {
                id: node.into(),
                address: "127.0.0.1:9000".into(),
                metadata: HashMap::new(),
            }],
            endpoints: Vec::new(),
        }
    }

    #[tokio::test]
    async fn register_then_deregister() {
        let dir = MemoryDirectory::new();
        dir.register(&service("greeter-1"), &RegisterOptions::default())
            .await
            .unwrap();
        dir.register(&service("greeter-2"), &RegisterOptions::default())
            .await
            .unwrap();
        assert_eq!(dir.get_service("greeter").await.unwrap().nodes.len(), 2);

        dir.deregister(&service("greeter-1")).await.unwrap();
        let svc = dir.get_service("greeter").await.unwrap();
        assert_eq!(svc.nodes.len(), 1);
        assert_eq!(svc.nodes[0].id, "greeter-2");

        dir.deregister(&service("greeter-2")).await.unwrap();
        assert!(dir.get_service("greeter").await.is_none());
        assert_eq!(dir.registrations(), 2);
        assert_eq!(dir.deregistrations(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expires_nodes() {
        let dir = MemoryDirectory::new();
        let opts = RegisterOptions {
            ttl: Duration::from_secs(10),
            ..RegisterOptions::default()
        };
        dir.register(&service("greeter-1"), &opts).await.unwrap();
        assert!(dir.get_service("greeter").await.is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(dir.get_service("greeter").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn register_prunes_expired_nodes() {
        let dir = MemoryDirectory::new();
        let opts = RegisterOptions {
            ttl: Duration::from_secs(10),
            ..RegisterOptions::default()
        };
        for id in ["greeter-1", "greeter-2", "greeter-3"] {
            dir.register(&service(id), &opts).await.unwrap();
        }

        tokio::time::advance(Duration::from_secs(11)).await;
        dir.register(&service("greeter-4"), &opts).await.unwrap();

        let records = dir.records.read().await;
        let ids: Vec<&String> = records["greeter"].nodes.keys().collect();
        assert_eq!(ids, ["greeter-4"]);
    }
}
