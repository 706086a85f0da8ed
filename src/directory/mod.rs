//! # Service directory contract.
//!
//! The server advertises one [`Service`] record per registration cycle and
//! withdraws it on deregistration. Storage, replication and lookup belong to
//! the [`Directory`] implementation.
//!
//! [`MemoryDirectory`] keeps records in process and honours the TTL passed in
//! [`RegisterOptions`].

mod memory;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::DirectoryError;

pub use memory::MemoryDirectory;

/// Advertised description of one callable capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint name (`Func`, `Receiver.Method`, or a handler endpoint name).
    pub name: String,
    /// Request shape descriptor (payload type path).
    pub request: Option<String>,
    /// Free-form metadata (`topic`, `subscriber`, ...).
    pub metadata: HashMap<String, String>,
}

/// One running instance of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node id (`{name}-{id}`).
    pub id: String,
    /// Address clients should dial.
    pub address: String,
    /// Node metadata (protocol, transport, broker, registry, user metadata).
    pub metadata: HashMap<String, String>,
}

/// Advertisement unit sent to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Service name.
    pub name: String,
    /// Service version.
    pub version: String,
    /// Service metadata.
    pub metadata: HashMap<String, String>,
    /// Nodes; the server always advertises exactly one.
    pub nodes: Vec<Node>,
    /// Advertised endpoints.
    pub endpoints: Vec<Endpoint>,
}

/// Options passed with [`Directory::register`].
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Record time-to-live; zero means no expiry.
    pub ttl: Duration,
    /// Context of the registering server.
    pub context: Context,
}

/// Service discovery backend.
#[async_trait]
pub trait Directory: Send + Sync + 'static {
    /// Directory name, advertised in node metadata.
    fn name(&self) -> &str;

    /// Advertises (or refreshes) `service`.
    async fn register(&self, service: &Service, opts: &RegisterOptions)
    -> Result<(), DirectoryError>;

    /// Withdraws the nodes of `service`.
    async fn deregister(&self, service: &Service) -> Result<(), DirectoryError>;
}
