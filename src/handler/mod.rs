//! # Connection handlers.
//!
//! A [`Handler`] pairs a connection-serving routine ([`Serve`]) with the
//! endpoints it advertises. The acceptor hands every accepted [`Connection`]
//! to [`Serve::serve`] on its own task.
//!
//! ## Example
//! ```rust
//! use servisor::{Handler, ServeFn};
//! use tokio::io::AsyncWriteExt;
//!
//! let handler = Handler::new(
//!     "echo",
//!     ServeFn::arc(|mut conn: servisor::Connection| async move {
//!         let _ = conn.write_all(b"hello\n").await;
//!     }),
//! )
//! .endpoint("Echo.Call", [("stream", "true")]);
//!
//! assert_eq!(handler.endpoints()[0].name, "Echo.Call");
//! ```

mod serve_fn;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::directory::Endpoint;
use crate::net::Connection;

pub use serve_fn::ServeFn;

/// Serves one accepted connection until it is done with it.
#[async_trait]
pub trait Serve: Send + Sync + 'static {
    /// Handles `conn`. The connection (and its limit permit) is released on return.
    async fn serve(&self, conn: Connection);
}

/// Options attached to a [`Handler`].
#[derive(Debug, Clone, Default)]
pub struct HandlerOptions {
    /// Per-endpoint metadata, keyed by endpoint name.
    pub metadata: BTreeMap<String, HashMap<String, String>>,
    /// Internal handlers advertise no endpoints.
    pub internal: bool,
}

/// Connection handler plus its advertised endpoints.
#[derive(Clone)]
pub struct Handler {
    name: String,
    serve: Arc<dyn Serve>,
    opts: HandlerOptions,
}

impl Handler {
    /// Creates a handler with no endpoints.
    pub fn new(name: impl Into<String>, serve: Arc<dyn Serve>) -> Self {
        Self {
            name: name.into(),
            serve,
            opts: HandlerOptions::default(),
        }
    }

    /// Declares an endpoint with its metadata.
    pub fn endpoint<K, V>(
        mut self,
        name: impl Into<String>,
        metadata: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let md = metadata
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.opts.metadata.insert(name.into(), md);
        self
    }

    /// Marks the handler internal (hidden from the directory).
    pub fn internal(mut self, internal: bool) -> Self {
        self.opts.internal = internal;
        self
    }

    /// Handler name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handler options.
    pub fn options(&self) -> &HandlerOptions {
        &self.opts
    }

    /// Endpoints to advertise, ordered by name; empty for internal handlers.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        if self.opts.internal {
            return Vec::new();
        }
        self.opts
            .metadata
            .iter()
            .map(|(name, md)| Endpoint {
                name: name.clone(),
                request: None,
                metadata: md.clone(),
            })
            .collect()
    }

    pub(crate) fn serve_ref(&self) -> Arc<dyn Serve> {
        Arc::clone(&self.serve)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn Serve> {
        ServeFn::arc(|_conn: Connection| async {})
    }

    #[test]
    fn internal_handler_hides_endpoints() {
        let h = Handler::new("rpc", noop())
            .endpoint("Greeter.Hello", [("stream", "false")])
            .endpoint("Greeter.Bye", Vec::<(String, String)>::new());
        let names: Vec<_> = h.endpoints().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["Greeter.Bye", "Greeter.Hello"]);

        let h = h.internal(true);
        assert!(h.endpoints().is_empty());
        assert_eq!(h.options().metadata.len(), 2);
    }
}
