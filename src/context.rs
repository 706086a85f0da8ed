//! # Request/event context.
//!
//! [`Context`] travels with every broker call and every handler invocation.
//! It pairs a [`CancellationToken`] with a read-only metadata map (for
//! dispatched events: the inbound headers minus `Content-Type`).
//!
//! Cloning is cheap; clones share both the token and the metadata.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Metadata carried by a [`Context`].
pub type Metadata = HashMap<String, String>;

/// Cancellation + metadata carrier handed to brokers and handlers.
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: CancellationToken,
    metadata: Arc<Metadata>,
}

impl Context {
    /// Returns a fresh context that is never cancelled unless asked to.
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a context sharing this token but carrying `metadata`.
    pub fn with_metadata(&self, metadata: Metadata) -> Self {
        Self {
            token: self.token.clone(),
            metadata: Arc::new(metadata),
        }
    }

    /// Returns a context whose token is a child of this one.
    ///
    /// Cancelling the child does not affect the parent.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            metadata: Arc::clone(&self.metadata),
        }
    }

    /// Returns the metadata map.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Looks up one metadata value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Returns the underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancels this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
