//! # Function-backed connection handler (`ServeFn`)
//!
//! [`ServeFn`] wraps a closure `F: Fn(Connection) -> Fut`, producing a fresh
//! future per connection. Shared state goes through an explicit `Arc` captured
//! by the closure.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::Serve;
use crate::net::Connection;

/// Function-backed [`Serve`] implementation.
#[derive(Debug)]
pub struct ServeFn<F> {
    f: F,
}

impl<F> ServeFn<F> {
    /// Wraps a closure.
    ///
    /// Prefer [`ServeFn::arc`] when you immediately need a shared handle.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps a closure and returns it as `Arc<Self>`.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Serve for ServeFn<F>
where
    F: Fn(Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn serve(&self, conn: Connection) {
        (self.f)(conn).await
    }
}
