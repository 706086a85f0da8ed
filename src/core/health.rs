//! # Health predicate consulted on every heartbeat tick.
//!
//! A failing check withdraws a registered service; it never causes a
//! registration.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::HandlerError;

/// Health predicate.
#[async_trait]
pub trait RegisterCheck: Send + Sync + 'static {
    /// Returns `Err` when the service should not be advertised.
    async fn check(&self, ctx: &Context) -> Result<(), HandlerError>;
}

/// Check that always passes (the default).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysHealthy;

#[async_trait]
impl RegisterCheck for AlwaysHealthy {
    async fn check(&self, _ctx: &Context) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Function-backed [`RegisterCheck`].
#[derive(Debug)]
pub struct CheckFn<F> {
    f: F,
}

impl<F> CheckFn<F> {
    /// Wraps a closure and returns it as `Arc<Self>`.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self { f })
    }
}

#[async_trait]
impl<F, Fut> RegisterCheck for CheckFn<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn check(&self, ctx: &Context) -> Result<(), HandlerError> {
        (self.f)(ctx.clone()).await
    }
}
