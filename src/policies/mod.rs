//! Retry policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how the acceptor's sleep grows after consecutive
//!   temporary accept failures (first / factor / max)
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=5ms, factor=2.0, max=1s.

mod backoff;

pub use backoff::BackoffPolicy;
