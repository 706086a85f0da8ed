//! Runtime core: lifecycle and orchestration.
//!
//! The public API of this module is [`Server`], its [`ServerConfig`] and
//! [`ServerBuilder`], and the [`RegisterCheck`] health predicate.
//!
//! Internal modules:
//! - [`acceptor`]: accept loop with capped exponential backoff;
//! - [`heartbeat`]: coordinator task, periodic re-registration and shutdown sequence;
//! - [`registration`]: register/deregister against directory and broker;
//! - [`registry`]: subscription bookkeeping and service-record building;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod acceptor;
mod builder;
mod config;
mod health;
mod heartbeat;
mod registration;
mod registry;
mod server;
mod shutdown;

pub use builder::ServerBuilder;
pub use config::ServerConfig;
pub use health::{AlwaysHealthy, CheckFn, RegisterCheck};
pub use server::{Server, ServerState};
