//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: acceptor loop, `Server::register` / `deregister`, heartbeat.
//! - **Consumers**: anything holding a receiver from `Server::events()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
