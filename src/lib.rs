//! # servisor
//!
//! **Servisor** is a network service host for Rust.
//!
//! It accepts inbound TCP connections, advertises itself to a service
//! directory on a heartbeat, and fans incoming pub/sub events out to typed
//! handlers. Collaborators (codec, broker, directory) sit behind traits; the
//! crate ships in-memory implementations for tests and local development.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Handler    │   │ Subscription │   │ Subscription │
//!     │ (connections)│   │  (topic #1)  │   │  (topic #2)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Server (lifecycle coordinator)                                   │
//! │  - RwLock<config, handler, registry, registered, cached record>   │
//! │  - Bus (broadcast runtime events)                                 │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐
//!     │   Acceptor   │   │  Heartbeat   │   │  Broker bindings     │
//!     │ (accept loop │   │ (register /  │   │  Dispatcher per      │
//!     │  + backoff)  │   │  deregister) │   │  subscription        │
//!     └──────┬───────┘   └──────┬───────┘   └──────────┬───────────┘
//!            ▼                  ▼                      ▼
//!     Serve::serve(conn)   Directory::register   handlers (JoinSet fan-out)
//! ```
//!
//! ### Dispatch
//! ```text
//! BrokerEvent ─► codec by Content-Type ─► decode once per handler
//!             ─► wrappers (first = outermost) ─► all handlers concurrently
//!             ─► Ok | "subscriber error: <msg>\n<msg>..." (handler order)
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                          |
//! |-------------------|----------------------------------------------------------------|---------------------------------------------|
//! | **Server**        | Start/stop, registration heartbeat, graceful shutdown.         | [`Server`], [`ServerState`]                 |
//! | **Handlers**      | Serve accepted connections, advertise endpoints.               | [`Handler`], [`Serve`], [`ServeFn`]         |
//! | **Subscriptions** | Typed event handlers, validation, concurrent fan-out.          | [`Subscription`], [`EventHandler`]          |
//! | **Collaborators** | Codec, broker and directory contracts with in-memory backends. | [`Codec`], [`Broker`], [`Directory`]        |
//! | **Policies**      | Accept-error backoff.                                          | [`BackoffPolicy`]                           |
//! | **Errors**        | Typed errors with stable labels.                               | [`ServerError`], [`HandlerError`]           |
//! | **Configuration** | Centralized settings and builder.                              | [`ServerConfig`], [`ServerBuilder`]         |
//!
//! ## Optional features
//! - `tls`: terminates TLS on accepted connections (`tokio-rustls`).
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use serde::Deserialize;
//! use servisor::{Connection, Context, EventHandler, Handler, HandlerError, ServeFn, Server, Subscription};
//!
//! #[derive(Deserialize)]
//! struct Order { id: u64 }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .with_name("shop")
//!         .with_address("127.0.0.1:0")
//!         .with_register_interval(Duration::ZERO)
//!         .build();
//!
//!     server
//!         .handle(Handler::new("rpc", ServeFn::arc(|_conn: Connection| async {})))
//!         .await;
//!
//!     server
//!         .subscribe(Subscription::new(
//!             "orders",
//!             EventHandler::func(|_ctx: Context, order: Order| async move {
//!                 println!("order {}", order.id);
//!                 Ok::<(), HandlerError>(())
//!             }),
//!         ))
//!         .await?;
//!
//!     server.start().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

mod context;
mod core;
mod error;
mod events;
mod handler;
mod net;
mod policies;
mod subscription;

pub mod broker;
pub mod codec;
pub mod directory;

// ---- Public re-exports ----

pub use broker::{Binding, Broker, BrokerEvent, BrokerHandler, MemoryBroker, SubscribeOptions};
pub use codec::{Codec, JsonCodec};
pub use context::{Context, Metadata};
pub use core::{
    AlwaysHealthy, CheckFn, RegisterCheck, Server, ServerBuilder, ServerConfig, ServerState,
};
pub use directory::{Directory, MemoryDirectory, Service};
pub use error::{
    BrokerError, CodecError, DirectoryError, HandlerError, ServerError, ValidationError,
};
pub use events::{Event, EventKind};
pub use handler::{Handler, HandlerOptions, Serve, ServeFn};
pub use net::{Accept, Connection, Listener, ListenerSlot, Stream, is_temporary};
pub use policies::BackoffPolicy;
pub use subscription::{
    DecodeFn, EventHandler, HandlerKind, Message, Param, Payload, Signature, SubscriberFn,
    SubscriberWrapper, Subscription, SubscriptionBuilder, SubscriptionId, SubscriptionOptions,
    TypeRef, decoder,
};
