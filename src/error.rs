//! Error types used by the servisor runtime, its collaborators and handlers.
//!
//! This module defines:
//!
//! - [`ServerError`] — errors returned by the [`Server`](crate::Server) API.
//! - [`ValidationError`] — malformed subscriptions rejected at registration time.
//! - [`CodecError`] — content-type resolution and payload decoding failures.
//! - [`BrokerError`] / [`DirectoryError`] — failures reported by external collaborators.
//! - [`HandlerError`] — the single outcome type every event handler returns.
//!
//! Every enum provides `as_label` for logs/metrics.

use std::io;

use thiserror::Error;

use crate::subscription::SubscriptionId;

/// # Errors produced by the server runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Listener I/O failed outside of binding (address lookup, close).
    #[error("listener error: {0}")]
    Listener(#[source] io::Error),

    /// A subscription or handler was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Inbound event could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Message broker failure.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Service directory failure.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// One or more handlers of a single dispatch failed.
    ///
    /// Messages are kept in handler order.
    #[error("subscriber error: {}", .errors.join("\n"))]
    Subscriber {
        /// Message of every failing handler.
        errors: Vec<String>,
    },

    /// `start` was called without a connection handler.
    #[error("invalid handler: no connection handler configured")]
    NoHandler,

    /// `start` was called while the server is not stopped.
    #[error("server already started")]
    AlreadyStarted,

    /// `stop` was called while the server is not running.
    #[error("server is not running")]
    NotRunning,

    /// No subscription is registered under this id.
    #[error("subscription {0} not found")]
    NotFound(SubscriptionId),

    /// The background coordinator task panicked or was aborted.
    #[error("coordinator task failed: {0}")]
    Coordinator(String),
}

impl ServerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use servisor::ServerError;
    ///
    /// let err = ServerError::Subscriber { errors: vec!["boom".into()] };
    /// assert_eq!(err.as_label(), "server_subscriber");
    /// assert_eq!(err.to_string(), "subscriber error: boom");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServerError::Bind { .. } => "server_bind",
            ServerError::Listener(_) => "server_listener",
            ServerError::Validation(e) => e.as_label(),
            ServerError::Codec(e) => e.as_label(),
            ServerError::Broker(e) => e.as_label(),
            ServerError::Directory(e) => e.as_label(),
            ServerError::Subscriber { .. } => "server_subscriber",
            ServerError::NoHandler => "server_no_handler",
            ServerError::AlreadyStarted => "server_already_started",
            ServerError::NotRunning => "server_not_running",
            ServerError::NotFound(_) => "server_not_found",
            ServerError::Coordinator(_) => "server_coordinator",
        }
    }

    pub(crate) fn bind(addr: impl Into<String>, source: io::Error) -> Self {
        ServerError::Bind {
            addr: addr.into(),
            source,
        }
    }
}

/// # Subscription shape violations.
///
/// Raised synchronously by [`Server::subscribe`](crate::Server::subscribe);
/// a rejected subscription is never stored.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Subscription carries no handlers.
    #[error("invalid subscriber on topic {topic}: no handler functions")]
    NoHandlers {
        /// Subscription topic.
        topic: String,
    },

    /// Wrong number (or order) of parameters.
    #[error("subscriber {handler} takes wrong number of args: {got} required signature {expected}")]
    Arguments {
        /// Handler name (`Func` or `Receiver.Method`).
        handler: String,
        /// Declared parameter list.
        got: String,
        /// Canonical signature.
        expected: &'static str,
    },

    /// Payload type is neither exported nor built-in.
    #[error("subscriber {handler} argument type not exported: {ty}")]
    NotExported {
        /// Handler name.
        handler: String,
        /// Offending type path.
        ty: String,
    },

    /// Wrong number of results.
    #[error("subscriber {handler} has wrong number of outs: {got} require signature {expected}")]
    Results {
        /// Handler name.
        handler: String,
        /// Declared result count.
        got: usize,
        /// Canonical signature.
        expected: &'static str,
    },

    /// The single result is not the handler error type.
    #[error("subscriber {handler} returns {ty} not error")]
    NotError {
        /// Handler name.
        handler: String,
        /// Declared result type.
        ty: String,
    },

    /// The same subscription was registered twice.
    #[error("subscriber {id} on topic {topic} already exists")]
    Duplicate {
        /// Identity of the subscription.
        id: SubscriptionId,
        /// Subscription topic.
        topic: String,
    },
}

impl ValidationError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ValidationError::NoHandlers { .. } => "validation_no_handlers",
            ValidationError::Arguments { .. } => "validation_arguments",
            ValidationError::NotExported { .. } => "validation_not_exported",
            ValidationError::Results { .. } => "validation_results",
            ValidationError::NotError { .. } => "validation_not_error",
            ValidationError::Duplicate { .. } => "validation_duplicate",
        }
    }
}

/// # Codec failures.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// No codec is registered for the event's content type.
    #[error("unknown content type: {0:?}")]
    UnknownContentType(String),

    /// Header frame could not be read.
    #[error("failed to read header: {0}")]
    Header(String),

    /// Body could not be read or decoded into the declared payload.
    #[error("failed to read body: {0}")]
    Body(String),
}

impl CodecError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CodecError::UnknownContentType(_) => "codec_unknown_content_type",
            CodecError::Header(_) => "codec_header",
            CodecError::Body(_) => "codec_body",
        }
    }
}

/// # Message broker failures.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Broker could not connect.
    #[error("broker connect failed: {0}")]
    Connect(String),

    /// Broker could not disconnect cleanly.
    #[error("broker disconnect failed: {0}")]
    Disconnect(String),

    /// Operation requires a connected broker.
    #[error("broker not connected")]
    NotConnected,

    /// Subscribing to a topic failed.
    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe {
        /// Topic that was requested.
        topic: String,
        /// Broker-provided reason.
        reason: String,
    },

    /// Unsubscribing from a topic failed.
    #[error("unsubscribe from {topic} failed: {reason}")]
    Unsubscribe {
        /// Topic of the binding.
        topic: String,
        /// Broker-provided reason.
        reason: String,
    },

    /// A delivered event was rejected by its handler.
    #[error("{0}")]
    Handler(String),
}

impl BrokerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::Connect(_) => "broker_connect",
            BrokerError::Disconnect(_) => "broker_disconnect",
            BrokerError::NotConnected => "broker_not_connected",
            BrokerError::Subscribe { .. } => "broker_subscribe",
            BrokerError::Unsubscribe { .. } => "broker_unsubscribe",
            BrokerError::Handler(_) => "broker_handler",
        }
    }
}

/// # Service directory failures.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// Advertising the service failed.
    #[error("register {service} failed: {reason}")]
    Register {
        /// Service name.
        service: String,
        /// Directory-provided reason.
        reason: String,
    },

    /// Withdrawing the service failed.
    #[error("deregister {service} failed: {reason}")]
    Deregister {
        /// Service name.
        service: String,
        /// Directory-provided reason.
        reason: String,
    },
}

impl DirectoryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DirectoryError::Register { .. } => "directory_register",
            DirectoryError::Deregister { .. } => "directory_deregister",
        }
    }
}

/// # Outcome of a failing event handler.
///
/// Displayed as the bare message, so aggregated dispatch errors read
/// `subscriber error: <message>`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<io::Error> for HandlerError {
    fn from(err: io::Error) -> Self {
        Self::new(err.to_string())
    }
}
