//! # Typed event handlers.
//!
//! An [`EventHandler`] carries three things:
//! - a declared [`Signature`] (function or receiver method, parameter list,
//!   result list) checked when the subscription is added;
//! - a decode step turning the codec's [`Value`] into the declared payload;
//! - the invocation itself, a [`SubscriberFn`].
//!
//! The typed constructors ([`EventHandler::func`], [`EventHandler::func_payload`],
//! [`EventHandler::method`]) derive the signature from the closure's types, so
//! they are valid by construction as long as the payload type is public.
//! [`EventHandler::dynamic`] accepts a hand-written signature and is checked
//! like any other handler.

use std::any::{Any, type_name};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;

use super::Message;
use crate::codec::Value;
use crate::context::Context;
use crate::error::{CodecError, HandlerError};

/// Decoded payload handed to one handler.
pub type Payload = Box<dyn Any + Send>;

/// Turns a decoded body into a handler's payload.
pub type DecodeFn = Arc<dyn Fn(Value) -> Result<Payload, CodecError> + Send + Sync>;

/// Invocation of one event handler.
pub type SubscriberFn =
    Arc<dyn Fn(Context, Message) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// Middleware around a [`SubscriberFn`].
///
/// The first configured wrapper is the outermost one.
pub type SubscriberWrapper = Arc<dyn Fn(SubscriberFn) -> SubscriberFn + Send + Sync>;

/// Reference to a Rust type by module path and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    path: String,
    name: String,
}

impl TypeRef {
    /// Describes `T`.
    pub fn of<T: ?Sized>() -> Self {
        Self::parse(type_name::<T>())
    }

    /// Describes a type by hand. `path` may be empty.
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    fn parse(full: &str) -> Self {
        let full = full.trim_start_matches('&');
        if full.starts_with(['(', '[']) {
            return Self::new("", full);
        }
        let base_end = full.find('<').unwrap_or(full.len());
        match full[..base_end].rfind("::") {
            Some(i) => Self::new(&full[..i], &full[i + 2..]),
            None => Self::new("", full),
        }
    }

    /// Module path (empty for primitives, tuples and slices).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Type name, including generic arguments.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Standard-library or path-less type.
    pub fn is_builtin(&self) -> bool {
        self.path.is_empty()
            || ["core", "alloc", "std"]
                .iter()
                .any(|root| self.path == *root || self.path.starts_with(&format!("{root}::")))
    }

    /// Type name starts with an uppercase letter.
    pub fn is_exported(&self) -> bool {
        self.name.chars().next().is_some_and(char::is_uppercase)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}::{}", self.path, self.name)
        }
    }
}

/// Function handler or method of a receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    /// Free function or closure, advertised as `Func`.
    Func,
    /// Method on a receiver, advertised as `Receiver.Method`.
    Method {
        /// Receiver type name.
        receiver: String,
        /// Method name.
        method: String,
    },
}

/// One declared handler parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// Request context.
    Context,
    /// Decoded event payload.
    Payload(TypeRef),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Context => f.write_str("Context"),
            Param::Payload(ty) => write!(f, "{ty}"),
        }
    }
}

/// Declared shape of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Function or method.
    pub kind: HandlerKind,
    /// Parameters, in order.
    pub params: Vec<Param>,
    /// Result types.
    pub results: Vec<TypeRef>,
}

impl Signature {
    /// Function signature.
    pub fn func(params: Vec<Param>, results: Vec<TypeRef>) -> Self {
        Self {
            kind: HandlerKind::Func,
            params,
            results,
        }
    }

    /// Method signature.
    pub fn method(
        receiver: impl Into<String>,
        method: impl Into<String>,
        params: Vec<Param>,
        results: Vec<TypeRef>,
    ) -> Self {
        Self {
            kind: HandlerKind::Method {
                receiver: receiver.into(),
                method: method.into(),
            },
            params,
            results,
        }
    }

    /// `Func` or `Receiver.Method`.
    pub fn handler_name(&self) -> String {
        match &self.kind {
            HandlerKind::Func => "Func".to_string(),
            HandlerKind::Method { receiver, method } => format!("{receiver}.{method}"),
        }
    }

    /// Declared payload type (last parameter), if any.
    pub fn payload(&self) -> Option<&TypeRef> {
        match self.params.last() {
            Some(Param::Payload(ty)) => Some(ty),
            _ => None,
        }
    }

    pub(crate) fn describe_params(&self) -> String {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        format!("({})", params.join(", "))
    }

    fn typed<T: ?Sized>(kind: HandlerKind, with_context: bool) -> Self {
        let mut params = Vec::with_capacity(2);
        if with_context {
            params.push(Param::Context);
        }
        params.push(Param::Payload(TypeRef::of::<T>()));
        Self {
            kind,
            params,
            results: vec![TypeRef::of::<HandlerError>()],
        }
    }
}

/// One consumer of a subscription's events.
#[derive(Clone)]
pub struct EventHandler {
    signature: Signature,
    decode: DecodeFn,
    invoke: SubscriberFn,
}

impl EventHandler {
    /// Handler taking the request context and a payload.
    ///
    /// ```rust
    /// use serde::Deserialize;
    /// use servisor::{Context, EventHandler, HandlerError};
    ///
    /// #[derive(Deserialize)]
    /// struct Order { id: u64 }
    ///
    /// let h = EventHandler::func(|_ctx: Context, order: Order| async move {
    ///     if order.id == 0 {
    ///         return Err(HandlerError::new("empty order"));
    ///     }
    ///     Ok(())
    /// });
    /// assert_eq!(h.name(), "Func");
    /// ```
    pub fn func<T, F, Fut>(f: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(Context, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let invoke: SubscriberFn =
            Arc::new(move |ctx: Context, msg: Message| match msg.into_payload::<T>() {
                Ok(payload) => f(ctx, payload).boxed(),
                Err(err) => futures::future::ready(Err(err)).boxed(),
            });
        Self {
            signature: Signature::typed::<T>(HandlerKind::Func, true),
            decode: decoder::<T>(),
            invoke,
        }
    }

    /// Handler taking only a payload.
    pub fn func_payload<T, F, Fut>(f: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let invoke: SubscriberFn =
            Arc::new(move |_ctx: Context, msg: Message| match msg.into_payload::<T>() {
                Ok(payload) => f(payload).boxed(),
                Err(err) => futures::future::ready(Err(err)).boxed(),
            });
        Self {
            signature: Signature::typed::<T>(HandlerKind::Func, false),
            decode: decoder::<T>(),
            invoke,
        }
    }

    /// Method `method` of `receiver`, advertised as `Receiver.method`.
    pub fn method<R, T, F, Fut>(receiver: Arc<R>, method: &str, f: F) -> Self
    where
        R: Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        F: Fn(Arc<R>, Context, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let kind = HandlerKind::Method {
            receiver: TypeRef::of::<R>().name().to_string(),
            method: method.to_string(),
        };
        let invoke: SubscriberFn =
            Arc::new(move |ctx: Context, msg: Message| match msg.into_payload::<T>() {
                Ok(payload) => f(Arc::clone(&receiver), ctx, payload).boxed(),
                Err(err) => futures::future::ready(Err(err)).boxed(),
            });
        Self {
            signature: Signature::typed::<T>(kind, true),
            decode: decoder::<T>(),
            invoke,
        }
    }

    /// Handler with a hand-declared signature.
    ///
    /// The signature is validated when the subscription is added.
    pub fn dynamic(signature: Signature, decode: DecodeFn, invoke: SubscriberFn) -> Self {
        Self {
            signature,
            decode,
            invoke,
        }
    }

    /// Declared signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// `Func` or `Receiver.Method`.
    pub fn name(&self) -> String {
        self.signature.handler_name()
    }

    pub(crate) fn decode(&self, value: Value) -> Result<Payload, CodecError> {
        (self.decode)(value)
    }

    pub(crate) fn invoker(&self) -> SubscriberFn {
        Arc::clone(&self.invoke)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Decoder producing `T` from a decoded body.
pub fn decoder<T>() -> DecodeFn
where
    T: DeserializeOwned + Send + 'static,
{
    Arc::new(|value: Value| {
        serde_json::from_value::<T>(value)
            .map(|v| Box::new(v) as Payload)
            .map_err(|e| CodecError::Body(format!("{}: {e}", type_name::<T>())))
    })
}
