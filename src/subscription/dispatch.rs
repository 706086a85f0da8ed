//! # Event fan-out for one subscription.
//!
//! ```text
//! BrokerEvent ──► resolve codec (Content-Type) ──► ctx = base ctx + headers \ Content-Type
//!                          │
//!                          ▼  for every handler (all before any runs)
//!            read_header(Event) ─► read_body ─► decode into declared payload
//!                          │
//!                          ▼
//!      wrap: w[0](w[1](..w[n-1](handler)))  ──►  JoinSet: one task per handler
//!                          │
//!                          ▼
//!          N outcomes in handler order ──► Ok | ServerError::Subscriber
//! ```
//!
//! ## Rules
//! - A decode failure for any handler fails the dispatch before any handler starts.
//! - A panicking handler counts as a failure carrying its panic message.
//! - There is no timeout; the dispatch returns once every handler finished.
//! - Handlers get a child of the subscription context; it is cancelled when the
//!   dispatch returns, the subscription context itself is left alone.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;

use super::{Message, SubscriberFn, SubscriberWrapper, Subscription};
use crate::broker::{BrokerEvent, BrokerHandler};
use crate::codec::{self, CONTENT_TYPE, Codecs, Frame, MessageKind};
use crate::context::{Context, Metadata};
use crate::error::ServerError;

/// Decodes and fans out the events of one subscription.
pub(crate) struct Dispatcher {
    sub: Subscription,
    codecs: Arc<Codecs>,
    wrappers: Arc<[SubscriberWrapper]>,
    context: Context,
}

impl Dispatcher {
    pub(crate) fn new(
        sub: Subscription,
        codecs: Arc<Codecs>,
        wrappers: Arc<[SubscriberWrapper]>,
        context: Context,
    ) -> Self {
        Self {
            sub,
            codecs,
            wrappers,
            context,
        }
    }

    /// Converts the dispatcher into the callback handed to the broker.
    pub(crate) fn into_handler(self) -> BrokerHandler {
        let this = Arc::new(self);
        Arc::new(move |event: BrokerEvent| {
            let this = Arc::clone(&this);
            async move { this.dispatch(event).await }.boxed()
        })
    }

    pub(crate) async fn dispatch(&self, event: BrokerEvent) -> Result<(), ServerError> {
        let content_type = event
            .header
            .get(CONTENT_TYPE)
            .map(String::as_str)
            .unwrap_or_default();
        let codec = codec::resolve(&self.codecs, content_type)?;

        let metadata: Metadata = event
            .header
            .iter()
            .filter(|(k, _)| k.as_str() != CONTENT_TYPE)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let ctx = self.context.child().with_metadata(metadata);
        let _cancel_on_return = ctx.token().clone().drop_guard();
        let header = Arc::new(event.header.clone());

        let mut calls = Vec::with_capacity(self.sub.handlers().len());
        for handler in self.sub.handlers() {
            let mut buf = event.body.clone();
            let mut frame = Frame::default();
            codec.read_header(&mut buf, &mut frame, MessageKind::Event)?;
            let value = codec.read_body(&mut buf)?;
            let payload = handler.decode(value)?;

            let msg = Message::new(
                self.sub.topic(),
                content_type,
                Arc::clone(&header),
                event.body.clone(),
                payload,
            );
            calls.push((self.wrap(handler.invoker()), msg));
        }

        let total = calls.len();
        let mut set = JoinSet::new();
        for (idx, (call, msg)) in calls.into_iter().enumerate() {
            let ctx = ctx.clone();
            set.spawn(async move {
                let outcome = AssertUnwindSafe(call(ctx, msg)).catch_unwind().await;
                let outcome = match outcome {
                    Ok(res) => res.map_err(|e| e.to_string()),
                    Err(panic) => Err(panic_message(panic)),
                };
                (idx, outcome)
            });
        }

        let mut failures: Vec<Option<String>> = vec![None; total];
        let mut lost = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, Err(msg))) => failures[idx] = Some(msg),
                Ok((_, Ok(()))) => {}
                Err(err) => lost.push(format!("handler task failed: {err}")),
            }
        }

        let errors: Vec<String> = failures.into_iter().flatten().chain(lost).collect();
        if errors.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            topic = %self.sub.topic(),
            failed = errors.len(),
            total,
            "subscriber handlers failed"
        );
        Err(ServerError::Subscriber { errors })
    }

    fn wrap(&self, inner: SubscriberFn) -> SubscriberFn {
        self.wrappers
            .iter()
            .rev()
            .fold(inner, |next, wrapper| wrapper(next))
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::Bytes;

    use serde::Deserialize;

    use super::*;
    use crate::codec::{Codec, Value, default_codecs};
    use crate::error::{CodecError, HandlerError};
    use crate::subscription::EventHandler;

    #[derive(Debug, Deserialize)]
    struct Order {
        id: u64,
    }

    fn dispatcher(sub: Subscription, wrappers: Vec<SubscriberWrapper>) -> Dispatcher {
        Dispatcher::new(
            sub,
            Arc::new(default_codecs()),
            wrappers.into(),
            Context::background(),
        )
    }

    fn json(body: &'static str) -> BrokerEvent {
        BrokerEvent::new("application/json", body)
    }

    #[tokio::test]
    async fn unknown_content_type_fails_before_handlers() {
        let hits = Arc::new(Mutex::new(0));
        let h = Arc::clone(&hits);
        let sub = Subscription::new(
            "orders",
            EventHandler::func_payload(move |_o: Order| {
                *h.lock().unwrap() += 1;
                async { Ok::<(), HandlerError>(()) }
            }),
        );

        let err = dispatcher(sub, Vec::new())
            .dispatch(BrokerEvent::new("text/xml", "<order/>"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Codec(CodecError::UnknownContentType(ref ct)) if ct == "text/xml"
        ));
        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn decode_failure_starts_no_handler() {
        #[derive(Debug, Deserialize)]
        struct Strict {
            #[allow(dead_code)]
            sku: String,
        }

        let hits = Arc::new(Mutex::new(0));
        let h = Arc::clone(&hits);
        let sub = Subscription::builder("orders")
            .handler(EventHandler::func_payload(move |_o: Order| {
                *h.lock().unwrap() += 1;
                async { Ok::<(), HandlerError>(()) }
            }))
            .handler(EventHandler::func_payload(|_s: Strict| async {
                Ok::<(), HandlerError>(())
            }))
            .build();

        let err = dispatcher(sub, Vec::new())
            .dispatch(json(r#"{"id": 1}"#))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "codec_body");
        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn errors_keep_handler_order() {
        let calls: Arc<[AtomicUsize; 3]> = Arc::default();
        let counted = |idx: usize, delay: u64, outcome: Result<(), &'static str>| {
            let calls = Arc::clone(&calls);
            EventHandler::func_payload(move |_o: Order| {
                calls[idx].fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    outcome.map_err(HandlerError::new)
                }
            })
        };
        let sub = Subscription::builder("orders")
            .handler(counted(0, 30, Err("first")))
            .handler(counted(1, 0, Ok(())))
            .handler(counted(2, 0, Err("third")))
            .build();

        let err = dispatcher(sub, Vec::new())
            .dispatch(json(r#"{"id": 1}"#))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "subscriber error: first\nthird");

        let counts: Vec<usize> = calls.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        assert_eq!(counts, [1, 1, 1]);
    }

    #[tokio::test]
    async fn panic_counts_as_failure() {
        let sub = Subscription::builder("orders")
            .handler(EventHandler::func_payload(|o: Order| async move {
                if o.id == 1 {
                    panic!("bad order");
                }
                Ok::<(), HandlerError>(())
            }))
            .build();

        let err = dispatcher(sub, Vec::new())
            .dispatch(json(r#"{"id": 1}"#))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "subscriber error: handler panicked: bad order");
    }

    #[tokio::test]
    async fn context_carries_headers_without_content_type() {
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        let sub = Subscription::new(
            "orders",
            EventHandler::func(move |ctx: Context, o: Order| {
                *s.lock().unwrap() = Some((ctx.metadata().clone(), o.id));
                async { Ok::<(), HandlerError>(()) }
            }),
        );

        dispatcher(sub, Vec::new())
            .dispatch(json(r#"{"id": 9}"#).with_header("X-Trace", "abc"))
            .await
            .unwrap();

        let (md, id) = seen.lock().unwrap().take().unwrap();
        assert_eq!(id, 9);
        assert_eq!(md.get("X-Trace").map(String::as_str), Some("abc"));
        assert!(!md.contains_key(CONTENT_TYPE));
    }

    #[tokio::test]
    async fn first_wrapper_is_outermost() {
        let trail = Arc::new(Mutex::new(Vec::<&'static str>::new()));

        let tag = |label: &'static str, trail: Arc<Mutex<Vec<&'static str>>>| -> SubscriberWrapper {
            Arc::new(move |next: SubscriberFn| -> SubscriberFn {
                let trail = Arc::clone(&trail);
                Arc::new(move |ctx: Context, msg: Message| {
                    trail.lock().unwrap().push(label);
                    next(ctx, msg)
                })
            })
        };

        let t = Arc::clone(&trail);
        let sub = Subscription::new(
            "orders",
            EventHandler::func_payload(move |_o: Order| {
                t.lock().unwrap().push("handler");
                async { Ok::<(), HandlerError>(()) }
            }),
        );
        let wrappers = vec![tag("outer", Arc::clone(&trail)), tag("inner", Arc::clone(&trail))];

        dispatcher(sub, wrappers)
            .dispatch(json(r#"{"id": 1}"#))
            .await
            .unwrap();
        assert_eq!(*trail.lock().unwrap(), ["outer", "inner", "handler"]);
    }

    #[tokio::test]
    async fn handler_context_is_cancelled_after_dispatch() {
        let kept = Arc::new(Mutex::new(None));
        let k = Arc::clone(&kept);
        let sub = Subscription::new(
            "orders",
            EventHandler::func(move |ctx: Context, _o: Order| {
                let live = !ctx.is_cancelled();
                *k.lock().unwrap() = Some(ctx);
                async move {
                    assert!(live);
                    Ok::<(), HandlerError>(())
                }
            }),
        );
        let base = Context::background();
        let d = Dispatcher::new(
            sub,
            Arc::new(default_codecs()),
            Vec::<SubscriberWrapper>::new().into(),
            base.clone(),
        );

        d.dispatch(json(r#"{"id": 1}"#)).await.unwrap();

        let ctx = kept.lock().unwrap().take().unwrap();
        assert!(ctx.is_cancelled());
        assert!(!base.is_cancelled());
    }

    /// Plain-text codec: the whole body becomes a string value.
    struct TextCodec;

    impl Codec for TextCodec {
        fn name(&self) -> &str {
            "text"
        }

        fn read_header(
            &self,
            _buf: &mut Bytes,
            _frame: &mut Frame,
            _kind: MessageKind,
        ) -> Result<(), CodecError> {
            Ok(())
        }

        fn read_body(&self, buf: &mut Bytes) -> Result<Value, CodecError> {
            let body = std::mem::take(buf);
            String::from_utf8(body.to_vec())
                .map(Value::String)
                .map_err(|e| CodecError::Body(e.to_string()))
        }
    }

    #[tokio::test]
    async fn non_json_codec_feeds_typed_handlers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let sub = Subscription::new(
            "greetings",
            EventHandler::func_payload(move |text: String| {
                s.lock().unwrap().push(text);
                async { Ok::<(), HandlerError>(()) }
            }),
        );
        let mut codecs = default_codecs();
        codecs.insert("text/plain".to_string(), Arc::new(TextCodec));
        let d = Dispatcher::new(
            sub,
            Arc::new(codecs),
            Vec::<SubscriberWrapper>::new().into(),
            Context::background(),
        );

        d.dispatch(BrokerEvent::new("text/plain", "hello")).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), ["hello"]);
    }
}
