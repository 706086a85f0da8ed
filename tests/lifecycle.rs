mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::{BrokenDirectory, Harness, RefusingBroker, echo, noop, wait_for};
use servisor::{
    CheckFn, Context, EventHandler, EventKind, HandlerError, MemoryBroker, ServerError,
    ServerState, Subscription,
};

fn orders() -> Subscription {
    topic("orders")
}

fn topic(name: &str) -> Subscription {
    Subscription::new(
        name,
        EventHandler::func(|_ctx: Context, _v: serde_json::Value| async {
            Ok::<(), HandlerError>(())
        }),
    )
}

#[tokio::test]
async fn start_registers_and_stop_withdraws() {
    let h = Harness::new();
    let server = h.builder().build();
    server.handle(noop()).await;

    server.start().await.unwrap();
    assert_eq!(server.state().await, ServerState::Running);
    assert!(server.is_registered().await);
    assert!(h.broker.is_connected());
    assert!(!server.address().await.ends_with(":0"));

    let record = h.directory.get_service("test").await.unwrap();
    assert_eq!(record.nodes[0].id, "test-1");
    assert_eq!(record.nodes[0].address, server.address().await);

    server.stop().await.unwrap();
    assert_eq!(server.state().await, ServerState::Stopped);
    assert!(!server.is_registered().await);
    assert!(!h.broker.is_connected());
    assert!(h.directory.get_service("test").await.is_none());
    assert_eq!(h.directory.deregistrations(), 1);
}

#[tokio::test]
async fn lifecycle_misuse_is_rejected() {
    let h = Harness::new();
    let server = h.builder().build();

    assert!(matches!(server.stop().await, Err(ServerError::NotRunning)));
    assert!(matches!(server.start().await, Err(ServerError::NoHandler)));
    assert_eq!(server.state().await, ServerState::Stopped);

    server.handle(noop()).await;
    server.start().await.unwrap();
    assert!(matches!(server.start().await, Err(ServerError::AlreadyStarted)));

    server.stop().await.unwrap();
    assert!(matches!(server.stop().await, Err(ServerError::NotRunning)));

    // restartable once stopped
    server.start().await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn accepted_connections_reach_the_handler() {
    let h = Harness::new();
    let server = h.builder().build();
    server.handle(echo()).await;
    server.start().await.unwrap();

    let mut stream = TcpStream::connect(server.address().await).await.unwrap();
    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    drop(stream);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn pre_bound_listener_is_used() {
    let bound = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = bound.local_addr().unwrap().to_string();

    let h = Harness::new();
    let server = h.builder().with_listener(bound).build();
    server.handle(echo()).await;
    server.start().await.unwrap();
    assert_eq!(server.address().await, addr);

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream.write_all(b"hi").await.unwrap();
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hi");

    drop(stream);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn bind_failure_leaves_server_stopped() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let h = Harness::new();
    let server = h.builder().with_address(addr).build();
    server.handle(noop()).await;

    let err = server.start().await.unwrap_err();
    assert_eq!(err.as_label(), "server_bind");
    assert_eq!(server.state().await, ServerState::Stopped);
    assert!(!h.broker.is_connected());
}

#[tokio::test]
async fn failed_registration_aborts_start() {
    let h = Harness::new();
    let directory = Arc::new(BrokenDirectory::default());
    let server = h
        .builder()
        .with_directory(directory.clone())
        .with_register_attempts(3)
        .build();
    server.handle(noop()).await;

    let err = server.start().await.unwrap_err();
    assert_eq!(err.as_label(), "directory_register");
    assert_eq!(directory.registers.load(Ordering::SeqCst), 3);
    assert_eq!(server.state().await, ServerState::Stopped);
    assert!(!server.is_registered().await);
    assert!(!h.broker.is_connected());
}

#[tokio::test]
async fn failed_arming_withdraws_advertised_record() {
    let h = Harness::new();
    let refusing = Arc::new(RefusingBroker {
        inner: h.broker.clone(),
    });
    let server = h.builder().with_broker(refusing).build();
    server.handle(noop()).await;
    server.subscribe(orders()).await.unwrap();

    let err = server.start().await.unwrap_err();
    assert_eq!(err.as_label(), "broker_subscribe");
    assert_eq!(h.directory.registrations(), 1);
    assert!(h.directory.get_service("test").await.is_none());
    assert_eq!(server.state().await, ServerState::Stopped);
    assert!(!server.is_registered().await);
    assert!(!h.broker.is_connected());
}

#[tokio::test]
async fn repeated_register_keeps_one_binding() {
    let h = Harness::new();
    let server = h.builder().build();
    server.handle(noop()).await;
    server.subscribe(orders()).await.unwrap();

    server.start().await.unwrap();
    server.register().await.unwrap();
    server.register().await.unwrap();

    assert_eq!(h.broker.bindings("orders").await.len(), 1);
    assert_eq!(h.directory.registrations(), 3);

    server.stop().await.unwrap();
    assert!(h.broker.bindings("orders").await.is_empty());
}

#[tokio::test]
async fn register_while_registered_keeps_advertised_endpoints() {
    let h = Harness::new();
    let server = h.builder().build();
    server.handle(noop()).await;
    server.subscribe(orders()).await.unwrap();
    server.start().await.unwrap();
    let before = h.directory.get_service("test").await.unwrap().endpoints;

    // added after registration: stays unarmed until the next deregister
    server.subscribe(topic("zeta")).await.unwrap();
    server.register().await.unwrap();

    let after = h.directory.get_service("test").await.unwrap().endpoints;
    assert_eq!(after, before);
    assert!(h.broker.bindings("zeta").await.is_empty());
    assert_eq!(h.broker.bindings("orders").await.len(), 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn deregister_tears_down_and_register_rearms() {
    let h = Harness::new();
    let server = h.builder().build();
    server.handle(noop()).await;
    server.subscribe(orders()).await.unwrap();
    server.start().await.unwrap();

    server.deregister().await.unwrap();
    assert!(!server.is_registered().await);
    assert!(h.broker.bindings("orders").await.is_empty());
    assert!(h.directory.get_service("test").await.is_none());

    server.register().await.unwrap();
    assert!(server.is_registered().await);
    assert_eq!(h.broker.bindings("orders").await.len(), 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn deregister_error_is_returned_after_teardown() {
    let h = Harness::new();
    let server = h.builder().build();
    server.handle(noop()).await;
    server.subscribe(orders()).await.unwrap();
    server.start().await.unwrap();

    server
        .init(|cfg| cfg.directory = Arc::new(BrokenDirectory::default()))
        .await;
    let err = server.deregister().await.unwrap_err();
    assert_eq!(err.as_label(), "directory_deregister");
    assert!(!server.is_registered().await);
    assert!(h.broker.bindings("orders").await.is_empty());

    // withdrawal failures on stop are logged, not returned
    server.stop().await.unwrap();
}

#[tokio::test]
async fn internal_subscriptions_are_neither_armed_nor_advertised() {
    let h = Harness::new();
    let server = h.builder().build();
    server.handle(noop()).await;
    server
        .subscribe(
            Subscription::builder("audit")
                .handler(EventHandler::func_payload(|_v: String| async {
                    Ok::<(), HandlerError>(())
                }))
                .internal(true)
                .build(),
        )
        .await
        .unwrap();
    server.subscribe(orders()).await.unwrap();
    server.start().await.unwrap();

    assert!(h.broker.bindings("audit").await.is_empty());
    assert_eq!(h.broker.bindings("orders").await.len(), 1);

    let record = h.directory.get_service("test").await.unwrap();
    let topics: Vec<&str> = record
        .endpoints
        .iter()
        .filter_map(|e| e.metadata.get("topic").map(String::as_str))
        .collect();
    assert_eq!(topics, ["orders"]);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn removing_a_subscription_unsubscribes_it() {
    let h = Harness::new();
    let server = h.builder().build();
    server.handle(noop()).await;
    let id = server.subscribe(orders()).await.unwrap();
    server.start().await.unwrap();
    assert_eq!(server.subscriptions().await, vec![(id, "orders".to_string())]);

    server.remove_subscription(id).await.unwrap();
    assert!(h.broker.bindings("orders").await.is_empty());
    assert!(server.subscriptions().await.is_empty());
    assert!(matches!(
        server.remove_subscription(id).await,
        Err(ServerError::NotFound(missing)) if missing == id
    ));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn duplicate_subscription_is_rejected() {
    let h = Harness::new();
    let server = h.builder().build();
    let sub = orders();
    server.subscribe(sub.clone()).await.unwrap();

    let err = server.subscribe(sub).await.unwrap_err();
    assert_eq!(err.as_label(), "validation_duplicate");
    assert_eq!(server.subscriptions().await.len(), 1);
}

#[tokio::test]
async fn failing_check_withdraws_registered_service() {
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = healthy.clone();

    let h = Harness::new();
    let server = h
        .builder()
        .with_register_interval(Duration::from_millis(20))
        .with_register_check(CheckFn::arc(move |_ctx: Context| {
            let ok = flag.load(Ordering::SeqCst);
            async move {
                if ok {
                    Ok(())
                } else {
                    Err(HandlerError::new("disk full"))
                }
            }
        }))
        .build();
    server.handle(noop()).await;
    server.subscribe(orders()).await.unwrap();

    let mut events = server.events();
    server.start().await.unwrap();
    wait_for(&mut events, EventKind::Registered).await;

    healthy.store(false, Ordering::SeqCst);
    let failed = wait_for(&mut events, EventKind::HealthCheckFailed).await;
    assert_eq!(failed.error.as_deref(), Some("disk full"));
    wait_for(&mut events, EventKind::Deregistered).await;

    assert!(!server.is_registered().await);
    assert!(h.broker.bindings("orders").await.is_empty());

    healthy.store(true, Ordering::SeqCst);
    wait_for(&mut events, EventKind::Subscribed).await;
    assert!(server.is_registered().await);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn failing_check_never_registers() {
    let checks = Arc::new(AtomicUsize::new(0));
    let seen = checks.clone();

    let h = Harness::new();
    let server = h
        .builder()
        .with_register_interval(Duration::from_millis(10))
        .with_register_check(CheckFn::arc(move |_ctx: Context| {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(HandlerError::new("not ready")) }
        }))
        .build();
    server.handle(noop()).await;
    server.start().await.unwrap();
    server.deregister().await.unwrap();

    let mut events = server.events();
    for _ in 0..3 {
        wait_for(&mut events, EventKind::HealthCheckFailed).await;
    }

    assert!(checks.load(Ordering::SeqCst) >= 3);
    assert!(!server.is_registered().await);
    // only the registration performed by start
    assert_eq!(h.directory.registrations(), 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn stop_closes_listener_with_armed_subscriptions() {
    let h = Harness::new();
    let server = h.builder().build();
    server.handle(noop()).await;
    for name in ["orders", "invoices", "refunds"] {
        server.subscribe(topic(name)).await.unwrap();
    }
    server.start().await.unwrap();
    let addr = server.address().await;
    assert_eq!(h.broker.bindings("refunds").await.len(), 1);

    server.stop().await.unwrap();

    assert!(TcpStream::connect(&addr).await.is_err());
    for name in ["orders", "invoices", "refunds"] {
        assert!(h.broker.bindings(name).await.is_empty());
    }
    assert!(!h.broker.is_connected());
}

#[tokio::test]
async fn stop_disconnects_the_broker_connected_by_start() {
    let h = Harness::new();
    let server = h.builder().build();
    server.handle(noop()).await;
    server.start().await.unwrap();

    let replacement = Arc::new(MemoryBroker::new());
    let swapped = replacement.clone();
    server.init(move |cfg| cfg.broker = swapped).await;

    server.stop().await.unwrap();
    assert!(!h.broker.is_connected());
    assert!(!replacement.is_connected());
}

#[tokio::test]
async fn stop_publishes_stopped_last() {
    let h = Harness::new();
    let server = h.builder().build();
    server.handle(noop()).await;

    let mut events = server.events();
    server.start().await.unwrap();
    let listening = wait_for(&mut events, EventKind::Listening).await;
    assert_eq!(listening.addr.as_deref(), Some(server.address().await.as_str()));

    server.stop().await.unwrap();
    wait_for(&mut events, EventKind::Deregistered).await;
    wait_for(&mut events, EventKind::Stopped).await;
}
