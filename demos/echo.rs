//! # Example: Echo server with a topic subscription
//!
//! Serves a line echo on `127.0.0.1:7070`, registers with the in-memory
//! directory every 5s and listens on the `greetings` topic.
//!
//! ```text
//! $ cargo run --example echo
//! $ nc 127.0.0.1 7070
//! ```
//!
//! Stop with Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use servisor::{
    BrokerEvent, Connection, Context, EventHandler, Handler, HandlerError, MemoryBroker, ServeFn,
    Server, Subscription,
};

#[derive(Debug, Deserialize)]
struct Greeting {
    from: String,
}

async fn echo(conn: Connection) {
    let peer = conn.peer_addr();
    let (read, mut write) = tokio::io::split(conn);
    let mut lines = BufReader::new(read).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if write.write_all(format!("{line}\n").as_bytes()).await.is_err() {
            break;
        }
    }
    tracing::info!(%peer, "connection closed");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let broker = Arc::new(MemoryBroker::new());
    let server = Server::builder()
        .with_name("echo")
        .with_address("127.0.0.1:7070")
        .with_register_interval(Duration::from_secs(5))
        .with_register_ttl(Duration::from_secs(15))
        .with_broker(broker.clone())
        .build();

    server
        .handle(Handler::new("echo", ServeFn::arc(echo)).endpoint("Echo.Line", [("stream", "true")]))
        .await;

    server
        .subscribe(Subscription::new(
            "greetings",
            EventHandler::func(|ctx: Context, greeting: Greeting| async move {
                tracing::info!(from = %greeting.from, trace = ?ctx.get("X-Trace"), "greeting");
                Ok::<(), HandlerError>(())
            }),
        ))
        .await?;

    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(3));
        loop {
            tick.tick().await;
            if !broker.is_connected() {
                continue;
            }
            let event = BrokerEvent::new("application/json", r#"{"from":"demo"}"#)
                .with_header("X-Trace", "demo-1");
            if let Err(err) = broker.publish("greetings", event).await {
                tracing::warn!(error = %err, "publish failed");
            }
        }
    });

    server.run().await?;
    Ok(())
}
