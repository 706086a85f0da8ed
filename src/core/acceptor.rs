//! # Connection acceptor loop.
//!
//! ```text
//! loop {
//!   accept()
//!     ├─ Ok(conn) ─► failures = 0; spawn handler.serve(conn)
//!     └─ Err(e)
//!          ├─ exit cancelled      ─► return (shutdown in progress)
//!          ├─ temporary(e)        ─► publish AcceptBackoff; sleep backoff.next(failures); failures += 1
//!          └─ otherwise           ─► publish AcceptFailed; return
//! }
//! ```
//!
//! ## Rules
//! - The loop never closes the listener; the coordinator does.
//! - Each connection is served on its own task and is not awaited.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};
use crate::handler::Serve;
use crate::net::{Accept, is_temporary};
use crate::policies::BackoffPolicy;

/// Runs the accept loop until a fatal error or shutdown.
pub(crate) async fn serve<A: Accept>(
    listener: Arc<A>,
    handler: Arc<dyn Serve>,
    exit: CancellationToken,
    backoff: BackoffPolicy,
    bus: Bus,
) {
    let mut failures: u32 = 0;
    loop {
        match listener.accept().await {
            Ok(conn) => {
                failures = 0;
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { handler.serve(conn).await });
            }
            Err(err) => {
                if exit.is_cancelled() {
                    return;
                }
                if is_temporary(&err) {
                    let delay = backoff.next(failures);
                    failures = failures.saturating_add(1);
                    tracing::warn!(error = %err, delay = ?delay, "accept error; retrying");
                    bus.publish(
                        Event::new(EventKind::AcceptBackoff)
                            .with_delay(delay)
                            .with_attempt(failures)
                            .with_error(&err),
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                tracing::error!(error = %err, "accept error");
                bus.publish(Event::new(EventKind::AcceptFailed).with_error(&err));
                return;
            }
        }
    }
}
