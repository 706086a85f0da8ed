use std::sync::Arc;

use async_trait::async_trait;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;

use super::Connection;
use crate::handler::Serve;

/// Terminates TLS on the per-connection task, then hands the decrypted stream on.
pub(crate) struct TlsServe {
    acceptor: TlsAcceptor,
    inner: Arc<dyn Serve>,
}

impl TlsServe {
    pub(crate) fn new(config: Arc<ServerConfig>, inner: Arc<dyn Serve>) -> Self {
        Self {
            acceptor: TlsAcceptor::from(config),
            inner,
        }
    }
}

#[async_trait]
impl Serve for TlsServe {
    async fn serve(&self, conn: Connection) {
        let (stream, peer, permit) = conn.into_parts();
        match self.acceptor.accept(stream).await {
            Ok(tls) => {
                self.inner
                    .serve(Connection::new(tls, peer).with_permit(permit))
                    .await
            }
            Err(err) => tracing::warn!(peer = %peer, error = %err, "tls handshake failed"),
        }
    }
}
