//! Listener setup for the echo server.

use std::future::Future;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use rv_upload_protocol::{DEFAULT_PORT, MAX_MESSAGE_SIZE, RvServer};
use tokio::net::TcpListener;
use tonic::transport::Server;
use tonic::transport::server::TcpIncoming;
use tower::limit::GlobalConcurrencyLimitLayer;
use tracing::{info, warn};

use crate::error::EchoError;
use crate::service::EchoService;

/// Calls handled at the same time across all connections.
pub const DEFAULT_WORKERS: usize = 10;

/// Echo server configuration.
#[derive(Debug, Clone)]
pub struct EchoServer {
    host: IpAddr,
    port: u16,
    workers: usize,
}

impl Default for EchoServer {
    fn default() -> Self {
        Self {
            host: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl EchoServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interface to bind; all interfaces by default.
    #[must_use]
    pub fn host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// At least one call is always allowed.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Binds the configured port and serves until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<(), EchoError>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = self.addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| EchoError::Bind { addr, source })?;
        self.serve_on(listener, shutdown).await
    }

    /// Binds the configured port and serves until Ctrl-C.
    pub async fn run(self) -> Result<(), EchoError> {
        self.serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C; serving until killed");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
        })
        .await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    ///
    /// In-flight calls are allowed to finish before this returns.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<(), EchoError>
    where
        F: Future<Output = ()> + Send,
    {
        let local = listener.local_addr().ok();
        let incoming = TcpIncoming::from_listener(listener, true, None)
            .map_err(|e| EchoError::Listener(e.to_string()))?;

        let service = RvServer::new(EchoService)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE);

        info!(addr = ?local, workers = self.workers, "debug echo server listening");

        Server::builder()
            .layer(GlobalConcurrencyLimitLayer::new(self.workers))
            .add_service(service)
            .serve_with_incoming_shutdown(incoming, shutdown)
            .await?;

        info!("debug echo server stopped");
        Ok(())
    }
}
