//! Echo server error types.

use std::net::SocketAddr;

/// Errors produced while running the echo server.
#[derive(Debug, thiserror::Error)]
pub enum EchoError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot accept on listener: {0}")]
    Listener(String),

    #[error("server error: {0}")]
    Serve(#[from] tonic::transport::Error),
}
