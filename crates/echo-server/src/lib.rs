//! Debug echo server for the Route Views upload protocol.
//!
//! A loop-back stand-in for the real destination: it decodes every
//! `FileUpload` request, logs a transcript of it and answers `FAIL` with the
//! transcript as the error message. It never stores anything.

pub mod error;
pub mod server;
pub mod service;
pub mod transcript;

pub use error::EchoError;
pub use server::{DEFAULT_WORKERS, EchoServer};
pub use service::EchoService;
pub use transcript::{TRANSCRIPT_HEADER, render_transcript};

/// Serves on `port` (all interfaces) with default settings until Ctrl-C.
pub async fn serve(port: u16) -> Result<(), EchoError> {
    EchoServer::new().port(port).run().await
}
