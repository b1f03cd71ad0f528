//! Error types for the upload client.

use std::path::PathBuf;

use rv_upload_protocol::Status;

/// Every way an upload can fail, split by who is at fault.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The local file could not be read. Raised before any network activity.
    #[error("cannot read {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// The request never reached the service.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The service received the request and refused it.
    #[error("upload rejected ({status}): {message}")]
    RemoteRejection { status: Status, message: String },
}

impl UploadError {
    /// Returns true if the request reached the destination and was refused.
    pub fn is_remote_rejection(&self) -> bool {
        matches!(self, UploadError::RemoteRejection { .. })
    }
}

/// Credential loading and identity token errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("cannot read credential file {}: {source}", path.display())]
    CredentialFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed credential file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("credential type is `{0}`, expected `service_account`")]
    NotServiceAccount(String),

    #[error("cannot sign identity assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("identity token exchange failed: {0}")]
    TokenExchange(String),

    #[error("identity token is not a valid header value")]
    InvalidToken,

    #[error("destination refused credentials: {0}")]
    Rejected(String),
}

/// Channel setup and call-level network errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid destination `{destination}`: {reason}")]
    InvalidDestination { destination: String, reason: String },

    #[error("cannot connect to {destination}: {source}")]
    Connect {
        destination: String,
        #[source]
        source: tonic::transport::Error,
    },

    /// The request exceeds the message size limit and is never sent.
    #[error("request of {size} bytes exceeds the {limit} byte message limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("call failed: {0}")]
    Call(tonic::Status),
}
