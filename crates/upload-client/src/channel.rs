//! Channel setup for the upload call.
//!
//! Whether a call is authenticated is decided once per invocation by a
//! [`ChannelStrategy`]. Both strategies yield the same client type; the
//! insecure one simply carries an empty [`BearerAuth`].

use std::path::Path;
use std::time::Duration;

use rv_upload_protocol::{MAX_MESSAGE_SIZE, RvClient};
use tonic::codegen::InterceptedService;
use tonic::codegen::http::Uri;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, info};

use crate::auth::{BearerAuth, IdTokenSource, ServiceAccountKey, audience_for};
use crate::error::{AuthError, TransportError, UploadError};

/// Client stub used for every upload, authenticated or not.
pub type UploadClient = RvClient<InterceptedService<Channel, BearerAuth>>;

/// Call tuning. Nothing is bounded by default.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Deadline for the whole call.
    pub timeout: Option<Duration>,
    /// Deadline for establishing the connection.
    pub connect_timeout: Option<Duration>,
}

/// How the channel to the destination is established.
#[derive(Debug, Clone)]
pub enum ChannelStrategy {
    /// Plaintext HTTP/2, no credentials.
    Insecure,
    /// TLS plus a service-account ID token on every call.
    Authenticated(ServiceAccountKey),
}

impl ChannelStrategy {
    /// Picks the strategy from an optional key file.
    ///
    /// A key file that is missing or malformed is an error; it never falls
    /// back to [`ChannelStrategy::Insecure`].
    pub fn from_credential_file(path: Option<&Path>) -> Result<Self, AuthError> {
        match path {
            Some(path) => Ok(Self::Authenticated(ServiceAccountKey::from_file(path)?)),
            None => Ok(Self::Insecure),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Credentials for calls to `destination`.
    ///
    /// For [`ChannelStrategy::Authenticated`] the first token is minted here,
    /// so credential problems surface before a channel is opened.
    pub async fn authorize(
        &self,
        destination: &str,
        options: &UploadOptions,
    ) -> Result<BearerAuth, UploadError> {
        match self {
            Self::Insecure => Ok(BearerAuth::none()),
            Self::Authenticated(key) => {
                secure_endpoint_uri(destination)?;
                let host = host_of(destination)?;
                let source = IdTokenSource::new(key.clone(), audience_for(&host))?
                    .with_timeout(options.timeout)?;
                let auth = BearerAuth::from_source(source);
                auth.refresh().await?;
                Ok(auth)
            }
        }
    }

    /// Opens the channel and returns a ready client stub that sends `auth`.
    ///
    /// An authenticated channel always uses TLS; a destination naming any
    /// other scheme than `https` is refused.
    pub async fn connect(
        &self,
        destination: &str,
        options: &UploadOptions,
        auth: BearerAuth,
    ) -> Result<UploadClient, UploadError> {
        let channel = match self {
            Self::Insecure => {
                let endpoint = endpoint(destination, endpoint_uri(destination, false), options)?;
                open(endpoint, destination).await?
            }
            Self::Authenticated(_) => {
                let uri = secure_endpoint_uri(destination)?;
                let host = host_of(destination)?;
                let tls = ClientTlsConfig::new()
                    .domain_name(host)
                    .with_native_roots();
                let endpoint = endpoint(destination, uri, options)?
                    .tls_config(tls)
                    .map_err(|source| TransportError::Connect {
                        destination: destination.to_string(),
                        source,
                    })?;
                open(endpoint, destination).await?
            }
        };

        info!(
            destination,
            authenticated = auth.is_authenticated(),
            "channel established"
        );

        Ok(RvClient::with_interceptor(channel, auth)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE))
    }
}

/// Turns `host[:port]` into a URI; a destination that already names a scheme is kept.
pub fn endpoint_uri(destination: &str, tls: bool) -> String {
    if destination.contains("://") {
        destination.to_string()
    } else if tls {
        format!("https://{destination}")
    } else {
        format!("http://{destination}")
    }
}

/// URI for an authenticated channel: `https` is added when no scheme is
/// given, and any other scheme is an error.
pub fn secure_endpoint_uri(destination: &str) -> Result<String, TransportError> {
    match destination.split_once("://") {
        None => Ok(format!("https://{destination}")),
        Some((scheme, _)) if scheme.eq_ignore_ascii_case("https") => Ok(destination.to_string()),
        Some((scheme, _)) => Err(TransportError::InvalidDestination {
            destination: destination.to_string(),
            reason: format!("scheme `{scheme}` cannot carry credentials, use https"),
        }),
    }
}

/// Refuses a request too large for either side of the channel to accept.
pub fn ensure_within_limit(content_len: usize, limit: usize) -> Result<(), TransportError> {
    if content_len > limit {
        return Err(TransportError::MessageTooLarge {
            size: content_len,
            limit,
        });
    }
    Ok(())
}

/// Host part of a destination, without scheme or port.
pub fn host_of(destination: &str) -> Result<String, TransportError> {
    let uri: Uri = endpoint_uri(destination, true)
        .parse()
        .map_err(|e: tonic::codegen::http::uri::InvalidUri| TransportError::InvalidDestination {
            destination: destination.to_string(),
            reason: e.to_string(),
        })?;
    match uri.host() {
        Some(host) if !host.is_empty() => Ok(host.to_string()),
        _ => Err(TransportError::InvalidDestination {
            destination: destination.to_string(),
            reason: "no host".into(),
        }),
    }
}

fn endpoint(
    destination: &str,
    uri: String,
    options: &UploadOptions,
) -> Result<Endpoint, TransportError> {
    let mut endpoint = Endpoint::from_shared(uri).map_err(|e| {
        TransportError::InvalidDestination {
            destination: destination.to_string(),
            reason: e.to_string(),
        }
    })?;
    if let Some(timeout) = options.timeout {
        endpoint = endpoint.timeout(timeout);
    }
    if let Some(timeout) = options.connect_timeout {
        endpoint = endpoint.connect_timeout(timeout);
    }
    Ok(endpoint)
}

async fn open(endpoint: Endpoint, destination: &str) -> Result<Channel, TransportError> {
    debug!(uri = %endpoint.uri(), "connecting");
    endpoint
        .connect()
        .await
        .map_err(|source| TransportError::Connect {
            destination: destination.to_string(),
            source,
        })
}

/// Maps a failed call onto the error taxonomy.
///
/// A status carrying a source error was produced on this side of the
/// connection (HTTP/2 errors, resets, local encode limits) and is a transport
/// failure whatever its code. Otherwise network-level codes are transport
/// failures, credential codes are authentication failures, and anything else
/// was raised by the service itself and counts as a rejection.
pub(crate) fn classify_status(status: tonic::Status) -> UploadError {
    use std::error::Error as _;
    use tonic::Code;

    if status.source().is_some() {
        return TransportError::Call(status).into();
    }

    match status.code() {
        Code::Unauthenticated | Code::PermissionDenied => {
            AuthError::Rejected(status.message().to_string()).into()
        }
        Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled => {
            TransportError::Call(status).into()
        }
        code => UploadError::RemoteRejection {
            status: rv_upload_protocol::Status::Unknown,
            message: format!("{code:?}: {}", status.message()),
        },
    }
}
