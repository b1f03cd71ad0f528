//! Client for the Route Views file upload service.
//!
//! An upload reads one local file into memory, tags it with its MD5 digest,
//! a destination-relative name, a project and a convert flag, and sends it
//! in a single unary `FileUpload` call. With a service-account key the call
//! goes over TLS and carries an ID token; without one it is plaintext.
//!
//! ```rust,no_run
//! use rv_upload_client::{UploadJob, UploadOptions, upload};
//! use rv_upload_protocol::Project;
//!
//! # async fn example() -> Result<(), rv_upload_client::UploadError> {
//! let job = UploadJob::new("/srv/route-views2/updates.20240101.0000.bz2", Project::Routeviews);
//! let response = upload("localhost:50051", &job, None, &UploadOptions::default()).await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod channel;
pub mod error;
pub mod request;
pub mod uploader;

use std::path::Path;

use rv_upload_protocol::UploadResponse;

pub use auth::{BearerAuth, IdTokenSource, ServiceAccountKey};
pub use channel::{ChannelStrategy, UploadClient, UploadOptions};
pub use error::{AuthError, TransportError, UploadError};
pub use request::{UploadJob, resolve_filename};
pub use uploader::Uploader;

/// Destination used when none is configured.
pub const DEFAULT_DESTINATION: &str = "grpc.routeviews.org";

/// Uploads one file to `destination`.
///
/// The file is read and the credential loaded before anything touches the
/// network, so a missing file or key file fails without opening a channel.
pub async fn upload(
    destination: &str,
    job: &UploadJob,
    credential_file: Option<&Path>,
    options: &UploadOptions,
) -> Result<UploadResponse, UploadError> {
    let request = job.build_request()?;
    let strategy = ChannelStrategy::from_credential_file(credential_file)?;
    let mut uploader = Uploader::connect(destination, &strategy, options).await?;
    uploader.send(request).await
}
