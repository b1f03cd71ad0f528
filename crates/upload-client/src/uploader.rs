//! A connected uploader, reusable for several files.

use rv_upload_protocol::{MAX_MESSAGE_SIZE, UploadRequest, UploadResponse};
use tracing::{info, warn};

use crate::auth::BearerAuth;
use crate::channel::{
    ChannelStrategy, UploadClient, UploadOptions, classify_status, ensure_within_limit,
};
use crate::error::UploadError;
use crate::request::UploadJob;

/// An open channel to one destination.
///
/// On an authenticated channel the identity token is refreshed before a call
/// when it is close to expiry, so one uploader can outlive a single token.
pub struct Uploader {
    client: UploadClient,
    auth: BearerAuth,
    destination: String,
}

impl Uploader {
    pub async fn connect(
        destination: &str,
        strategy: &ChannelStrategy,
        options: &UploadOptions,
    ) -> Result<Self, UploadError> {
        let auth = strategy.authorize(destination, options).await?;
        let client = strategy.connect(destination, options, auth.clone()).await?;
        Ok(Self {
            client,
            auth,
            destination: destination.to_string(),
        })
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Reads the job's file and uploads it.
    pub async fn upload(&mut self, job: &UploadJob) -> Result<UploadResponse, UploadError> {
        let request = job.build_request()?;
        self.send(request).await
    }

    /// Issues exactly one `FileUpload` call. No retries.
    pub async fn send(&mut self, request: UploadRequest) -> Result<UploadResponse, UploadError> {
        ensure_within_limit(request.content.len(), MAX_MESSAGE_SIZE)?;
        self.auth.refresh().await?;

        info!(
            destination = %self.destination,
            filename = %request.filename,
            bytes = request.content.len(),
            checksum = %request.checksum,
            project = %request.project(),
            convert = request.convert_flag,
            "uploading file"
        );

        let response = self
            .client
            .file_upload(request)
            .await
            .map_err(classify_status)?
            .into_inner();

        let status = response.status();
        info!(%status, "upload status");

        if response.is_success() {
            Ok(response)
        } else {
            warn!(%status, error_message = %response.error_message, "destination rejected upload");
            Err(UploadError::RemoteRejection {
                status,
                message: response.error_message,
            })
        }
    }
}
