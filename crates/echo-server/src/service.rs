//! The echo implementation of the `RV` service.
//!
//! This is test scaffolding, not an ingestion backend: every request is
//! answered with `FAIL` and a transcript of what arrived.

use rv_upload_protocol::{Rv, UploadRequest, UploadResponse};
use tonic::{Request, Response, Status};
use tracing::info;

use crate::transcript::render_transcript;

/// Stateless echo handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoService;

impl EchoService {
    /// Builds the reply for one request.
    pub fn respond(request: &UploadRequest) -> UploadResponse {
        UploadResponse::failure(render_transcript(request))
    }
}

#[tonic::async_trait]
impl Rv for EchoService {
    async fn file_upload(
        &self,
        request: Request<UploadRequest>,
    ) -> Result<Response<UploadResponse>, Status> {
        let remote = request.remote_addr();
        let request = request.into_inner();
        let response = Self::respond(&request);

        info!(
            remote = ?remote,
            filename = %request.filename,
            bytes = request.content.len(),
            "received upload, replying FAIL with transcript:\n{}",
            response.error_message
        );

        Ok(Response::new(response))
    }
}
