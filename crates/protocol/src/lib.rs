//! Wire schema for the Route Views file upload service.
//!
//! The service exposes a single unary call, `rv.proto.RV/FileUpload`, that
//! carries one whole file plus its MD5 digest and routing metadata. The
//! message and stub code under `src/generated/` comes from `proto/rv.proto` and is
//! checked in, so building the workspace does not need `protoc`.
//!
//! Field tags match the schema deployed on the production destination.

#[allow(clippy::all, missing_docs)]
#[path = "generated/rv.proto.rs"]
mod generated;

pub mod integrity;
pub mod messages;

pub use generated::rv_client::RvClient;
pub use generated::rv_server::{Rv, RvServer, SERVICE_NAME};
pub use generated::upload_request::Project;
pub use generated::upload_response::Status;
pub use generated::{UploadRequest, UploadResponse};
pub use integrity::checksum_hex;
pub use messages::ParseEnumError;

/// Default port of the debug echo server.
pub const DEFAULT_PORT: u16 = 50051;

/// Largest request or response either side will encode or decode (2 GiB).
///
/// There is no chunking, so this also bounds the size of an uploaded file.
pub const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024 * 1024;

/// Full gRPC path of the upload method.
pub const FILE_UPLOAD_PATH: &str = "/rv.proto.RV/FileUpload";
