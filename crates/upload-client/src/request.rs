//! Construction of the upload request.
//!
//! A request is fully determined by the file bytes, the name it is stored
//! under, the project it belongs to and whether it should be converted. The
//! checksum is always computed here, never taken from the caller.

use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use rv_upload_protocol::{MAX_MESSAGE_SIZE, Project, UploadRequest};

use crate::channel::ensure_within_limit;
use crate::error::UploadError;

/// What to upload and how the destination should treat it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub path: PathBuf,
    pub project: Project,
    pub convert_flag: bool,
    /// Stored name at the destination; defaults to `path` without leading separators.
    pub override_filename: Option<String>,
}

impl UploadJob {
    pub fn new(path: impl Into<PathBuf>, project: Project) -> Self {
        Self {
            path: path.into(),
            project,
            convert_flag: false,
            override_filename: None,
        }
    }

    #[must_use]
    pub fn convert(mut self, convert_flag: bool) -> Self {
        self.convert_flag = convert_flag;
        self
    }

    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.override_filename = Some(filename.into());
        self
    }

    /// Name the file will be stored under.
    pub fn resolved_filename(&self) -> String {
        resolve_filename(&self.path, self.override_filename.as_deref())
    }

    /// Reads the file and builds the request.
    ///
    /// A file larger than [`MAX_MESSAGE_SIZE`] is refused here, before any
    /// channel is opened.
    pub fn build_request(&self) -> Result<UploadRequest, UploadError> {
        let content = read_file(&self.path)?;
        ensure_within_limit(content.len(), MAX_MESSAGE_SIZE)?;
        Ok(UploadRequest::for_content(
            self.resolved_filename(),
            content,
            self.convert_flag,
            self.project,
        ))
    }
}

/// Resolves the transmitted filename without touching the filesystem.
///
/// An override is used verbatim. Otherwise the path is used with every
/// leading separator removed, as the destination treats names as relative.
pub fn resolve_filename(path: &Path, override_filename: Option<&str>) -> String {
    match override_filename {
        Some(name) => name.to_string(),
        None => path
            .to_string_lossy()
            .trim_start_matches(|c: char| c == '/' || c == MAIN_SEPARATOR)
            .to_string(),
    }
}

/// Reads the whole file into memory.
pub fn read_file(path: &Path) -> Result<Vec<u8>, UploadError> {
    std::fs::read(path).map_err(|source| UploadError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}
