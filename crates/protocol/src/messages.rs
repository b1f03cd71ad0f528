//! Conveniences on top of the generated message types.

use std::fmt;
use std::str::FromStr;

use crate::{Project, Status, UploadRequest, UploadResponse, checksum_hex};

/// Error returned when a name does not match any value of a wire enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl UploadRequest {
    /// Builds a request carrying `content`, with its checksum computed here.
    pub fn for_content(
        filename: impl Into<String>,
        content: Vec<u8>,
        convert_flag: bool,
        project: Project,
    ) -> Self {
        let checksum = checksum_hex(&content);
        Self {
            filename: filename.into(),
            checksum,
            content,
            convert_flag,
            project: project as i32,
        }
    }

    /// Returns true if `checksum` is the digest of `content`.
    pub fn checksum_matches(&self) -> bool {
        self.checksum == checksum_hex(&self.content)
    }
}

impl UploadResponse {
    pub fn success() -> Self {
        Self {
            status: Status::Success as i32,
            error_message: String::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: Status::Fail as i32,
            error_message: message.into(),
        }
    }

    /// Unknown status values count as not successful.
    pub fn is_success(&self) -> bool {
        self.status() == Status::Success
    }
}

/// Accepts the schema names (`RIPE_RIS`) as well as the kebab-case spelling
/// used on the command line (`ripe-ris`).
fn normalize(value: &str) -> String {
    value.trim().replace('-', "_").to_ascii_uppercase()
}

impl FromStr for Project {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Project::from_str_name(&normalize(s)).ok_or_else(|| ParseEnumError {
            kind: "project",
            value: s.to_string(),
        })
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::from_str_name(&normalize(s)).ok_or_else(|| ParseEnumError {
            kind: "status",
            value: s.to_string(),
        })
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str_name())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str_name())
    }
}
