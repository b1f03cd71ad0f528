//! Human-readable rendering of a received request.
//!
//! The layout follows protobuf text format: one `name: value` line per
//! field, strings and bytes quoted with C-style escapes, enums by name.

use std::fmt::Write;

use rv_upload_protocol::{Project, UploadRequest};

/// First line of every transcript.
pub const TRANSCRIPT_HEADER: &str = "DEBUG::ECHO::";

const INDENT: &str = "    ";

/// Renders every field of `request` under the [`TRANSCRIPT_HEADER`] line.
pub fn render_transcript(request: &UploadRequest) -> String {
    let mut out = String::with_capacity(request.content.len() + 256);
    out.push_str(TRANSCRIPT_HEADER);
    out.push('\n');

    let fields = [
        ("filename", quoted(request.filename.as_bytes())),
        ("checksum", quoted(request.checksum.as_bytes())),
        ("content", quoted(&request.content)),
        ("convert_flag", request.convert_flag.to_string()),
        ("project", project_name(request.project)),
    ];
    for (name, value) in fields {
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{INDENT}{name}: {value}");
    }
    out
}

/// Enum values this build does not know are shown as their number.
fn project_name(value: i32) -> String {
    match Project::try_from(value) {
        Ok(project) => project.as_str_name().to_string(),
        Err(_) => value.to_string(),
    }
}

fn quoted(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'"' => out.push_str("\\\""),
            b'\'' => out.push_str("\\'"),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{b:03o}");
            }
        }
    }
    out.push('"');
    out
}
