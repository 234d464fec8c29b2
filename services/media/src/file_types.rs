//! Attachment allow-list and text previews

use std::path::Path;

use crate::error::{MediaError, MediaResult};

/// Extensions accepted as appointment attachments
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "doc", "docx", "txt"];

/// Number of characters kept in a content preview
pub const PREVIEW_CHARS: usize = 1024;

/// Lower-cased extension of `filename`, if any
fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Reject files whose extension is not on the allow-list
pub fn ensure_supported(filename: &str) -> MediaResult<()> {
    match extension(filename) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(MediaError::UnsupportedFileType(filename.to_string())),
    }
}

/// MIME type for an allowed extension
pub fn content_type_for(filename: &str) -> &'static str {
    match extension(filename).as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// First [`PREVIEW_CHARS`] characters of the content when it is valid UTF-8
pub fn content_preview(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(PREVIEW_CHARS).collect())
}

/// Final path component of a client-supplied filename
pub fn sanitize_filename(filename: &str) -> String {
    Path::new(filename.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("attachment")
        .to_string()
}
