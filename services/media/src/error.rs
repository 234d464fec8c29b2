//! Error types for attachment handling

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    /// Extension outside the allow-list
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// The attachment store rejected or failed the upload
    #[error("File upload failed: {0}")]
    UploadFailed(String),
}

pub type MediaResult<T> = Result<T, MediaError>;
