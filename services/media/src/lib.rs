//! Attachment handling for appointments
//!
//! Checks uploaded files against the allow-list, stores them in S3 (or
//! in memory for local runs) and extracts a short text preview.

pub mod error;
pub mod file_types;
pub mod models;
pub mod storage;

pub use error::{MediaError, MediaResult};
pub use file_types::{content_preview, ensure_supported};
pub use models::{StoredAttachment, UploadOptions, UploadedFile};
pub use storage::{AttachmentStore, InMemoryAttachmentStore, S3AttachmentStore, S3StorageConfig};
