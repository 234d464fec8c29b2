use serde::{Deserialize, Serialize};

/// File received from a client, held in memory until it is uploaded
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Reference to content kept in the attachment store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredAttachment {
    pub url: String,
    pub filename: String,
    pub mimetype: String,
}

/// Where and how an upload is placed
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Key prefix grouping uploads of the same kind
    pub folder: String,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            folder: "appointments".to_string(),
        }
    }
}
