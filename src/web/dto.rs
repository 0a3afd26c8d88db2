//! Request and response DTOs for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::store::StoredObject;

/// Object metadata as exposed over the wire.
#[derive(Debug, Clone, Serialize)]
pub struct FileDto {
    /// Object id.
    pub id: String,
    /// Display filename.
    pub filename: String,
    /// MIME type.
    #[serde(rename = "contentType")]
    pub content_type: String,
    /// Size in bytes.
    pub length: i64,
    /// Bytes per chunk.
    #[serde(rename = "chunkSize")]
    pub chunk_size: i64,
    /// Upload timestamp, RFC 3339 UTC.
    #[serde(rename = "uploadDate")]
    pub upload_date: String,
}

impl From<StoredObject> for FileDto {
    fn from(object: StoredObject) -> Self {
        Self {
            id: object.id,
            filename: object.filename,
            content_type: object.content_type,
            length: object.length,
            chunk_size: object.chunk_size,
            upload_date: object.upload_date,
        }
    }
}

/// Response for a single-file upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Human-readable confirmation.
    pub text: String,
    /// The stored file.
    pub file: FileDto,
}

/// Response for a multi-file upload.
#[derive(Debug, Serialize)]
pub struct MultiUploadResponse {
    /// Human-readable confirmation.
    pub text: String,
    /// The stored files, in upload order.
    pub files: Vec<FileDto>,
}

/// Plain confirmation response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Human-readable confirmation.
    pub text: String,
}

impl MessageResponse {
    /// Create a confirmation message.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Request body for renaming a file.
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    /// The new display filename.
    pub filename: String,
}
