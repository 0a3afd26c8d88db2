//! Object and chunk record types for the chunked store.

use chrono::{DateTime, Utc};

/// Metadata for one stored object.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredObject {
    /// Unique object ID (UUID v4), assigned at creation.
    pub id: String,
    /// Display filename, mutable via rename.
    pub filename: String,
    /// MIME type, fixed at creation.
    pub content_type: String,
    /// Total size in bytes, fixed once the upload completes.
    pub length: i64,
    /// Bytes per chunk, fixed at creation.
    pub chunk_size: i64,
    /// Upload timestamp, RFC 3339 UTC.
    pub upload_date: String,
}

impl StoredObject {
    /// Upload timestamp as a chrono value.
    ///
    /// Unparseable stored text falls back to the Unix epoch, a fixed
    /// sentinel rather than a moving clock reading.
    pub fn uploaded_at(&self) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&self.upload_date)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// Metadata for creating a new object.
#[derive(Debug, Clone)]
pub struct NewObject {
    /// Display filename.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
}

impl NewObject {
    /// Create new-object metadata with the default content type.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content_type: "application/octet-stream".to_string(),
        }
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// One fixed-size ordered fragment of an object's content.
///
/// Chunks are keyed by `(object_id, seq)` and read back in strictly
/// increasing sequence order. Only the final chunk of an object may be
/// shorter than the object's chunk size.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Chunk {
    /// Owning object ID.
    pub object_id: String,
    /// Zero-based sequence number.
    pub seq: i64,
    /// Fragment content.
    pub data: Vec<u8>,
}
