//! Base64 batch encoder.
//!
//! Drains each object's read stream fully into memory and emits one
//! base64 record per object. Unlike the zip aggregator this pipeline is
//! a fan-out/fan-in: all drains run concurrently, and the results are
//! collected in the original listing order regardless of which drain
//! finishes first. Peak memory is proportional to the combined size of
//! the objects; that scaling is inherent to this export format.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::try_join_all;
use futures::stream::TryStreamExt;
use serde::Serialize;

use crate::store::{ChunkedStore, StoredObject};
use crate::{Result, StashError};

/// One exported object with its full content base64-encoded.
#[derive(Debug, Clone, Serialize)]
pub struct Base64Record {
    /// Display filename.
    pub filename: String,
    /// MIME type.
    #[serde(rename = "contentType")]
    pub content_type: String,
    /// Base64-encoded content (standard alphabet, padded).
    pub data: String,
    /// Content size in bytes, before encoding.
    pub size: i64,
    /// Upload timestamp, RFC 3339 UTC.
    #[serde(rename = "uploadDate")]
    pub upload_date: String,
}

/// Encode all given objects as base64 records, preserving input order.
///
/// Fails with [`StashError::EmptyCollection`] if the object set is
/// empty, and with the first drain error otherwise.
pub async fn encode_batch(
    store: &ChunkedStore,
    objects: &[StoredObject],
) -> Result<Vec<Base64Record>> {
    if objects.is_empty() {
        return Err(StashError::EmptyCollection);
    }

    // try_join_all polls every drain concurrently but yields results in
    // input order, which keeps the response deterministic.
    try_join_all(objects.iter().map(|object| drain_one(store, object))).await
}

async fn drain_one(store: &ChunkedStore, object: &StoredObject) -> Result<Base64Record> {
    let (meta, stream) = store.open_read(&object.id).await?;
    futures::pin_mut!(stream);

    let mut content = Vec::with_capacity(meta.length as usize);
    while let Some(chunk) = stream.try_next().await? {
        content.extend_from_slice(&chunk);
    }

    Ok(Base64Record {
        filename: meta.filename,
        content_type: meta.content_type,
        data: STANDARD.encode(&content),
        size: meta.length,
        upload_date: meta.upload_date,
    })
}
