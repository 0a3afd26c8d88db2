//! Chunked object store.
//!
//! Splits an arbitrary-length byte stream into fixed-size chunks keyed
//! by `(object_id, seq)` and reconstructs the stream on read. Object
//! metadata and all chunks for an upload commit in one transaction, so a
//! partial upload is never visible.

use bytes::{Bytes, BytesMut};
use chrono::{SecondsFormat, Utc};
use futures::stream::{Stream, TryStreamExt};
use uuid::Uuid;

use crate::db::DbPool;
use crate::{Result, StashError};

use super::object::{Chunk, NewObject, StoredObject};

/// Chunked object store over the backing SQLite pool.
#[derive(Clone)]
pub struct ChunkedStore {
    pool: DbPool,
    chunk_size: usize,
    max_object_size: u64,
}

impl ChunkedStore {
    /// Create a store with the given chunk size and upload size limit.
    pub fn new(pool: DbPool, chunk_size: usize, max_object_size: u64) -> Self {
        Self {
            pool,
            chunk_size,
            max_object_size,
        }
    }

    /// Create a store from the storage configuration section.
    pub fn from_config(pool: DbPool, config: &crate::config::StorageConfig) -> Self {
        Self::new(pool, config.chunk_size, config.max_upload_bytes())
    }

    /// Bytes per chunk for newly created objects.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Create an object from an incoming byte stream.
    ///
    /// The stream is consumed incrementally; each chunk is written as it
    /// fills and the metadata row is inserted last, all inside one
    /// transaction. A stream error or an oversized body rolls everything
    /// back. Zero-byte uploads are rejected with
    /// [`StashError::EmptyInput`].
    pub async fn create<S>(&self, meta: NewObject, stream: S) -> Result<StoredObject>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        futures::pin_mut!(stream);

        let id = Uuid::new_v4().to_string();
        let upload_date = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut tx = self.pool.begin().await?;
        let mut buf = BytesMut::with_capacity(self.chunk_size);
        let mut seq: i64 = 0;
        let mut total: u64 = 0;

        while let Some(bytes) = stream.try_next().await? {
            total += bytes.len() as u64;
            if total > self.max_object_size {
                return Err(StashError::Validation(format!(
                    "file exceeds maximum size of {} bytes",
                    self.max_object_size
                )));
            }

            buf.extend_from_slice(&bytes);
            while buf.len() >= self.chunk_size {
                let data = buf.split_to(self.chunk_size);
                insert_chunk(&mut tx, &id, seq, &data).await?;
                seq += 1;
            }
        }

        if total == 0 {
            return Err(StashError::EmptyInput);
        }

        if !buf.is_empty() {
            insert_chunk(&mut tx, &id, seq, &buf).await?;
            seq += 1;
        }

        sqlx::query(
            "INSERT INTO files (id, filename, content_type, length, chunk_size, upload_date)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&id)
        .bind(&meta.filename)
        .bind(&meta.content_type)
        .bind(total as i64)
        .bind(self.chunk_size as i64)
        .bind(&upload_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            object_id = %id,
            bytes = total,
            chunks = seq,
            "object stored"
        );

        Ok(StoredObject {
            id,
            filename: meta.filename,
            content_type: meta.content_type,
            length: total as i64,
            chunk_size: self.chunk_size as i64,
            upload_date,
        })
    }

    /// List all visible objects in insertion order.
    pub async fn list(&self) -> Result<Vec<StoredObject>> {
        let objects = sqlx::query_as::<_, StoredObject>(
            "SELECT id, filename, content_type, length, chunk_size, upload_date
             FROM files ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(objects)
    }

    /// Get an object's metadata by id.
    pub async fn get(&self, id: &str) -> Result<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, filename, content_type, length, chunk_size, upload_date
             FROM files WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StashError::NotFound(format!("file {id}")))
    }

    /// Open a lazy read stream over an object's content.
    ///
    /// Chunks are fetched one at a time in sequence order; a missing or
    /// wrong-sized chunk fails the stream with
    /// [`StashError::Corrupt`] rather than skipping bytes.
    pub async fn open_read(
        &self,
        id: &str,
    ) -> Result<(StoredObject, impl Stream<Item = Result<Bytes>> + Send + 'static)> {
        let meta = self.get(id).await?;
        let stream = read_stream(self.pool.clone(), meta.clone());
        Ok((meta, stream))
    }

    /// Rename an object. Chunks and all other metadata are untouched.
    pub async fn rename(&self, id: &str, new_name: &str) -> Result<()> {
        if new_name.trim().is_empty() {
            return Err(StashError::Validation(
                "filename must not be empty".to_string(),
            ));
        }

        let result = sqlx::query("UPDATE files SET filename = $1 WHERE id = $2")
            .bind(new_name)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StashError::NotFound(format!("file {id}")));
        }
        Ok(())
    }

    /// Delete an object's metadata and every associated chunk.
    ///
    /// The metadata row goes first, then the chunks, in one transaction;
    /// readers observe either the full object or `NotFound`.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StashError::NotFound(format!("file {id}")));
        }

        sqlx::query("DELETE FROM chunks WHERE object_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(object_id = %id, "object deleted");
        Ok(())
    }
}

impl std::fmt::Debug for ChunkedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedStore")
            .field("chunk_size", &self.chunk_size)
            .field("max_object_size", &self.max_object_size)
            .finish()
    }
}

async fn insert_chunk(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    object_id: &str,
    seq: i64,
    data: &[u8],
) -> Result<()> {
    sqlx::query("INSERT INTO chunks (object_id, seq, data) VALUES ($1, $2, $3)")
        .bind(object_id)
        .bind(seq)
        .bind(data)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

struct ReadState {
    pool: DbPool,
    object_id: String,
    seq: i64,
    produced: u64,
    length: u64,
    chunk_size: u64,
}

/// Lazily reconstruct an object's bytes from its chunks.
fn read_stream(
    pool: DbPool,
    meta: StoredObject,
) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
    let state = ReadState {
        pool,
        object_id: meta.id,
        seq: 0,
        produced: 0,
        length: meta.length as u64,
        chunk_size: meta.chunk_size as u64,
    };

    futures::stream::try_unfold(state, |mut st| async move {
        if st.produced >= st.length {
            return Ok(None);
        }

        let chunk = sqlx::query_as::<_, Chunk>(
            "SELECT object_id, seq, data FROM chunks WHERE object_id = $1 AND seq = $2",
        )
        .bind(&st.object_id)
        .bind(st.seq)
        .fetch_optional(&st.pool)
        .await?
        .ok_or_else(|| {
            StashError::Corrupt(format!(
                "chunk {} of object {} is missing",
                st.seq, st.object_id
            ))
        })?;
        let data = chunk.data;

        // Every chunk except the final one must be exactly chunk_size
        let expected = st.chunk_size.min(st.length - st.produced);
        if data.len() as u64 != expected {
            return Err(StashError::Corrupt(format!(
                "chunk {} of object {} has {} bytes, expected {}",
                st.seq,
                st.object_id,
                data.len(),
                expected
            )));
        }

        st.produced += data.len() as u64;
        st.seq += 1;
        Ok(Some((Bytes::from(data), st)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreHandle;

    const TEST_CHUNK_SIZE: usize = 8;
    const TEST_MAX_SIZE: u64 = 1024;

    async fn setup_store() -> ChunkedStore {
        let handle = StoreHandle::open_in_memory().await.unwrap();
        ChunkedStore::new(
            handle.pool().unwrap().clone(),
            TEST_CHUNK_SIZE,
            TEST_MAX_SIZE,
        )
    }

    fn byte_stream(parts: Vec<Vec<u8>>) -> impl Stream<Item = Result<Bytes>> {
        futures::stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
    }

    async fn read_all(
        store: &ChunkedStore,
        id: &str,
    ) -> Result<Vec<u8>> {
        let (_, stream) = store.open_read(id).await?;
        futures::pin_mut!(stream);
        let mut out = Vec::new();
        while let Some(chunk) = stream.try_next().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_round_trip_single_chunk() {
        let store = setup_store().await;
        let content = b"hello".to_vec();

        let object = store
            .create(NewObject::new("a.txt"), byte_stream(vec![content.clone()]))
            .await
            .unwrap();

        assert_eq!(object.length, 5);
        assert_eq!(object.chunk_size, TEST_CHUNK_SIZE as i64);
        assert_eq!(read_all(&store, &object.id).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_round_trip_multi_chunk_with_partial_tail() {
        let store = setup_store().await;
        // 26 bytes: three full 8-byte chunks plus a 2-byte tail
        let content: Vec<u8> = (0..26).collect();

        let object = store
            .create(NewObject::new("alpha.bin"), byte_stream(vec![content.clone()]))
            .await
            .unwrap();

        assert_eq!(object.length, 26);
        assert_eq!(read_all(&store, &object.id).await.unwrap(), content);

        let chunk_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE object_id = $1")
                .bind(&object.id)
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(chunk_count, 4);
    }

    #[tokio::test]
    async fn test_round_trip_exact_chunk_boundary() {
        let store = setup_store().await;
        let content: Vec<u8> = vec![0xAB; TEST_CHUNK_SIZE * 2];

        let object = store
            .create(NewObject::new("exact.bin"), byte_stream(vec![content.clone()]))
            .await
            .unwrap();

        assert_eq!(read_all(&store, &object.id).await.unwrap(), content);

        let chunk_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE object_id = $1")
                .bind(&object.id)
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(chunk_count, 2);
    }

    #[tokio::test]
    async fn test_round_trip_fragmented_input() {
        let store = setup_store().await;
        // Delivered in uneven pieces that straddle chunk boundaries
        let parts = vec![vec![1u8; 3], vec![2u8; 11], vec![3u8; 1], vec![4u8; 7]];
        let mut expected = Vec::new();
        for p in &parts {
            expected.extend_from_slice(p);
        }

        let object = store
            .create(NewObject::new("frag.bin"), byte_stream(parts))
            .await
            .unwrap();

        assert_eq!(read_all(&store, &object.id).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let store = setup_store().await;

        let result = store
            .create(NewObject::new("empty.txt"), byte_stream(vec![]))
            .await;
        assert!(matches!(result, Err(StashError::EmptyInput)));

        // Nothing becomes visible
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_nothing_visible() {
        let store = setup_store().await;

        let failing = futures::stream::iter(vec![
            Ok(Bytes::from(vec![0u8; 20])),
            Err(StashError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "peer went away",
            ))),
        ]);

        let result = store.create(NewObject::new("broken.bin"), failing).await;
        assert!(result.is_err());

        assert!(store.list().await.unwrap().is_empty());
        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(chunk_count, 0);
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let store = setup_store().await;
        let content = vec![0u8; TEST_MAX_SIZE as usize + 1];

        let result = store
            .create(NewObject::new("big.bin"), byte_stream(vec![content]))
            .await;
        assert!(matches!(result, Err(StashError::Validation(_))));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_insertion_order() {
        let store = setup_store().await;

        for name in ["first.txt", "second.txt", "third.txt"] {
            store
                .create(NewObject::new(name), byte_stream(vec![b"x".to_vec()]))
                .await
                .unwrap();
        }

        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.filename)
            .collect();
        assert_eq!(names, ["first.txt", "second.txt", "third.txt"]);
    }

    #[tokio::test]
    async fn test_open_read_not_found() {
        let store = setup_store().await;
        let result = store.open_read("no-such-id").await;
        assert!(matches!(result, Err(StashError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rename() {
        let store = setup_store().await;
        let object = store
            .create(
                NewObject::new("old.txt").with_content_type("text/plain"),
                byte_stream(vec![b"content".to_vec()]),
            )
            .await
            .unwrap();

        store.rename(&object.id, "new.txt").await.unwrap();

        let renamed = store.get(&object.id).await.unwrap();
        assert_eq!(renamed.filename, "new.txt");
        // Everything but the filename is preserved
        assert_eq!(renamed.id, object.id);
        assert_eq!(renamed.content_type, object.content_type);
        assert_eq!(renamed.length, object.length);
        assert_eq!(renamed.upload_date, object.upload_date);
    }

    #[tokio::test]
    async fn test_rename_not_found() {
        let store = setup_store().await;
        let result = store.rename("missing", "new.txt").await;
        assert!(matches!(result, Err(StashError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rename_empty_name_rejected() {
        let store = setup_store().await;
        let object = store
            .create(NewObject::new("a.txt"), byte_stream(vec![b"x".to_vec()]))
            .await
            .unwrap();

        let result = store.rename(&object.id, "   ").await;
        assert!(matches!(result, Err(StashError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_metadata_and_chunks() {
        let store = setup_store().await;
        let object = store
            .create(
                NewObject::new("doomed.bin"),
                byte_stream(vec![vec![7u8; 30]]),
            )
            .await
            .unwrap();

        store.delete(&object.id).await.unwrap();

        assert!(matches!(
            store.open_read(&object.id).await,
            Err(StashError::NotFound(_))
        ));
        assert!(store.list().await.unwrap().is_empty());

        let chunk_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE object_id = $1")
                .bind(&object.id)
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(chunk_count, 0);
    }

    #[tokio::test]
    async fn test_double_delete_fails() {
        let store = setup_store().await;
        let object = store
            .create(NewObject::new("once.txt"), byte_stream(vec![b"x".to_vec()]))
            .await
            .unwrap();

        store.delete(&object.id).await.unwrap();
        let second = store.delete(&object.id).await;
        assert!(matches!(second, Err(StashError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_chunk_is_corruption() {
        let store = setup_store().await;
        let object = store
            .create(
                NewObject::new("holey.bin"),
                byte_stream(vec![vec![1u8; TEST_CHUNK_SIZE * 3]]),
            )
            .await
            .unwrap();

        // Knock a middle chunk out from under the reader
        sqlx::query("DELETE FROM chunks WHERE object_id = $1 AND seq = 1")
            .bind(&object.id)
            .execute(&store.pool)
            .await
            .unwrap();

        let result = read_all(&store, &object.id).await;
        assert!(matches!(result, Err(StashError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_short_chunk_is_corruption() {
        let store = setup_store().await;
        let object = store
            .create(
                NewObject::new("short.bin"),
                byte_stream(vec![vec![1u8; TEST_CHUNK_SIZE * 2]]),
            )
            .await
            .unwrap();

        sqlx::query("UPDATE chunks SET data = $1 WHERE object_id = $2 AND seq = 0")
            .bind(&[1u8, 2u8][..])
            .bind(&object.id)
            .execute(&store.pool)
            .await
            .unwrap();

        let result = read_all(&store, &object.id).await;
        assert!(matches!(result, Err(StashError::Corrupt(_))));
    }
}
