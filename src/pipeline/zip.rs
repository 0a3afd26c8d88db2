//! Streaming zip aggregator.
//!
//! Composes many object read-streams into one zip byte stream. Entries
//! are written strictly sequentially, so at most one object's chunks are
//! in flight at a time and peak memory stays bounded by the chunk size
//! rather than the corpus size.
//!
//! Each entry is a deflate-compressed local record with a trailing data
//! descriptor (general purpose flag bit 3); the central directory and
//! end-of-archive record follow the last entry. Output flows through a
//! bounded channel and every send is an await point, so a consumer that
//! stops polling stalls the writer instead of letting compressed output
//! pile up. If a read fails after bytes have been emitted, the archive
//! is truncated and the failure is logged; the caller must validate the
//! non-empty precondition before any byte is written.

use std::io::Write;

use bytes::Bytes;
use chrono::{DateTime, Datelike, Timelike, Utc};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use futures::stream::{Stream, TryStreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::store::{ChunkedStore, StoredObject};
use crate::{Result, StashError};

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const DESCRIPTOR_SIG: u32 = 0x0807_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const END_OF_CENTRAL_SIG: u32 = 0x0605_4b50;

const VERSION_NEEDED: u16 = 20;
// Bit 3: sizes and CRC in a trailing descriptor. Bit 11: UTF-8 names.
const GP_FLAGS: u16 = 0x0808;
const METHOD_DEFLATE: u16 = 8;

/// Channel capacity between the writer task and the response body. One
/// slot keeps at most one compressed piece in flight beyond whatever
/// the encoder itself holds.
const SINK_CAPACITY: usize = 1;

/// Build a zip byte stream over the given objects, in order.
///
/// Fails with [`StashError::EmptyCollection`] before producing any byte
/// if the object set is empty. The archive itself is produced by a
/// background task that suspends on every send, so it advances only as
/// fast as the stream is consumed; a dropped receiver (client
/// disconnect) stops the task promptly.
pub fn zip_stream(
    store: ChunkedStore,
    objects: Vec<StoredObject>,
) -> Result<impl Stream<Item = std::io::Result<Bytes>> + Send + 'static> {
    if objects.is_empty() {
        return Err(StashError::EmptyCollection);
    }

    let (tx, rx) = mpsc::channel(SINK_CAPACITY);

    tokio::spawn(async move {
        let mut sink = ZipSink {
            tx: tx.clone(),
            offset: 0,
        };

        match write_archive(&store, objects, &mut sink).await {
            Ok(()) => {}
            Err(StashError::Io(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!("zip download aborted: client disconnected");
            }
            Err(e) => {
                // Headers are long gone; the best we can do is abort the
                // body so the client sees a truncated archive.
                tracing::error!("zip aggregation failed mid-stream, archive truncated: {e}");
                let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
            }
        }
    });

    Ok(ReceiverStream::new(rx))
}

/// Byte sink feeding the response body channel, tracking the archive
/// offset for central directory bookkeeping.
struct ZipSink {
    tx: mpsc::Sender<std::io::Result<Bytes>>,
    offset: u64,
}

impl ZipSink {
    /// Hand one piece of archive output to the consumer.
    ///
    /// Suspends until the channel has room. A closed channel means the
    /// response body was dropped and surfaces as a broken pipe.
    async fn send(&mut self, piece: Vec<u8>) -> Result<()> {
        if piece.is_empty() {
            return Ok(());
        }
        let len = piece.len() as u64;
        self.tx.send(Ok(Bytes::from(piece))).await.map_err(|_| {
            StashError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "response body closed",
            ))
        })?;
        self.offset += len;
        Ok(())
    }
}

struct CentralEntry {
    name: Vec<u8>,
    crc: u32,
    compressed: u64,
    uncompressed: u64,
    dos_time: u16,
    dos_date: u16,
    offset: u64,
}

async fn write_archive(
    store: &ChunkedStore,
    objects: Vec<StoredObject>,
    sink: &mut ZipSink,
) -> Result<()> {
    let mut entries = Vec::with_capacity(objects.len());

    for object in objects {
        let (meta, stream) = store.open_read(&object.id).await?;
        futures::pin_mut!(stream);

        let name = meta.filename.clone().into_bytes();
        if name.len() > u16::MAX as usize {
            return Err(StashError::Validation(format!(
                "filename too long for zip entry: {}",
                meta.filename
            )));
        }

        let (dos_time, dos_date) = dos_datetime(meta.uploaded_at());
        let offset = sink.offset;

        sink.send(local_header(&name, dos_time, dos_date)).await?;

        let mut crc = crc32fast::Hasher::new();
        let mut uncompressed: u64 = 0;
        let mut compressed: u64 = 0;
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());

        while let Some(chunk) = stream.try_next().await? {
            crc.update(&chunk);
            uncompressed += chunk.len() as u64;
            encoder.write_all(&chunk)?;

            // Drain whatever the encoder has emitted so far and yield it
            // before reading the next chunk; the send is the suspension
            // point that paces the writer to the consumer.
            let ready = std::mem::take(encoder.get_mut());
            compressed += ready.len() as u64;
            sink.send(ready).await?;
        }

        let tail = encoder.finish()?;
        compressed += tail.len() as u64;
        sink.send(tail).await?;

        let crc = crc.finalize();

        sink.send(descriptor(crc, to_u32(compressed)?, to_u32(uncompressed)?).to_vec())
            .await?;

        entries.push(CentralEntry {
            name,
            crc,
            compressed,
            uncompressed,
            dos_time,
            dos_date,
            offset,
        });
    }

    let cd_offset = sink.offset;
    for entry in &entries {
        sink.send(central_header(entry)?).await?;
    }
    let cd_size = sink.offset - cd_offset;

    sink.send(end_of_central_directory(entries.len(), cd_size, cd_offset)?)
        .await?;
    Ok(())
}

fn local_header(name: &[u8], dos_time: u16, dos_date: u16) -> Vec<u8> {
    let mut h = Vec::with_capacity(30 + name.len());
    h.extend_from_slice(&LOCAL_HEADER_SIG.to_le_bytes());
    h.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
    h.extend_from_slice(&GP_FLAGS.to_le_bytes());
    h.extend_from_slice(&METHOD_DEFLATE.to_le_bytes());
    h.extend_from_slice(&dos_time.to_le_bytes());
    h.extend_from_slice(&dos_date.to_le_bytes());
    h.extend_from_slice(&0u32.to_le_bytes()); // crc-32, in the descriptor
    h.extend_from_slice(&0u32.to_le_bytes()); // compressed size, in the descriptor
    h.extend_from_slice(&0u32.to_le_bytes()); // uncompressed size, in the descriptor
    h.extend_from_slice(&(name.len() as u16).to_le_bytes());
    h.extend_from_slice(&0u16.to_le_bytes()); // extra field length
    h.extend_from_slice(name);
    h
}

fn descriptor(crc: u32, compressed: u32, uncompressed: u32) -> [u8; 16] {
    let mut d = [0u8; 16];
    d[0..4].copy_from_slice(&DESCRIPTOR_SIG.to_le_bytes());
    d[4..8].copy_from_slice(&crc.to_le_bytes());
    d[8..12].copy_from_slice(&compressed.to_le_bytes());
    d[12..16].copy_from_slice(&uncompressed.to_le_bytes());
    d
}

fn central_header(entry: &CentralEntry) -> Result<Vec<u8>> {
    let mut h = Vec::with_capacity(46 + entry.name.len());
    h.extend_from_slice(&CENTRAL_HEADER_SIG.to_le_bytes());
    h.extend_from_slice(&VERSION_NEEDED.to_le_bytes()); // version made by
    h.extend_from_slice(&VERSION_NEEDED.to_le_bytes()); // version needed
    h.extend_from_slice(&GP_FLAGS.to_le_bytes());
    h.extend_from_slice(&METHOD_DEFLATE.to_le_bytes());
    h.extend_from_slice(&entry.dos_time.to_le_bytes());
    h.extend_from_slice(&entry.dos_date.to_le_bytes());
    h.extend_from_slice(&entry.crc.to_le_bytes());
    h.extend_from_slice(&to_u32(entry.compressed)?.to_le_bytes());
    h.extend_from_slice(&to_u32(entry.uncompressed)?.to_le_bytes());
    h.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
    h.extend_from_slice(&0u16.to_le_bytes()); // extra field length
    h.extend_from_slice(&0u16.to_le_bytes()); // comment length
    h.extend_from_slice(&0u16.to_le_bytes()); // disk number start
    h.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
    h.extend_from_slice(&0u32.to_le_bytes()); // external attributes
    h.extend_from_slice(&to_u32(entry.offset)?.to_le_bytes());
    h.extend_from_slice(&entry.name);
    Ok(h)
}

fn end_of_central_directory(count: usize, cd_size: u64, cd_offset: u64) -> Result<Vec<u8>> {
    let count = u16::try_from(count)
        .map_err(|_| StashError::Validation("too many entries for zip archive".to_string()))?;

    let mut h = Vec::with_capacity(22);
    h.extend_from_slice(&END_OF_CENTRAL_SIG.to_le_bytes());
    h.extend_from_slice(&0u16.to_le_bytes()); // this disk
    h.extend_from_slice(&0u16.to_le_bytes()); // central directory disk
    h.extend_from_slice(&count.to_le_bytes()); // entries on this disk
    h.extend_from_slice(&count.to_le_bytes()); // entries total
    h.extend_from_slice(&to_u32(cd_size)?.to_le_bytes());
    h.extend_from_slice(&to_u32(cd_offset)?.to_le_bytes());
    h.extend_from_slice(&0u16.to_le_bytes()); // comment length
    Ok(h)
}

// No zip64 support; the upload size limit keeps everything well below u32.
fn to_u32(value: u64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StashError::Validation("object too large for zip archive".to_string()))
}

/// Convert a timestamp to MS-DOS time and date fields.
fn dos_datetime(dt: DateTime<Utc>) -> (u16, u16) {
    let year = dt.year().clamp(1980, 2107);
    let date = (((year - 1980) as u16) << 9) | ((dt.month() as u16) << 5) | (dt.day() as u16);
    let time =
        ((dt.hour() as u16) << 11) | ((dt.minute() as u16) << 5) | ((dt.second() as u16) / 2);
    (time, date)
}
