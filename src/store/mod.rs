//! Chunked object storage for stashd.
//!
//! Objects are stored as fixed-size chunks in the backing store and
//! reassembled into byte streams on read. This module owns the
//! create / list / open_read / rename / delete operations.

mod chunked;
mod object;

pub use chunked::ChunkedStore;
pub use object::{Chunk, NewObject, StoredObject};

/// Default bytes per chunk (255 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;
