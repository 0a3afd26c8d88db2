//! stashd - chunked file-storage service
//!
//! An HTTP service that stores uploaded files as fixed-size chunks in
//! SQLite and serves them back individually, as a streamed zip archive,
//! or as a base64-encoded batch.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod store;
pub mod web;

pub use config::Config;
pub use db::{DbPool, StoreHandle};
pub use error::{Result, StashError};
pub use pipeline::{encode_batch, zip_stream, Base64Record};
pub use store::{Chunk, ChunkedStore, NewObject, StoredObject, DEFAULT_CHUNK_SIZE};
pub use web::WebServer;
