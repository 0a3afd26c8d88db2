//! Bulk-export pipelines.
//!
//! Two distinct concurrency shapes: the zip aggregator is a sequential
//! single-pass writer with bounded memory, while the base64 batch
//! encoder fans out one drain per object and collects results in input
//! order.

pub mod base64;
pub mod zip;

pub use base64::{encode_batch, Base64Record};
pub use zip::zip_stream;
