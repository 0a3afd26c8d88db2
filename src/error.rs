//! Error types for stashd.

use thiserror::Error;

/// Common error type for stashd.
#[derive(Error, Debug)]
pub enum StashError {
    /// Backing store query error.
    #[error("database error: {0}")]
    Database(String),

    /// Backing store connection error.
    #[error("store connection error: {0}")]
    Connection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A bulk export was requested over zero objects.
    #[error("no files to export")]
    EmptyCollection,

    /// An upload stream yielded zero bytes.
    #[error("upload contained no data")]
    EmptyInput,

    /// Stored chunks do not reassemble into the declared object.
    #[error("corrupt object data: {0}")]
    Corrupt(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

// Conversion from sqlx errors
impl From<sqlx::Error> for StashError {
    fn from(e: sqlx::Error) -> Self {
        StashError::Database(e.to_string())
    }
}

/// Result type alias for stashd operations.
pub type Result<T> = std::result::Result<T, StashError>;
