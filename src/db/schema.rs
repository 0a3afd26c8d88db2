//! Database schema and migrations for stashd.
//!
//! Migrations are applied sequentially; the schema_version table tracks
//! which ones have already run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Initial schema - object metadata and chunk tables
    r#"
-- One row per visible stored object. A row is inserted only after all
-- of the object's chunks have been written, in the same transaction.
CREATE TABLE files (
    id            TEXT PRIMARY KEY,              -- UUID v4
    filename      TEXT NOT NULL,                 -- display name, mutable via rename
    content_type  TEXT NOT NULL,
    length        INTEGER NOT NULL,              -- total size in bytes
    chunk_size    INTEGER NOT NULL,              -- bytes per chunk, fixed at creation
    upload_date   TEXT NOT NULL                  -- RFC 3339 UTC
);

CREATE INDEX idx_files_upload_date ON files(upload_date);

-- Fixed-size ordered fragments of object content. The final chunk of an
-- object may be shorter than chunk_size; every other chunk is exact.
CREATE TABLE chunks (
    object_id  TEXT NOT NULL,
    seq        INTEGER NOT NULL,
    data       BLOB NOT NULL,
    PRIMARY KEY (object_id, seq)
);
"#,
];
