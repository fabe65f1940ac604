//! Error types for commitstream.
//!
//! This module defines the unified error enum used throughout the crate. All
//! fallible operations return `Result<T, Error>`. Callers distinguish the
//! recoverable conflict case (re-read current state, retry the business
//! operation) from infrastructure failures (surfaced unchanged, typically
//! fatal to the current operation).

use uuid::Uuid;

/// Unified error type for all commitstream operations.
///
/// Variants fall into three classes:
///
/// - `Conflict` -> concurrency conflict, recoverable by re-reading state
/// - `Io` / `CorruptCommit` / `InvalidHeader` -> persistence failure
/// - `InvalidArgument` / `StreamNotFound` -> caller error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Optimistic concurrency check failed: a competing writer already
    /// committed at or past the attempted stream revision.
    #[error(
        "concurrency conflict on stream {stream_id}: attempted revision \
         {attempted_revision}, stream already at {current_revision}"
    )]
    Conflict {
        /// Stream the conflicting append targeted.
        stream_id: Uuid,
        /// Stream revision the rejected commit attempt carried.
        attempted_revision: u64,
        /// Revision the stream is actually at.
        current_revision: u64,
    },

    /// The requested stream has no commits.
    #[error("stream not found: {stream_id}")]
    StreamNotFound {
        /// UUID of the stream that was not found.
        stream_id: Uuid,
    },

    /// An I/O error occurred in the persistence engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A commit frame on disk is corrupt (CRC mismatch, malformed field).
    #[error("corrupt commit frame at byte offset {offset}: {detail}")]
    CorruptCommit {
        /// Byte offset of the corrupt frame within the log file.
        offset: u64,
        /// Human-readable description of the corruption.
        detail: String,
    },

    /// The log file header is invalid or unrecognized.
    #[error("invalid file header: {0}")]
    InvalidHeader(String),

    /// A request argument is invalid; rejected before any engine call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
