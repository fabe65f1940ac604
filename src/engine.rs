//! Persistence engine contract.
//!
//! The adapter depends on this trait rather than a concrete store, so the
//! commit log can be in-memory ([`MemoryEngine`](crate::memory::MemoryEngine)),
//! file-backed ([`FileEngine`](crate::store::FileEngine)), or remote without
//! touching adapter logic. The engine exclusively owns the durable commit log;
//! the adapter holds no cached copy across calls.

use uuid::Uuid;

use crate::error::Error;
use crate::types::{Commit, CommitAttempt};

/// A commit-oriented store of ordered event batches, keyed by stream.
///
/// The engine's append-with-uniqueness check is the sole concurrency-control
/// mechanism: a commit attempt whose stream revision does not advance past
/// the stream's current revision is rejected with [`Error::Conflict`].
/// Callers resolve conflicts by re-reading state, never by the engine
/// retrying.
pub trait PersistenceEngine {
    /// Durably append one commit, assigning it the next commit sequence for
    /// its stream. The first commit for a new stream gets sequence 1.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the attempt's stream revision is at or
    /// below the stream's current revision. Storage-layer failures surface
    /// as [`Error::Io`].
    fn append(&mut self, attempt: CommitAttempt) -> Result<Commit, Error>;

    /// All commits for `stream_id` whose stream revision lies in the
    /// inclusive range `[min_revision, max_revision]`, ordered by commit
    /// sequence ascending.
    ///
    /// The range check is on commit revision, which is coarser than per-event
    /// sequence; callers needing per-event granularity re-filter the flattened
    /// events themselves.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamNotFound`] if the stream has no commits.
    fn commits_in_revision_range(
        &self,
        stream_id: Uuid,
        min_revision: u64,
        max_revision: u64,
    ) -> Result<Vec<Commit>, Error>;
}
