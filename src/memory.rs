//! In-memory persistence engine.
//!
//! `MemoryEngine` keeps the commit log in an `Arc<RwLock<..>>`-shared map of
//! stream ID to commit list. Cloning produces a second handle onto the same
//! log, not a copy, so concurrent readers and a writer can share one engine
//! the same way clones of a read index share one event log.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::engine::PersistenceEngine;
use crate::error::Error;
use crate::types::{Commit, CommitAttempt};

/// In-memory commit log keyed by stream ID.
///
/// Commits for a stream are held in commit-sequence order; appending assigns
/// `commit_sequence` = number of existing commits + 1 under the write lock,
/// which serializes racing appends. Useful as a test fixture and as the
/// reference semantics for other engine implementations.
#[derive(Clone, Debug, Default)]
pub struct MemoryEngine {
    /// Shared commit log. Index `i` in a stream's vec = commit sequence `i + 1`.
    streams: Arc<RwLock<HashMap<Uuid, Vec<Commit>>>>,
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        MemoryEngine::default()
    }

    /// Current stream revision (last commit's revision), or `None` if the
    /// stream has no commits.
    pub fn current_revision(&self, stream_id: &Uuid) -> Option<u64> {
        let streams = self.streams.read().expect("commit log RwLock poisoned");
        streams
            .get(stream_id)
            .and_then(|commits| commits.last())
            .map(|commit| commit.stream_revision)
    }

    /// Number of commits appended to the stream, or 0 if it does not exist.
    pub fn commit_count(&self, stream_id: &Uuid) -> u64 {
        let streams = self.streams.read().expect("commit log RwLock poisoned");
        streams.get(stream_id).map(|c| c.len() as u64).unwrap_or(0)
    }
}

impl PersistenceEngine for MemoryEngine {
    fn append(&mut self, attempt: CommitAttempt) -> Result<Commit, Error> {
        let mut streams = self.streams.write().expect("commit log RwLock poisoned");
        let commits = streams.entry(attempt.stream_id).or_default();

        // Optimistic concurrency: the attempt must advance the stream
        // revision past the last durable commit.
        if let Some(last) = commits.last() {
            if attempt.stream_revision <= last.stream_revision {
                return Err(Error::Conflict {
                    stream_id: attempt.stream_id,
                    attempted_revision: attempt.stream_revision,
                    current_revision: last.stream_revision,
                });
            }
        }

        let commit = Commit {
            commit_id: attempt.commit_id,
            stream_id: attempt.stream_id,
            commit_sequence: commits.len() as u64 + 1,
            stream_revision: attempt.stream_revision,
            events: attempt.events,
        };
        commits.push(commit.clone());
        Ok(commit)
    }

    fn commits_in_revision_range(
        &self,
        stream_id: Uuid,
        min_revision: u64,
        max_revision: u64,
    ) -> Result<Vec<Commit>, Error> {
        let streams = self.streams.read().expect("commit log RwLock poisoned");
        let commits = streams
            .get(&stream_id)
            .ok_or(Error::StreamNotFound { stream_id })?;

        // Commits are stored in commit-sequence order, so a linear filter
        // preserves the required ordering.
        Ok(commits
            .iter()
            .filter(|c| c.stream_revision >= min_revision && c.stream_revision <= max_revision)
            .cloned()
            .collect())
    }
}
