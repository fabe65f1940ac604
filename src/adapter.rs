//! Stream adapter: flat event sequences over a batched commit log.
//!
//! `StreamAdapter` translates between the domain's view of a stream (a flat,
//! 1-based sequence of events) and the engine's view (batches of events per
//! commit, each carrying a stream revision). Writes wrap one uncommitted
//! stream into one commit; reads fetch commits by revision range and
//! re-filter the flattened events to the exact sequence window.

use uuid::Uuid;

use crate::engine::PersistenceEngine;
use crate::error::Error;
use crate::types::{
    Commit, CommitAttempt, CommittedEvent, CommittedEventStream, UncommittedEventStream,
};

/// Stateless translation layer over an injected [`PersistenceEngine`].
///
/// The adapter owns no persistent state and performs no locking; each call is
/// independent. Concurrent writers racing on the same stream are arbitrated
/// solely by the engine's append-with-uniqueness check.
#[derive(Debug)]
pub struct StreamAdapter<E> {
    /// The injected commit store.
    engine: E,
}

impl<E: PersistenceEngine> StreamAdapter<E> {
    /// Create an adapter over the given engine.
    pub fn new(engine: E) -> Self {
        StreamAdapter { engine }
    }

    /// Shared access to the underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Persist an uncommitted stream as one commit.
    ///
    /// Assigns the batch a fresh commit ID and a stream revision equal to the
    /// last event's sequence, then delegates to the engine, which assigns the
    /// commit sequence (1 for a new stream). Not idempotent: repeating the
    /// call with the same events is a fresh attempt the engine will reject as
    /// a revision conflict.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] before any engine call if the
    /// stream is empty, mixes stream IDs, or its event sequences are not
    /// contiguous and increasing. Engine errors ([`Error::Conflict`],
    /// storage failures) are surfaced unchanged; the adapter never retries.
    pub fn store(&mut self, stream: UncommittedEventStream) -> Result<Commit, Error> {
        let stream_id = stream
            .stream_id()
            .ok_or_else(|| Error::InvalidArgument("uncommitted stream is empty".to_string()))?;

        for pair in stream.events().windows(2) {
            if pair[1].sequence != pair[0].sequence + 1 {
                return Err(Error::InvalidArgument(format!(
                    "event sequences must be contiguous and increasing: {} follows {}",
                    pair[1].sequence, pair[0].sequence
                )));
            }
        }
        if let Some(stray) = stream.events().iter().find(|e| e.stream_id != stream_id) {
            return Err(Error::InvalidArgument(format!(
                "all events in a batch must share one stream ID: found {} and {}",
                stream_id, stray.stream_id
            )));
        }

        let commit_id = Uuid::new_v4();
        let events: Vec<CommittedEvent> = stream
            .into_events()
            .into_iter()
            .map(|e| CommittedEvent {
                event_id: e.event_id,
                stream_id: e.stream_id,
                sequence: e.sequence,
                commit_id,
                created_at: e.created_at,
                schema: e.schema,
                payload: e.payload,
            })
            .collect();
        let stream_revision = events
            .last()
            .map(|e| e.sequence)
            .expect("stream verified non-empty above");

        tracing::debug!(
            %stream_id,
            %commit_id,
            stream_revision,
            event_count = events.len(),
            "storing uncommitted stream as one commit"
        );

        self.engine.append(CommitAttempt {
            commit_id,
            stream_id,
            stream_revision,
            events,
        })
    }

    /// Reconstruct the logical event stream for the inclusive sequence window
    /// `[min_sequence, max_sequence]`.
    ///
    /// Two-stage filtering: the engine is asked for commits with revision in
    /// `[min_sequence, u64::MAX]`, then the flattened events are re-filtered
    /// to the exact window. A commit whose revision is below the window floor
    /// holds only out-of-window events and is skipped by the engine; a commit
    /// whose revision exceeds the ceiling can still hold in-window events, so
    /// the upper bound stays open and the per-event filter decides.
    ///
    /// Events are yielded in strictly increasing sequence order: commits
    /// arrive in commit-sequence order and events within a commit are stored
    /// in sequence order. An unknown stream produces an empty result, leaving
    /// the not-found policy to the caller.
    ///
    /// Pass `u64::MIN` / `u64::MAX` as window bounds to read the full stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `min_sequence > max_sequence`.
    /// Engine storage failures are propagated unmodified.
    pub fn read_from(
        &self,
        stream_id: Uuid,
        min_sequence: u64,
        max_sequence: u64,
    ) -> Result<CommittedEventStream, Error> {
        if min_sequence > max_sequence {
            return Err(Error::InvalidArgument(format!(
                "min_sequence {min_sequence} exceeds max_sequence {max_sequence}"
            )));
        }

        let commits =
            match self
                .engine
                .commits_in_revision_range(stream_id, min_sequence, u64::MAX)
            {
                Ok(commits) => commits,
                Err(Error::StreamNotFound { .. }) => {
                    return Ok(CommittedEventStream::new(Vec::new()));
                }
                Err(e) => return Err(e),
            };

        let events: Vec<CommittedEvent> = commits
            .into_iter()
            .flat_map(|commit| commit.events)
            .filter(|e| e.sequence >= min_sequence && e.sequence <= max_sequence)
            .collect();

        tracing::debug!(
            %stream_id,
            min_sequence,
            max_sequence,
            event_count = events.len(),
            "read committed event stream"
        );

        Ok(CommittedEventStream::new(events))
    }
}
