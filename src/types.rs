//! Core domain types for commitstream.
//!
//! This module defines the foundational data types every other module depends
//! on: uncommitted events and streams (writer-side), commit attempts and
//! commits (engine-side batches), and the committed event stream returned by
//! reads. Event sequences are 1-based and strictly increasing within a
//! stream; a commit's stream revision equals the sequence of the last event
//! it contains.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use uuid::Uuid;

/// Current wall-clock time as Unix epoch milliseconds.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A domain event that has not yet been assigned to a commit.
///
/// The writer assigns the `event_id`, the owning `stream_id`, and the
/// 1-based `sequence` within the stream. Payloads are opaque byte buffers;
/// the adapter never interprets them. The `schema` tag identifies the payload
/// shape for the caller's decoder (e.g., `"OrderPlaced/1.0"`).
///
/// # Fields
///
/// * `event_id` - Unique ID for this event.
/// * `stream_id` - UUID of the stream this event belongs to.
/// * `sequence` - 1-based position within the stream.
/// * `created_at` - Unix epoch milliseconds at event creation.
/// * `schema` - Schema/version tag for the opaque payload.
/// * `payload` - Opaque domain event body.
#[derive(Debug, Clone, PartialEq)]
pub struct UncommittedEvent {
    /// Unique ID for this event.
    pub event_id: Uuid,
    /// Stream this event belongs to.
    pub stream_id: Uuid,
    /// 1-based position within the stream.
    pub sequence: u64,
    /// Unix epoch milliseconds at event creation.
    pub created_at: u64,
    /// Schema/version tag for the opaque payload.
    pub schema: String,
    /// Opaque domain event body.
    pub payload: Bytes,
}

impl UncommittedEvent {
    /// Create an event with a fresh v4 `event_id` and the current wall-clock
    /// timestamp.
    pub fn new(stream_id: Uuid, sequence: u64, schema: impl Into<String>, payload: Bytes) -> Self {
        UncommittedEvent {
            event_id: Uuid::new_v4(),
            stream_id,
            sequence,
            created_at: unix_millis(),
            schema: schema.into(),
            payload,
        }
    }
}

/// An ordered batch of events awaiting persistence.
///
/// Created by a writer, appended to, then passed once to
/// [`StreamAdapter::store`](crate::adapter::StreamAdapter::store), which
/// consumes it. The batch carries no ties to persisted revisions; the adapter
/// derives the commit's stream revision from the last appended event.
#[derive(Debug, Clone, Default)]
pub struct UncommittedEventStream {
    events: Vec<UncommittedEvent>,
}

impl UncommittedEventStream {
    /// Create an empty uncommitted stream.
    pub fn new() -> Self {
        UncommittedEventStream { events: Vec::new() }
    }

    /// Append an event to the end of the batch.
    pub fn append(&mut self, event: UncommittedEvent) {
        self.events.push(event);
    }

    /// Stream ID of the first appended event, or `None` if the batch is empty.
    pub fn stream_id(&self) -> Option<Uuid> {
        self.events.first().map(|e| e.stream_id)
    }

    /// Number of events in the batch.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the batch contains no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The appended events, in append order.
    pub fn events(&self) -> &[UncommittedEvent] {
        &self.events
    }

    /// Consume the batch, yielding its events.
    pub fn into_events(self) -> Vec<UncommittedEvent> {
        self.events
    }
}

/// A persisted event record inside a commit.
///
/// Identical to [`UncommittedEvent`] plus the `commit_id` of the batch it was
/// durably appended in.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedEvent {
    /// Unique ID for this event.
    pub event_id: Uuid,
    /// Stream this event belongs to.
    pub stream_id: Uuid,
    /// 1-based position within the stream.
    pub sequence: u64,
    /// Commit this event was persisted in.
    pub commit_id: Uuid,
    /// Unix epoch milliseconds at event creation.
    pub created_at: u64,
    /// Schema/version tag for the opaque payload.
    pub schema: String,
    /// Opaque domain event body.
    pub payload: Bytes,
}

/// A commit the adapter wants the engine to append.
///
/// Carries everything except the `commit_sequence`, which the engine assigns
/// at append time (the first commit for a new stream gets sequence 1). The
/// attempt/commit split mirrors the uncommitted/committed event split: the
/// engine, not the caller, owns position assignment.
///
/// # Fields
///
/// * `commit_id` - Fresh UUID identifying the batch.
/// * `stream_id` - Target stream.
/// * `stream_revision` - Sequence of the last event in the batch.
/// * `events` - The ordered events to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitAttempt {
    /// Fresh UUID identifying the batch.
    pub commit_id: Uuid,
    /// Target stream.
    pub stream_id: Uuid,
    /// Sequence of the last event in the batch.
    pub stream_revision: u64,
    /// The ordered events to persist.
    pub events: Vec<CommittedEvent>,
}

/// A durably appended batch of events.
///
/// Per stream, `commit_sequence` values are contiguous starting at 1 and
/// `stream_revision` values strictly increase across commits.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    /// UUID identifying the batch.
    pub commit_id: Uuid,
    /// Stream this commit belongs to.
    pub stream_id: Uuid,
    /// 1-based ordinal of this commit within the stream's commit history.
    pub commit_sequence: u64,
    /// Sequence of the last event in the batch.
    pub stream_revision: u64,
    /// The ordered events in the batch.
    pub events: Vec<CommittedEvent>,
}

/// An ordered, restartable view over the events of a read.
///
/// Returned by
/// [`StreamAdapter::read_from`](crate::adapter::StreamAdapter::read_from).
/// Iteration always starts from the first in-window event; iterating twice
/// yields the same events. `current_source_version` is the sequence of the
/// last event in the view, or 0 when the view is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedEventStream {
    events: Vec<CommittedEvent>,
}

impl CommittedEventStream {
    /// Build a view over events already filtered and in sequence order.
    pub(crate) fn new(events: Vec<CommittedEvent>) -> Self {
        CommittedEventStream { events }
    }

    /// Sequence of the last event in the view, or 0 if the view is empty.
    ///
    /// Downstream version checks treat 0 as "no events observed".
    pub fn current_source_version(&self) -> u64 {
        self.events.last().map(|e| e.sequence).unwrap_or(0)
    }

    /// Number of events in the view.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the view contains no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate the events in increasing sequence order. Restartable: each
    /// call starts from the first event.
    pub fn iter(&self) -> std::slice::Iter<'_, CommittedEvent> {
        self.events.iter()
    }

    /// The events in increasing sequence order.
    pub fn events(&self) -> &[CommittedEvent] {
        &self.events
    }
}

impl IntoIterator for CommittedEventStream {
    type Item = CommittedEvent;
    type IntoIter = std::vec::IntoIter<CommittedEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a CommittedEventStream {
    type Item = &'a CommittedEvent;
    type IntoIter = std::slice::Iter<'a, CommittedEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed(sequence: u64) -> CommittedEvent {
        CommittedEvent {
            event_id: Uuid::new_v4(),
            stream_id: Uuid::new_v4(),
            sequence,
            commit_id: Uuid::new_v4(),
            created_at: 0,
            schema: "TestEvent/1.0".to_string(),
            payload: Bytes::from_static(b"{}"),
        }
    }

    #[test]
    fn uncommitted_event_new_assigns_id_and_timestamp() {
        let stream_id = Uuid::new_v4();
        let event = UncommittedEvent::new(stream_id, 1, "OrderPlaced/1.0", Bytes::new());

        assert_eq!(event.stream_id, stream_id);
        assert_eq!(event.sequence, 1);
        assert_eq!(event.schema, "OrderPlaced/1.0");
        assert!(!event.event_id.is_nil());
        assert!(event.created_at > 0);
    }

    #[test]
    fn uncommitted_event_clone_is_equal() {
        let event = UncommittedEvent::new(Uuid::new_v4(), 2, "ItemAdded/1.0", Bytes::from_static(b"{\"qty\":1}"));
        let cloned = event.clone();
        assert_eq!(event, cloned);
    }

    #[test]
    fn uncommitted_stream_starts_empty() {
        let stream = UncommittedEventStream::new();
        assert!(stream.is_empty());
        assert_eq!(stream.len(), 0);
        assert_eq!(stream.stream_id(), None);
    }

    #[test]
    fn uncommitted_stream_append_preserves_order() {
        let stream_id = Uuid::new_v4();
        let mut stream = UncommittedEventStream::new();
        stream.append(UncommittedEvent::new(stream_id, 1, "A", Bytes::new()));
        stream.append(UncommittedEvent::new(stream_id, 2, "B", Bytes::new()));
        stream.append(UncommittedEvent::new(stream_id, 3, "C", Bytes::new()));

        assert_eq!(stream.len(), 3);
        assert_eq!(stream.stream_id(), Some(stream_id));
        let sequences: Vec<u64> = stream.events().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn uncommitted_stream_into_events_hands_back_all() {
        let stream_id = Uuid::new_v4();
        let mut stream = UncommittedEventStream::new();
        stream.append(UncommittedEvent::new(stream_id, 1, "A", Bytes::new()));
        stream.append(UncommittedEvent::new(stream_id, 2, "B", Bytes::new()));

        let events = stream.into_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].sequence, 2);
    }

    #[test]
    fn commit_clone_is_equal() {
        let stream_id = Uuid::new_v4();
        let commit = Commit {
            commit_id: Uuid::new_v4(),
            stream_id,
            commit_sequence: 1,
            stream_revision: 2,
            events: vec![committed(1), committed(2)],
        };
        let cloned = commit.clone();
        assert_eq!(commit, cloned);
    }

    #[test]
    fn commits_with_different_commit_sequence_are_not_equal() {
        let commit_a = Commit {
            commit_id: Uuid::new_v4(),
            stream_id: Uuid::new_v4(),
            commit_sequence: 1,
            stream_revision: 1,
            events: vec![],
        };
        let commit_b = Commit {
            commit_sequence: 2,
            ..commit_a.clone()
        };
        assert_ne!(commit_a, commit_b);
    }

    #[test]
    fn committed_stream_current_source_version_is_last_sequence() {
        let stream = CommittedEventStream::new(vec![committed(1), committed(2), committed(3)]);
        assert_eq!(stream.current_source_version(), 3);
    }

    #[test]
    fn committed_stream_empty_version_is_zero() {
        let stream = CommittedEventStream::new(Vec::new());
        assert!(stream.is_empty());
        assert_eq!(stream.current_source_version(), 0);
    }

    #[test]
    fn committed_stream_iteration_is_restartable() {
        let stream = CommittedEventStream::new(vec![committed(1), committed(2)]);

        let first_pass: Vec<u64> = stream.iter().map(|e| e.sequence).collect();
        let second_pass: Vec<u64> = stream.iter().map(|e| e.sequence).collect();

        assert_eq!(first_pass, vec![1, 2]);
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn committed_stream_ref_into_iterator() {
        let stream = CommittedEventStream::new(vec![committed(5), committed(6)]);
        let mut count = 0;
        for event in &stream {
            assert!(event.sequence >= 5);
            count += 1;
        }
        assert_eq!(count, 2);
        // The stream is still usable after borrowing iteration.
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn committed_stream_owned_into_iterator() {
        let stream = CommittedEventStream::new(vec![committed(1), committed(2), committed(3)]);
        let sequences: Vec<u64> = stream.into_iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }
}
