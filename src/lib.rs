//! commitstream: an event-stream adapter over a commit-oriented persistence engine.
//!
//! The domain sees a stream as a flat, 1-based sequence of events; the
//! persistence engine sees it as ordered batches ("commits"), each carrying a
//! stream revision (the sequence of its last event) and a 1-based commit
//! sequence. [`StreamAdapter`] reconciles the two views: one uncommitted
//! stream becomes one commit on write, and a revision-range fetch plus an
//! exact per-event filter rebuilds any sequence window on read.

pub mod adapter;
pub mod codec;
pub mod engine;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use adapter::StreamAdapter;
pub use engine::PersistenceEngine;
pub use error::Error;
pub use memory::MemoryEngine;
pub use store::FileEngine;
pub use types::{
    Commit, CommitAttempt, CommittedEvent, CommittedEventStream, UncommittedEvent,
    UncommittedEventStream,
};
