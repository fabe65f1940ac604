//! File-backed persistence engine.
//!
//! `FileEngine` owns an append-only log file of commit frames and an
//! in-memory index of commits per stream. Opening an existing file replays
//! every valid frame to rebuild the index; appends serialize the commit
//! frame, write it, fsync, then update the index.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use uuid::Uuid;

use crate::codec::{self, DecodeOutcome};
use crate::engine::PersistenceEngine;
use crate::error::Error;
use crate::types::{Commit, CommitAttempt};

/// Check whether a valid commit frame exists in `data` after byte offset
/// `start`.
///
/// Scans forward one byte at a time from `start + 1` through the end of the
/// buffer, looking for a decodable frame. Returns `true` if found, indicating
/// mid-file corruption (the corrupt region is not at the tail).
fn has_valid_frame_after(data: &[u8], start: usize) -> bool {
    for probe in (start + 1)..data.len() {
        if let Ok(DecodeOutcome::Complete { .. }) = codec::decode_commit(&data[probe..]) {
            return true;
        }
    }
    false
}

/// Truncate the log file to a given offset, fsync, and return a `FileEngine`
/// with the commits recovered so far.
///
/// This is the common recovery path for all partial/corrupt tail scenarios:
/// an incomplete trailing frame or a trailing CRC mismatch.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be opened or truncated.
fn truncate_and_return(
    path: &Path,
    truncate_to: usize,
    streams: HashMap<Uuid, Vec<Commit>>,
) -> Result<FileEngine, Error> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    file.set_len(truncate_to as u64)?;
    file.sync_all()?;

    Ok(FileEngine { file, streams })
}

/// Commit log backed by an append-only file.
///
/// All writes go through [`PersistenceEngine::append`], which checks the
/// attempt's revision against the index, serializes the frame to disk,
/// fsyncs, then records the commit in the index. Reads go directly to the
/// in-memory index with no disk I/O. Appends take `&mut self`; a single
/// writer per engine is the concurrency model, matching the one-writer
/// discipline of the log file itself.
#[derive(Debug)]
pub struct FileEngine {
    /// Append-only log file handle.
    file: File,
    /// Per-stream commit index. Index `i` in a vec = commit sequence `i + 1`.
    streams: HashMap<Uuid, Vec<Commit>>,
}

impl FileEngine {
    /// Open or create the commit log at the given file path.
    ///
    /// If the file does not exist, creates it with the 8-byte file header,
    /// fsyncs, and returns an empty engine. If the file exists, validates the
    /// header and replays all valid frames, rebuilding the per-stream index.
    ///
    /// # Recovery behavior
    ///
    /// - **Trailing incomplete/corrupt frame**: truncated from the file with
    ///   a `tracing::warn!` log. The engine opens successfully with all
    ///   preceding valid commits.
    /// - **Mid-file corruption** (corrupt frame followed by a valid frame):
    ///   returns [`Error::CorruptCommit`]. This is unrecoverable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be created or written.
    /// Returns [`Error::InvalidHeader`] if an existing file has a bad header.
    /// Returns [`Error::CorruptCommit`] if mid-file corruption is detected.
    pub fn open(path: &Path) -> Result<FileEngine, Error> {
        if !path.exists() {
            // New file: create with read+write so append() can write later.
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            file.write_all(&codec::encode_header())?;
            file.sync_all()?;

            // Fsync the parent directory so the new file's directory entry
            // is durable before any commit lands in it.
            let parent = path
                .parent()
                .expect("log path must have a parent directory");
            let dir_handle = File::open(parent)?;
            dir_handle.sync_all()?;

            return Ok(FileEngine {
                file,
                streams: HashMap::new(),
            });
        }

        // Existing file: read contents, validate header, replay frames.
        let data = std::fs::read(path)?;

        if data.len() < codec::HEADER_SIZE {
            return Err(Error::InvalidHeader(format!(
                "file too short for header: {} bytes",
                data.len()
            )));
        }

        let header: &[u8; codec::HEADER_SIZE] = data[..codec::HEADER_SIZE]
            .try_into()
            .expect("slice is exactly 8 bytes");
        codec::decode_header(header)?;

        let mut streams: HashMap<Uuid, Vec<Commit>> = HashMap::new();
        let mut offset = codec::HEADER_SIZE;

        loop {
            let remaining = &data[offset..];
            if remaining.is_empty() {
                break;
            }

            match codec::decode_commit(remaining) {
                Ok(DecodeOutcome::Complete { value, consumed }) => {
                    offset += consumed;
                    streams.entry(value.stream_id).or_default().push(value);
                }
                Ok(DecodeOutcome::Incomplete) => {
                    // Trailing partial frame -- truncate to frame start.
                    tracing::warn!(
                        offset,
                        "truncating trailing partial commit frame at byte offset {offset}"
                    );
                    return truncate_and_return(path, offset, streams);
                }
                Err(Error::CorruptCommit { detail, .. }) => {
                    // Bad frame at this offset. Check whether valid data
                    // follows before declaring the tail torn.
                    if has_valid_frame_after(&data, offset) {
                        return Err(Error::CorruptCommit {
                            offset: offset as u64,
                            detail: format!(
                                "mid-file corruption: valid frame follows corrupt data ({detail})"
                            ),
                        });
                    }
                    tracing::warn!(
                        offset,
                        detail,
                        "truncating trailing corrupt commit frame at byte offset {offset}"
                    );
                    return truncate_and_return(path, offset, streams);
                }
                Err(e) => return Err(e),
            }
        }

        // All frames decoded successfully. Open for future appends.
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(FileEngine { file, streams })
    }

    /// Current stream revision (last commit's revision), or `None` if the
    /// stream has no commits.
    pub fn current_revision(&self, stream_id: &Uuid) -> Option<u64> {
        self.streams
            .get(stream_id)
            .and_then(|commits| commits.last())
            .map(|commit| commit.stream_revision)
    }

    /// Number of commits appended to the stream, or 0 if it does not exist.
    pub fn commit_count(&self, stream_id: &Uuid) -> u64 {
        self.streams
            .get(stream_id)
            .map(|c| c.len() as u64)
            .unwrap_or(0)
    }

    /// Current byte length of the log file.
    ///
    /// Uses `File::metadata()` which issues a `stat(2)` syscall without
    /// seeking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the metadata syscall fails.
    pub fn log_file_len(&self) -> Result<u64, Error> {
        Ok(self.file.metadata()?.len())
    }
}

impl PersistenceEngine for FileEngine {
    /// Append one commit with optimistic concurrency control.
    ///
    /// Checks the attempt's revision against the stream's current revision,
    /// assigns the next commit sequence, serializes the frame, writes it to
    /// the log file, fsyncs, then records the commit in the index. If the
    /// concurrency check fails, nothing is written.
    fn append(&mut self, attempt: CommitAttempt) -> Result<Commit, Error> {
        // The stream index is only touched after the frame is durable, so a
        // failed append leaves no trace in memory or on disk.
        let existing = self.streams.get(&attempt.stream_id).map(|c| c.as_slice()).unwrap_or(&[]);

        if let Some(last) = existing.last() {
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
            commit_sequence: existing.len() as u64 + 1,
            stream_revision: attempt.stream_revision,
            events: attempt.events,
        };

        // Write the frame and fsync before the index sees the commit, so the
        // index never references a commit the disk does not hold.
        let encoded = codec::encode_commit(&commit);
        use std::io::Seek;
        self.file.seek(std::io::SeekFrom::End(0))?;
        self.file.write_all(&encoded)?;
        self.file.sync_all()?;

        self.streams
            .entry(commit.stream_id)
            .or_default()
            .push(commit.clone());
        Ok(commit)
    }

    fn commits_in_revision_range(
        &self,
        stream_id: Uuid,
        min_revision: u64,
        max_revision: u64,
    ) -> Result<Vec<Commit>, Error> {
        let commits = self
            .streams
            .get(&stream_id)
            .ok_or(Error::StreamNotFound { stream_id })?;

        Ok(commits
            .iter()
            .filter(|c| c.stream_revision >= min_revision && c.stream_revision <= max_revision)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommittedEvent;
    use bytes::Bytes;

    /// Helper: build a commit attempt whose events span `first..=last`.
    fn attempt(stream_id: Uuid, first: u64, last: u64) -> CommitAttempt {
        let commit_id = Uuid::new_v4();
        let events = (first..=last)
            .map(|sequence| CommittedEvent {
                event_id: Uuid::new_v4(),
                stream_id,
                sequence,
                commit_id,
                created_at: 0,
                schema: "TestEvent/1.0".to_string(),
                payload: Bytes::from_static(b"{}"),
            })
            .collect();
        CommitAttempt {
            commit_id,
            stream_id,
            stream_revision: last,
            events,
        }
    }

    #[test]
    fn open_creates_file_with_header_and_empty_engine() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("commits.log");
        assert!(!path.exists());

        let engine = FileEngine::open(&path).expect("open should succeed");

        assert!(path.exists());
        let contents = std::fs::read(&path).expect("read file");
        assert_eq!(&contents[..codec::HEADER_SIZE], &codec::encode_header());
        assert_eq!(engine.commit_count(&Uuid::new_v4()), 0);
    }

    #[test]
    fn append_assigns_contiguous_commit_sequences() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("commits.log");
        let mut engine = FileEngine::open(&path).expect("open should succeed");
        let stream_id = Uuid::new_v4();

        let first = engine.append(attempt(stream_id, 1, 2)).expect("append 1");
        let second = engine.append(attempt(stream_id, 3, 4)).expect("append 2");

        assert_eq!(first.commit_sequence, 1);
        assert_eq!(second.commit_sequence, 2);
        assert_eq!(engine.current_revision(&stream_id), Some(4));
    }

    #[test]
    fn stale_revision_is_rejected_and_nothing_written() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("commits.log");
        let mut engine = FileEngine::open(&path).expect("open should succeed");
        let stream_id = Uuid::new_v4();

        engine.append(attempt(stream_id, 1, 3)).expect("append should succeed");
        let len_before = engine.log_file_len().expect("stat should succeed");

        let result = engine.append(attempt(stream_id, 2, 3));
        assert!(matches!(result, Err(Error::Conflict { .. })));

        // Rejected attempts leave no bytes behind.
        assert_eq!(engine.log_file_len().expect("stat should succeed"), len_before);
        assert_eq!(engine.commit_count(&stream_id), 1);
    }

    #[test]
    fn reopen_recovers_commits_across_streams() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("commits.log");

        let stream_a = Uuid::new_v4();
        let stream_b = Uuid::new_v4();
        let (a1, b1, a2);
        {
            let mut engine = FileEngine::open(&path).expect("open should succeed");
            a1 = engine.append(attempt(stream_a, 1, 2)).expect("append a1");
            b1 = engine.append(attempt(stream_b, 1, 1)).expect("append b1");
            a2 = engine.append(attempt(stream_a, 3, 4)).expect("append a2");
        }

        let engine = FileEngine::open(&path).expect("reopen should succeed");

        assert_eq!(engine.commit_count(&stream_a), 2);
        assert_eq!(engine.commit_count(&stream_b), 1);
        assert_eq!(engine.current_revision(&stream_a), Some(4));
        assert_eq!(engine.current_revision(&stream_b), Some(1));

        let recovered_a = engine
            .commits_in_revision_range(stream_a, u64::MIN, u64::MAX)
            .expect("range query should succeed");
        assert_eq!(recovered_a, vec![a1, a2]);

        let recovered_b = engine
            .commits_in_revision_range(stream_b, u64::MIN, u64::MAX)
            .expect("range query should succeed");
        assert_eq!(recovered_b, vec![b1]);
    }

    #[test]
    fn reopen_continues_commit_sequence_numbering() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("commits.log");
        let stream_id = Uuid::new_v4();

        {
            let mut engine = FileEngine::open(&path).expect("open should succeed");
            engine.append(attempt(stream_id, 1, 2)).expect("append 1");
        }

        let mut engine = FileEngine::open(&path).expect("reopen should succeed");
        let second = engine.append(attempt(stream_id, 3, 3)).expect("append 2");
        assert_eq!(second.commit_sequence, 2);
    }

    #[test]
    fn trailing_partial_frame_is_truncated_on_open() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("commits.log");
        let stream_id = Uuid::new_v4();

        {
            let mut engine = FileEngine::open(&path).expect("open should succeed");
            engine.append(attempt(stream_id, 1, 2)).expect("append should succeed");
        }
        let intact_len = std::fs::metadata(&path).expect("stat").len();

        // Simulate a torn write: a second frame cut off mid-way.
        let torn = codec::encode_commit(&Commit {
            commit_id: Uuid::new_v4(),
            stream_id,
            commit_sequence: 2,
            stream_revision: 4,
            events: vec![],
        });
        {
            let mut file = OpenOptions::new().append(true).open(&path).expect("open for append");
            file.write_all(&torn[..torn.len() / 2]).expect("write torn frame");
            file.sync_all().expect("sync");
        }

        let engine = FileEngine::open(&path).expect("recovery should succeed");

        // The torn frame is gone, the intact commit survives.
        assert_eq!(engine.commit_count(&stream_id), 1);
        assert_eq!(engine.current_revision(&stream_id), Some(2));
        assert_eq!(std::fs::metadata(&path).expect("stat").len(), intact_len);
    }

    #[test]
    fn trailing_corrupt_frame_is_truncated_on_open() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("commits.log");
        let stream_id = Uuid::new_v4();

        {
            let mut engine = FileEngine::open(&path).expect("open should succeed");
            engine.append(attempt(stream_id, 1, 2)).expect("append 1");
            engine.append(attempt(stream_id, 3, 4)).expect("append 2");
        }

        // Flip a byte inside the last frame's CRC-protected region.
        let mut data = std::fs::read(&path).expect("read log");
        let last = data.len() - 8;
        data[last] ^= 0xFF;
        std::fs::write(&path, &data).expect("write corrupted log");

        let engine = FileEngine::open(&path).expect("recovery should succeed");

        // Only the first commit survives.
        assert_eq!(engine.commit_count(&stream_id), 1);
        assert_eq!(engine.current_revision(&stream_id), Some(2));
    }

    #[test]
    fn mid_file_corruption_is_unrecoverable() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("commits.log");
        let stream_id = Uuid::new_v4();

        let first_frame_len;
        {
            let mut engine = FileEngine::open(&path).expect("open should succeed");
            let first = engine.append(attempt(stream_id, 1, 2)).expect("append 1");
            first_frame_len = codec::encode_commit(&first).len();
            engine.append(attempt(stream_id, 3, 4)).expect("append 2");
        }

        // Corrupt the first frame while the second remains valid.
        let mut data = std::fs::read(&path).expect("read log");
        let inside_first = codec::HEADER_SIZE + first_frame_len / 2;
        data[inside_first] ^= 0xFF;
        std::fs::write(&path, &data).expect("write corrupted log");

        let err = FileEngine::open(&path).expect_err("open should fail");
        match err {
            Error::CorruptCommit { offset, detail } => {
                assert_eq!(offset, codec::HEADER_SIZE as u64);
                assert!(
                    detail.contains("mid-file"),
                    "expected mid-file detail, got: {detail}"
                );
            }
            other => panic!("expected CorruptCommit, got: {other:?}"),
        }
    }

    #[test]
    fn open_rejects_file_with_bad_header() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("commits.log");
        std::fs::write(&path, b"notalog!").expect("write bogus file");

        let err = FileEngine::open(&path).expect_err("open should fail");
        assert!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn open_rejects_file_too_short_for_header() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("commits.log");
        std::fs::write(&path, b"CS").expect("write stub file");

        let err = FileEngine::open(&path).expect_err("open should fail");
        assert!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn range_query_on_unknown_stream_is_stream_not_found() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("commits.log");
        let engine = FileEngine::open(&path).expect("open should succeed");

        let unknown = Uuid::new_v4();
        match engine.commits_in_revision_range(unknown, u64::MIN, u64::MAX) {
            Err(Error::StreamNotFound { stream_id }) => assert_eq!(stream_id, unknown),
            other => panic!("expected StreamNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn range_query_filters_by_revision_inclusive() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("commits.log");
        let mut engine = FileEngine::open(&path).expect("open should succeed");
        let stream_id = Uuid::new_v4();

        engine.append(attempt(stream_id, 1, 2)).expect("append 1");
        engine.append(attempt(stream_id, 3, 4)).expect("append 2");
        engine.append(attempt(stream_id, 5, 6)).expect("append 3");

        let commits = engine
            .commits_in_revision_range(stream_id, 3, 5)
            .expect("range query should succeed");
        let revisions: Vec<u64> = commits.iter().map(|c| c.stream_revision).collect();
        assert_eq!(revisions, vec![4]);
    }
}
