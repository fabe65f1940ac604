//! Binary codec for the commitstream append-only log file.
//!
//! This module handles serialization and deserialization of the file header
//! and individual commit frames. It is pure data transformation -- no file
//! I/O, no index management.
//!
//! The file header is a fixed 8-byte sequence (magic number + format
//! version). Each commit is a length-prefixed, CRC32-checksummed binary frame
//! containing the commit fields followed by its event records.

use bytes::Bytes;
use uuid::Uuid;

use crate::error::Error;
use crate::types::{Commit, CommittedEvent};

/// Magic bytes identifying a commitstream log file (ASCII "CSLG").
const MAGIC: [u8; 4] = [0x43, 0x53, 0x4C, 0x47];

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

/// Size of the file header in bytes (magic + format version).
pub const HEADER_SIZE: usize = 8;

/// Size of the frame length prefix in bytes.
const LENGTH_PREFIX_SIZE: usize = 4;

/// Result of attempting to decode a value from a byte buffer.
///
/// Distinguishes between a successfully decoded value and a buffer that does
/// not contain enough bytes to form a complete frame. The distinction drives
/// crash recovery: a truncated trailing frame is expected after an unclean
/// shutdown, whereas a checksum mismatch followed by valid data indicates
/// corruption.
#[derive(Debug)]
pub enum DecodeOutcome<T> {
    /// A full value was successfully decoded from the buffer.
    Complete {
        /// The decoded value.
        value: T,
        /// Total number of bytes consumed from the buffer.
        consumed: usize,
    },
    /// The buffer does not contain enough bytes to form a complete frame.
    Incomplete,
}

/// Encode the file header as a fixed 8-byte array.
///
/// A 4-byte magic number (`CSLG` in ASCII) followed by a 4-byte format
/// version in little-endian encoding.
pub fn encode_header() -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..4].copy_from_slice(&MAGIC);
    buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf
}

/// Decode and validate the file header.
///
/// # Errors
///
/// Returns [`Error::InvalidHeader`] if the magic number is wrong or the
/// format version is unsupported.
pub fn decode_header(buf: &[u8; HEADER_SIZE]) -> Result<u32, Error> {
    if buf[0..4] != MAGIC {
        return Err(Error::InvalidHeader(
            "wrong magic bytes: expected CSLG".to_string(),
        ));
    }
    let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if version != FORMAT_VERSION {
        return Err(Error::InvalidHeader(format!(
            "unsupported format version: {version}"
        )));
    }
    Ok(version)
}

/// Encode a [`Commit`] into a binary frame.
///
/// The returned buffer contains the length prefix, the commit fields, each
/// event record, and a trailing CRC32 checksum over everything after the
/// length prefix. The caller can append this directly to the log file.
///
/// Per-event `stream_id` and `commit_id` are not written; they are rebuilt
/// from the commit fields at decode time.
pub fn encode_commit(commit: &Commit) -> Vec<u8> {
    let mut buf = Vec::new();

    // Length prefix is patched in after the body is built.
    buf.extend_from_slice(&[0u8; LENGTH_PREFIX_SIZE]);

    // -- Begin body (CRC32 covers from here through the last event) --
    buf.extend_from_slice(commit.commit_id.as_bytes());
    buf.extend_from_slice(commit.stream_id.as_bytes());
    buf.extend_from_slice(&commit.commit_sequence.to_le_bytes());
    buf.extend_from_slice(&commit.stream_revision.to_le_bytes());
    buf.extend_from_slice(&(commit.events.len() as u32).to_le_bytes());

    for event in &commit.events {
        let schema_bytes = event.schema.as_bytes();
        buf.extend_from_slice(event.event_id.as_bytes());
        buf.extend_from_slice(&event.sequence.to_le_bytes());
        buf.extend_from_slice(&event.created_at.to_le_bytes());
        buf.extend_from_slice(&(schema_bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(schema_bytes);
        buf.extend_from_slice(&(event.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&event.payload);
    }
    // -- End body --

    let crc = crc32fast::hash(&buf[LENGTH_PREFIX_SIZE..]);
    buf.extend_from_slice(&crc.to_le_bytes());

    // body length = everything after the length prefix, checksum included.
    let body_len = (buf.len() - LENGTH_PREFIX_SIZE) as u32;
    buf[0..LENGTH_PREFIX_SIZE].copy_from_slice(&body_len.to_le_bytes());

    buf
}

/// Decode a single commit frame from the start of a byte buffer.
///
/// Handles three cases:
///
/// 1. **Complete frame** -- returns [`DecodeOutcome::Complete`] with the
///    decoded commit and the total number of bytes consumed.
/// 2. **Incomplete data** -- the buffer is too short for a full frame
///    (fewer than 4 bytes for the length prefix, or fewer bytes than the
///    prefix indicates). Returns [`DecodeOutcome::Incomplete`].
/// 3. **Corrupt data** -- the checksum does not match or a field is
///    malformed. Returns [`Error::CorruptCommit`].
///
/// # Errors
///
/// Returns [`Error::CorruptCommit`] with `offset` 0 (the caller knows the
/// frame's position in the file) if the CRC32 does not match or field data
/// is malformed (e.g., invalid UTF-8 in the schema tag).
pub fn decode_commit(buf: &[u8]) -> Result<DecodeOutcome<Commit>, Error> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(DecodeOutcome::Incomplete);
    }

    let body_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let total = LENGTH_PREFIX_SIZE + body_len;
    if buf.len() < total {
        return Ok(DecodeOutcome::Incomplete);
    }

    let body = &buf[LENGTH_PREFIX_SIZE..total];
    if body.len() < 4 {
        return Err(corrupt("frame body too short for checksum"));
    }

    // The last 4 bytes of the body are the checksum; everything before is
    // the CRC32-protected region.
    let crc_offset = body.len() - 4;
    let stored_crc = u32::from_le_bytes([
        body[crc_offset],
        body[crc_offset + 1],
        body[crc_offset + 2],
        body[crc_offset + 3],
    ]);
    let computed_crc = crc32fast::hash(&body[..crc_offset]);
    if stored_crc != computed_crc {
        return Err(corrupt(&format!(
            "CRC32 mismatch: stored {stored_crc:#010X}, computed {computed_crc:#010X}"
        )));
    }

    let protected = &body[..crc_offset];
    let mut cursor = 0;

    // Read N bytes from `protected` at `cursor`, advance the cursor, or
    // return CorruptCommit if the remaining data is too short.
    macro_rules! read_bytes {
        ($n:expr) => {{
            if cursor + $n > protected.len() {
                return Err(corrupt("frame field extends past checksum boundary"));
            }
            let slice = &protected[cursor..cursor + $n];
            cursor += $n;
            slice
        }};
    }

    let commit_id = Uuid::from_slice(read_bytes!(16)).map_err(|e| corrupt(&e.to_string()))?;
    let stream_id = Uuid::from_slice(read_bytes!(16)).map_err(|e| corrupt(&e.to_string()))?;
    let commit_sequence = u64::from_le_bytes(
        read_bytes!(8)
            .try_into()
            .expect("slice is exactly 8 bytes"),
    );
    let stream_revision = u64::from_le_bytes(
        read_bytes!(8)
            .try_into()
            .expect("slice is exactly 8 bytes"),
    );
    let event_count = u32::from_le_bytes(
        read_bytes!(4)
            .try_into()
            .expect("slice is exactly 4 bytes"),
    );

    let mut events = Vec::with_capacity(event_count as usize);
    for _ in 0..event_count {
        let event_id = Uuid::from_slice(read_bytes!(16)).map_err(|e| corrupt(&e.to_string()))?;
        let sequence = u64::from_le_bytes(
            read_bytes!(8)
                .try_into()
                .expect("slice is exactly 8 bytes"),
        );
        let created_at = u64::from_le_bytes(
            read_bytes!(8)
                .try_into()
                .expect("slice is exactly 8 bytes"),
        );
        let schema_len = u16::from_le_bytes(
            read_bytes!(2)
                .try_into()
                .expect("slice is exactly 2 bytes"),
        ) as usize;
        let schema = std::str::from_utf8(read_bytes!(schema_len))
            .map_err(|_| corrupt("schema tag is not valid UTF-8"))?
            .to_string();
        let payload_len = u32::from_le_bytes(
            read_bytes!(4)
                .try_into()
                .expect("slice is exactly 4 bytes"),
        ) as usize;
        let payload = Bytes::copy_from_slice(read_bytes!(payload_len));

        events.push(CommittedEvent {
            event_id,
            stream_id,
            sequence,
            commit_id,
            created_at,
            schema,
            payload,
        });
    }

    if cursor != protected.len() {
        return Err(corrupt("trailing bytes after last event record"));
    }

    Ok(DecodeOutcome::Complete {
        value: Commit {
            commit_id,
            stream_id,
            commit_sequence,
            stream_revision,
            events,
        },
        consumed: total,
    })
}

/// Build a [`Error::CorruptCommit`] at offset 0; the store layer knows the
/// frame's byte offset and rewrites it.
fn corrupt(detail: &str) -> Error {
    Error::CorruptCommit {
        offset: 0,
        detail: detail.to_string(),
    }
}
