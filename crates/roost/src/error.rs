//! Error and Result types for Roost block and chunk operations.

use crate::downsample::AggrType;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for Roost operations.
pub type Result<T> = std::result::Result<T, BlockError>;

/// The error type for block storage and chunk codec operations.
#[derive(Debug, Error)]
pub enum BlockError {
    /// The requested aggregate was legitimately not computed for this chunk.
    ///
    /// This is an expected condition, not a corruption: downsampling may omit
    /// any aggregate for a given series. Callers typically try another
    /// aggregate or skip the series. Retrying cannot change the outcome.
    #[error("aggregate {0} not present in chunk")]
    AbsentAggregate(AggrType),

    /// The aggregate chunk violates its segment-framing invariant.
    ///
    /// Raised on a truncated varint or a declared segment length exceeding
    /// the remaining bytes. Fatal for the offending chunk.
    #[error("corrupt aggregate framing at segment {segment}: {reason}")]
    CorruptFraming {
        /// Index of the segment being walked when framing broke.
        segment: usize,
        /// What exactly was wrong with the bytes.
        reason: String,
    },

    /// Attempted to append to a decode-only chunk.
    #[error("chunk is read-only: aggregate chunks cannot be appended to")]
    ReadOnly,

    /// Encoding byte does not name any chunk codec known to this crate.
    #[error("unknown chunk encoding {0:#04x}")]
    UnknownEncoding(u8),

    /// A chunk byte region is shorter than its own framing declares.
    #[error("truncated chunk: need {needed} bytes, have {have}")]
    TruncatedChunk {
        /// Bytes the chunk framing requires.
        needed: usize,
        /// Bytes actually present.
        have: usize,
    },

    /// Chunk data or a chunks file could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid magic bytes in a chunks file.
    #[error("invalid magic bytes: {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported chunks file format version.
    #[error("unsupported chunks file version: {0}")]
    UnsupportedVersion(u16),

    /// Chunks file checksum does not match the stored value.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// CRC32 recorded in the file footer.
        expected: u32,
        /// CRC32 computed over the file contents.
        actual: u32,
    },

    /// Block metadata document failed to parse.
    #[error("failed to parse block metadata: {0}")]
    MetaParse(#[from] serde_json::Error),

    /// A series carries no `__name__` label.
    #[error("no `__name__` label in series of block {}", block.display())]
    MissingNameLabel {
        /// Directory of the block the series came from.
        block: PathBuf,
    },

    /// Opening a block through the storage engine failed.
    ///
    /// Unlike unreadable metadata, this aborts an entire snapshot scan: an
    /// unopenable block makes the whole query surface unreliable.
    #[error("failed to open block {}: {}", path.display(), source)]
    BlockOpenFailed {
        /// Directory of the block that failed to open.
        path: PathBuf,
        /// The underlying open failure.
        source: Box<BlockError>,
    },

    /// A string does not name any aggregate type.
    #[error("unknown aggregate type {0:?}")]
    UnknownAggrType(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
