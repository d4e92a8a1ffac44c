//! The multi-aggregate chunk codec.
//!
//! ## Wire format
//!
//! ```text
//! repeat for AggrType index 0..=4:
//!   varint  segment_length          0 => aggregate absent, no payload
//!   if segment_length > 0:
//!     byte    native sub-encoding
//!     bytes[segment_length]  native chunk body
//! ```
//!
//! Segments carry no offsets: segment *t* is only reachable by walking
//! segments `0..t` in order, so reads are strictly sequential. A zero
//! declared length is a legitimate absence (that aggregate was not computed
//! for this chunk), not an error.

use crate::chunk::{Chunk, ChunkAppender, ChunkIterator, Encoding, ValueKind, XorChunk, XorIterator};
use crate::downsample::AggrType;
use crate::error::{BlockError, Result};
use crate::varint::{read_uvarint, write_uvarint};

/// An immutable view over one series' multi-aggregate chunk payload.
///
/// The view borrows the byte region; the region's owner must outlive every
/// sub-chunk and iterator extracted from it.
#[derive(Debug, Clone, Copy)]
pub struct AggrChunk<'a> {
    data: &'a [u8],
}

impl<'a> AggrChunk<'a> {
    /// Creates a view over an aggregate chunk payload.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Returns the underlying byte region.
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Extracts the sub-chunk holding `target`, decoded through the native
    /// codec.
    ///
    /// # Errors
    ///
    /// - [`BlockError::AbsentAggregate`] when the chunk legitimately does
    ///   not carry `target`.
    /// - [`BlockError::CorruptFraming`] when the segment framing is violated
    ///   (truncated varint, or a declared length exceeding the remaining
    ///   bytes).
    /// - [`BlockError::UnknownEncoding`] when the sub-chunk's encoding byte
    ///   names no native codec.
    pub fn get(&self, target: AggrType) -> Result<XorChunk<'a>> {
        let (encoding, body) = self.segment(target)?;
        match Encoding::from_u8(encoding) {
            Some(Encoding::Xor) => XorChunk::from_bytes(body),
            _ => Err(BlockError::UnknownEncoding(encoding)),
        }
    }

    /// Walks the segment sequence up to `target` and returns its raw
    /// (sub-encoding byte, body) pair. Never reads past `target`'s segment.
    fn segment(&self, target: AggrType) -> Result<(u8, &'a [u8])> {
        let mut buf = self.data;
        for index in 0..=target.index() {
            let (len, varint_len) = read_uvarint(buf).ok_or_else(|| BlockError::CorruptFraming {
                segment: index,
                reason: "truncated segment length varint".to_string(),
            })?;
            buf = &buf[varint_len..];

            if len == 0 {
                // Legitimate absence; nothing to consume.
                if index == target.index() {
                    return Err(BlockError::AbsentAggregate(target));
                }
                continue;
            }

            // Payload is the sub-encoding byte plus `len` body bytes.
            if len >= buf.len() as u64 {
                return Err(BlockError::CorruptFraming {
                    segment: index,
                    reason: format!(
                        "declared segment length {} exceeds {} remaining bytes",
                        len,
                        buf.len()
                    ),
                });
            }
            let len = len as usize;
            if index == target.index() {
                return Ok((buf[0], &buf[1..=len]));
            }
            buf = &buf[len + 1..];
        }
        Err(BlockError::AbsentAggregate(target))
    }
}

/// Encodes up to five native sub-chunks into one aggregate chunk payload,
/// slot *i* holding [`AggrType::ALL`]`[i]`. `None` slots are written as
/// zero-length (absent) segments.
pub fn encode_aggr_chunk(sub_chunks: [Option<&XorChunk<'_>>; 5]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in sub_chunks {
        match chunk {
            None => write_uvarint(0, &mut out),
            Some(c) => {
                let body = c.bytes();
                write_uvarint(body.len() as u64, &mut out);
                out.push(c.encoding().as_u8());
                out.extend_from_slice(body);
            }
        }
    }
    out
}

/// Presents an aggregate chunk as a native chunk for one configured
/// aggregate type.
///
/// The adapter satisfies the full [`Chunk`] surface so callers stay agnostic
/// of the multi-aggregate format; decoding happens lazily, per call. The
/// format is decode-only: [`Chunk::appender`] always fails with
/// [`BlockError::ReadOnly`].
#[derive(Debug, Clone, Copy)]
pub struct AggrChunkAdapter<'a> {
    data: &'a [u8],
    aggr: AggrType,
}

impl<'a> AggrChunkAdapter<'a> {
    /// Creates an adapter over `data` bound to `aggr`.
    pub fn new(data: &'a [u8], aggr: AggrType) -> Self {
        Self { data, aggr }
    }

    /// Returns the aggregate type this adapter extracts.
    pub fn aggr_type(&self) -> AggrType {
        self.aggr
    }
}

impl<'a> Chunk<'a> for AggrChunkAdapter<'a> {
    fn bytes(&self) -> &[u8] {
        self.data
    }

    fn encoding(&self) -> Encoding {
        Encoding::Aggr
    }

    /// Sample count of the configured aggregate's sub-chunk.
    ///
    /// Advisory: an absent aggregate (or any decode failure) counts as 0.
    fn num_samples(&self) -> usize {
        match AggrChunk::new(self.data).get(self.aggr) {
            Ok(sub) => sub.num_samples(),
            Err(_) => 0,
        }
    }

    fn iterator(&self) -> Box<dyn ChunkIterator + '_> {
        Box::new(AggrChunkIterator::new(self.data, self.aggr))
    }

    fn appender(&mut self) -> Result<Box<dyn ChunkAppender + '_>> {
        Err(BlockError::ReadOnly)
    }

    fn compact(&mut self) {}

    fn reset(&mut self, data: &'a [u8]) {
        self.data = data;
    }
}

enum IterState<'a> {
    /// Decoding failed at construction; the error is reported through
    /// [`ChunkIterator::err`] and every cursor method short-circuits.
    Errored(BlockError),
    /// Decoding succeeded; cursor methods delegate to the native iterator
    /// over the resolved sub-chunk.
    Live(XorIterator<'a>),
}

/// Cursor over one aggregate of an aggregate chunk.
///
/// The state is fixed at construction: either a live native iterator over
/// the extracted sub-chunk, or the decode error. No I/O happens during
/// iteration; the bytes were resident before the cursor was built.
pub struct AggrChunkIterator<'a> {
    state: IterState<'a>,
}

impl<'a> AggrChunkIterator<'a> {
    /// Builds a cursor over `target` within the aggregate chunk `data`.
    pub fn new(data: &'a [u8], target: AggrType) -> Self {
        let state = match AggrChunk::new(data).segment(target) {
            Ok((encoding, body)) => match Encoding::from_u8(encoding) {
                Some(Encoding::Xor) => match XorIterator::new(body) {
                    Ok(it) => IterState::Live(it),
                    Err(err) => IterState::Errored(err),
                },
                _ => IterState::Errored(BlockError::UnknownEncoding(encoding)),
            },
            Err(err) => IterState::Errored(err),
        };
        Self { state }
    }
}

impl ChunkIterator for AggrChunkIterator<'_> {
    fn next(&mut self) -> ValueKind {
        match &mut self.state {
            IterState::Errored(_) => ValueKind::None,
            IterState::Live(it) => it.next(),
        }
    }

    fn seek(&mut self, timestamp: i64) -> ValueKind {
        match &mut self.state {
            IterState::Errored(_) => ValueKind::None,
            IterState::Live(it) => it.seek(timestamp),
        }
    }

    fn at(&self) -> (i64, f64) {
        match &self.state {
            IterState::Errored(_) => (0, 0.0),
            IterState::Live(it) => it.at(),
        }
    }

    fn at_timestamp(&self) -> i64 {
        match &self.state {
            IterState::Errored(_) => 0,
            IterState::Live(it) => it.at_timestamp(),
        }
    }

    fn err(&self) -> Option<&BlockError> {
        match &self.state {
            IterState::Errored(err) => Some(err),
            IterState::Live(it) => it.err(),
        }
    }
}
