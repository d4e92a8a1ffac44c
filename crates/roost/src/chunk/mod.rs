//! Chunk capability surface and the native chunk pool.
//!
//! A chunk is an immutable, self-describing byte region holding the samples
//! of one series for one time range. This module defines the traits every
//! chunk implementation satisfies ([`Chunk`], [`ChunkIterator`],
//! [`ChunkAppender`], [`ChunkPool`]), the closed [`Encoding`] registry, and
//! the [`DefaultChunkPool`] that materializes native chunks from raw bytes.
//!
//! Chunk objects never copy the byte region they decode; they borrow it.
//! The region's owner (typically a [`crate::block::Block`]) must outlive
//! every chunk and iterator built from it, which the `'a` lifetime threaded
//! through this module enforces at compile time.

use crate::error::{BlockError, Result};
use crate::downsample::AggrChunkAdapter;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod xor;

pub use xor::{XorAppender, XorChunk, XorIterator};

/// Chunk encoding byte values.
///
/// The aggregate marker is a reserved value distinct from every native
/// single-series encoding; it exists solely to trigger routing in
/// [`crate::downsample::AggrChunkPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Encoding {
    /// Native single-series chunk: Gorilla timestamps + XOR values.
    Xor = 0x01,
    /// Multi-aggregate chunk produced by downsampling.
    Aggr = 0xff,
}

impl Encoding {
    /// Returns the on-disk encoding byte.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Creates an Encoding from its on-disk byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Xor),
            0xff => Some(Self::Aggr),
            _ => None,
        }
    }
}

/// Kind of the sample an iterator is positioned at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// No sample: the iterator is exhausted, errored, or not yet started.
    None,
    /// A float sample, readable through [`ChunkIterator::at`].
    Float,
}

/// A pre-aggregated histogram sample.
///
/// No chunk encoding in this crate produces histograms; the accessors
/// returning this type exist so iterators remain drop-in compatible with
/// histogram-capable engines and can report a neutral "not a histogram"
/// result instead of erroring.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistogramSample {
    /// Sample timestamp in milliseconds.
    pub timestamp: i64,
    /// Total observation count.
    pub count: f64,
    /// Sum of all observations.
    pub sum: f64,
}

/// Cursor over the samples of one chunk.
///
/// A pure pull-based cursor: iteration performs no I/O of its own, all bytes
/// were resident before the iterator was built.
pub trait ChunkIterator {
    /// Advances to the next sample and reports its kind.
    fn next(&mut self) -> ValueKind;

    /// Advances to the first sample with timestamp >= `timestamp`.
    ///
    /// Returns [`ValueKind::None`] when no such sample exists.
    fn seek(&mut self, timestamp: i64) -> ValueKind;

    /// Returns the (timestamp, value) pair at the current position.
    fn at(&self) -> (i64, f64);

    /// Returns the timestamp at the current position.
    fn at_timestamp(&self) -> i64;

    /// Returns the error that stopped iteration, if any.
    fn err(&self) -> Option<&BlockError>;

    /// Returns the current sample as an integer histogram.
    ///
    /// Scalar encodings have none and report `None`.
    fn at_histogram(&self) -> Option<HistogramSample> {
        None
    }

    /// Returns the current sample as a float histogram.
    ///
    /// Scalar encodings have none and report `None`.
    fn at_float_histogram(&self) -> Option<HistogramSample> {
        None
    }
}

/// Sample writer for a mutable chunk.
pub trait ChunkAppender {
    /// Appends one sample to the chunk.
    fn append(&mut self, timestamp: i64, value: f64);
}

/// Capability surface every chunk exposes.
///
/// `'a` is the lifetime of the borrowed byte region; see the module docs for
/// the aliasing contract.
pub trait Chunk<'a> {
    /// Returns the chunk's raw byte region (excluding the encoding byte,
    /// which is carried by the surrounding chunk-list format).
    fn bytes(&self) -> &[u8];

    /// Returns the chunk's encoding.
    fn encoding(&self) -> Encoding;

    /// Returns the number of samples in the chunk.
    ///
    /// Advisory: implementations return 0 rather than failing when the
    /// region cannot be decoded.
    fn num_samples(&self) -> usize;

    /// Returns a cursor over the chunk's samples.
    fn iterator(&self) -> Box<dyn ChunkIterator + '_>;

    /// Returns an appender for adding samples.
    ///
    /// Decode-only encodings fail with [`BlockError::ReadOnly`].
    fn appender(&mut self) -> Result<Box<dyn ChunkAppender + '_>>;

    /// Compacts the chunk's in-memory representation, if anything to do.
    fn compact(&mut self);

    /// Replaces the borrowed byte region in place, enabling object reuse.
    ///
    /// Precondition: no other reader may hold a reference into the old
    /// region; callers must serialize `reset` against concurrent readers of
    /// the same chunk object.
    fn reset(&mut self, data: &'a [u8]);
}

/// A materialized chunk, tagged by codec.
///
/// The tagged variant keeps pool dispatch exhaustive: every site matching on
/// a `ChunkRef` is forced to handle both codecs.
#[derive(Debug, Clone)]
pub enum ChunkRef<'a> {
    /// Native single-series chunk.
    Xor(XorChunk<'a>),
    /// Aggregate chunk bound to one aggregate type.
    Aggr(AggrChunkAdapter<'a>),
}

impl<'a> Chunk<'a> for ChunkRef<'a> {
    fn bytes(&self) -> &[u8] {
        match self {
            ChunkRef::Xor(c) => c.bytes(),
            ChunkRef::Aggr(c) => c.bytes(),
        }
    }

    fn encoding(&self) -> Encoding {
        match self {
            ChunkRef::Xor(c) => c.encoding(),
            ChunkRef::Aggr(c) => c.encoding(),
        }
    }

    fn num_samples(&self) -> usize {
        match self {
            ChunkRef::Xor(c) => c.num_samples(),
            ChunkRef::Aggr(c) => c.num_samples(),
        }
    }

    fn iterator(&self) -> Box<dyn ChunkIterator + '_> {
        match self {
            ChunkRef::Xor(c) => c.iterator(),
            ChunkRef::Aggr(c) => c.iterator(),
        }
    }

    fn appender(&mut self) -> Result<Box<dyn ChunkAppender + '_>> {
        match self {
            ChunkRef::Xor(c) => c.appender(),
            ChunkRef::Aggr(c) => c.appender(),
        }
    }

    fn compact(&mut self) {
        match self {
            ChunkRef::Xor(c) => c.compact(),
            ChunkRef::Aggr(c) => c.compact(),
        }
    }

    fn reset(&mut self, data: &'a [u8]) {
        match self {
            ChunkRef::Xor(c) => c.reset(data),
            ChunkRef::Aggr(c) => c.reset(data),
        }
    }
}

/// Factory that turns an encoding byte plus raw bytes into a chunk object,
/// and optionally recycles chunk objects.
///
/// Object-safe so a block can hold `Arc<dyn ChunkPool>` and be opened with
/// either the default pool or an aggregate-aware router.
pub trait ChunkPool: Send + Sync {
    /// Materializes a chunk from an encoding byte and a borrowed byte region.
    fn get<'a>(&self, encoding: u8, data: &'a [u8]) -> Result<ChunkRef<'a>>;

    /// Returns a chunk object to the pool once the caller is done with it.
    fn put(&self, chunk: ChunkRef<'_>);
}

/// The native chunk pool.
///
/// Materializes native chunks and rejects every byte it does not recognize,
/// including the aggregate marker (routing aggregate chunks is the job of
/// [`crate::downsample::AggrChunkPool`]). Chunk objects borrow per-query
/// byte regions, so there is no freelist to recycle through; the pool keeps
/// monotonic get/put counters instead so reuse accounting stays observable.
#[derive(Debug, Default)]
pub struct DefaultChunkPool {
    gets: AtomicU64,
    puts: AtomicU64,
}

impl DefaultChunkPool {
    /// Creates a new pool with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks successfully materialized by this pool.
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Number of chunks returned to this pool.
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }
}

impl ChunkPool for DefaultChunkPool {
    fn get<'a>(&self, encoding: u8, data: &'a [u8]) -> Result<ChunkRef<'a>> {
        match Encoding::from_u8(encoding) {
            Some(Encoding::Xor) => {
                let chunk = XorChunk::from_bytes(data)?;
                self.gets.fetch_add(1, Ordering::Relaxed);
                Ok(ChunkRef::Xor(chunk))
            }
            _ => Err(BlockError::UnknownEncoding(encoding)),
        }
    }

    fn put(&self, chunk: ChunkRef<'_>) {
        match chunk {
            ChunkRef::Xor(_) => {
                self.puts.fetch_add(1, Ordering::Relaxed);
            }
            // Not one of ours; aggregate adapters are never recycled.
            ChunkRef::Aggr(_) => {}
        }
    }
}
