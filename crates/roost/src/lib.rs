//! Roost - Corvus Time Series Block Toolkit
//!
//! This crate reads immutable time-series storage blocks, including
//! downsampled blocks whose chunks multiplex several statistical aggregates
//! of one series, and migrates their contents into an import sink.
//!
//! # Components
//!
//! - [`XorChunk`]: native single-series chunk codec (Gorilla timestamps,
//!   XOR values)
//! - [`AggrChunk`] / [`AggrChunkAdapter`]: multi-aggregate chunk codec and
//!   its adapter onto the native [`Chunk`] surface
//! - [`AggrChunkPool`]: encoding-byte router between the aggregate codec
//!   and the default pool
//! - [`Block`] / [`open_blocks_with_info`]: block reading and
//!   resolution-aware snapshot scanning
//! - [`Processor`]: snapshot migration into an [`ImportSink`]
//!
//! # Example
//!
//! ```rust,ignore
//! use roost::{AggrType, Processor, JsonLinesSink};
//!
//! // Migrate a snapshot, expanding downsampled blocks into
//! // `name:5m:sum`-style series.
//! let mut sink = JsonLinesSink::new(std::io::stdout().lock());
//! let processor = Processor::new(vec![AggrType::Sum, AggrType::Count]);
//! let stats = processor.run("/data/snapshot".as_ref(), &mut sink)?;
//! println!("{stats}");
//! ```
//!
//! # Ownership
//!
//! Chunk objects and iterators borrow the byte region owned by their
//! [`Block`]; the borrow checker enforces that a block outlives everything
//! decoded out of it. Nothing in the decode path copies chunk bytes.

#![deny(missing_docs)]

pub mod block;
pub mod chunk;
pub mod downsample;
pub mod error;
pub mod meta;
pub mod migrate;
pub mod varint;

pub use block::{open_blocks_with_info, Block, BlockDescriptor, BlockWriter, SeriesRef};
pub use chunk::{
    Chunk, ChunkAppender, ChunkIterator, ChunkPool, ChunkRef, DefaultChunkPool, Encoding,
    HistogramSample, ValueKind, XorChunk, XorIterator,
};
pub use downsample::{
    encode_aggr_chunk, AggrChunk, AggrChunkAdapter, AggrChunkIterator, AggrChunkPool, AggrType,
};
pub use error::{BlockError, Result};
pub use meta::{read_block_meta, BlockMeta, Resolution};
pub use migrate::{
    ImportSink, ImportStats, JsonLinesSink, LabelPair, Processor, TimeSeries, VecSink,
};
