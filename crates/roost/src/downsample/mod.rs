//! Downsampled-block support.
//!
//! Downsampling compacts raw samples into per-window statistical aggregates
//! and stores all of them for one series in a single physical chunk. This
//! module holds the closed set of aggregate types, the multi-aggregate chunk
//! codec ([`AggrChunk`]), the adapter that lets such chunks travel behind
//! the native [`crate::chunk::Chunk`] surface, and the pool router that
//! dispatches on the encoding byte at query time.

mod chunk;
mod pool;

pub use chunk::{encode_aggr_chunk, AggrChunk, AggrChunkAdapter, AggrChunkIterator};
pub use pool::AggrChunkPool;

use crate::error::BlockError;
use std::fmt;
use std::str::FromStr;

/// Statistic carried by one sub-segment of an aggregate chunk.
///
/// The discriminant doubles as the segment's position in the on-disk
/// sequence: segment *t* of an aggregate chunk holds the aggregate with
/// index *t*, in [`AggrType::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AggrType {
    /// Number of raw samples in the window.
    Count = 0,
    /// Sum of the raw samples.
    Sum = 1,
    /// Minimum raw sample.
    Min = 2,
    /// Maximum raw sample.
    Max = 3,
    /// Last raw value of a monotonic counter, reset-adjusted.
    Counter = 4,
}

impl AggrType {
    /// All aggregate types in on-disk segment order.
    pub const ALL: [AggrType; 5] = [
        AggrType::Count,
        AggrType::Sum,
        AggrType::Min,
        AggrType::Max,
        AggrType::Counter,
    ];

    /// Returns the type's segment index.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Creates an AggrType from a segment index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the type's canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            AggrType::Count => "count",
            AggrType::Sum => "sum",
            AggrType::Min => "min",
            AggrType::Max => "max",
            AggrType::Counter => "counter",
        }
    }
}

impl fmt::Display for AggrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggrType {
    type Err = BlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(AggrType::Count),
            "sum" => Ok(AggrType::Sum),
            "min" => Ok(AggrType::Min),
            "max" => Ok(AggrType::Max),
            "counter" => Ok(AggrType::Counter),
            other => Err(BlockError::UnknownAggrType(other.to_string())),
        }
    }
}
