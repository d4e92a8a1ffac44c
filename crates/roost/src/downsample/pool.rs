//! Encoding-aware chunk pool router for downsampled blocks.

use crate::chunk::{ChunkPool, ChunkRef, Encoding};
use crate::downsample::{AggrChunkAdapter, AggrType};
use crate::error::Result;
use std::sync::Arc;

/// Chunk pool for blocks holding multi-aggregate chunks.
///
/// Dispatches on the encoding byte: the reserved aggregate marker becomes an
/// [`AggrChunkAdapter`] bound to the pool's configured aggregate type, and
/// every other byte is delegated to the wrapped native pool unchanged. One
/// router is constructed per opened downsampled block and shared, read-only,
/// across all chunk materializations for that block.
#[derive(Clone)]
pub struct AggrChunkPool {
    native: Arc<dyn ChunkPool>,
    aggr: AggrType,
}

impl AggrChunkPool {
    /// Creates a router around the engine's default pool, extracting `aggr`
    /// from every aggregate chunk.
    pub fn new(native: Arc<dyn ChunkPool>, aggr: AggrType) -> Self {
        Self { native, aggr }
    }

    /// Returns the aggregate type this pool's adapters extract.
    pub fn aggr_type(&self) -> AggrType {
        self.aggr
    }
}

impl ChunkPool for AggrChunkPool {
    /// Materializes a chunk. The aggregate marker never errors; other
    /// encodings carry the native pool's own result, errors included.
    fn get<'a>(&self, encoding: u8, data: &'a [u8]) -> Result<ChunkRef<'a>> {
        if encoding == Encoding::Aggr.as_u8() {
            return Ok(ChunkRef::Aggr(AggrChunkAdapter::new(data, self.aggr)));
        }
        self.native.get(encoding, data)
    }

    fn put(&self, chunk: ChunkRef<'_>) {
        match chunk {
            // Adapters are never returned to a freelist: their borrowed
            // bytes are only valid for the query that materialized them,
            // and reuse would alias stale data across queries.
            ChunkRef::Aggr(_) => {}
            other @ ChunkRef::Xor(_) => self.native.put(other),
        }
    }
}
