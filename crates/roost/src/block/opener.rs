//! Snapshot scanning and resolution-aware block opening.

use crate::block::Block;
use crate::chunk::{ChunkPool, DefaultChunkPool};
use crate::downsample::{AggrChunkPool, AggrType};
use crate::error::{BlockError, Result};
use crate::meta::{read_block_meta, Resolution, META_FILENAME};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// One block opened out of a snapshot directory, together with what its
/// metadata said about it.
///
/// Constructed once per directory entry and never mutated; the caller owns
/// the descriptor list and, through it, the opened blocks.
pub struct BlockDescriptor {
    /// The opened block.
    pub block: Block,
    /// Downsampling resolution from the block's metadata; `Raw` when the
    /// metadata was absent or unreadable.
    pub resolution: Resolution,
    /// Whether a `thanos` metadata section was actually present.
    pub has_thanos_meta: bool,
}

impl BlockDescriptor {
    /// Whether the block holds pre-aggregated samples.
    pub fn is_downsampled(&self) -> bool {
        self.resolution.millis() > 0
    }
}

/// Scans `snapshot_dir` and opens every block directory under it.
///
/// Subdirectories without a metadata file are skipped: they are not blocks.
/// A subdirectory whose metadata cannot be read or parsed is still opened,
/// best-effort, as a plain raw block through the default pool. Downsampled
/// blocks are opened through an [`AggrChunkPool`] configured for
/// `aggr_type`, so their aggregate chunks materialize as that aggregate.
///
/// Results come back in directory-iteration order; no sorting is applied
/// and none should be assumed across file systems.
///
/// # Errors
///
/// Metadata failures are absorbed (see above); a failing block open is not.
/// It aborts the whole scan with [`BlockError::BlockOpenFailed`] naming the
/// offending directory, because one unopenable block makes the entire query
/// surface unreliable.
pub fn open_blocks_with_info(snapshot_dir: &Path, aggr_type: AggrType) -> Result<Vec<BlockDescriptor>> {
    let default_pool: Arc<dyn ChunkPool> = Arc::new(DefaultChunkPool::new());
    let mut blocks = Vec::new();

    for entry in fs::read_dir(snapshot_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if !path.join(META_FILENAME).is_file() {
            debug!("skipping {}: no metadata file", path.display());
            continue;
        }

        let (resolution, has_thanos_meta) = match read_block_meta(&path) {
            Ok(meta) => (meta.resolution(), meta.thanos.is_some()),
            Err(err) => {
                warn!(
                    "unreadable metadata in {}: {}; opening as a raw block",
                    path.display(),
                    err
                );
                (Resolution::Raw, false)
            }
        };

        let pool: Arc<dyn ChunkPool> = if resolution.millis() > 0 {
            Arc::new(AggrChunkPool::new(Arc::clone(&default_pool), aggr_type))
        } else {
            Arc::clone(&default_pool)
        };

        let block = Block::open(&path, pool).map_err(|err| BlockError::BlockOpenFailed {
            path: path.clone(),
            source: Box::new(err),
        })?;
        debug!(
            "opened block {} ({} series, resolution {})",
            path.display(),
            block.num_series(),
            resolution
        );

        blocks.push(BlockDescriptor {
            block,
            resolution,
            has_thanos_meta,
        });
    }

    Ok(blocks)
}
