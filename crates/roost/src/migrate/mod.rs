//! Snapshot migration.
//!
//! The [`Processor`] walks a snapshot directory of blocks and feeds every
//! series into an [`ImportSink`]. Raw blocks are migrated as-is; downsampled
//! blocks are migrated once per requested aggregate type, with the metric
//! name suffixed by resolution and aggregate (`cpu_usage:5m:sum`) so the
//! pre-aggregated series stay distinguishable at the destination.
//!
//! Processing is sequential by design: decoding is CPU-only over resident
//! bytes, and callers that want parallelism can shard the snapshot's blocks
//! themselves.

mod sink;

pub use sink::{ImportSink, JsonLinesSink, LabelPair, TimeSeries, VecSink};

use crate::block::{open_blocks_with_info, BlockDescriptor, NAME_LABEL};
use crate::chunk::{Chunk, ChunkPool, ValueKind};
use crate::downsample::AggrType;
use crate::error::{BlockError, Result};
use crate::meta::Resolution;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Counters accumulated over one migration run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    /// Blocks processed (a downsampled block counts once per aggregate).
    pub blocks: u64,
    /// Series fed to the sink.
    pub series: u64,
    /// Samples fed to the sink.
    pub samples: u64,
}

impl fmt::Display for ImportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} blocks, {} series, {} samples",
            self.blocks, self.series, self.samples
        )
    }
}

/// Builds the destination metric name for one series.
///
/// Raw data keeps its name; downsampled data gets the resolution suffix and
/// the aggregate name, e.g. `cpu_usage` -> `cpu_usage:5m:sum`.
pub fn metric_name_with_suffix(name: &str, resolution: Resolution, aggr: Option<AggrType>) -> String {
    match aggr {
        Some(aggr) if resolution.millis() > 0 => {
            format!("{}{}:{}", name, resolution.suffix(), aggr)
        }
        _ => name.to_string(),
    }
}

/// Migrates the blocks of a snapshot directory into an import sink.
#[derive(Debug, Clone, Default)]
pub struct Processor {
    aggr_types: Vec<AggrType>,
}

impl Processor {
    /// Creates a processor migrating downsampled blocks for `aggr_types`.
    ///
    /// With an empty list only raw blocks are migrated and downsampled
    /// blocks are skipped (with a warning).
    pub fn new(aggr_types: Vec<AggrType>) -> Self {
        Self { aggr_types }
    }

    /// Runs the migration over `snapshot_dir`, feeding `sink`.
    ///
    /// Raw blocks are processed first, then the downsampled blocks once per
    /// configured aggregate type; each aggregate pass re-opens the blocks
    /// with a chunk pool routing aggregate chunks to that type.
    pub fn run(&self, snapshot_dir: &Path, sink: &mut dyn ImportSink) -> Result<ImportStats> {
        let mut stats = ImportStats::default();

        // The block list is identical for every aggregate type; probe with
        // the first one (or any, for a raw-only run).
        let probe = self.aggr_types.first().copied().unwrap_or(AggrType::Count);
        let blocks = open_blocks_with_info(snapshot_dir, probe)?;
        let downsampled = blocks.iter().filter(|b| b.is_downsampled()).count();
        info!(
            "found {} blocks to import ({} raw, {} downsampled)",
            blocks.len(),
            blocks.len() - downsampled,
            downsampled
        );

        for desc in blocks.iter().filter(|b| !b.is_downsampled()) {
            self.process_block(desc, None, sink, &mut stats)?;
        }

        if downsampled > 0 {
            if self.aggr_types.is_empty() {
                warn!(
                    "skipping {} downsampled blocks: no aggregate types configured",
                    downsampled
                );
            }
            for &aggr in &self.aggr_types {
                info!("processing downsampled blocks for aggregate {}", aggr);
                let blocks = open_blocks_with_info(snapshot_dir, aggr)?;
                for desc in blocks.iter().filter(|b| b.is_downsampled()) {
                    self.process_block(desc, Some(aggr), sink, &mut stats)?;
                }
            }
        }

        sink.flush()?;
        info!("import finished: {}", stats);
        Ok(stats)
    }

    fn process_block(
        &self,
        desc: &BlockDescriptor,
        aggr: Option<AggrType>,
        sink: &mut dyn ImportSink,
        stats: &mut ImportStats,
    ) -> Result<()> {
        let block = &desc.block;
        for series in block.series() {
            let name = series.name().ok_or_else(|| BlockError::MissingNameLabel {
                block: block.dir().to_path_buf(),
            })?;
            let name = metric_name_with_suffix(name, desc.resolution, aggr);

            let chunks = series.chunks().map_err(|err| {
                BlockError::Decode(format!(
                    "failed to materialize chunks of series {:?} in block {}: {}",
                    name,
                    block.dir().display(),
                    err
                ))
            })?;

            let mut timestamps = Vec::new();
            let mut values = Vec::new();
            for chunk in chunks {
                {
                    let mut it = chunk.iterator();
                    loop {
                        match it.next() {
                            ValueKind::Float => {
                                let (ts, val) = it.at();
                                timestamps.push(ts);
                                values.push(val);
                            }
                            ValueKind::None => break,
                        }
                    }
                    match it.err() {
                        // An aggregate the downsampler never computed for
                        // this series; try the next chunk.
                        Some(BlockError::AbsentAggregate(_)) => {}
                        Some(err) => {
                            return Err(BlockError::Decode(format!(
                                "failed to read series {:?} in block {}: {}",
                                name,
                                block.dir().display(),
                                err
                            )));
                        }
                        None => {}
                    }
                }
                block.pool().put(chunk);
            }

            if timestamps.is_empty() {
                continue;
            }

            let labels = series
                .labels()
                .iter()
                .filter(|(key, _)| key != NAME_LABEL)
                .map(|(key, value)| LabelPair {
                    name: key.clone(),
                    value: value.clone(),
                })
                .collect();

            stats.series += 1;
            stats.samples += timestamps.len() as u64;
            sink.input(TimeSeries {
                name,
                labels,
                timestamps,
                values,
            })?;
        }

        stats.blocks += 1;
        Ok(())
    }
}
