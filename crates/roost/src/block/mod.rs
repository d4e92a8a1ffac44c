//! Immutable block storage.
//!
//! A block is a self-contained directory holding one immutable time range:
//! a `meta.json` document (see [`crate::meta`]) and a chunks file with every
//! series' label set and chunk payloads.
//!
//! ## Chunks file structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Header (12 bytes)                                          │
//! │  - Magic: "RCHK" (4 bytes)                                  │
//! │  - Version: u16 (2 bytes) = 1                               │
//! │  - Series count: u32 (4 bytes)                              │
//! │  - Reserved: 2 bytes                                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Series records (repeated)                                  │
//! │  - label count: u16 + labels: (key_len: u16, key,           │
//! │    value_len: u16, value), ...                              │
//! │  - chunk count: u16 + chunks: (encoding: u8,                │
//! │    data_len: u32, data), ...                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Footer (8 bytes)                                           │
//! │  - CRC32 of header + records (4 bytes)                      │
//! │  - Reverse magic: "KHCR" (4 bytes)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Block::open`] reads the whole file into memory once; all chunk objects
//! handed out afterwards borrow ranges of that resident region, so a `Block`
//! must outlive every chunk and iterator derived from it.

mod opener;
mod writer;

pub use opener::{open_blocks_with_info, BlockDescriptor};
pub use writer::BlockWriter;

use crate::chunk::{ChunkPool, ChunkRef};
use crate::error::{BlockError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the chunks file inside a block directory.
pub const CHUNKS_FILENAME: &str = "chunks";

/// Magic bytes opening a chunks file: "RCHK".
pub const CHUNKS_MAGIC: [u8; 4] = *b"RCHK";

/// Reverse magic bytes closing a chunks file: "KHCR".
pub const CHUNKS_MAGIC_REVERSE: [u8; 4] = *b"KHCR";

/// Current chunks file format version.
pub const CHUNKS_VERSION: u16 = 1;

/// Label key naming a series' metric.
pub const NAME_LABEL: &str = "__name__";

const HEADER_SIZE: usize = 12;
const FOOTER_SIZE: usize = 8;

/// An opened, immutable block.
///
/// Holds the resident chunks-file bytes, a parsed series index over them,
/// and the chunk pool every chunk materialization for this block goes
/// through. Read-only after construction and safe to share across
/// concurrent queries.
pub struct Block {
    dir: PathBuf,
    data: Vec<u8>,
    series: Vec<SeriesRecord>,
    pool: Arc<dyn ChunkPool>,
}

struct SeriesRecord {
    labels: Vec<(String, String)>,
    chunks: Vec<ChunkInfo>,
}

struct ChunkInfo {
    encoding: u8,
    offset: usize,
    len: usize,
}

impl Block {
    /// Opens the block stored in `dir`, materializing chunks through `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockError::InvalidMagic`], [`BlockError::UnsupportedVersion`],
    /// [`BlockError::ChecksumMismatch`] or [`BlockError::Decode`] when the
    /// chunks file is damaged, and [`BlockError::Io`] when it cannot be read.
    pub fn open(dir: &Path, pool: Arc<dyn ChunkPool>) -> Result<Self> {
        let data = fs::read(dir.join(CHUNKS_FILENAME))?;
        let series = parse_index(&data)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            data,
            series,
            pool,
        })
    }

    /// Returns the block's directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the number of series in the block.
    pub fn num_series(&self) -> usize {
        self.series.len()
    }

    /// Returns the pool chunks of this block are materialized through.
    pub fn pool(&self) -> &Arc<dyn ChunkPool> {
        &self.pool
    }

    /// Iterates over the block's series in storage order.
    pub fn series(&self) -> impl Iterator<Item = SeriesRef<'_>> + '_ {
        self.series.iter().map(move |record| SeriesRef {
            block: self,
            record,
        })
    }
}

/// One series of an opened block.
#[derive(Clone, Copy)]
pub struct SeriesRef<'b> {
    block: &'b Block,
    record: &'b SeriesRecord,
}

impl<'b> SeriesRef<'b> {
    /// Returns the series' label pairs in storage order.
    pub fn labels(&self) -> &'b [(String, String)] {
        &self.record.labels
    }

    /// Returns the series' metric name, if the `__name__` label is present.
    pub fn name(&self) -> Option<&'b str> {
        self.record
            .labels
            .iter()
            .find(|(key, _)| key == NAME_LABEL)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the number of chunks stored for this series.
    pub fn num_chunks(&self) -> usize {
        self.record.chunks.len()
    }

    /// Materializes the series' chunks through the block's pool.
    ///
    /// The returned chunks borrow the block's resident byte region.
    pub fn chunks(&self) -> Result<Vec<ChunkRef<'b>>> {
        self.record
            .chunks
            .iter()
            .map(|info| {
                let data = &self.block.data[info.offset..info.offset + info.len];
                self.block.pool.get(info.encoding, data)
            })
            .collect()
    }
}

/// Sequential reader over an in-memory chunks file body.
struct Cursor<'d> {
    data: &'d [u8],
    pos: usize,
}

impl<'d> Cursor<'d> {
    fn take(&mut self, len: usize) -> Result<&'d [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                BlockError::Decode(format!("chunks file record at offset {} ends early", self.pos))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_string(&mut self, what: &str) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| BlockError::Decode(format!("invalid UTF-8 in {}: {}", what, err)))
    }
}

fn parse_index(data: &[u8]) -> Result<Vec<SeriesRecord>> {
    if data.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(BlockError::Decode(format!(
            "chunks file of {} bytes is shorter than its framing",
            data.len()
        )));
    }

    // Magic (4 bytes)
    let magic: [u8; 4] = data[0..4].try_into().unwrap();
    if magic != CHUNKS_MAGIC {
        return Err(BlockError::InvalidMagic(magic));
    }

    // Version (2 bytes)
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version > CHUNKS_VERSION {
        return Err(BlockError::UnsupportedVersion(version));
    }

    // Series count (4 bytes), reserved (2 bytes)
    let series_count = u32::from_le_bytes([data[6], data[7], data[8], data[9]]) as usize;
    // Each series record needs at least its two count fields.
    let body_len = data.len() - HEADER_SIZE - FOOTER_SIZE;
    if series_count > body_len / 4 {
        return Err(BlockError::Decode(format!(
            "declared series count {} cannot fit in {} body bytes",
            series_count, body_len
        )));
    }

    // Footer: CRC32 over everything before it, then reverse magic.
    let footer = &data[data.len() - FOOTER_SIZE..];
    let magic_reverse: [u8; 4] = footer[4..8].try_into().unwrap();
    if magic_reverse != CHUNKS_MAGIC_REVERSE {
        return Err(BlockError::InvalidMagic(magic_reverse));
    }
    let expected = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[..data.len() - FOOTER_SIZE]);
    let actual = hasher.finalize();
    if expected != actual {
        return Err(BlockError::ChecksumMismatch { expected, actual });
    }

    let mut cursor = Cursor {
        data: &data[..data.len() - FOOTER_SIZE],
        pos: HEADER_SIZE,
    };

    let mut series = Vec::with_capacity(series_count);
    for _ in 0..series_count {
        // Labels (count + entries)
        let label_count = cursor.read_u16()? as usize;
        let mut labels = Vec::with_capacity(label_count);
        for _ in 0..label_count {
            let key = cursor.read_string("label key")?;
            let value = cursor.read_string("label value")?;
            labels.push((key, value));
        }

        // Chunks (count + entries)
        let chunk_count = cursor.read_u16()? as usize;
        let mut chunks = Vec::with_capacity(chunk_count);
        for _ in 0..chunk_count {
            let encoding = cursor.read_u8()?;
            let len = cursor.read_u32()? as usize;
            let offset = cursor.pos;
            cursor.take(len)?;
            chunks.push(ChunkInfo {
                encoding,
                offset,
                len,
            });
        }

        series.push(SeriesRecord { labels, chunks });
    }

    if cursor.pos != cursor.data.len() {
        return Err(BlockError::Decode(format!(
            "{} trailing bytes after the last series record",
            cursor.data.len() - cursor.pos
        )));
    }

    Ok(series)
}
