//! Block directory builder.

use crate::block::{CHUNKS_FILENAME, CHUNKS_MAGIC, CHUNKS_MAGIC_REVERSE, CHUNKS_VERSION};
use crate::chunk::{Chunk, Encoding, XorChunk};
use crate::error::{BlockError, Result};
use crate::meta::{write_block_meta, BlockMeta};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Builds a block directory: a chunks file plus an optional `meta.json`.
///
/// Series are buffered in memory and written out in one pass by
/// [`BlockWriter::finish`], so the CRC footer covers the final byte layout.
pub struct BlockWriter {
    dir: PathBuf,
    series: Vec<(Vec<(String, String)>, Vec<(u8, Vec<u8>)>)>,
}

impl BlockWriter {
    /// Creates a writer for the block directory `dir`, creating it if
    /// needed.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            series: Vec::new(),
        })
    }

    /// Adds one series with prebuilt chunk payloads.
    ///
    /// Each chunk is an (encoding byte, payload) pair; the payload bytes are
    /// stored verbatim, so aggregate chunk payloads are as welcome as native
    /// ones.
    pub fn add_series(&mut self, labels: Vec<(String, String)>, chunks: Vec<(u8, Vec<u8>)>) {
        self.series.push((labels, chunks));
    }

    /// Adds one series by compressing raw samples into a single native
    /// chunk.
    pub fn add_series_samples(&mut self, labels: Vec<(String, String)>, points: &[(i64, f64)]) {
        let chunk = XorChunk::compress(points);
        self.add_series(
            labels,
            vec![(Encoding::Xor.as_u8(), chunk.bytes().to_vec())],
        );
    }

    /// Writes the block's metadata document.
    pub fn write_meta(&self, meta: &BlockMeta) -> Result<()> {
        write_block_meta(&self.dir, meta)
    }

    /// Writes the chunks file and returns its path.
    pub fn finish(self) -> Result<PathBuf> {
        let mut buf = Vec::new();

        // Header: magic, version, series count, reserved.
        buf.extend_from_slice(&CHUNKS_MAGIC);
        buf.extend_from_slice(&CHUNKS_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.series.len() as u32).to_le_bytes());
        buf.extend_from_slice(&[0u8; 2]);

        for (labels, chunks) in &self.series {
            buf.extend_from_slice(&checked_u16(labels.len(), "label count")?.to_le_bytes());
            for (key, value) in labels {
                write_string(&mut buf, key, "label key")?;
                write_string(&mut buf, value, "label value")?;
            }

            buf.extend_from_slice(&checked_u16(chunks.len(), "chunk count")?.to_le_bytes());
            for (encoding, data) in chunks {
                buf.push(*encoding);
                let len = u32::try_from(data.len()).map_err(|_| {
                    BlockError::Decode(format!("chunk of {} bytes exceeds u32 framing", data.len()))
                })?;
                buf.extend_from_slice(&len.to_le_bytes());
                buf.extend_from_slice(data);
            }
        }

        // Footer: CRC32 over everything written so far, then reverse magic.
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf);
        buf.extend_from_slice(&hasher.finalize().to_le_bytes());
        buf.extend_from_slice(&CHUNKS_MAGIC_REVERSE);

        let path = self.dir.join(CHUNKS_FILENAME);
        let mut file = fs::File::create(&path)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        Ok(path)
    }
}

fn checked_u16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len)
        .map_err(|_| BlockError::Decode(format!("{} {} exceeds u16 framing", what, len)))
}

fn write_string(buf: &mut Vec<u8>, s: &str, what: &str) -> Result<()> {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&checked_u16(bytes.len(), what)?.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}
