//! Block metadata document and downsampling resolution.
//!
//! Every block directory carries a `meta.json` describing the block's time
//! range and, for blocks produced by a downsampling compactor, a `thanos`
//! section with external labels and the downsampling resolution. Only the
//! resolution and the presence of that section drive behavior in this crate;
//! the remaining fields are passed through for callers that want them.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Name of the metadata document inside a block directory.
pub const META_FILENAME: &str = "meta.json";

/// Five minutes in milliseconds.
pub const RESOLUTION_5M_MS: i64 = 300_000;

/// One hour in milliseconds.
pub const RESOLUTION_1H_MS: i64 = 3_600_000;

/// Time granularity at which a block's samples were pre-aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Raw samples, no downsampling.
    Raw,
    /// Five-minute windows.
    FiveMinute,
    /// One-hour windows.
    OneHour,
    /// A resolution this crate does not recognize, kept verbatim for
    /// forward compatibility.
    Other(i64),
}

impl Resolution {
    /// Maps a resolution in milliseconds onto the closed enumeration.
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            0 => Resolution::Raw,
            RESOLUTION_5M_MS => Resolution::FiveMinute,
            RESOLUTION_1H_MS => Resolution::OneHour,
            other => Resolution::Other(other),
        }
    }

    /// Returns the resolution in milliseconds.
    pub fn millis(self) -> i64 {
        match self {
            Resolution::Raw => 0,
            Resolution::FiveMinute => RESOLUTION_5M_MS,
            Resolution::OneHour => RESOLUTION_1H_MS,
            Resolution::Other(millis) => millis,
        }
    }

    /// Returns the metric-name suffix for this resolution.
    ///
    /// Unrecognized resolutions get no suffix rather than a made-up one.
    pub fn suffix(self) -> &'static str {
        match self {
            Resolution::Raw => "",
            Resolution::FiveMinute => ":5m",
            Resolution::OneHour => ":1h",
            Resolution::Other(_) => "",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Raw => f.write_str("raw"),
            Resolution::FiveMinute => f.write_str("5m"),
            Resolution::OneHour => f.write_str("1h"),
            Resolution::Other(millis) => write!(f, "{}ms", millis),
        }
    }
}

/// The `meta.json` document of one block directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockMeta {
    /// Block identifier assigned by its producer.
    #[serde(default)]
    pub ulid: String,
    /// Inclusive lower bound of the block's time range, in milliseconds.
    #[serde(default, rename = "minTime")]
    pub min_time: i64,
    /// Exclusive upper bound of the block's time range, in milliseconds.
    #[serde(default, rename = "maxTime")]
    pub max_time: i64,
    /// Metadata document version.
    #[serde(default)]
    pub version: i64,
    /// Downsampling provenance; absent on plain blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thanos: Option<ThanosMeta>,
}

impl BlockMeta {
    /// Returns the block's downsampling resolution.
    ///
    /// Blocks without a `thanos` section are raw by definition.
    pub fn resolution(&self) -> Resolution {
        match &self.thanos {
            Some(thanos) => Resolution::from_millis(thanos.downsample.resolution),
            None => Resolution::Raw,
        }
    }

    /// Whether the block holds pre-aggregated (downsampled) samples.
    pub fn is_downsampled(&self) -> bool {
        self.resolution().millis() > 0
    }

    /// Returns the metric-name suffix for the block's resolution.
    pub fn resolution_suffix(&self) -> &'static str {
        self.resolution().suffix()
    }
}

/// The `thanos` section of a block's metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThanosMeta {
    /// External labels attached to the block.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Downsampling parameters.
    #[serde(default)]
    pub downsample: DownsampleMeta,
    /// Component that produced the block.
    #[serde(default)]
    pub source: String,
    /// Chunk segment file names, passthrough.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segment_files: Vec<String>,
    /// Constituent file descriptors, passthrough.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileMeta>,
}

/// One constituent file of a block, as recorded by its producer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileMeta {
    /// Path relative to the block directory.
    #[serde(default)]
    pub rel_path: String,
    /// File size in bytes.
    #[serde(default)]
    pub size_bytes: i64,
}

/// Downsampling parameters of a block.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DownsampleMeta {
    /// Downsampling resolution in milliseconds; 0 means raw.
    #[serde(default)]
    pub resolution: i64,
}

/// Reads and parses the metadata document of `block_dir`.
///
/// # Errors
///
/// [`crate::BlockError::Io`] when the file cannot be read,
/// [`crate::BlockError::MetaParse`] when it does not decode.
pub fn read_block_meta(block_dir: &Path) -> Result<BlockMeta> {
    let file = File::open(block_dir.join(META_FILENAME))?;
    let meta = serde_json::from_reader(BufReader::new(file))?;
    Ok(meta)
}

/// Writes `meta` as the metadata document of `block_dir`.
pub fn write_block_meta(block_dir: &Path, meta: &BlockMeta) -> Result<()> {
    let file = File::create(block_dir.join(META_FILENAME))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, meta)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_mapping() {
        assert_eq!(Resolution::from_millis(0), Resolution::Raw);
        assert_eq!(Resolution::from_millis(300_000), Resolution::FiveMinute);
        assert_eq!(Resolution::from_millis(3_600_000), Resolution::OneHour);
        assert_eq!(Resolution::from_millis(60_000), Resolution::Other(60_000));
    }

    #[test]
    fn test_resolution_display_and_suffix() {
        assert_eq!(Resolution::Raw.to_string(), "raw");
        assert_eq!(Resolution::FiveMinute.to_string(), "5m");
        assert_eq!(Resolution::OneHour.to_string(), "1h");

        assert_eq!(Resolution::Raw.suffix(), "");
        assert_eq!(Resolution::FiveMinute.suffix(), ":5m");
        assert_eq!(Resolution::OneHour.suffix(), ":1h");
        assert_eq!(Resolution::Other(60_000).suffix(), "");
    }

    #[test]
    fn test_resolution_millis_roundtrip() {
        for millis in [0, 300_000, 3_600_000, 60_000] {
            assert_eq!(Resolution::from_millis(millis).millis(), millis);
        }
    }

    #[test]
    fn test_meta_without_thanos_section_is_raw() {
        let meta: BlockMeta =
            serde_json::from_str(r#"{"ulid": "01ABC", "minTime": 0, "maxTime": 7200000}"#).unwrap();
        assert_eq!(meta.resolution(), Resolution::Raw);
        assert!(!meta.is_downsampled());
        assert_eq!(meta.resolution_suffix(), "");
    }

    #[test]
    fn test_meta_with_downsample_section() {
        let doc = r#"{
            "ulid": "01DEF",
            "version": 1,
            "thanos": {
                "labels": {"cluster": "eu1"},
                "downsample": {"resolution": 300000},
                "source": "compactor",
                "files": [{"rel_path": "chunks", "size_bytes": 1234}]
            }
        }"#;
        let meta: BlockMeta = serde_json::from_str(doc).unwrap();
        assert!(meta.is_downsampled());
        assert_eq!(meta.resolution(), Resolution::FiveMinute);
        assert_eq!(meta.resolution_suffix(), ":5m");

        let thanos = meta.thanos.as_ref().unwrap();
        assert_eq!(thanos.labels.get("cluster").map(String::as_str), Some("eu1"));
        assert_eq!(thanos.source, "compactor");
        assert_eq!(thanos.files[0].rel_path, "chunks");
        assert_eq!(thanos.files[0].size_bytes, 1234);
    }
}
