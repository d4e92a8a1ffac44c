//! Integration tests for the chunks file format.

use roost::block::CHUNKS_FILENAME;
use roost::{
    Block, BlockError, BlockWriter, Chunk, ChunkIterator, ChunkPool, DefaultChunkPool, Encoding,
    ValueKind, XorChunk,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn labels(name: &str, host: &str) -> Vec<(String, String)> {
    vec![
        ("__name__".to_string(), name.to_string()),
        ("host".to_string(), host.to_string()),
    ]
}

fn generate_points(start_ts: i64, interval: i64, count: usize, base: f64) -> Vec<(i64, f64)> {
    (0..count)
        .map(|i| {
            let ts = start_ts + i as i64 * interval;
            let value = base + i as f64 * 0.1 + (i as f64 * 0.1).sin() * 5.0;
            (ts, value)
        })
        .collect()
}

fn default_pool() -> Arc<dyn ChunkPool> {
    Arc::new(DefaultChunkPool::new())
}

#[test]
fn test_write_read_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("block-a");

    let points_a = generate_points(1_600_000_000_000, 15_000, 240, 50.0);
    let points_b = generate_points(1_600_000_000_000, 15_000, 240, -10.0);

    let mut writer = BlockWriter::create(&dir).unwrap();
    writer.add_series_samples(labels("cpu_usage", "server1"), &points_a);
    writer.add_series_samples(labels("cpu_usage", "server2"), &points_b);
    writer.finish().unwrap();

    let block = Block::open(&dir, default_pool()).unwrap();
    assert_eq!(block.num_series(), 2);
    assert_eq!(block.dir(), dir.as_path());

    let all: Vec<_> = block.series().collect();
    assert_eq!(all[0].name(), Some("cpu_usage"));
    assert_eq!(all[0].labels().len(), 2);
    assert_eq!(all[0].num_chunks(), 1);

    for (series, expected) in all.iter().zip([&points_a, &points_b]) {
        let chunks = series.chunks().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].encoding(), Encoding::Xor);

        let mut got = Vec::new();
        let mut it = chunks[0].iterator();
        while it.next() == ValueKind::Float {
            got.push(it.at());
        }
        assert!(it.err().is_none());
        assert_eq!(&got, expected);
    }
}

#[test]
fn test_multiple_chunks_per_series() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("block-b");

    let first = XorChunk::compress(&[(1000, 1.0), (2000, 2.0)]);
    let second = XorChunk::compress(&[(3000, 3.0), (4000, 4.0)]);

    let mut writer = BlockWriter::create(&dir).unwrap();
    writer.add_series(
        labels("requests_total", "server1"),
        vec![
            (Encoding::Xor.as_u8(), first.bytes().to_vec()),
            (Encoding::Xor.as_u8(), second.bytes().to_vec()),
        ],
    );
    writer.finish().unwrap();

    let block = Block::open(&dir, default_pool()).unwrap();
    let series = block.series().next().unwrap();
    assert_eq!(series.num_chunks(), 2);

    let mut all = Vec::new();
    for chunk in series.chunks().unwrap() {
        let mut it = chunk.iterator();
        while it.next() == ValueKind::Float {
            all.push(it.at());
        }
    }
    assert_eq!(all, vec![(1000, 1.0), (2000, 2.0), (3000, 3.0), (4000, 4.0)]);
}

#[test]
fn test_empty_block() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("block-empty");

    let writer = BlockWriter::create(&dir).unwrap();
    writer.finish().unwrap();

    let block = Block::open(&dir, default_pool()).unwrap();
    assert_eq!(block.num_series(), 0);
    assert!(block.series().next().is_none());
}

#[test]
fn test_corrupted_body_fails_checksum() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("block-c");

    let mut writer = BlockWriter::create(&dir).unwrap();
    writer.add_series_samples(labels("up", "server1"), &[(1000, 1.0)]);
    writer.finish().unwrap();

    let path = dir.join(CHUNKS_FILENAME);
    let mut data = fs::read(&path).unwrap();
    let mid = data.len() / 2;
    data[mid] ^= 0xff;
    fs::write(&path, &data).unwrap();

    match Block::open(&dir, default_pool()) {
        Err(BlockError::ChecksumMismatch { expected, actual }) => assert_ne!(expected, actual),
        other => panic!("expected ChecksumMismatch, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_invalid_magic() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("block-d");

    let mut writer = BlockWriter::create(&dir).unwrap();
    writer.add_series_samples(labels("up", "server1"), &[(1000, 1.0)]);
    writer.finish().unwrap();

    let path = dir.join(CHUNKS_FILENAME);
    let mut data = fs::read(&path).unwrap();
    data[0..4].copy_from_slice(b"NOPE");
    fs::write(&path, &data).unwrap();

    assert!(matches!(
        Block::open(&dir, default_pool()),
        Err(BlockError::InvalidMagic(m)) if &m == b"NOPE"
    ));
}

#[test]
fn test_unsupported_version() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("block-e");

    let mut writer = BlockWriter::create(&dir).unwrap();
    writer.add_series_samples(labels("up", "server1"), &[(1000, 1.0)]);
    writer.finish().unwrap();

    let path = dir.join(CHUNKS_FILENAME);
    let mut data = fs::read(&path).unwrap();
    data[4..6].copy_from_slice(&99u16.to_le_bytes());
    fs::write(&path, &data).unwrap();

    assert!(matches!(
        Block::open(&dir, default_pool()),
        Err(BlockError::UnsupportedVersion(99))
    ));
}

#[test]
fn test_truncated_file() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("block-f");

    let mut writer = BlockWriter::create(&dir).unwrap();
    writer.add_series_samples(labels("up", "server1"), &[(1000, 1.0)]);
    writer.finish().unwrap();

    let path = dir.join(CHUNKS_FILENAME);
    let data = fs::read(&path).unwrap();
    fs::write(&path, &data[..data.len() - 6]).unwrap();

    assert!(Block::open(&dir, default_pool()).is_err());
}

#[test]
fn test_missing_chunks_file() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("block-g");
    fs::create_dir_all(&dir).unwrap();

    assert!(matches!(
        Block::open(&dir, default_pool()),
        Err(BlockError::Io(_))
    ));
}

#[test]
fn test_aggregate_payloads_survive_verbatim() {
    // The writer stores payload bytes untouched, whatever the encoding.
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("block-h");

    let payload = vec![0u8, 0, 0, 0, 0];
    let mut writer = BlockWriter::create(&dir).unwrap();
    writer.add_series(
        labels("cpu_usage", "server1"),
        vec![(Encoding::Aggr.as_u8(), payload.clone())],
    );
    writer.finish().unwrap();

    // The default pool refuses the marker; the bytes themselves are intact.
    let block = Block::open(&dir, default_pool()).unwrap();
    let series = block.series().next().unwrap();
    assert!(matches!(
        series.chunks(),
        Err(BlockError::UnknownEncoding(0xff))
    ));
}
