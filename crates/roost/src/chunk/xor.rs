//! Native single-series chunk codec.
//!
//! Timestamps are delta-of-delta encoded, values are XOR encoded with a
//! reusable leading/trailing-zero window, both after the Gorilla paper.
//!
//! ## Chunk layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  sample count: u32 LE                                    │
//! │  timestamp stream length in bits: u32 LE                 │
//! ├──────────────────────────────────────────────────────────┤
//! │  timestamp stream (delta-of-delta, padded to a byte)     │
//! ├──────────────────────────────────────────────────────────┤
//! │  value stream (XOR, padded to a byte)                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Bit classes
//!
//! Timestamp delta-of-delta:
//! - `0`: `'0'` (1 bit)
//! - `[-63, 64]`: `'10'` + 7 bits
//! - `[-255, 256]`: `'110'` + 9 bits
//! - `[-2047, 2048]`: `'1110'` + 12 bits
//! - else: `'1111'` + 32 bits
//!
//! Value XOR:
//! - XOR = 0: `'0'` (1 bit)
//! - previous window fits: `'10'` + meaningful bits
//! - new window: `'11'` + 5 bits leading + 6 bits length + meaningful bits

use crate::chunk::{Chunk, ChunkAppender, ChunkIterator, Encoding, ValueKind};
use crate::error::{BlockError, Result};
use bitvec::prelude::*;
use std::borrow::Cow;

/// Fixed header size: sample count plus timestamp stream bit length.
const HEADER_LEN: usize = 8;

/// A native chunk over a borrowed (or, when built locally, owned) byte
/// region.
///
/// Constructed from raw bytes via [`XorChunk::from_bytes`], which validates
/// the framing, or from samples via [`XorChunk::compress`]. The chunk never
/// copies a borrowed region; see the module docs of [`crate::chunk`] for the
/// aliasing contract.
#[derive(Debug, Clone)]
pub struct XorChunk<'a> {
    data: Cow<'a, [u8]>,
}

impl<'a> XorChunk<'a> {
    /// Creates a chunk view over `data`, validating the framing.
    ///
    /// # Errors
    ///
    /// Returns [`BlockError::TruncatedChunk`] when the region is shorter
    /// than its own header declares.
    pub fn from_bytes(data: &'a [u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(BlockError::TruncatedChunk {
                needed: HEADER_LEN,
                have: data.len(),
            });
        }
        let ts_bits = read_u32(data, 4) as usize;
        let needed = HEADER_LEN + ts_bits.div_ceil(8);
        if data.len() < needed {
            return Err(BlockError::TruncatedChunk {
                needed,
                have: data.len(),
            });
        }
        Ok(Self {
            data: Cow::Borrowed(data),
        })
    }

    /// Compresses a sequence of (timestamp, value) pairs into an owned chunk.
    pub fn compress(points: &[(i64, f64)]) -> XorChunk<'static> {
        let mut ts_out = BitVec::<u8, Msb0>::new();
        let mut val_out = BitVec::<u8, Msb0>::new();
        let mut ts_enc = TimestampEncoder::new();
        let mut val_enc = ValueEncoder::new();

        for &(ts, val) in points {
            ts_enc.encode(ts, &mut ts_out);
            val_enc.encode(val, &mut val_out);
        }

        XorChunk {
            data: Cow::Owned(frame(points.len() as u32, &ts_out, &val_out)),
        }
    }

    fn sample_count(&self) -> usize {
        if self.data.len() < HEADER_LEN {
            return 0;
        }
        read_u32(&self.data, 0) as usize
    }
}

impl<'a> Chunk<'a> for XorChunk<'a> {
    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn encoding(&self) -> Encoding {
        Encoding::Xor
    }

    fn num_samples(&self) -> usize {
        self.sample_count()
    }

    fn iterator(&self) -> Box<dyn ChunkIterator + '_> {
        Box::new(XorIterator::new(&self.data).unwrap_or_else(XorIterator::errored))
    }

    fn appender(&mut self) -> Result<Box<dyn ChunkAppender + '_>> {
        // Replay the existing samples to seed the encoder state.
        let mut ts_out = BitVec::<u8, Msb0>::new();
        let mut val_out = BitVec::<u8, Msb0>::new();
        let mut ts_enc = TimestampEncoder::new();
        let mut val_enc = ValueEncoder::new();
        let mut count: u32 = 0;

        let mut it = XorIterator::new(&self.data)?;
        while it.next() == ValueKind::Float {
            let (ts, val) = it.at();
            ts_enc.encode(ts, &mut ts_out);
            val_enc.encode(val, &mut val_out);
            count += 1;
        }
        if let Some(err) = it.into_err() {
            return Err(err);
        }

        Ok(Box::new(XorAppender {
            chunk: self,
            count,
            ts_out,
            val_out,
            ts_enc,
            val_enc,
        }))
    }

    fn compact(&mut self) {
        // The encoded representation is already as small as it gets.
    }

    fn reset(&mut self, data: &'a [u8]) {
        self.data = Cow::Borrowed(data);
    }
}

fn frame(count: u32, ts_out: &BitVec<u8, Msb0>, val_out: &BitVec<u8, Msb0>) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(HEADER_LEN + ts_out.as_raw_slice().len() + val_out.as_raw_slice().len());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&(ts_out.len() as u32).to_le_bytes());
    out.extend_from_slice(ts_out.as_raw_slice());
    out.extend_from_slice(val_out.as_raw_slice());
    out
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

/// Appender that extends a chunk in place.
///
/// Created by [`Chunk::appender`] on a native chunk; the existing samples
/// are replayed once to recover the tail encoder state, after which each
/// append is O(1). The re-framed byte region is written back to the chunk
/// when the appender is dropped, turning a borrowed chunk into an owned one.
pub struct XorAppender<'c, 'a> {
    chunk: &'c mut XorChunk<'a>,
    count: u32,
    ts_out: BitVec<u8, Msb0>,
    val_out: BitVec<u8, Msb0>,
    ts_enc: TimestampEncoder,
    val_enc: ValueEncoder,
}

impl ChunkAppender for XorAppender<'_, '_> {
    fn append(&mut self, timestamp: i64, value: f64) {
        self.ts_enc.encode(timestamp, &mut self.ts_out);
        self.val_enc.encode(value, &mut self.val_out);
        self.count += 1;
    }
}

impl Drop for XorAppender<'_, '_> {
    fn drop(&mut self) {
        self.chunk.data = Cow::Owned(frame(self.count, &self.ts_out, &self.val_out));
    }
}

/// Cursor over the samples of a native chunk.
///
/// Decoding failures (a bit stream shorter than the sample count promises)
/// stop iteration and are reported through [`ChunkIterator::err`]; the
/// cursor never panics on corrupt input.
pub struct XorIterator<'a> {
    ts_dec: TimestampDecoder<'a>,
    val_dec: ValueDecoder<'a>,
    remaining: usize,
    started: bool,
    cur_ts: i64,
    cur_val: f64,
    err: Option<BlockError>,
}

impl<'a> XorIterator<'a> {
    /// Creates an iterator over a framed chunk byte region.
    ///
    /// # Errors
    ///
    /// Returns [`BlockError::TruncatedChunk`] when the region is shorter
    /// than its header declares.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(BlockError::TruncatedChunk {
                needed: HEADER_LEN,
                have: data.len(),
            });
        }
        let count = read_u32(data, 0) as usize;
        let ts_bit_len = read_u32(data, 4) as usize;
        let ts_byte_len = ts_bit_len.div_ceil(8);
        if data.len() < HEADER_LEN + ts_byte_len {
            return Err(BlockError::TruncatedChunk {
                needed: HEADER_LEN + ts_byte_len,
                have: data.len(),
            });
        }
        let ts_stream = &data[HEADER_LEN..HEADER_LEN + ts_byte_len].view_bits::<Msb0>()[..ts_bit_len];
        let val_stream = data[HEADER_LEN + ts_byte_len..].view_bits::<Msb0>();
        Ok(Self {
            ts_dec: TimestampDecoder::new(ts_stream),
            val_dec: ValueDecoder::new(val_stream),
            remaining: count,
            started: false,
            cur_ts: 0,
            cur_val: 0.0,
            err: None,
        })
    }

    fn errored(err: BlockError) -> Self {
        Self {
            ts_dec: TimestampDecoder::new(BitSlice::empty()),
            val_dec: ValueDecoder::new(BitSlice::empty()),
            remaining: 0,
            started: false,
            cur_ts: 0,
            cur_val: 0.0,
            err: Some(err),
        }
    }

    /// Consumes the iterator, returning the error that stopped it, if any.
    pub fn into_err(self) -> Option<BlockError> {
        self.err
    }
}

impl ChunkIterator for XorIterator<'_> {
    fn next(&mut self) -> ValueKind {
        if self.err.is_some() || self.remaining == 0 {
            return ValueKind::None;
        }
        let ts = match self.ts_dec.decode_next() {
            Some(ts) => ts,
            None => {
                self.err = Some(exhausted_stream("timestamp"));
                self.remaining = 0;
                return ValueKind::None;
            }
        };
        let val = match self.val_dec.decode_next() {
            Some(val) => val,
            None => {
                self.err = Some(exhausted_stream("value"));
                self.remaining = 0;
                return ValueKind::None;
            }
        };
        self.cur_ts = ts;
        self.cur_val = val;
        self.remaining -= 1;
        self.started = true;
        ValueKind::Float
    }

    fn seek(&mut self, timestamp: i64) -> ValueKind {
        while !self.started || self.cur_ts < timestamp {
            if self.next() == ValueKind::None {
                return ValueKind::None;
            }
        }
        ValueKind::Float
    }

    fn at(&self) -> (i64, f64) {
        (self.cur_ts, self.cur_val)
    }

    fn at_timestamp(&self) -> i64 {
        self.cur_ts
    }

    fn err(&self) -> Option<&BlockError> {
        self.err.as_ref()
    }
}

fn exhausted_stream(stream: &str) -> BlockError {
    BlockError::Decode(format!(
        "{stream} bit stream ends before the declared sample count"
    ))
}

/// Encoder for timestamps using delta-of-delta encoding.
#[derive(Debug, Default)]
struct TimestampEncoder {
    first_ts: Option<i64>,
    prev_ts: i64,
    prev_delta: i64,
}

impl TimestampEncoder {
    fn new() -> Self {
        Self::default()
    }

    fn encode(&mut self, timestamp: i64, output: &mut BitVec<u8, Msb0>) {
        if self.first_ts.is_none() {
            // First timestamp: 64 bits raw.
            self.first_ts = Some(timestamp);
            self.prev_ts = timestamp;
            self.prev_delta = 0;
            push_bits(output, timestamp as u64, 64);
            return;
        }

        let delta = timestamp - self.prev_ts;
        let delta_of_delta = delta - self.prev_delta;

        if delta_of_delta == 0 {
            output.push(false);
        } else if (-63..=64).contains(&delta_of_delta) {
            output.push(true);
            output.push(false);
            push_bits(output, (delta_of_delta + 63) as u64, 7);
        } else if (-255..=256).contains(&delta_of_delta) {
            output.push(true);
            output.push(true);
            output.push(false);
            push_bits(output, (delta_of_delta + 255) as u64, 9);
        } else if (-2047..=2048).contains(&delta_of_delta) {
            output.push(true);
            output.push(true);
            output.push(true);
            output.push(false);
            push_bits(output, (delta_of_delta + 2047) as u64, 12);
        } else {
            output.push(true);
            output.push(true);
            output.push(true);
            output.push(true);
            push_bits(output, delta_of_delta as i32 as u32 as u64, 32);
        }

        self.prev_delta = delta;
        self.prev_ts = timestamp;
    }
}

/// Decoder for delta-of-delta encoded timestamps.
struct TimestampDecoder<'a> {
    reader: BitReader<'a>,
    first_seen: bool,
    prev_ts: i64,
    prev_delta: i64,
}

impl<'a> TimestampDecoder<'a> {
    fn new(bits: &'a BitSlice<u8, Msb0>) -> Self {
        Self {
            reader: BitReader::new(bits),
            first_seen: false,
            prev_ts: 0,
            prev_delta: 0,
        }
    }

    fn decode_next(&mut self) -> Option<i64> {
        if !self.first_seen {
            let ts = self.reader.read_bits(64)? as i64;
            self.first_seen = true;
            self.prev_ts = ts;
            self.prev_delta = 0;
            return Some(ts);
        }

        let delta_of_delta = if !self.reader.read_bit()? {
            0
        } else if !self.reader.read_bit()? {
            self.reader.read_bits(7)? as i64 - 63
        } else if !self.reader.read_bit()? {
            self.reader.read_bits(9)? as i64 - 255
        } else if !self.reader.read_bit()? {
            self.reader.read_bits(12)? as i64 - 2047
        } else {
            self.reader.read_bits(32)? as u32 as i32 as i64
        };

        let delta = self.prev_delta + delta_of_delta;
        let ts = self.prev_ts + delta;
        self.prev_delta = delta;
        self.prev_ts = ts;
        Some(ts)
    }
}

/// Encoder for float values using XOR compression.
#[derive(Debug, Default)]
struct ValueEncoder {
    first_value: Option<u64>,
    prev_value: u64,
    prev_leading: u32,
    prev_trailing: u32,
}

impl ValueEncoder {
    fn new() -> Self {
        Self::default()
    }

    fn encode(&mut self, value: f64, output: &mut BitVec<u8, Msb0>) {
        let bits = value.to_bits();

        if self.first_value.is_none() {
            // First value: 64 bits raw.
            self.first_value = Some(bits);
            self.prev_value = bits;
            push_bits(output, bits, 64);
            return;
        }

        let xor = bits ^ self.prev_value;

        if xor == 0 {
            output.push(false);
        } else {
            // The leading-zero count is stored in 5 bits, so cap it before
            // sizing the window; the extra zeros ride along as meaningful
            // bits and the decoder stays in sync.
            let leading = xor.leading_zeros().min(31);
            let trailing = xor.trailing_zeros();

            if leading >= self.prev_leading && trailing >= self.prev_trailing {
                // Previous window still covers the meaningful bits.
                output.push(true);
                output.push(false);
                let meaningful = 64 - self.prev_leading - self.prev_trailing;
                push_bits(output, xor >> self.prev_trailing, meaningful);
            } else {
                output.push(true);
                output.push(true);
                // 5 bits of leading zeros, 6 bits of meaningful length
                // stored as length - 1.
                let meaningful = 64 - leading - trailing;
                push_bits(output, u64::from(leading), 5);
                push_bits(output, u64::from(meaningful - 1), 6);
                push_bits(output, xor >> trailing, meaningful);
                self.prev_leading = leading;
                self.prev_trailing = trailing;
            }
        }

        self.prev_value = bits;
    }
}

/// Decoder for XOR-encoded float values.
struct ValueDecoder<'a> {
    reader: BitReader<'a>,
    first_seen: bool,
    prev_value: u64,
    prev_leading: u32,
    prev_trailing: u32,
}

impl<'a> ValueDecoder<'a> {
    fn new(bits: &'a BitSlice<u8, Msb0>) -> Self {
        Self {
            reader: BitReader::new(bits),
            first_seen: false,
            prev_value: 0,
            prev_leading: 0,
            prev_trailing: 0,
        }
    }

    fn decode_next(&mut self) -> Option<f64> {
        if !self.first_seen {
            let bits = self.reader.read_bits(64)?;
            self.first_seen = true;
            self.prev_value = bits;
            return Some(f64::from_bits(bits));
        }

        let xor = if !self.reader.read_bit()? {
            0u64
        } else if !self.reader.read_bit()? {
            let meaningful = 64 - self.prev_leading - self.prev_trailing;
            self.reader.read_bits(meaningful)? << self.prev_trailing
        } else {
            let leading = self.reader.read_bits(5)? as u32;
            let meaningful = self.reader.read_bits(6)? as u32 + 1;
            if leading + meaningful > 64 {
                return None;
            }
            let trailing = 64 - leading - meaningful;
            self.prev_leading = leading;
            self.prev_trailing = trailing;
            self.reader.read_bits(meaningful)? << trailing
        };

        let bits = self.prev_value ^ xor;
        self.prev_value = bits;
        Some(f64::from_bits(bits))
    }
}

/// Bounds-checked MSB-first cursor over a bit slice.
struct BitReader<'a> {
    bits: &'a BitSlice<u8, Msb0>,
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(bits: &'a BitSlice<u8, Msb0>) -> Self {
        Self { bits, pos: 0 }
    }

    fn read_bit(&mut self) -> Option<bool> {
        let bit = *self.bits.get(self.pos)?;
        self.pos += 1;
        Some(bit)
    }

    fn read_bits(&mut self, count: u32) -> Option<u64> {
        if self.pos + count as usize > self.bits.len() {
            return None;
        }
        let mut value: u64 = 0;
        for _ in 0..count {
            value = (value << 1) | u64::from(self.bits[self.pos]);
            self.pos += 1;
        }
        Some(value)
    }
}

fn push_bits(output: &mut BitVec<u8, Msb0>, value: u64, count: u32) {
    for i in (0..count).rev() {
        output.push((value >> i) & 1 == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(chunk: &XorChunk<'_>) -> Vec<(i64, f64)> {
        let mut it = Chunk::iterator(chunk);
        let mut out = Vec::new();
        while it.next() == ValueKind::Float {
            out.push(it.at());
        }
        assert!(it.err().is_none(), "unexpected error: {:?}", it.err());
        out
    }

    #[test]
    fn test_compress_roundtrip() {
        let points = vec![
            (1000_i64, 1.0_f64),
            (1010, 1.1),
            (1020, 1.2),
            (1030, 1.1),
            (1040, 1.0),
        ];
        let chunk = XorChunk::compress(&points);
        assert_eq!(chunk.num_samples(), 5);
        assert_eq!(collect(&chunk), points);
    }

    #[test]
    fn test_empty_chunk() {
        let chunk = XorChunk::compress(&[]);
        assert_eq!(chunk.num_samples(), 0);
        assert!(collect(&chunk).is_empty());
    }

    #[test]
    fn test_borrowed_roundtrip() {
        let points = vec![(1_600_000_000_000_i64, 42.5), (1_600_000_010_000, 42.6)];
        let owned = XorChunk::compress(&points);
        let bytes = owned.bytes().to_vec();

        let view = XorChunk::from_bytes(&bytes).unwrap();
        assert_eq!(view.num_samples(), 2);
        assert_eq!(collect(&view), points);
    }

    #[test]
    fn test_irregular_intervals_and_values() {
        let points = vec![
            (1000_i64, 1.0),
            (1001, 1.1),
            (1100, 2.0),
            (5000, -3.0),
            (5001, 3.1),
            (100_000_000, 0.0),
            (100_000_001, f64::MAX),
        ];
        let chunk = XorChunk::compress(&points);
        assert_eq!(collect(&chunk), points);
    }

    #[test]
    fn test_special_floats() {
        let points: Vec<(i64, f64)> = [
            0.0,
            -0.0,
            f64::MIN,
            f64::MAX,
            f64::MIN_POSITIVE,
            f64::EPSILON,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ]
        .iter()
        .enumerate()
        .map(|(i, &v)| (1000 + i as i64 * 10, v))
        .collect();

        let chunk = XorChunk::compress(&points);
        let decoded = collect(&chunk);
        assert_eq!(decoded.len(), points.len());
        for ((ts, expected), (dts, actual)) in points.iter().zip(decoded.iter()) {
            assert_eq!(ts, dts);
            assert_eq!(expected.to_bits(), actual.to_bits());
        }
    }

    #[test]
    fn test_from_bytes_rejects_truncation() {
        let chunk = XorChunk::compress(&[(1000, 1.0), (1010, 2.0)]);
        let bytes = chunk.bytes();

        match XorChunk::from_bytes(&bytes[..4]) {
            Err(BlockError::TruncatedChunk { .. }) => {}
            other => panic!("expected TruncatedChunk, got {:?}", other.map(|_| ())),
        }
        match XorChunk::from_bytes(&bytes[..HEADER_LEN + 2]) {
            Err(BlockError::TruncatedChunk { .. }) => {}
            other => panic!("expected TruncatedChunk, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_iterator_reports_exhausted_stream() {
        // Claim more samples than the bit streams hold.
        let chunk = XorChunk::compress(&[(1000, 1.0)]);
        let mut bytes = chunk.bytes().to_vec();
        bytes[0..4].copy_from_slice(&5u32.to_le_bytes());

        let mut it = XorIterator::new(&bytes).unwrap();
        assert_eq!(it.next(), ValueKind::Float);
        assert_eq!(it.next(), ValueKind::None);
        assert!(matches!(it.err(), Some(BlockError::Decode(_))));
    }

    #[test]
    fn test_seek() {
        let points: Vec<(i64, f64)> = (0..100).map(|i| (1000 + i * 10, i as f64)).collect();
        let chunk = XorChunk::compress(&points);

        let mut it = Chunk::iterator(&chunk);
        assert_eq!(it.seek(1500), ValueKind::Float);
        assert_eq!(it.at(), (1500, 50.0));

        // Seeking backwards keeps the current position.
        assert_eq!(it.seek(1000), ValueKind::Float);
        assert_eq!(it.at(), (1500, 50.0));

        // Seeking to a gap lands on the next sample.
        assert_eq!(it.seek(1501), ValueKind::Float);
        assert_eq!(it.at(), (1510, 51.0));

        assert_eq!(it.seek(i64::MAX), ValueKind::None);
    }

    #[test]
    fn test_appender_extends_chunk() {
        let mut chunk = XorChunk::compress(&[(1000, 1.0), (1010, 2.0)]);
        {
            let mut app = chunk.appender().unwrap();
            app.append(1020, 3.0);
            app.append(1030, 4.0);
        }
        assert_eq!(chunk.num_samples(), 4);
        assert_eq!(
            collect(&chunk),
            vec![(1000, 1.0), (1010, 2.0), (1020, 3.0), (1030, 4.0)]
        );
    }

    #[test]
    fn test_appender_on_empty_chunk() {
        let mut chunk = XorChunk::compress(&[]);
        {
            let mut app = chunk.appender().unwrap();
            app.append(500, 0.5);
        }
        assert_eq!(collect(&chunk), vec![(500, 0.5)]);
    }

    #[test]
    fn test_reset_swaps_region() {
        let a = XorChunk::compress(&[(1, 1.0)]);
        let b = XorChunk::compress(&[(2, 2.0), (3, 3.0)]);
        let a_bytes = a.bytes().to_vec();
        let b_bytes = b.bytes().to_vec();

        let mut chunk = XorChunk::from_bytes(&a_bytes).unwrap();
        assert_eq!(chunk.num_samples(), 1);
        chunk.reset(&b_bytes);
        assert_eq!(chunk.num_samples(), 2);
        assert_eq!(collect(&chunk), vec![(2, 2.0), (3, 3.0)]);
    }

    #[test]
    fn test_large_regular_series_compresses() {
        let points: Vec<(i64, f64)> = (0..1000)
            .map(|i| (1_000_000 + i * 1000, 50.0 + (i as f64 * 0.1).sin()))
            .collect();
        let chunk = XorChunk::compress(&points);
        assert_eq!(collect(&chunk), points);
        assert!(chunk.bytes().len() < 1000 * 16 / 2, "expected >2:1 compression");
    }
}
