//! Integration tests for the multi-aggregate chunk codec.

use roost::{
    encode_aggr_chunk, AggrChunk, AggrChunkAdapter, AggrChunkIterator, AggrType, BlockError,
    Chunk, ChunkIterator, Encoding, ValueKind, XorChunk,
};

/// Helper producing a native sub-chunk with `count` samples starting at
/// `start`.
fn sub_chunk(start: i64, count: usize, base_value: f64) -> XorChunk<'static> {
    let points: Vec<(i64, f64)> = (0..count)
        .map(|i| (start + i as i64 * 1000, base_value + i as f64 * 0.5))
        .collect();
    XorChunk::compress(&points)
}

fn samples(it: &mut dyn ChunkIterator) -> Vec<(i64, f64)> {
    let mut out = Vec::new();
    while it.next() == ValueKind::Float {
        out.push(it.at());
    }
    out
}

#[test]
fn test_partial_presence() {
    // Aggregates at indices {0: absent, 1: "P1", 2: absent, 3: "P3",
    // 4: absent}.
    let p1 = sub_chunk(1000, 3, 10.0);
    let p3 = sub_chunk(1000, 3, 99.0);
    let payload = encode_aggr_chunk([None, Some(&p1), None, Some(&p3), None]);
    let chunk = AggrChunk::new(&payload);

    let sum = chunk.get(AggrType::Sum).unwrap();
    assert_eq!(sum.bytes(), p1.bytes());

    assert!(matches!(
        chunk.get(AggrType::Count),
        Err(BlockError::AbsentAggregate(AggrType::Count))
    ));

    // Reaching index 3 requires walking the zero-length segments 0 and 2.
    let max = chunk.get(AggrType::Max).unwrap();
    assert_eq!(max.bytes(), p3.bytes());

    assert!(matches!(
        chunk.get(AggrType::Counter),
        Err(BlockError::AbsentAggregate(AggrType::Counter))
    ));
}

#[test]
fn test_full_presence_roundtrip() {
    let subs: Vec<XorChunk<'static>> = (0..5).map(|i| sub_chunk(0, 4, i as f64)).collect();
    let payload = encode_aggr_chunk([
        Some(&subs[0]),
        Some(&subs[1]),
        Some(&subs[2]),
        Some(&subs[3]),
        Some(&subs[4]),
    ]);
    let chunk = AggrChunk::new(&payload);

    for aggr in AggrType::ALL {
        let sub = chunk.get(aggr).unwrap();
        assert_eq!(
            sub.bytes(),
            subs[aggr.index()].bytes(),
            "wrong sub-chunk for {}",
            aggr
        );
        assert_eq!(sub.num_samples(), 4);
    }
}

#[test]
fn test_truncated_mid_varint_is_corrupt() {
    // A multi-byte varint cut off after its continuation byte.
    let payload = [0xff_u8];
    for aggr in AggrType::ALL {
        assert!(matches!(
            AggrChunk::new(&payload).get(aggr),
            Err(BlockError::CorruptFraming { segment: 0, .. })
        ));
    }
}

#[test]
fn test_declared_length_beyond_buffer_is_corrupt() {
    let p1 = sub_chunk(0, 2, 1.0);
    let mut payload = encode_aggr_chunk([Some(&p1), None, None, None, None]);
    // Chop off the tail of segment 0's payload.
    payload.truncate(payload.len() / 2);

    match AggrChunk::new(&payload).get(AggrType::Count) {
        Err(BlockError::CorruptFraming { segment, .. }) => assert_eq!(segment, 0),
        other => panic!("expected CorruptFraming, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_corruption_behind_target_is_invisible() {
    let p0 = sub_chunk(0, 2, 1.0);
    let mut payload = encode_aggr_chunk([Some(&p0), None, None, None, None]);
    // Replace everything after segment 0 with a truncated varint.
    payload.truncate(payload.len() - 4);
    payload.push(0x80);

    // Segment 0 is still reachable...
    assert!(AggrChunk::new(&payload).get(AggrType::Count).is_ok());
    // ...while anything past it reports the damage.
    assert!(matches!(
        AggrChunk::new(&payload).get(AggrType::Sum),
        Err(BlockError::CorruptFraming { segment: 1, .. })
    ));
}

#[test]
fn test_iterator_over_absent_aggregate() {
    let p1 = sub_chunk(0, 2, 1.0);
    let payload = encode_aggr_chunk([None, Some(&p1), None, None, None]);

    let mut it = AggrChunkIterator::new(&payload, AggrType::Min);
    // "No value" from the very first call.
    assert_eq!(it.next(), ValueKind::None);
    assert_eq!(it.next(), ValueKind::None);
    assert_eq!(it.seek(0), ValueKind::None);
    assert_eq!(it.at(), (0, 0.0));
    assert_eq!(it.at_timestamp(), 0);
    // The construction-time error is preserved.
    assert!(matches!(
        it.err(),
        Some(BlockError::AbsentAggregate(AggrType::Min))
    ));
}

#[test]
fn test_iterator_over_corrupt_chunk() {
    let mut it = AggrChunkIterator::new(&[0x80], AggrType::Sum);
    assert_eq!(it.next(), ValueKind::None);
    assert!(matches!(it.err(), Some(BlockError::CorruptFraming { .. })));
}

#[test]
fn test_iterator_live_delegation() {
    let p4 = sub_chunk(5000, 10, 2.0);
    let payload = encode_aggr_chunk([None, None, None, None, Some(&p4)]);

    let mut it = AggrChunkIterator::new(&payload, AggrType::Counter);
    assert_eq!(it.next(), ValueKind::Float);
    assert_eq!(it.at(), (5000, 2.0));
    assert_eq!(it.seek(9000), ValueKind::Float);
    assert_eq!(it.at(), (9000, 4.0));
    assert_eq!(it.at_timestamp(), 9000);
    assert!(it.err().is_none());

    // Histogram accessors stay neutral on this scalar-only format.
    assert_eq!(it.at_histogram(), None);
    assert_eq!(it.at_float_histogram(), None);
}

#[test]
fn test_adapter_is_a_chunk() {
    let p1 = sub_chunk(1000, 5, 7.0);
    let payload = encode_aggr_chunk([None, Some(&p1), None, None, None]);

    let mut adapter = AggrChunkAdapter::new(&payload, AggrType::Sum);
    assert_eq!(adapter.encoding(), Encoding::Aggr);
    assert_eq!(adapter.bytes(), &payload[..]);
    assert_eq!(adapter.num_samples(), 5);

    let mut it = adapter.iterator();
    let got = samples(it.as_mut());
    drop(it);
    assert_eq!(got.len(), 5);
    assert_eq!(got[0], (1000, 7.0));
    assert_eq!(got[4], (5000, 9.0));

    // Decode-only by design.
    assert!(matches!(adapter.appender(), Err(BlockError::ReadOnly)));
    adapter.compact();
    assert_eq!(adapter.num_samples(), 5);
}

#[test]
fn test_adapter_num_samples_is_advisory() {
    let absent = encode_aggr_chunk([None, None, None, None, None]);
    assert_eq!(AggrChunkAdapter::new(&absent, AggrType::Sum).num_samples(), 0);

    let corrupt = [0x80_u8];
    assert_eq!(AggrChunkAdapter::new(&corrupt, AggrType::Sum).num_samples(), 0);
}
