//! Criterion benchmarks for the packet codec and the newline framer.
//!
//! Run with:
//! ```bash
//! cargo bench --package relay-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use relay_core::{decode_packet, encode_line, LineFramer, Packet};
use serde_json::json;

fn make_packet(fields: usize) -> Packet {
    let mut data = serde_json::Map::new();
    for i in 0..fields {
        data.insert(format!("field_{i}"), json!({"value": i, "label": "payload"}));
    }
    Packet::new("BROADCAST", serde_json::Value::Object(data))
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_line");
    for fields in [1usize, 16, 256] {
        let packet = make_packet(fields);
        group.bench_with_input(BenchmarkId::from_parameter(fields), &packet, |b, p| {
            b.iter(|| encode_line(black_box(p)).unwrap())
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_packet");
    for fields in [1usize, 16, 256] {
        let bytes = encode_line(&make_packet(fields)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(fields), &bytes, |b, bytes| {
            b.iter(|| decode_packet(black_box(bytes)).unwrap())
        });
    }
    group.finish();
}

fn bench_framer(c: &mut Criterion) {
    // 64 small packets coalesced into one buffer, as a busy TCP read would deliver them.
    let mut stream = Vec::new();
    for _ in 0..64 {
        stream.extend_from_slice(&encode_line(&make_packet(1)).unwrap());
    }

    c.bench_function("line_framer_64_frames", |b| {
        b.iter(|| {
            let mut framer = LineFramer::new();
            framer.push(black_box(&stream));
            let mut count = 0;
            while let Ok(Some(_)) = framer.next_frame() {
                count += 1;
            }
            count
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_framer);
criterion_main!(benches);
