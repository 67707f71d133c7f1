//! Benchmarks for batch writing
//!
//! This benchmark measures:
//! - Chunk splitting overhead
//! - Chunked writes into the in-memory repository
//! - Event encoding throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use request_pipeline::batch::{split_to_chunks, ChunkedWriter};
use request_pipeline::events::{codec, Event, EventKind};
use request_pipeline::storage::{InMemoryRepo, RepoChunkSink, Request};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn sample_batch(n: u64) -> Vec<Request> {
    (0..n)
        .map(|i| Request::new(0, i + 1, i % 4, format!("benchmark request {i}")))
        .collect()
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_to_chunks");
    let batch = sample_batch(10_000);

    for chunk_size in [10usize, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &chunk_size,
            |b, &k| b.iter(|| black_box(split_to_chunks(black_box(&batch), k)).len()),
        );
    }

    group.finish();
}

fn bench_chunked_write(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("chunked_write");

    for size in [100u64, 1000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(&rt).iter(|| async move {
                let writer = ChunkedWriter::new(RepoChunkSink::new(Arc::new(InMemoryRepo::new())), 100);
                let outcome = writer.write(sample_batch(size)).await;
                black_box(outcome.written_items)
            })
        });
    }

    group.finish();
}

fn bench_event_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_encoding");

    let mut trace = BTreeMap::new();
    trace.insert("uber-trace-id".to_string(), "5f2c:9a1e:0:1".to_string());
    let event = Event::new(123_456, EventKind::Update)
        .with_error("request does not exist")
        .with_trace_context(trace);

    group.bench_function("encode", |b| b.iter(|| codec::encode(black_box(&event))));

    let payload = codec::encode(&event);
    group.bench_function("decode", |b| b.iter(|| codec::decode(black_box(&payload))));

    group.finish();
}

criterion_group!(benches, bench_split, bench_chunked_write, bench_event_encoding);
criterion_main!(benches);
