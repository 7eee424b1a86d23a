//! Sample ring hot-path benchmarks.
//!
//! The ring sits between the sampler tick and the publisher; push/pop cost
//! bounds the sampling rate the service can sustain.

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use stage_common::axis::AxisId;
use stage_common::sample::PositionSample;
use stage_stream::publisher::format_batch;
use stage_stream::ring::sample_ring;

fn full_sample(n: u64) -> PositionSample {
    let mut sample = PositionSample::at(n);
    sample.record(AxisId::X, 999_730);
    sample.record(AxisId::Y, -12);
    sample.record(AxisId::Z, -224_330);
    sample.record(AxisId::R, -600_530);
    sample
}

/// Benchmark the push-pop round trip on an otherwise empty ring.
fn bench_push_pop_roundtrip(c: &mut Criterion) {
    let (mut tx, mut rx) = sample_ring(4096);
    let sample = full_sample(1_735_689_123_457_789_000);

    c.bench_function("ring_push_pop", |b| {
        b.iter(|| {
            black_box(tx.try_push(black_box(sample)));
            black_box(rx.try_pop());
        });
    });
}

/// Benchmark draining a full batch, the publisher's per-period work.
fn bench_batch_drain(c: &mut Criterion) {
    let (mut tx, mut rx) = sample_ring(4096);

    c.bench_function("ring_drain_1000", |b| {
        b.iter(|| {
            for n in 0..1000u64 {
                tx.try_push(full_sample(n));
            }
            while let Some(sample) = rx.try_pop() {
                black_box(sample);
            }
        });
    });
}

/// Benchmark formatting a full batch into the publish payload.
fn bench_batch_format(c: &mut Criterion) {
    let batch: Vec<PositionSample> = (0..1000).map(full_sample).collect();
    let mut payload = String::with_capacity(80 * 1000);

    c.bench_function("format_batch_1000", |b| {
        b.iter(|| {
            format_batch(black_box(&batch), &mut payload);
            black_box(payload.len());
        });
    });
}

criterion_group!(
    benches,
    bench_push_pop_roundtrip,
    bench_batch_drain,
    bench_batch_format
);
criterion_main!(benches);
