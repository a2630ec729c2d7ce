//! Benchmarks for fingerprinting and pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use docflow::core::Fingerprint;
use docflow::testing::{sample_pdf, TestHarness};

fn fingerprint_benchmark(c: &mut Criterion) {
    let bytes: Vec<u8> = sample_pdf(7).repeat(4096);
    c.bench_function("fingerprint_1mb", |b| {
        b.iter(|| Fingerprint::of(black_box(&bytes)))
    });
}

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let harness = TestHarness::new();
    let pipeline = harness.pipeline().unwrap();
    let mut seed = 0u32;

    c.bench_function("standard_pipeline_in_memory", |b| {
        b.iter(|| {
            seed = seed.wrapping_add(1);
            runtime.block_on(pipeline.run(sample_pdf(black_box(seed))))
        })
    });
}

criterion_group!(benches, fingerprint_benchmark, pipeline_benchmark);
criterion_main!(benches);
