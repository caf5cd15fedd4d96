//! Criterion benchmarks for configuration fingerprinting
//!
//! Every synchronization pass outside of polling resolves the inputs and
//! fingerprints the result, so these run once per pass per instance.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use serde_json::{json, Map, Value};

use spacelift_block::block::{BlockDefinition, DesiredConfig};
use spacelift_block::fingerprint::{canonical_json, fingerprint, fingerprint_document};

// =============================================================================
// Fixtures
// =============================================================================

fn bucket_inputs() -> Map<String, Value> {
    match json!({ "prefix": "demo", "random_length": 12 }) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Config with `size` random scalar entries
fn random_config(size: usize) -> DesiredConfig {
    let mut rng = StdRng::seed_from_u64(42);
    let pairs = (0..size).map(|i| {
        let value = match rng.gen_range(0..3) {
            0 => json!(rng.gen::<u32>()),
            1 => json!(rng.gen::<bool>()),
            _ => json!(format!("value-{}", rng.gen::<u64>())),
        };
        (format!("input_{i:04}"), value)
    });
    DesiredConfig::from_pairs(pairs).unwrap_or_default()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_resolve_and_fingerprint(c: &mut Criterion) {
    let block = BlockDefinition::storage_bucket();
    let inputs = bucket_inputs();

    c.bench_function("resolve_and_fingerprint/storage_bucket", |b| {
        b.iter(|| {
            let desired = block.resolve("blk-1", black_box(&inputs)).ok()?;
            fingerprint(&desired).ok()
        });
    });
}

fn bench_fingerprint_by_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for size in [5usize, 50, 500] {
        let config = random_config(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("canonical_json", size), &config, |b, config| {
            b.iter(|| canonical_json(black_box(config)));
        });

        let document = canonical_json(&config).unwrap_or_default();
        group.bench_with_input(BenchmarkId::new("digest", size), &document, |b, document| {
            b.iter(|| fingerprint_document(black_box(document)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve_and_fingerprint, bench_fingerprint_by_size);
criterion_main!(benches);
