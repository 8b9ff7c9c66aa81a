//! Criterion benchmarks for the aggregate tree.
//!
//! Models the processor's hot loop: replace a degree by its successor and
//! query the weighted rank of the new value.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pa_common::RankSample;
use pa_tree::{build_index, Allocator, RankIndex, TreeVariant};

/// Deterministic skewed degree sequence (many small degrees, few large ones).
fn degrees(n: usize) -> Vec<u32> {
    let mut x: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..n)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            let u = (x >> 11) as f64 / (1u64 << 53) as f64;
            (1.0 / (1.0 - u).max(1e-6)).floor() as u32
        })
        .collect()
}

fn bench_rank_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_update");
    let seed = degrees(100_000);

    for (variant, allocator) in [
        (TreeVariant::Multiset, Allocator::Compact),
        (TreeVariant::Multiset, Allocator::Boxed),
        (TreeVariant::Map, Allocator::Compact),
    ] {
        for exponents in [vec![], vec![0.5, 1.0, 1.5]] {
            let name = format!("{}-{}-m{}", variant, allocator, exponents.len());
            group.bench_with_input(BenchmarkId::new("replace_and_rank", name), &exponents, |b, exps| {
                let mut index = build_index::<u32>(variant, allocator, exps);
                for &d in &seed {
                    index.add(d).expect("seed insert");
                }
                let mut sample = RankSample::zeroed(exps.len());
                let mut i = 0usize;
                b.iter(|| {
                    let d = seed[i % seed.len()];
                    i += 1;
                    index.replace(d, d + 1).expect("replace");
                    index.rank(d + 1, &mut sample).expect("rank");
                    index.replace(d + 1, d).expect("restore");
                    black_box(&sample);
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_rank_update);
criterion_main!(benches);
