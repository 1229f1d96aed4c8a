//! Gaussian elimination over dense-ish combination rows.
#![allow(clippy::expect_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use relpos_core::{CombinationVectors, EdgeId};

/// Builds `rows` combination rows over `cols` components with a banded
/// sparsity pattern, then measures eliminating the first `cols / 2` columns.
fn build(rows: usize, cols: usize) -> (CombinationVectors, Vec<relpos_core::VectorId>) {
    let mut cv = CombinationVectors::new(1e-12, 1e9);
    let mut combs = Vec::with_capacity(rows);
    for r in 0..rows {
        let entries: Vec<(EdgeId, f64)> = (0..cols)
            .filter(|c| (c + r) % 3 != 0)
            .map(|c| (EdgeId(c as u32), if (c + r) % 2 == 0 { 1.0 } else { -1.0 }))
            .collect();
        let base = cv.new_base_vector(entries);
        let comb = cv.new_comb_vector(base, 1.0).expect("base exists");
        combs.push(comb);
    }
    (cv, combs)
}

fn bench_elimination(c: &mut Criterion) {
    let mut group = c.benchmark_group("elimination");
    for size in [8usize, 32, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let (mut cv, combs) = build(size, size * 2);
                for (i, &comb) in combs.iter().enumerate().take(size / 2) {
                    cv.eliminate(EdgeId(i as u32), comb);
                }
                cv.combination_set().nonzero_size()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_elimination);
criterion_main!(benches);
