//! Merkle tree construction and verification benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use medtrust::core::{ContentHash, MerkleTree};

fn make_leaves(n: usize) -> Vec<ContentHash> {
    (0..n)
        .map(|i| ContentHash::hash(format!("event-{i}").as_bytes()))
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle_build");
    for size in [16usize, 256, 4096] {
        let leaves = make_leaves(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &leaves, |b, leaves| {
            b.iter(|| MerkleTree::build(black_box(leaves)));
        });
    }
    group.finish();
}

fn bench_prove_and_verify(c: &mut Criterion) {
    let leaves = make_leaves(4096);
    let tree = MerkleTree::build(&leaves);
    let root = tree.root();

    c.bench_function("merkle_prove_4096", |b| {
        b.iter(|| tree.prove_index(black_box(2048)));
    });

    let proof = tree.prove_index(2048);
    c.bench_function("merkle_verify_4096", |b| {
        b.iter(|| MerkleTree::verify(black_box(&root), black_box(&proof)));
    });
}

criterion_group!(benches, bench_build, bench_prove_and_verify);
criterion_main!(benches);
