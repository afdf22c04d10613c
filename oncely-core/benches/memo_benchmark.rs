use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use oncely_core::{derive_key, normalize, CallSiteId, InstanceMemo, SharedMemo};
use once_cell::sync::Lazy;
use std::thread;

static SHARED: Lazy<SharedMemo> = Lazy::new(SharedMemo::new);

fn bench_derive_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("derive_key");
    let site = CallSiteId::new("bench", file!(), line!(), column!());

    group.bench_function("no_args", |b| {
        b.iter(|| black_box(derive_key(&site, &[])));
    });

    for len in [1usize, 4, 16].iter() {
        let values: Vec<String> = (0..*len).map(|i| format!("arg{}", i)).collect();
        let args = normalize(&[&values]).unwrap();
        group.bench_with_input(BenchmarkId::new("strings", len), &args, |b, args| {
            b.iter(|| black_box(derive_key(&site, args)));
        });
    }

    group.finish();
}

fn bench_hit_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("hit_path");
    let site = CallSiteId::named("hit");

    let local = InstanceMemo::new();
    local.memoize(&site, &[&1u32], || 42u64).unwrap();
    group.bench_function("instance", |b| {
        b.iter(|| black_box(local.memoize(&site, &[&1u32], || 0u64).unwrap()));
    });

    SHARED.memoize(&site, &[&1u32], || 42u64).unwrap();
    group.bench_function("shared", |b| {
        b.iter(|| black_box(SHARED.memoize(&site, &[&1u32], || 0u64).unwrap()));
    });

    let disabled = InstanceMemo::disabled();
    group.bench_function("disabled", |b| {
        b.iter(|| black_box(disabled.memoize(&site, &[&1u32], || 42u64).unwrap()));
    });

    group.finish();
}

fn bench_miss_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("miss_path");
    let site = CallSiteId::named("miss");

    for size in [10u32, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("instance", size), size, |b, &size| {
            b.iter(|| {
                let memo = InstanceMemo::new();
                for i in 0..size {
                    black_box(memo.memoize(&site, &[&i], || i * 2).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn bench_concurrent_hits(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_hits");
    let site = CallSiteId::named("concurrent");
    for i in 0..100u32 {
        SHARED.memoize(&site, &[&i], || i).unwrap();
    }

    for num_threads in [2, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            thread::spawn(|| {
                                let site = CallSiteId::named("concurrent");
                                for i in 0..100u32 {
                                    black_box(SHARED.memoize(&site, &[&i], || 0u32).unwrap());
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_derive_key,
    bench_hit_path,
    bench_miss_path,
    bench_concurrent_hits
);
criterion_main!(benches);
