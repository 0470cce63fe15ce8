use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use peercache::cache::LruCache;
use peercache::ring::Ring;
use peercache::sink::ByteSink;
use peercache::{ByteView, Context, Group, LoaderFn};

fn bench_lru(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru");

    for size in [100usize, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("add", size), size, |b, &size| {
            b.iter(|| {
                let mut cache = LruCache::new(size);
                for i in 0..size {
                    cache.add(&format!("key-{i}"), ByteView::from("0123456789abcdef"));
                }
                black_box(cache.len())
            });
        });

        group.bench_with_input(BenchmarkId::new("get_hit", size), size, |b, &size| {
            let mut cache = LruCache::new(size);
            for i in 0..size {
                cache.add(&format!("key-{i}"), ByteView::from("0123456789abcdef"));
            }
            b.iter(|| black_box(cache.get("key-0").is_some()));
        });
    }

    group.finish();
}

fn bench_ring(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring");

    for peers in [3usize, 16].iter() {
        let mut ring = Ring::new(50);
        ring.add_peers((0..*peers).map(|i| format!("http://10.0.0.{i}:8000")));

        group.bench_with_input(BenchmarkId::new("get", peers), peers, |b, _| {
            let mut i = 0u64;
            b.iter(|| {
                i = i.wrapping_add(1);
                black_box(ring.get(&format!("user{i}")))
                    .map(str::len)
            });
        });
    }

    group.finish();
}

fn bench_cached_get(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let cache_group = Group::builder(
        "bench-cached-get",
        LoaderFn::new(|key: String| async move { Ok(key.into_bytes()) }),
    )
    .cache_bytes(1 << 20)
    .build();

    // Warm the cache so the bench measures the hit path.
    rt.block_on(async {
        let mut value = Vec::new();
        cache_group
            .get(&Context::new(), "warm", &mut ByteSink::new(&mut value))
            .await
            .unwrap();
    });

    c.bench_function("group_get_hit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut value = Vec::new();
                cache_group
                    .get(&Context::new(), "warm", &mut ByteSink::new(&mut value))
                    .await
                    .unwrap();
                black_box(value)
            })
        });
    });
}

criterion_group!(benches, bench_lru, bench_ring, bench_cached_get);
criterion_main!(benches);
