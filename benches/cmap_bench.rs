use cmap::ConcurrentMap;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(n: u64) -> String {
    format!("k{:016x}", n)
}

fn filled(seed: u64, n: usize) -> (ConcurrentMap<String, u64>, Vec<String>) {
    let m = ConcurrentMap::new();
    let keys: Vec<_> = lcg(seed).take(n).map(key).collect();
    for (i, k) in keys.iter().cloned().enumerate() {
        m.put(k, i as u64);
    }
    (m, keys)
}

fn bench_put(c: &mut Criterion) {
    c.bench_function("cmap_put_10k", |b| {
        b.iter_batched(
            ConcurrentMap::<String, u64>::new,
            |m| {
                // Starts from 16 slots per shard, so this includes resizing.
                for (i, x) in lcg(1).take(10_000).enumerate() {
                    m.put(key(x), i as u64);
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_get_hit(c: &mut Criterion) {
    c.bench_function("cmap_get_hit", |b| {
        let (m, keys) = filled(7, 20_000);
        let mut it = keys.iter().cycle();
        b.iter(|| {
            let k = it.next().unwrap();
            black_box(m.get(k).unwrap());
        })
    });
}

fn bench_get_miss(c: &mut Criterion) {
    c.bench_function("cmap_get_miss", |b| {
        let (m, _keys) = filled(11, 10_000);
        let mut miss = lcg(0xdead_beef);
        b.iter(|| {
            let k = key(miss.next().unwrap());
            black_box(m.get(&k));
        })
    });
}

fn bench_put_delete_cycle(c: &mut Criterion) {
    c.bench_function("cmap_put_delete_cycle", |b| {
        let (m, _keys) = filled(13, 10_000);
        let mut fresh = lcg(0xfeed);
        b.iter(|| {
            let k = key(fresh.next().unwrap());
            m.put(k.clone(), 1);
            black_box(m.delete(&k));
        })
    });
}

// Four threads, 80% reads, on a map shared across all of them.
fn bench_mixed_threads(c: &mut Criterion) {
    const THREADS: u64 = 4;
    const OPS: usize = 5_000;
    c.bench_function("cmap_mixed_4_threads", |b| {
        let (m, keys) = filled(17, 20_000);
        b.iter(|| {
            std::thread::scope(|s| {
                for t in 0..THREADS {
                    let (m, keys) = (&m, &keys);
                    s.spawn(move || {
                        for (i, x) in lcg(t + 1).take(OPS).enumerate() {
                            let k = &keys[(x % keys.len() as u64) as usize];
                            if i % 5 == 0 {
                                m.put(k.clone(), x);
                            } else {
                                black_box(m.get(k));
                            }
                        }
                    });
                }
            });
        })
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(8))
        .warm_up_time(Duration::from_secs(2))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_put, bench_get_hit, bench_get_miss, bench_put_delete_cycle, bench_mixed_threads
}
criterion_main!(benches);
