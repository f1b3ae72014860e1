//! Throughput of the `PFn`/`PFork` pipeline stages over an in-memory
//! source, across a few worker-count settings (§4.7).

use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use weft::pipeline::{PFn, PFork, Stage};

fn run_pfn(n: i32, workers: usize) {
    let stage = PFn::new(|_task, item: i32| vec![item.wrapping_mul(item)]).with_parallelism(workers);
    let items: Vec<i32> = (0..n).collect();
    let out = stage.run(items).unwrap();
    for result in out {
        black_box(result.unwrap());
    }
}

fn run_pfork(n: i32) {
    let double: Box<dyn Stage<i32, i32> + Send + Sync> = Box::new(PFn::new(|_task, item: i32| vec![item * 2]));
    let triple: Box<dyn Stage<i32, i32> + Send + Sync> = Box::new(PFn::new(|_task, item: i32| vec![item * 3]));
    let fork = PFork::new(vec![double, triple]);
    let items: Vec<i32> = (0..n).collect();
    let out = fork.run(items).unwrap();
    for result in out {
        black_box(result.unwrap());
    }
}

fn bench_pfn(c: &mut Criterion) {
    let mut group = c.benchmark_group("pfn_throughput");
    for &workers in &[1usize, 4, 8] {
        group.bench_function(format!("workers-{workers}"), |b| b.iter(|| run_pfn(black_box(2_000), workers)));
    }
    group.finish();
}

fn bench_pfork(c: &mut Criterion) {
    c.bench_function("pfork_two_branches", |b| b.iter(|| run_pfork(black_box(2_000))));
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(5));
    targets = bench_pfn, bench_pfork
}
criterion_main!(benches);
