//! Throughput of the worker-pool scheduler under pure task-queueing load,
//! with no blocking primitives involved (§4.4).

use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use weft::task::Task;

fn run_n_tasks(n: u64) {
    let tasks: Vec<Task<u64>> = (0..n).map(|i| Task::run(move |_| Ok(i * i))).collect();
    for task in tasks {
        black_box(task.result().unwrap());
    }
}

fn bench_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_throughput");
    for &n in &[100u64, 1_000, 10_000] {
        group.bench_function(format!("tasks-{n}"), |b| b.iter(|| run_n_tasks(black_box(n))));
    }
    group.finish();
}

fn bench_continuation_fanin(c: &mut Criterion) {
    c.bench_function("with_all_fanin_64", |b| {
        b.iter(|| {
            let tasks: Vec<Task<u64>> = (0..64).map(|i| Task::run(move |_| Ok(i))).collect();
            let joined = Task::with_all(&tasks, weft::ContinuationOptions::ON_COMPLETED_SUCCESSFULLY, None)
                .run(|_, tasks| Ok(tasks.iter().map(|t| t.result()).sum::<weft::Result<u64>>()?));
            black_box(joined.result().unwrap());
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(5));
    targets = bench_scheduler, bench_continuation_fanin
}
criterion_main!(benches);
