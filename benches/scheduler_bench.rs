use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::Arc;
use std::thread;

use appifo::observer::ChannelObserver;
use appifo::packet::Packet;
use appifo::scheduler::{self, BoxedScheduler};
use appifo::workload::{self, WorkloadConfig};
use appifo::{
    DiagnosticsConfig, Exclusive, PartitionTree, QueueConfig, RankScale, RotatingArray,
    SchedulerKind,
};

fn ranks(count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| ((i as u64 * 104_729) % 1_000_000) as f64)
        .collect()
}

fn bench_partition_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_tree");

    group.bench_function("admit_serve", |b| {
        let mut tree = PartitionTree::<f64>::new(8, 64).unwrap();
        let ranks = ranks(32);
        tree.admit_all(ranks.iter().copied());
        let mut next = 0;

        b.iter(|| {
            tree.admit(black_box(ranks[next % ranks.len()]));
            next += 1;
            black_box(tree.serve());
        });
    });

    group.bench_function("fill_and_drain_64_buckets", |b| {
        let ranks = ranks(64 * 16);
        b.iter_batched(
            || PartitionTree::<f64>::new(64, 16).unwrap(),
            |mut tree| {
                tree.admit_all(ranks.iter().copied());
                while let Some(rank) = tree.serve() {
                    black_box(rank);
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("admit_serve_with_diagnostics", |b| {
        let config = QueueConfig {
            diagnostics: DiagnosticsConfig::all(),
            ..QueueConfig::default()
        };
        let mut tree = PartitionTree::<f64>::from_config(&config).unwrap();
        let (observer, events_rx) = ChannelObserver::bounded(1_024);
        tree.attach_observer(Box::new(observer));
        let ranks = ranks(32);
        tree.admit_all(ranks.iter().copied());
        let mut next = 0;

        b.iter(|| {
            tree.admit(black_box(ranks[next % ranks.len()]));
            next += 1;
            black_box(tree.serve());
            events_rx.try_iter().for_each(drop);
        });
    });

    group.finish();
}

fn bench_rotating_array(c: &mut Criterion) {
    let mut group = c.benchmark_group("rotating_array");

    group.bench_function("admit_serve", |b| {
        let ring = RotatingArray::<f64>::new(8, 64, RankScale::default()).unwrap();
        let ranks = ranks(32);
        ring.admit_all(ranks.iter().copied());
        let mut next = 0;

        b.iter(|| {
            ring.admit(black_box(ranks[next % ranks.len()]));
            next += 1;
            black_box(ring.serve());
        });
    });

    group.bench_function("fill_and_drain_64_buckets", |b| {
        let ranks = ranks(64 * 16);
        b.iter_batched(
            || RotatingArray::<f64>::new(64, 16, RankScale::default()).unwrap(),
            |ring| {
                ring.admit_all(ranks.iter().copied());
                while let Some(rank) = ring.serve() {
                    black_box(rank);
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_shared_queues(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared");
    group.sample_size(20);

    group.bench_function("rotating_array_4_threads", |b| {
        b.iter(|| {
            let ring = Arc::new(RotatingArray::<f64>::new(8, 32, RankScale::default()).unwrap());
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let ring = Arc::clone(&ring);
                    thread::spawn(move || {
                        for rank in ranks(1_000) {
                            ring.admit(rank);
                            ring.serve();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        });
    });

    group.bench_function("exclusive_tree_4_threads", |b| {
        b.iter(|| {
            let tree = Arc::new(Exclusive::new(PartitionTree::<f64>::new(8, 32).unwrap()));
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let tree = Arc::clone(&tree);
                    thread::spawn(move || {
                        for rank in ranks(1_000) {
                            tree.admit(rank);
                            tree.serve::<f64>();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        });
    });

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    let ops = WorkloadConfig {
        operations: 10_000,
        ..WorkloadConfig::default()
    }
    .generate()
    .unwrap();

    for kind in [SchedulerKind::PartitionTree, SchedulerKind::RotatingArray] {
        let config = QueueConfig {
            kind,
            ..QueueConfig::default()
        };
        group.bench_function(kind.to_string(), |b| {
            b.iter_batched(
                || scheduler::build::<Packet>(&config).unwrap(),
                |mut queue: BoxedScheduler<Packet>| {
                    black_box(workload::replay(&mut queue, &ops, 4, None));
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_partition_tree,
    bench_rotating_array,
    bench_shared_queues,
    bench_replay
);
criterion_main!(benches);
