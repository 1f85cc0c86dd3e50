use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

use chorus::domain::models::{MergeItem, TaskId};
use chorus::services::MergeQueue;

fn items(count: usize) -> Vec<MergeItem> {
    (0..count)
        .map(|i| {
            let id = TaskId::sequential("ch", i as u64 + 1);
            let mut item = MergeItem::new(id.clone(), format!("task/{id}"), format!("/wt/{id}"))
                .with_priority((i % 5) as u8);
            if i % 3 == 0 && i > 0 {
                item = item.with_dependencies([TaskId::sequential("ch", i as u64)]);
            }
            item
        })
        .collect()
}

fn bench_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_queue");
    for count in [50, 250] {
        let batch = items(count);
        group.bench_with_input(BenchmarkId::new("enqueue", count), &batch, |b, batch| {
            b.iter_batched(
                || batch.clone(),
                |batch| {
                    let mut queue = MergeQueue::new();
                    for item in batch {
                        let _ = queue.enqueue(item);
                    }
                    black_box(queue.len())
                },
                BatchSize::SmallInput,
            );
        });
        group.bench_with_input(BenchmarkId::new("drain", count), &batch, |b, batch| {
            b.iter_batched(
                || {
                    let mut queue = MergeQueue::new();
                    for item in batch.clone() {
                        let _ = queue.enqueue(item);
                    }
                    queue
                },
                |mut queue| {
                    while let Some(next) = queue.dequeue() {
                        queue.mark_completed(&next.task_id);
                    }
                    black_box(queue.stats())
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_admission);
criterion_main!(benches);
