use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flowcore::handlers::AlwaysFail;
use flowcore::node::ParallelismSafety;
use flowcore::pipe::{BoxedPipe, CancellationSource, CancellationToken, MaterializedPipe};
use flowcore::strategy::{BatchingStrategy, SequentialStrategy};
use flowcore::{ExecutionContext, Result, Transform};

struct Doubler;

#[async_trait]
impl Transform for Doubler {
    type Input = i32;
    type Output = i32;

    async fn execute(&self, item: i32, _ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<i32> {
        Ok(item * 2)
    }
}
impl ParallelismSafety for Doubler {}

fn sequential_strategy_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let items: Vec<i32> = (0..10_000).collect();

    c.bench_function("sequential strategy over 10k items", |b| {
        b.to_async(&runtime).iter(|| async {
            let (_src, cancel) = CancellationSource::new();
            let context = Arc::new(ExecutionContext::new(cancel.clone(), Default::default()));
            let input: BoxedPipe<i32> = Box::new(MaterializedPipe::new("ints", items.clone()));
            let strategy = SequentialStrategy::new("doubler", Arc::new(Doubler), Arc::new(AlwaysFail), None, 0);
            let mut output = strategy.apply(input, context);
            let mut count = 0usize;
            while output.next(&cancel).await.unwrap().is_some() {
                count += 1;
            }
            black_box(count)
        });
    });
}

fn batching_strategy_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let items: Vec<i32> = (0..10_000).collect();

    c.bench_function("batching strategy over 10k items, batch size 100", |b| {
        b.to_async(&runtime).iter(|| async {
            let (_src, cancel) = CancellationSource::new();
            let input: BoxedPipe<i32> = Box::new(MaterializedPipe::new("ints", items.clone()));
            let strategy = BatchingStrategy::new("batcher", 100, None);
            let mut output = strategy.apply(input);
            let mut batch_count = 0usize;
            while output.next(&cancel).await.unwrap().is_some() {
                batch_count += 1;
            }
            black_box(batch_count)
        });
    });
}

criterion_group!(benches, sequential_strategy_benchmark, batching_strategy_benchmark);
criterion_main!(benches);
