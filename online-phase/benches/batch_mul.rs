//! Benchmarks for batch multiplication between mock parties

use std::time::{Duration, Instant};

use ark_spdz::{
    algebra::Scalar,
    test_helpers::{execute_mock_mpc_with_config, TestField},
    EvaluationStrategy, ExecutorConfig, PARTY0, PARTY1,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use itertools::Itertools;
use rand::thread_rng;
use tokio::runtime::Builder as RuntimeBuilder;

/// The number of parties in each benchmark
const N_PARTIES: usize = 2;

/// Execute a batch multiplication and return the time taken by the slowest
/// party
async fn perform_batch_mul(
    a: Vec<Scalar<TestField>>,
    b: Vec<Scalar<TestField>>,
    config: ExecutorConfig,
) -> Duration {
    let durations = execute_mock_mpc_with_config(N_PARTIES, config, |mut executor| {
        let a = a.clone();
        let b = b.clone();
        async move {
            let party_id = executor.party_id();
            let start = Instant::now();
            let res = executor
                .run(move |root| {
                    root.par(move |builder| {
                        let mut numeric = builder.numeric();
                        let mut shared = a
                            .into_iter()
                            .map(|a| numeric.input((party_id == PARTY0).then_some(a), PARTY0))
                            .collect_vec();
                        shared.extend(
                            b.into_iter()
                                .map(|b| numeric.input((party_id == PARTY1).then_some(b), PARTY1)),
                        );

                        builder.collect(&shared)
                    })
                    .seq(|builder, shared| {
                        let shared = shared.into_iter().map(|s| builder.constant(s)).collect_vec();
                        let (a, b) = shared.split_at(shared.len() / 2);

                        let mut numeric = builder.numeric();
                        let products = numeric.mul_batch(a, b);
                        let opened = numeric.open_batch(&products);
                        builder.collect(&opened)
                    })
                    .output()
                })
                .await;

            let _ = black_box(res);
            start.elapsed()
        }
    })
    .await;

    durations.into_iter().max().unwrap_or_default()
}

/// Benchmark batch multiplication on a range of batches, under both
/// evaluation strategies
fn bench_batch_mul(c: &mut Criterion) {
    let runtime =
        RuntimeBuilder::new_multi_thread().worker_threads(3).enable_all().build().unwrap();

    let mut group = c.benchmark_group("batch-mul");

    for strategy in [EvaluationStrategy::Parallel, EvaluationStrategy::Sequential] {
        for batch_size in [10, 100, 1000].into_iter() {
            let id = BenchmarkId::new(format!("{strategy:?}"), batch_size);
            let config = ExecutorConfig::default().with_strategy(strategy);

            group.throughput(Throughput::Elements(batch_size));
            group.bench_function(id, |bencher| {
                let mut async_bencher = bencher.to_async(&runtime);
                async_bencher.iter_custom(|n_iters| {
                    let config = config.clone();
                    async move {
                        let mut total_time = Duration::default();
                        for _ in 0..n_iters {
                            let mut rng = thread_rng();
                            let a = (0..batch_size).map(|_| Scalar::random(&mut rng)).collect_vec();
                            let b = (0..batch_size).map(|_| Scalar::random(&mut rng)).collect_vec();

                            total_time += perform_batch_mul(a, b, config.clone()).await;
                        }

                        total_time
                    }
                });
            });
        }
    }
}

criterion_group!(
    name = batch_mul;
    config = Criterion::default().sample_size(10);
    targets = bench_batch_mul
);
criterion_main!(batch_mul);
