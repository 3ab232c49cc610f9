use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use optimizely::{bucketer, ClientConfig, DecideOption};

fn criterion_benchmark(c: &mut Criterion) {
    let datafile = std::fs::read("test-data/datafiles/decide.json").unwrap();
    let client = ClientConfig::from_datafile(datafile)
        .default_decide_options([DecideOption::DisableDecisionEvent])
        .to_client()
        .unwrap();

    {
        let mut group = c.benchmark_group("bucketer");
        group.throughput(Throughput::Elements(1));
        group.bench_function("bucket_value", |b| {
            b.iter(|| bucketer::bucket_value(black_box("ppid11886780721")))
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("feature-test");
        group.throughput(Throughput::Elements(1));
        let user = client.create_user_context(
            "user_1",
            [("country".to_owned(), "US".into())].into(),
        );
        group.bench_function("decide", |b| {
            b.iter(|| user.decide(black_box("checkout_flow"), &[]))
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("rollout");
        group.throughput(Throughput::Elements(1));
        let user = client.create_user_context("user_2", HashMap::new());
        group.bench_function("decide", |b| {
            b.iter(|| user.decide(black_box("checkout_flow"), &[]))
        });
        group.bench_function("decide_all", |b| b.iter(|| user.decide_all(&[])));
        group.finish();
    }

    client.close().unwrap();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
