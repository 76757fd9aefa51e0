use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quota_watch::bench_support::MonitorBenchFixture;

fn bench_usage_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("usage_refresh");
    group
        .sample_size(30)
        .measurement_time(Duration::from_secs(10));

    let synthetic = MonitorBenchFixture::synthetic(16, 100).expect("synthetic fixture");
    group.bench_function("synthetic_1600_quotas", |b| {
        let monitor = synthetic.monitor.clone();
        b.to_async(&synthetic.runtime).iter(|| {
            let monitor = monitor.clone();
            async move { black_box(monitor.refresh_usage().await.expect("usage refresh")) }
        });
    });

    for resources in [10usize, 1_000] {
        let fixture = MonitorBenchFixture::inventory_backed(resources).expect("inventory fixture");
        group.bench_function(BenchmarkId::new("inventory_rules", resources), |b| {
            let monitor = fixture.monitor.clone();
            b.to_async(&fixture.runtime).iter(|| {
                let monitor = monitor.clone();
                async move { black_box(monitor.refresh_usage().await.expect("usage refresh")) }
            });
        });
    }

    group.finish();
}

criterion_group!(usage_refresh, bench_usage_refresh);
criterion_main!(usage_refresh);
