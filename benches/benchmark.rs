use criterion::{black_box, criterion_group, criterion_main, Criterion};
use site_auditor::Config;
use std::time::Duration;

#[cfg(feature = "integration_benchmarks")]
use site_auditor::{EnvOverrides, EventBus, RunManager};

fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

// === UNIT BENCHMARKS ===

fn benchmark_config_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");
    configure_fast_group(&mut group);

    group.bench_function("validate", |b| {
        b.iter(|| {
            let config = Config {
                sitemap_url: Some("https://example.com/sitemap.xml".to_string()),
                output_dir: "./out".to_string(),
                ..Default::default()
            };
            let result = config.validate();
            black_box(result);
        });
    });

    group.finish();
}

fn benchmark_sitemap_filtering(c: &mut Criterion) {
    let mut group = c.benchmark_group("sitemap");
    configure_fast_group(&mut group);

    let urls: Vec<String> = (0..500)
        .map(|i| format!("https://example.com/page-{i}"))
        .collect();

    group.bench_function("filter_urls", |b| {
        b.iter(|| {
            let filtered = site_auditor::sitemap::filter_urls(
                urls.clone(),
                Some("page-[0-9]+$"),
                None,
                200,
            );
            black_box(filtered);
        });
    });

    group.finish();
}

fn benchmark_retry_delay(c: &mut Criterion) {
    use site_auditor::retry;

    let mut group = c.benchmark_group("retry");
    configure_fast_group(&mut group);
    let mut rng = retry::seeded_rng(42);

    group.bench_function("delay_with_jitter", |b| {
        b.iter(|| {
            for attempt in 0..5 {
                let d = retry::delay(attempt, Duration::from_millis(200), &mut rng);
                black_box(d);
            }
        });
    });

    group.finish();
}

fn benchmark_artifact_serialization(c: &mut Criterion) {
    use site_auditor::PageArtifact;

    let mut group = c.benchmark_group("artifact");
    configure_fast_group(&mut group);

    group.bench_function("error_stub_and_serialize", |b| {
        b.iter(|| {
            let error = site_auditor::AuditError::NavigationTimeout(Duration::from_secs(30));
            let artifact = PageArtifact::error_stub(
                "run-bench",
                "https://example.com/page",
                None,
                &error,
                chrono::Utc::now(),
            );
            let json = serde_json::to_string(&artifact).unwrap();
            black_box(json);
        });
    });

    group.finish();
}

// === INTEGRATION BENCHMARKS (require Chrome) ===

#[cfg(feature = "integration_benchmarks")]
fn benchmark_run_start(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("run");
    configure_fast_group(&mut group);

    group.bench_function("start_single_url", |b| {
        b.iter(|| {
            rt.block_on(async {
                let bus = EventBus::new();
                let runs = RunManager::new(bus, EnvOverrides::default());
                let config = Config {
                    urls: vec!["https://example.com".to_string()],
                    concurrency: 1,
                    ..Default::default()
                };
                let handle = runs.start(config).await.unwrap();
                black_box(handle);
            })
        });
    });

    group.finish();
}

criterion_group!(
    unit_benches,
    benchmark_config_validate,
    benchmark_sitemap_filtering,
    benchmark_retry_delay,
    benchmark_artifact_serialization,
);

#[cfg(feature = "integration_benchmarks")]
criterion_group!(integration_benches, benchmark_run_start);

#[cfg(feature = "integration_benchmarks")]
criterion_main!(unit_benches, integration_benches);

#[cfg(not(feature = "integration_benchmarks"))]
criterion_main!(unit_benches);
