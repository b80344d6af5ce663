use criterion::{Criterion, black_box, criterion_group, criterion_main};

use geoindex::models::{DocumentConfig, MetadataRecord};
use geoindex::services::DocumentBuilder;

fn record(long_field: usize) -> MetadataRecord {
    MetadataRecord::new()
        .with_field("series_id", "GSE123456")
        .with_field("title", "Single-cell atlas of the regenerating zebrafish heart")
        .with_field("summary", "Cardiomyocytes \"dedifferentiate\"\nand proliferate. ".repeat(40))
        .with_field("data_processing", "x".repeat(long_field))
        .with_field("overall_design", "Time course, 3 replicates per point")
        .with_field("organism", "Danio rerio")
}

fn bench_build(c: &mut Criterion) {
    let builder = DocumentBuilder::from_config(&DocumentConfig::default());
    let typical = record(800);
    let oversized = record(200_000);

    c.bench_function("build_typical_record", |b| {
        b.iter(|| builder.build(black_box(&typical)))
    });
    c.bench_function("build_oversized_record", |b| {
        b.iter(|| builder.build(black_box(&oversized)))
    });

    let tight = DocumentBuilder::new(vec!["data_processing".to_string()], 100_000, 4096);
    c.bench_function("build_budget_cut", |b| {
        b.iter(|| tight.build(black_box(&oversized)))
    });
}

criterion_group!(benches, bench_build);
criterion_main!(benches);
