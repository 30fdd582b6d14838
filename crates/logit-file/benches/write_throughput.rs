//! Write throughput benchmarks for the rolling file writer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use logit_file::{FileConfig, RollingFileWriter};
use std::time::Duration;
use tempfile::TempDir;

fn bench_single_thread_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_writes");

    for line_len in [64usize, 512, 4096] {
        let dir = TempDir::new().unwrap();
        let writer = RollingFileWriter::open(dir.path().join("bench.log"), FileConfig::default()).unwrap();
        let line = vec![b'x'; line_len];

        group.throughput(Throughput::Bytes(line_len as u64));
        group.bench_with_input(BenchmarkId::new("no_roll", line_len), &line, |b, line| {
            b.iter(|| writer.write(black_box(line)).unwrap())
        });
    }

    group.finish();
}

fn bench_frequent_rolls(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let config = FileConfig::default()
        .with_max_size(64 * 1024)
        .with_max_backups(4)
        .with_max_age(Duration::ZERO);
    let writer = RollingFileWriter::open(dir.path().join("bench.log"), config).unwrap();
    let line = vec![b'y'; 1024];

    c.bench_function("roll_every_64_lines", |b| {
        b.iter(|| writer.write(black_box(&line)).unwrap())
    });
}

criterion_group!(benches, bench_single_thread_writes, bench_frequent_rolls);
criterion_main!(benches);
