use chrono::Local;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::time::Duration;
use templog::export::ExportTable;
use templog_core::{SessionBuffer, SessionExport};
use templog_types::{Reading, ReadingValue, SensorId, SessionId};

fn tick(sensors: &[SensorId], n: u64) -> Vec<Reading> {
    let timestamp = Local::now();
    sensors
        .iter()
        .map(|id| {
            Reading::new(
                id.clone(),
                n,
                Duration::from_secs(n),
                timestamp,
                ReadingValue::Celsius(20.0 + (n % 10) as f64),
            )
        })
        .collect()
}

fn filled(sensors: &[SensorId], ticks: u64) -> SessionBuffer {
    let buffer = SessionBuffer::new(500);
    buffer.begin_session(SessionId::generate());
    for n in 1..=ticks {
        let _ = buffer.append_tick(tick(sensors, n));
    }
    buffer
}

fn bench_session_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_buffer");
    let sensor_counts = [1usize, 8, 32];

    for &count in &sensor_counts {
        let sensors: Vec<SensorId> = (0..count).map(|i| SensorId::new(format!("28-{i:012}"))).collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("append_tick", count), &sensors, |b, sensors| {
            let buffer = SessionBuffer::new(500);
            buffer.begin_session(SessionId::generate());
            let mut n = 0;
            b.iter(|| {
                n += 1;
                black_box(buffer.append_tick(tick(sensors, n)))
            });
        });

        // One hour of 1 s ticks
        let buffer = filled(&sensors, 3600);
        group.throughput(Throughput::Elements(3600 * count as u64));
        group.bench_with_input(BenchmarkId::new("snapshot", count), &buffer, |b, buffer| {
            b.iter(|| black_box(buffer.snapshot()));
        });

        let export = SessionExport {
            session: None,
            labels: Default::default(),
            readings: buffer.snapshot(),
        };
        group.bench_with_input(BenchmarkId::new("export_table", count), &export, |b, export| {
            b.iter(|| black_box(ExportTable::from_export(export)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_session_buffer);
criterion_main!(benches);
