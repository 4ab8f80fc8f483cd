/// Commit log storage benchmarks
///
/// Measures the storage engine in isolation:
/// - Random reads by offset (index lookup + store read)
/// - Sequential appends, including rotation
/// - Bulk streaming through the log reader
///
/// No networking, no async, no replication.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Read;
use tempfile::TempDir;

use commitlog::config::Config;
use commitlog::storage::index::ENTRY_WIDTH;
use commitlog::storage::log::Log;

/// Test fixture: a log on disk with known data.
struct LogFixture {
    _temp_dir: TempDir,
    log: Log,
    record_count: usize,
    record_size: usize,
}

impl LogFixture {
    /// Create a log holding `record_count` records of `record_size` bytes,
    /// with segments of `records_per_segment` records each.
    ///
    /// Pattern: each record is filled with (offset % 256) as byte value
    fn new(record_count: usize, record_size: usize, records_per_segment: u64) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");

        let config = Config::new()
            .max_store_bytes(u64::MAX)
            .max_index_bytes(ENTRY_WIDTH * records_per_segment);
        let log = Log::open(temp_dir.path(), config).expect("failed to open log");

        for i in 0..record_count {
            let payload = vec![(i % 256) as u8; record_size];
            log.append(&payload).expect("failed to append record");
        }

        Self {
            _temp_dir: temp_dir,
            log,
            record_count,
            record_size,
        }
    }

    fn total_payload_bytes(&self) -> usize {
        self.record_count * self.record_size
    }
}

/// Benchmark 1: Random reads by offset
///
/// Every read is one index lookup and one store read, regardless of where
/// the offset sits in the log.
fn benchmark_offset_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("offset_reads");

    let record_sizes = vec![(128, "128B"), (512, "512B"), (1024, "1KB")];

    for (record_size, size_label) in record_sizes {
        let fixture = LogFixture::new(10_000, record_size, 1_000);

        group.throughput(Throughput::Bytes(record_size as u64));

        group.bench_function(BenchmarkId::new("read", size_label), |b| {
            let mut offset = 0u64;
            b.iter(|| {
                // Stride through the log so reads hop between segments
                offset = (offset + 7_919) % fixture.record_count as u64;
                let payload = fixture.log.read(black_box(offset)).expect("read failed");
                black_box(payload);
            });
        });
    }

    group.finish();
}

/// Benchmark 2: Appends
///
/// Small segments force frequent rotation; large ones measure the plain
/// store + index write path.
fn benchmark_appends(c: &mut Criterion) {
    let mut group = c.benchmark_group("appends");

    let record_size = 512;
    let payload = vec![42u8; record_size];

    for (records_per_segment, label) in [(100u64, "rotate_every_100"), (100_000u64, "no_rotation")] {
        group.throughput(Throughput::Bytes(record_size as u64));

        group.bench_function(BenchmarkId::from_parameter(label), |b| {
            let temp_dir = TempDir::new().expect("failed to create temp dir");
            let config = Config::new()
                .max_store_bytes(u64::MAX)
                .max_index_bytes(ENTRY_WIDTH * records_per_segment);
            let log = Log::open(temp_dir.path(), config).expect("failed to open log");

            b.iter(|| {
                let offset = log.append(black_box(&payload)).expect("append failed");
                black_box(offset);
            });
        });
    }

    group.finish();
}

/// Benchmark 3: Bulk streaming
///
/// Reads every store byte through `Log::reader`, crossing all segment
/// boundaries, as a follower catching up would.
fn benchmark_reader_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("reader_stream");

    let fixture = LogFixture::new(10_000, 512, 1_000);
    group.throughput(Throughput::Bytes(fixture.total_payload_bytes() as u64));

    for (chunk_size, label) in [(4 * 1024, "4KB_chunks"), (64 * 1024, "64KB_chunks")] {
        group.bench_function(BenchmarkId::from_parameter(label), |b| {
            let mut buf = vec![0u8; chunk_size];
            b.iter(|| {
                let mut reader = fixture.log.reader().expect("reader failed");
                let mut total = 0usize;
                loop {
                    let n = reader.read(&mut buf).expect("stream read failed");
                    if n == 0 {
                        break;
                    }
                    total += n;
                }
                black_box(total);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_offset_reads,
    benchmark_appends,
    benchmark_reader_stream
);
criterion_main!(benches);
