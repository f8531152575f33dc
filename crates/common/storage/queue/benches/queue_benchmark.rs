// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Benchmarks for the mapped queue.
//!
//! Measures:
//! - Single append latency per lock mode
//! - Append throughput at different payload sizes
//! - Sequential dequeue throughput

use std::{
    hint::black_box,
    time::{Duration, Instant},
};

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use queue::{
    CursorKind, LockMode, PageCount, Queue, QueueBuilder, ReaderSettings, WriterSettings,
};
use tempfile::TempDir;

/// Payload sizes to benchmark (bytes)
const PAYLOAD_SIZES: &[usize] = &[64, 256, 1024, 4096, 16384];

/// Records per throughput iteration
const BATCH_SIZE: usize = 10_000;

/// 64MB data segments, 4MB index segments.
fn create_queue(temp_dir: &TempDir) -> Queue {
    QueueBuilder::new(temp_dir.path())
        .data_segment_size(PageCount::new(16_384))
        .index_segment_size(PageCount::new(1024))
        .store_size_in_index(true)
        .create()
        .expect("Failed to create queue")
}

fn writer(mode: LockMode) -> WriterSettings { WriterSettings::builder().lock_mode(mode).build() }

fn bench_append_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_latency");

    for mode in [
        LockMode::SingleThread,
        LockMode::SingleProcess,
        LockMode::MultiProcess,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{mode:?}")),
            &mode,
            |b, &mode| {
                let payload = vec![0xABu8; 256];
                // A fresh queue per sample keeps the files from growing
                // with the iteration count.
                b.iter_custom(|iters| {
                    let temp_dir = TempDir::new().unwrap();
                    let queue = create_queue(&temp_dir);
                    let mut appender = queue.create_appender(writer(mode));
                    let start = Instant::now();
                    for _ in 0..iters {
                        appender.append(black_box(&payload)).unwrap();
                    }
                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

fn bench_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_throughput");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    for &size in PAYLOAD_SIZES {
        group.throughput(Throughput::Bytes((size * BATCH_SIZE) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let payload = vec![0xABu8; size];
            b.iter_batched(
                || {
                    let temp_dir = TempDir::new().unwrap();
                    let queue = create_queue(&temp_dir);
                    (temp_dir, queue)
                },
                |(_temp_dir, queue)| {
                    let mut appender = queue.create_appender(writer(LockMode::MultiProcess));
                    for _ in 0..BATCH_SIZE {
                        appender.append(black_box(&payload)).unwrap();
                    }
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

fn bench_dequeue_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("dequeue_throughput");
    group.sample_size(20);

    for &size in PAYLOAD_SIZES {
        let temp_dir = TempDir::new().unwrap();
        let queue = create_queue(&temp_dir);
        let mut appender = queue.create_appender(writer(LockMode::SingleThread));
        let payload = vec![0xCDu8; size];
        for _ in 0..BATCH_SIZE {
            appender.append(&payload).unwrap();
        }

        group.throughput(Throughput::Bytes((size * BATCH_SIZE) as u64));
        let settings = ReaderSettings::builder()
            .cursor(CursorKind::Ephemeral { start: None })
            .build();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut tailer = queue.create_tailer(settings.clone()).unwrap();
                let mut read = 0usize;
                while let Some(payload) = tailer.dequeue_one().unwrap() {
                    read += black_box(payload).len();
                }
                assert_eq!(read, size * BATCH_SIZE);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_append_latency,
    bench_append_throughput,
    bench_dequeue_throughput,
);
criterion_main!(benches);
