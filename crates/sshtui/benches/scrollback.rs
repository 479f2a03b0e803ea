//! Performance benchmarks for scrollback handling.
//!
//! These benchmarks measure the hot paths of a busy session:
//! - Appending pty output chunks under the byte ceiling
//! - Building pager lines and searching them

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sshtui::session::{ScrollbackBuffer, PTY_READ_BUFFER_SIZE};
use sshtui::ui::{Pager, PagerCommand};

fn output_chunk(len: usize) -> Vec<u8> {
    b"drwxr-xr-x  2 deploy deploy 4096 Oct 19 12:00 releases\n"
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

/// Benchmark appends with and without truncation.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("scrollback_append");
    let chunk = output_chunk(PTY_READ_BUFFER_SIZE);
    group.throughput(Throughput::Bytes(chunk.len() as u64));

    group.bench_function("below_limit_4KB", |b| {
        b.iter_batched(
            || ScrollbackBuffer::with_limit(64 * 1024 * 1024),
            |mut buffer| {
                buffer.append(black_box(&chunk));
                buffer
            },
            criterion::BatchSize::SmallInput,
        );
    });

    // Steady state of a full 1 MiB buffer: every append truncates.
    let mut full = ScrollbackBuffer::new();
    for _ in 0..(full.limit() / chunk.len() + 1) {
        full.append(&chunk);
    }
    group.bench_function("at_limit_4KB", |b| {
        b.iter(|| full.append(black_box(&chunk)));
    });

    group.finish();
}

/// Benchmark turning a full buffer into pager lines and searching them.
fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("scrollback_search");

    let mut buffer = ScrollbackBuffer::new();
    let chunk = output_chunk(PTY_READ_BUFFER_SIZE);
    while buffer.len() < buffer.limit() {
        buffer.append(&chunk);
    }
    group.throughput(Throughput::Bytes(buffer.len() as u64));

    group.bench_function("snapshot_lines_1MB", |b| {
        b.iter(|| black_box(&buffer).snapshot_lines());
    });

    let lines = buffer.snapshot_lines();
    let search = PagerCommand::parse("/RELEASES");
    group.bench_function("search_1MB", |b| {
        b.iter(|| {
            let mut pager = Pager::new("bench", lines.clone(), 20);
            pager.apply(black_box(&search));
            pager.matches().len()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_append, bench_search);
criterion_main!(benches);
