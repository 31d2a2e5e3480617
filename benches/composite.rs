//! Benchmarks for bounded access through windows and composite views.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use shm_compose::memory::{
    AccessMode, CompositeView, MappedRegion, Placement, Protection, SegmentHandle, WindowMapper,
    page_size,
};
use std::hint::black_box;

fn bench_composite_write(c: &mut Criterion) {
    let page = page_size();
    let name = format!("/shm-compose-bench-{}", std::process::id());
    let handle = SegmentHandle::open(&name, AccessMode::ReadWriteCreate).unwrap();
    handle.set_length(page).unwrap();

    let mapper = WindowMapper::new();
    let room = mapper.reserve(2 * page).unwrap();
    let first = mapper
        .map(&handle, page, Protection::ReadWrite, room.placement_at(0))
        .unwrap();
    let second = mapper
        .map(
            &handle,
            page,
            Protection::ReadWrite,
            Placement::after(first.base_address(), first.len()),
        )
        .unwrap();
    let view = CompositeView::compose(&first, &second).unwrap();

    let mut group = c.benchmark_group("composite_write");
    for size in [64usize, 512, 2048] {
        let data = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("window", size), &data, |b, data| {
            b.iter(|| first.write_from(black_box(0), black_box(data)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("straddle", size), &data, |b, data| {
            let offset = page - size / 2;
            b.iter(|| view.write(black_box(offset), black_box(data)).unwrap())
        });
    }
    group.finish();

    drop(second);
    drop(first);
    let _ = SegmentHandle::unlink(&name);
}

fn bench_composite_read(c: &mut Criterion) {
    let page = page_size();
    let name = format!("/shm-compose-bench-read-{}", std::process::id());
    let handle = SegmentHandle::open(&name, AccessMode::ReadWriteCreate).unwrap();
    handle.set_length(page).unwrap();

    let mapper = WindowMapper::new();
    let room = mapper.reserve(2 * page).unwrap();
    let first = mapper
        .map(&handle, page, Protection::ReadWrite, room.placement_at(0))
        .unwrap();
    let second = mapper
        .map(&handle, page, Protection::ReadWrite, room.placement_at(page))
        .unwrap();
    let view = CompositeView::compose(&first, &second).unwrap();

    let mut buf = vec![0u8; 2048];
    c.bench_function("composite_read_straddle_2k", |b| {
        b.iter(|| view.read_into(black_box(page - 1024), &mut buf).unwrap())
    });

    let _ = SegmentHandle::unlink(&name);
}

criterion_group!(benches, bench_composite_write, bench_composite_read);
criterion_main!(benches);
