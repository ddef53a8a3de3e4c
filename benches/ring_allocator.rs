//! Benchmarks for the packet ring allocator
//!
//! Tests allocation churn for:
//! - Allocate, fill and drop in order (steady state FIFO reclaim)
//! - A sliding window of live packets, as held by a lagging reader

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use daqflow::PacketRingAllocator;
use daqflow::test_utils::{f64_descriptor, shared};
use std::collections::VecDeque;
use std::hint::black_box;
use std::sync::Arc;

const PACKET_SAMPLES: usize = 128;

fn bench_allocate_drop(c: &mut Criterion) {
    let descriptor = shared(f64_descriptor());
    let allocator = PacketRingAllocator::with_sample_capacity(PACKET_SAMPLES * 16, 8).expect("Allocator");
    let samples = vec![1.5f64; PACKET_SAMPLES];

    let mut group = c.benchmark_group("ring_allocator");
    group.throughput(Throughput::Bytes((PACKET_SAMPLES * 8) as u64));

    group.bench_function("allocate_fill_drop", |b| {
        b.iter(|| {
            let mut allocation =
                allocator.allocate(Arc::clone(&descriptor), PACKET_SAMPLES, None).expect("Allocate");
            allocation.writer.write_samples(black_box(&samples)).expect("Write");
            black_box(allocation.writer.finish().expect("Finish"))
        })
    });

    group.bench_function("sliding_window_of_8", |b| {
        let mut window = VecDeque::new();
        b.iter(|| {
            if window.len() == 8 {
                window.pop_front();
            }
            let mut allocation =
                allocator.allocate(Arc::clone(&descriptor), PACKET_SAMPLES, None).expect("Allocate");
            allocation.writer.write_samples(&samples).expect("Write");
            window.push_back(allocation.writer.finish().expect("Finish"));
            black_box(allocator.available())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_allocate_drop);
criterion_main!(benches);
