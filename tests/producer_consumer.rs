//! Producer/consumer tests across threads
//!
//! Producers append packets from their own threads while readers block on
//! their notifier; every sample must arrive exactly once and in order.

mod common;

use daqflow::reader::{BlockReader, StreamReader};
use common::{domain_signal, f64_descriptor, send_ramp};
use daqflow::types::ReadTimeoutType;
use daqflow::{
    AllocationStatus, DataPacket, Driver, PacketRingAllocator, ReadStatus, SampleBlock, Signal,
    providers::ReplaySource,
};
use std::thread;
use std::time::Duration;

const TOTAL: usize = 10_000;
const PACKET: usize = 37;

fn ramp_signal(rate: i64) -> Signal {
    Signal::with_domain(f64_descriptor(), domain_signal(rate)).expect("signal")
}

fn spawn_ramp_producer(signal: Signal) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut sent = 0;
        while sent < TOTAL {
            let count = PACKET.min(TOTAL - sent);
            send_ramp(&signal, sent as i64, count);
            sent += count;
            if sent % (PACKET * 10) == 0 {
                thread::sleep(Duration::from_millis(1));
            }
        }
    })
}

#[test]
fn stream_reader_sees_every_sample_in_order() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let signal = ramp_signal(1000);
    let reader = StreamReader::new(&signal).with_timeout_type(ReadTimeoutType::Any);
    let producer = spawn_ramp_producer(signal.clone());

    let mut expected = 0.0;
    let mut buffer = [0f64; 256];
    let mut received = 0;
    while received < TOTAL {
        let status = reader.read(&mut buffer, Duration::from_secs(5))?;
        assert_eq!(status.status, ReadStatus::Ok);
        assert!(status.read_count > 0, "timed out after {} samples", received);
        for value in &buffer[..status.read_count] {
            assert_eq!(*value, expected);
            expected += 1.0;
        }
        received += status.read_count;
    }

    producer.join().expect("producer thread");
    assert_eq!(reader.available_count(), 0);
    Ok(())
}

#[test]
fn block_reader_waits_for_full_blocks() -> anyhow::Result<()> {
    let signal = ramp_signal(1000);
    let reader = BlockReader::new(&signal, 100, 25)?.with_timeout_type(ReadTimeoutType::Any);
    let producer = spawn_ramp_producer(signal.clone());

    let mut blocks = vec![0f64; 100 * 4];
    let mut domain = vec![0i64; 100 * 4];
    let mut next_start = 0i64;
    let mut total_blocks = 0;
    let expected_blocks = reader.available_block_count(TOTAL);
    while total_blocks < expected_blocks {
        let status = reader.read_with_domain(&mut blocks, &mut domain, Duration::from_secs(5))?;
        assert!(status.read_count > 0);
        for block in 0..status.read_count {
            assert_eq!(domain[block * 100], next_start);
            assert_eq!(blocks[block * 100 + 99], (next_start + 99) as f64);
            next_start += 75;
        }
        total_blocks += status.read_count;
    }

    producer.join().expect("producer thread");
    Ok(())
}

#[test]
fn slow_consumer_backpressures_allocator() -> anyhow::Result<()> {
    let signal = ramp_signal(1000);
    let reader = StreamReader::new(&signal);
    let allocator = PacketRingAllocator::with_sample_capacity(64, 8)?;
    let descriptor = signal.descriptor();

    let mut allocation = allocator.allocate(descriptor.clone(), 48, None)?;
    assert_eq!(allocation.status, AllocationStatus::Ok);
    allocation.writer.write_samples(&[0.0f64; 48])?;
    let domain = DataPacket::implicit(signal.domain_descriptor().expect("domain"), 48, 0)?;
    allocation.writer.set_domain(Some(domain));
    signal.send_packet(allocation.writer.finish()?)?;

    let second = allocator.allocate(descriptor.clone(), 32, None)?;
    assert_eq!(second.status, AllocationStatus::AdjustedSize { requested: 32, granted: 16 });
    drop(second);
    assert!(allocator.allocate(descriptor.clone(), 32, None).is_err());

    let mut values = [0f64; 48];
    reader.read(&mut values, Duration::ZERO)?;
    assert_eq!(allocator.live_allocations(), 0);
    assert_eq!(allocator.allocate(descriptor, 32, None)?.status, AllocationStatus::Ok);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn driver_feeds_blocking_reader() -> anyhow::Result<()> {
    let signal = ramp_signal(1000);
    let reader = StreamReader::new(&signal);
    let allocator = PacketRingAllocator::with_sample_capacity(4096, 8)?;

    let blocks: Vec<SampleBlock<f64>> = (0..50)
        .map(|i| SampleBlock::new((0..40).map(|j| f64::from(i * 40 + j)).collect()))
        .collect();
    let driver = Driver::spawn(ReplaySource::new(blocks, 1000.0), signal.clone(), allocator.clone());

    let (values, status) = reader.read_async::<f64>(2000, Duration::from_secs(10)).await?;
    assert_eq!(status.read_count, 2000);
    assert!(values.iter().enumerate().all(|(i, v)| *v == i as f64));

    let stats = driver.join().await?;
    assert_eq!(stats.samples, 2000);
    assert_eq!(stats.dropped_samples, 0);
    Ok(())
}
