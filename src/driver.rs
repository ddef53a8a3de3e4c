//! Driver spawns and manages producer tasks

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::provider::{SampleBlock, SampleSource};
use crate::allocator::PacketRingAllocator;
use crate::config::DriverConfig;
use crate::connection::Signal;
use crate::types::{DataPacket, DataRule, EventPacket, Sample};
use crate::{Result, StreamError};

/// Running totals of one producer task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct DriverStats {
    pub blocks: u64,
    pub packets: u64,
    pub samples: u64,
    /// Samples dropped because the arena stayed full
    pub dropped_samples: u64,
    pub errors: u64,
    /// Domain tick of the next sample
    pub next_offset: i64,
}

/// Handle to a spawned producer task
pub struct DriverHandle {
    /// Receiver for statistics, updated after every block
    pub stats: watch::Receiver<DriverStats>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    task: JoinHandle<DriverStats>,
}

impl DriverHandle {
    /// Request shutdown. The task stops at its next await point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end and return its final statistics.
    pub async fn join(self) -> Result<DriverStats> {
        self.task
            .await
            .map_err(|e| StreamError::source_failed(format!("producer task failed: {}", e)))
    }
}

/// Driver spawns and manages producer tasks
///
/// Each task owns one [`SampleSource`] and publishes its blocks as
/// ring-allocated data packets on one [`Signal`], linking implicit domain
/// packets when the signal has a linear domain.
pub struct Driver;

impl Driver {
    /// Spawn a producer task with the default [`DriverConfig`]
    pub fn spawn<S>(source: S, signal: Signal, allocator: PacketRingAllocator) -> DriverHandle
    where
        S: SampleSource,
    {
        Self::spawn_with_config(source, signal, allocator, DriverConfig::default())
    }

    /// Spawn a producer task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_with_config<S>(
        source: S,
        signal: Signal,
        allocator: PacketRingAllocator,
        config: DriverConfig,
    ) -> DriverHandle
    where
        S: SampleSource,
    {
        let (stats_tx, stats_rx) = watch::channel(DriverStats::default());
        let cancel = CancellationToken::new();
        let cancel_task = cancel.clone();

        let producer = Producer { signal, allocator, config, stats: DriverStats::default() };
        let task = tokio::spawn(async move { Self::producer_task(source, producer, stats_tx, cancel_task).await });

        DriverHandle { stats: stats_rx, cancel, task }
    }

    /// Producer task - pulls blocks from the source and publishes packets
    async fn producer_task<S>(
        mut source: S,
        mut producer: Producer,
        stats_tx: watch::Sender<DriverStats>,
        cancel: CancellationToken,
    ) -> DriverStats
    where
        S: SampleSource,
    {
        let signal_name = producer.signal.descriptor().name.clone();
        info!(signal = %signal_name, rate = source.sample_rate(), "Producer task started");
        producer.check_rate(source.sample_rate());
        let mut error_count = 0u32;
        let max_errors = producer.config.max_errors.max(1);

        loop {
            // Check for cancellation between blocks
            if cancel.is_cancelled() {
                info!("Producer cancelled");
                break;
            }

            // Use select to allow cancellation while the source waits
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Producer cancelled during read");
                    break;
                }
                result = source.next_block() => result,
            };

            let outcome = match result {
                Ok(Some(block)) => producer.handle_block(block, &cancel).await,
                Ok(None) => {
                    info!(blocks = producer.stats.blocks, "Source exhausted");
                    break;
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    error_count = 0;
                    stats_tx.send_replace(producer.stats);
                }
                Err(e) => {
                    // Source or publish error - don't crash on transient failures
                    error_count += 1;
                    producer.stats.errors += 1;
                    error!("Producer error ({}/{}): {}", error_count, max_errors, e);

                    if error_count >= max_errors {
                        error!("Too many producer errors, shutting down");
                        break;
                    }

                    // Exponential backoff: 100ms, 200ms, 400ms, ...
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        stats_tx.send_replace(producer.stats);
        info!(
            signal = %signal_name,
            packets = producer.stats.packets,
            samples = producer.stats.samples,
            dropped = producer.stats.dropped_samples,
            "Producer task ended"
        );
        producer.stats
    }
}

struct Producer {
    signal: Signal,
    allocator: PacketRingAllocator,
    config: DriverConfig,
    stats: DriverStats,
}

impl Producer {
    fn check_rate(&self, source_rate: f64) {
        let domain_rate = self.signal.domain_descriptor().and_then(|d| d.sample_rate());
        if let Some(domain_rate) = domain_rate {
            if (domain_rate - source_rate).abs() > domain_rate * 1e-9 {
                warn!(domain_rate, source_rate, "Source rate differs from the domain rate");
            }
        }
    }

    /// Domain ticks per sample.
    fn domain_delta(&self) -> i64 {
        match self.signal.domain_descriptor().map(|d| d.rule) {
            Some(DataRule::Linear { delta, .. }) => delta,
            _ => 1,
        }
    }

    async fn handle_block<T: Sample>(&mut self, block: SampleBlock<T>, cancel: &CancellationToken) -> Result<()> {
        self.stats.blocks += 1;
        if let Some(descriptor) = block.descriptor {
            let descriptor = self.signal.set_descriptor(descriptor)?;
            debug!(sample_type = %descriptor.sample_type, "Source changed descriptor");
        }
        if let Some(gap) = block.gap {
            self.skip_ticks(gap);
        }
        self.publish(&block.samples, cancel).await
    }

    fn skip_ticks(&mut self, ticks: i64) {
        if ticks <= 0 {
            return;
        }
        self.stats.next_offset += ticks;
        self.signal.send_event(EventPacket::implicit_domain_gap(ticks));
        debug!(ticks, next_offset = self.stats.next_offset, "Domain gap");
    }

    /// Publish `samples`, splitting on adjusted-size grants and retrying while
    /// the arena is full.
    async fn publish<T: Sample>(&mut self, samples: &[T], cancel: &CancellationToken) -> Result<()> {
        let descriptor = self.signal.descriptor();
        let domain = self.signal.domain_descriptor();
        let delta = self.domain_delta();
        let elements = descriptor.elements_per_sample();
        let total = samples.len() / elements;

        let mut sent = 0;
        let mut retries = 0u32;
        while sent < total {
            let allocation = match self.allocator.allocate(Arc::clone(&descriptor), total - sent, None) {
                Ok(allocation) => {
                    retries = 0;
                    allocation
                }
                Err(StreamError::OutOfMemory { .. }) if retries < self.config.out_of_memory_retries => {
                    retries += 1;
                    trace!(retries, "Arena full, waiting for consumers");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(Duration::from_millis(self.config.out_of_memory_retry_ms)) => {}
                    }
                    continue;
                }
                Err(StreamError::OutOfMemory { .. }) => {
                    let dropped = total - sent;
                    warn!(dropped, "Arena stayed full, dropping samples");
                    self.stats.dropped_samples += dropped as u64;
                    self.skip_ticks(dropped as i64 * delta);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let mut writer = allocation.writer;
            let granted = writer.sample_count();
            writer.write_samples(&samples[sent * elements..(sent + granted) * elements])?;
            if let Some(domain) = &domain {
                writer.set_domain(Some(DataPacket::implicit(Arc::clone(domain), granted, self.stats.next_offset)?));
            }
            self.signal.send_packet(writer.finish()?)?;

            trace!(granted, offset = self.stats.next_offset, "Published packet");
            self.stats.next_offset += granted as i64 * delta;
            self.stats.packets += 1;
            self.stats.samples += granted as u64;
            sent += granted;
        }
        Ok(())
    }
}
