//! Source trait for the producer driver

use crate::Result;
use crate::types::{DataDescriptor, Sample};

/// One block of samples handed to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock<T> {
    /// Interleaved samples (`elements_per_sample` scalars each)
    pub samples: Vec<T>,
    /// Value descriptor taking effect with this block
    pub descriptor: Option<DataDescriptor>,
    /// Domain ticks skipped before this block
    pub gap: Option<i64>,
}

impl<T> SampleBlock<T> {
    pub fn new(samples: Vec<T>) -> Self {
        Self { samples, descriptor: None, gap: None }
    }

    /// Apply `descriptor` to this and every following block.
    pub fn with_descriptor(mut self, descriptor: DataDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    /// Mark `ticks` missing domain ticks before this block.
    pub fn with_gap(mut self, ticks: i64) -> Self {
        self.gap = Some(ticks);
        self
    }
}

/// Trait for sample producers driven by [`Driver`](crate::driver::Driver)
///
/// Sources abstract over devices, generators and recordings and handle their
/// own pacing internally.
#[async_trait::async_trait]
pub trait SampleSource: Send + 'static {
    /// Rust type of the produced samples
    type Sample: Sample;

    /// Get the next block of samples
    ///
    /// Returns:
    /// - `Ok(Some(block))` - New samples available
    /// - `Ok(None)` - Source exhausted (normal termination)
    /// - `Err(e)` - Error occurred; the driver backs off and retries
    ///
    /// Each source handles timing internally:
    /// - Generator: sleeps one block period
    /// - Replay: optionally waits for the recorded pacing
    /// - Stream: waits on the wrapped stream
    async fn next_block(&mut self) -> Result<Option<SampleBlock<Self::Sample>>>;

    /// Nominal sample rate in samples per second
    fn sample_rate(&self) -> f64;
}
