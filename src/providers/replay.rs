//! Replay source for pre-recorded sample blocks

use std::collections::VecDeque;
use tokio::time::{Duration, sleep};
use tracing::{debug, trace};

use crate::provider::{SampleBlock, SampleSource};
use crate::types::Sample;

/// Replay source that hands out recorded blocks in order
pub struct ReplaySource<T> {
    /// Blocks not yet replayed
    blocks: VecDeque<SampleBlock<T>>,

    /// Nominal sample rate of the recording
    sample_rate: f64,

    /// Playback speed multiplier (1.0 = normal, 2.0 = double speed)
    speed: f64,

    /// Wait one block duration before each block
    paced: bool,

    replayed: usize,
}

impl<T: Sample> ReplaySource<T> {
    /// Create a replay source from recorded blocks
    pub fn new(blocks: Vec<SampleBlock<T>>, sample_rate: f64) -> Self {
        debug!(blocks = blocks.len(), sample_rate, "Created replay source");
        Self { blocks: blocks.into(), sample_rate, speed: 1.0, paced: false, replayed: 0 }
    }

    /// Split a flat recording into blocks of `block_size` scalars
    pub fn from_samples(samples: &[T], block_size: usize, sample_rate: f64) -> Self {
        let blocks = samples
            .chunks(block_size.max(1))
            .map(|chunk| SampleBlock::new(chunk.to_vec()))
            .collect();
        Self::new(blocks, sample_rate)
    }

    /// Replay at the recorded pace instead of as fast as possible
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Set playback speed
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.clamp(0.1, 10.0); // Clamp to reasonable range
        debug!("Playback speed set to {}x", self.speed);
    }

    pub fn remaining_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn replayed_blocks(&self) -> usize {
        self.replayed
    }

    /// Total duration of the remaining blocks in seconds
    pub fn remaining_duration(&self) -> f64 {
        let samples: usize = self.blocks.iter().map(|b| b.samples.len()).sum();
        samples as f64 / self.sample_rate
    }
}

#[async_trait::async_trait]
impl<T: Sample> SampleSource for ReplaySource<T> {
    type Sample = T;

    async fn next_block(&mut self) -> crate::Result<Option<SampleBlock<T>>> {
        let Some(block) = self.blocks.pop_front() else {
            debug!(replayed = self.replayed, "Reached end of replay");
            return Ok(None);
        };

        // Wait for the block's playback time
        if self.paced && self.sample_rate > 0.0 {
            let seconds = block.samples.len() as f64 / (self.sample_rate * self.speed);
            sleep(Duration::from_secs_f64(seconds)).await;
        }

        self.replayed += 1;
        trace!(block = self.replayed, samples = block.samples.len(), "Replayed block");
        Ok(Some(block))
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_recorded_order() {
        let mut source = ReplaySource::from_samples(&[1i32, 2, 3, 4, 5], 2, 10.0);
        assert_eq!(source.remaining_blocks(), 3);
        assert_eq!(source.next_block().await.unwrap().unwrap().samples, vec![1, 2]);
        assert_eq!(source.next_block().await.unwrap().unwrap().samples, vec![3, 4]);
        assert_eq!(source.next_block().await.unwrap().unwrap().samples, vec![5]);
        assert!(source.next_block().await.unwrap().is_none());
        assert_eq!(source.replayed_blocks(), 3);
    }

    #[tokio::test]
    async fn paced_replay_waits_block_duration() {
        let mut source = ReplaySource::from_samples(&[0.0f64; 20], 10, 100.0).paced(true);
        source.set_speed(2.0);
        let started = std::time::Instant::now();
        source.next_block().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn speed_is_clamped() {
        let mut source = ReplaySource::<f64>::new(Vec::new(), 10.0);
        source.set_speed(100.0);
        assert_eq!(source.speed, 10.0);
    }
}
