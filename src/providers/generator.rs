//! Synthetic waveform source

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, trace};

use crate::provider::{SampleBlock, SampleSource};
use crate::{Result, StreamError};

/// Shape of generated samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum Waveform {
    Sine { frequency: f64, amplitude: f64 },
    /// `index * step`
    Ramp { step: f64 },
    /// Sample index
    Counter,
}

impl Waveform {
    /// Value of sample `index` at `sample_rate`.
    pub fn value(&self, index: u64, sample_rate: f64) -> f64 {
        match *self {
            Waveform::Sine { frequency, amplitude } => {
                amplitude * (TAU * frequency * index as f64 / sample_rate).sin()
            }
            Waveform::Ramp { step } => index as f64 * step,
            Waveform::Counter => index as f64,
        }
    }
}

/// Generates `Float64` blocks of a [`Waveform`]
pub struct GeneratorSource {
    waveform: Waveform,
    sample_rate: f64,
    block_size: usize,
    produced: u64,
    /// Stop after this many samples
    sample_limit: Option<u64>,
    paced: bool,
    /// Block pacing interval, created on first use inside the runtime
    interval: Option<Interval>,
}

impl GeneratorSource {
    pub fn new(waveform: Waveform, sample_rate: f64, block_size: usize) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(StreamError::invalid_parameter(format!("sample rate must be positive, got {}", sample_rate)));
        }
        if block_size == 0 {
            return Err(StreamError::invalid_parameter("block size must be non-zero"));
        }
        debug!(?waveform, sample_rate, block_size, "Created generator source");
        Ok(Self { waveform, sample_rate, block_size, produced: 0, sample_limit: None, paced: false, interval: None })
    }

    /// Emit blocks in real time instead of as fast as possible.
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn with_sample_limit(mut self, samples: u64) -> Self {
        self.sample_limit = Some(samples);
        self
    }

    /// Samples generated so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn block_period(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate)
    }
}

#[async_trait::async_trait]
impl SampleSource for GeneratorSource {
    type Sample = f64;

    async fn next_block(&mut self) -> Result<Option<SampleBlock<f64>>> {
        let remaining = self.sample_limit.map_or(u64::MAX, |limit| limit.saturating_sub(self.produced));
        if remaining == 0 {
            debug!(produced = self.produced, "Generator reached its sample limit");
            return Ok(None);
        }

        if self.paced {
            let period = self.block_period();
            let ticker = self.interval.get_or_insert_with(|| {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });
            ticker.tick().await;
        }

        let count = remaining.min(self.block_size as u64);
        let samples = (self.produced..self.produced + count)
            .map(|index| self.waveform.value(index, self.sample_rate))
            .collect();
        self.produced += count;
        trace!(count, produced = self.produced, "Generated block");
        Ok(Some(SampleBlock::new(samples)))
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counter_honours_sample_limit() {
        let mut source = GeneratorSource::new(Waveform::Counter, 100.0, 4).unwrap().with_sample_limit(6);
        let first = source.next_block().await.unwrap().unwrap();
        assert_eq!(first.samples, vec![0.0, 1.0, 2.0, 3.0]);
        let second = source.next_block().await.unwrap().unwrap();
        assert_eq!(second.samples, vec![4.0, 5.0]);
        assert!(source.next_block().await.unwrap().is_none());
    }

    #[test]
    fn sine_hits_peak_at_quarter_period() {
        let sine = Waveform::Sine { frequency: 1.0, amplitude: 2.0 };
        assert!((sine.value(25, 100.0) - 2.0).abs() < 1e-12);
        assert!(sine.value(0, 100.0).abs() < 1e-12);
        assert_eq!(Waveform::Ramp { step: 0.5 }.value(4, 10.0), 2.0);
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(GeneratorSource::new(Waveform::Counter, 0.0, 4).is_err());
        assert!(GeneratorSource::new(Waveform::Counter, f64::NAN, 4).is_err());
        assert!(GeneratorSource::new(Waveform::Counter, 10.0, 0).is_err());
    }

    #[test]
    fn waveform_parses_from_yaml() {
        let waveform: Waveform = serde_yaml_ng::from_str("kind: sine\nfrequency: 50.0\namplitude: 1.5").unwrap();
        assert_eq!(waveform, Waveform::Sine { frequency: 50.0, amplitude: 1.5 });
    }
}
