//! Fixed-size, optionally overlapping block reader

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::{
    Handoff, Reader, Shared, SignalReader, Transform, deadline, elements_per_sample, status_of,
};
use super::signal_reader::ReadProgress;
use crate::config::{BlockConfig, ReaderConfig};
use crate::connection::{Connection, Signal};
use crate::types::{ReadMode, ReadTimeoutType, ReaderStatus, Sample, SampleType, decode_samples};
use crate::Result;

/// Block window arithmetic.
///
/// With `overlap` percent, consecutive blocks share
/// `overlapped = floor(block_size * overlap / 100)` samples and each new block
/// advances the stream by `remainder = block_size - overlapped` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    block_size: usize,
    overlap: usize,
    overlapped: usize,
    remainder: usize,
}

impl BlockGeometry {
    /// Fails for a zero block size or an overlap of 100% or more, since a
    /// block could then never advance.
    pub fn new(block_size: usize, overlap: usize) -> Result<Self> {
        BlockConfig { block_size, overlap }.validate()?;
        let overlapped = block_size * overlap / 100;
        Ok(Self { block_size, overlap, overlapped, remainder: block_size - overlapped })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Overlap in percent.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Samples shared with the previous block.
    pub fn overlapped_block_size(&self) -> usize {
        self.overlapped
    }

    /// Samples each block advances by.
    pub fn remainder(&self) -> usize {
        self.remainder
    }

    /// Whole blocks contained in `sample_count` samples.
    pub fn available_block_count(&self, sample_count: usize) -> usize {
        if sample_count < self.block_size {
            return 0;
        }
        (sample_count - self.block_size) / self.remainder + 1
    }

    /// Samples required to produce `blocks` blocks.
    pub fn samples_needed(&self, blocks: usize) -> usize {
        if blocks == 0 {
            return 0;
        }
        blocks * self.remainder + self.overlapped
    }
}

/// Reads whole blocks of samples. Never delivers a partial block.
#[derive(Clone)]
pub struct BlockReader {
    shared: Arc<Shared>,
    geometry: BlockGeometry,
    timeout_type: ReadTimeoutType,
}

impl BlockReader {
    /// Reader with inferred types in scaled mode.
    pub fn new(signal: &Signal, block_size: usize, overlap: usize) -> Result<Self> {
        Self::from_config(signal, &ReaderConfig::default(), &BlockConfig { block_size, overlap })
    }

    pub fn with_types(
        signal: &Signal,
        block_size: usize,
        overlap: usize,
        value_type: Option<SampleType>,
        domain_type: Option<SampleType>,
        read_mode: ReadMode,
    ) -> Result<Self> {
        let config = ReaderConfig { value_type, domain_type, read_mode, ..ReaderConfig::default() };
        Self::from_config(signal, &config, &BlockConfig { block_size, overlap })
    }

    pub fn from_config(signal: &Signal, reader: &ReaderConfig, block: &BlockConfig) -> Result<Self> {
        let geometry = BlockGeometry::new(block.block_size, block.overlap)?;
        Ok(Self::attach(signal.connect(), reader, geometry))
    }

    /// Attach to an already connected input.
    pub fn from_connection(connection: Connection, reader: &ReaderConfig, block: &BlockConfig) -> Result<Self> {
        let geometry = BlockGeometry::new(block.block_size, block.overlap)?;
        Ok(Self::attach(connection, reader, geometry))
    }

    fn attach(connection: Connection, config: &ReaderConfig, geometry: BlockGeometry) -> Self {
        let reader = SignalReader::attach(connection, config.value_type, config.domain_type, config.read_mode);
        info!(
            block_size = geometry.block_size,
            overlap = geometry.overlap,
            value = ?reader.value_reader().read_type(),
            "Block reader attached"
        );
        Self { shared: Shared::new(reader), geometry, timeout_type: config.timeout_type }
    }

    /// Replace `old` with a block reader producing different types. `old`
    /// becomes invalid; unread packets carry over.
    pub fn from_existing(
        old: &impl Reader,
        value_type: Option<SampleType>,
        domain_type: Option<SampleType>,
        block_size: usize,
        overlap: usize,
    ) -> Result<Self> {
        let geometry = BlockGeometry::new(block_size, overlap)?;
        Ok(Self::from_handoff(old.hand_off()?, value_type, domain_type, geometry))
    }

    fn from_handoff(
        handoff: Handoff,
        value_type: Option<SampleType>,
        domain_type: Option<SampleType>,
        geometry: BlockGeometry,
    ) -> Self {
        let reader = SignalReader::from_handoff(handoff, value_type, domain_type);
        debug!(valid = reader.is_valid(), "Block reader created from existing reader");
        Self { shared: Shared::new(reader), geometry, timeout_type: ReadTimeoutType::All }
    }

    pub fn with_timeout_type(mut self, timeout_type: ReadTimeoutType) -> Self {
        self.timeout_type = timeout_type;
        self
    }

    pub fn geometry(&self) -> BlockGeometry {
        self.geometry
    }

    pub fn block_size(&self) -> usize {
        self.geometry.block_size
    }

    pub fn overlap(&self) -> usize {
        self.geometry.overlap
    }

    /// Whole blocks readable from `sample_count` samples.
    pub fn available_block_count(&self, sample_count: usize) -> usize {
        self.geometry.available_block_count(sample_count)
    }

    /// Read up to `blocks.len() / block_size` blocks. `read_count` of the
    /// returned status counts blocks.
    pub fn read<V: Sample>(&self, blocks: &mut [V], timeout: Duration) -> Result<ReaderStatus> {
        self.read_impl::<V, i64>(blocks, None, timeout)
    }

    /// Like [`read`](Self::read), also filling `domain` with one domain value per sample.
    pub fn read_with_domain<V: Sample, D: Sample>(
        &self,
        blocks: &mut [V],
        domain: &mut [D],
        timeout: Duration,
    ) -> Result<ReaderStatus> {
        self.read_impl(blocks, Some(domain), timeout)
    }

    fn read_impl<V: Sample, D: Sample>(
        &self,
        blocks: &mut [V],
        domain: Option<&mut [D]>,
        timeout: Duration,
    ) -> Result<ReaderStatus> {
        let geometry = self.geometry;
        let mut reader = self.shared.reader.lock();
        if !reader.is_valid() {
            return Ok(ReaderStatus::ignored());
        }
        let deadline = deadline(timeout);

        if reader.value_reader().read_type().is_none() && !timeout.is_zero() {
            self.shared
                .notifier
                .wait_until(&mut reader, deadline, |r| !r.is_valid() || !r.connection().is_empty());
            if !reader.is_valid() {
                return Ok(ReaderStatus::ignored());
            }
            reader.establish();
        }
        let elements = elements_per_sample::<V>(reader.value_reader(), "value")?;
        let value_block_len = geometry.block_size * elements;
        let mut count = blocks.len() / value_block_len;
        if let Some(domain) = domain.as_deref() {
            elements_per_sample::<D>(reader.domain_reader(), "domain")?;
            count = count.min(domain.len() / geometry.block_size);
        }
        if count == 0 {
            return Ok(ReaderStatus::ok(0, None));
        }

        if !timeout.is_zero() {
            let needed = match self.timeout_type {
                ReadTimeoutType::All => geometry.samples_needed(count),
                ReadTimeoutType::Any => geometry.block_size,
            };
            self.shared.notifier.wait_until(&mut reader, deadline, |r| {
                !r.is_valid() || r.available() >= needed || r.event_pending()
            });
            if !reader.is_valid() {
                return Ok(ReaderStatus::ignored());
            }
            // Another handle may have read past a descriptor change meanwhile.
            if elements_per_sample::<V>(reader.value_reader(), "value")? != elements {
                return Ok(ReaderStatus::ok(0, None));
            }
            if domain.is_some() {
                elements_per_sample::<D>(reader.domain_reader(), "domain")?;
            }
        }

        let ready = geometry.available_block_count(reader.available()).min(count);
        let value_block_bytes = value_block_len * V::SIZE;
        let domain_block_bytes = geometry.block_size * D::SIZE;
        let mut value_bytes = vec![0u8; ready * value_block_bytes];
        let mut domain_bytes = domain.as_ref().map(|_| vec![0u8; ready * domain_block_bytes]);

        let mut outcome = ReadProgress::default();
        let mut produced = 0;
        while produced < ready {
            let values_out = &mut value_bytes[produced * value_block_bytes..];
            let domain_out = domain_bytes
                .as_deref_mut()
                .map(|bytes| &mut bytes[produced * domain_block_bytes..]);
            let progress = reader.read_into(values_out, domain_out, geometry.block_size)?;
            if produced == 0 {
                outcome.first_domain = progress.first_domain;
            }
            if progress.event.is_some() || progress.read < geometry.block_size {
                if progress.event.is_none() {
                    reader.rewind(progress.read)?;
                }
                outcome.event = progress.event;
                break;
            }
            reader.rewind(geometry.overlapped)?;
            produced += 1;
        }
        reader.release_consumed();

        // Leftover samples before an event can never complete a block.
        if outcome.event.is_none()
            && produced < count
            && reader.is_valid()
            && reader.available() < geometry.block_size
            && reader.event_pending()
        {
            let discarded = reader.discard_until_event();
            trace!(discarded, "Dropped incomplete block before event");
            outcome.event = reader.take_event();
        }

        let values_len = produced * value_block_len;
        decode_samples(&value_bytes[..produced * value_block_bytes], &mut blocks[..values_len]);
        if let (Some(out), Some(bytes)) = (domain, domain_bytes) {
            let len = produced * geometry.block_size;
            decode_samples(&bytes[..len * D::SIZE], &mut out[..len]);
        }
        Ok(status_of(outcome, produced, reader.is_valid()))
    }

    /// Whole blocks readable before the next event.
    pub fn available_count(&self) -> usize {
        self.geometry.available_block_count(self.shared.reader.lock().available())
    }

    pub fn is_valid(&self) -> bool {
        self.shared.reader.lock().is_valid()
    }

    pub fn invalidate(&self) {
        self.shared.invalidate();
    }

    pub fn value_read_type(&self) -> Option<SampleType> {
        self.shared.reader.lock().value_reader().read_type()
    }

    pub fn domain_read_type(&self) -> Option<SampleType> {
        self.shared.reader.lock().domain_reader().read_type()
    }

    pub fn set_value_transform(&self, transform: Option<Transform>) {
        self.shared.reader.lock().value_reader_mut().set_transform(transform);
    }

    pub fn set_domain_transform(&self, transform: Option<Transform>) {
        self.shared.reader.lock().domain_reader_mut().set_transform(transform);
    }
}

impl Reader for BlockReader {
    fn available_count(&self) -> usize {
        BlockReader::available_count(self)
    }

    fn is_valid(&self) -> bool {
        BlockReader::is_valid(self)
    }

    fn invalidate(&self) {
        BlockReader::invalidate(self)
    }

    fn hand_off(&self) -> Result<Handoff> {
        self.shared.hand_off()
    }
}

impl std::fmt::Debug for BlockReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockReader")
            .field("geometry", &self.geometry)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::StreamReader;
    use crate::test_utils::{domain_signal, f64_descriptor, send_ramp};
    use crate::StreamError;
    use crate::types::{EventPacket, ReadStatus};
    use proptest::prelude::*;

    fn ramp_signal() -> Signal {
        Signal::with_domain(f64_descriptor(), domain_signal(1000)).unwrap()
    }

    #[test]
    fn full_overlap_is_rejected() {
        let signal = ramp_signal();
        let err = BlockReader::new(&signal, 10, 100).unwrap_err();
        assert!(matches!(err, StreamError::InvalidParameter { .. }));
        assert!(BlockReader::new(&signal, 0, 0).is_err());
    }

    #[test]
    fn half_overlap_geometry() {
        let geometry = BlockGeometry::new(100, 50).unwrap();
        assert_eq!(geometry.overlapped_block_size(), 50);
        assert_eq!(geometry.remainder(), 50);
        assert_eq!(geometry.samples_needed(1), 100);
        assert_eq!(geometry.samples_needed(3), 200);
        assert_eq!(geometry.available_block_count(99), 0);
        assert_eq!(geometry.available_block_count(100), 1);
        assert_eq!(geometry.available_block_count(149), 1);
        assert_eq!(geometry.available_block_count(150), 2);
    }

    #[test]
    fn overlapped_block_rewinds_for_next_call() {
        let _ = tracing_subscriber::fmt::try_init();
        let signal = ramp_signal();
        let reader = BlockReader::new(&signal, 100, 50).unwrap();
        send_ramp(&signal, 0, 60);
        send_ramp(&signal, 60, 40);

        let mut block = vec![0f64; 100];
        let status = reader.read(&mut block, Duration::ZERO).unwrap();
        assert!(status.is_ok());
        assert_eq!(status.read_count, 1);
        assert_eq!(block[0], 0.0);
        assert_eq!(block[99], 99.0);
        assert_eq!(reader.available_count(), 0);

        send_ramp(&signal, 100, 50);
        let mut domain = vec![0i64; 100];
        let status = reader.read_with_domain(&mut block, &mut domain, Duration::ZERO).unwrap();
        assert_eq!(status.read_count, 1);
        assert_eq!(status.offset, Some(50));
        assert_eq!(block[0], 50.0);
        assert_eq!(block[99], 149.0);
        assert_eq!(domain[0], 50);
    }

    #[test]
    fn never_emits_partial_blocks() {
        let signal = ramp_signal();
        let reader = BlockReader::new(&signal, 4, 0).unwrap();
        send_ramp(&signal, 0, 10);

        let mut blocks = vec![-1f64; 12];
        let status = reader.read(&mut blocks, Duration::from_millis(10)).unwrap();
        assert_eq!(status.read_count, 2);
        assert_eq!(&blocks[..8], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(&blocks[8..], &[-1.0; 4]);
        assert_eq!(reader.available_count(), 0);
    }

    #[test]
    fn incomplete_block_before_event_is_dropped() {
        let signal = ramp_signal();
        let reader = BlockReader::new(&signal, 4, 0).unwrap();
        send_ramp(&signal, 0, 6);
        signal.send_event(EventPacket::implicit_domain_gap(2));
        send_ramp(&signal, 8, 4);

        let mut blocks = vec![0f64; 8];
        let status = reader.read(&mut blocks, Duration::ZERO).unwrap();
        assert_eq!(status.status, ReadStatus::Event);
        assert_eq!(status.read_count, 1);
        assert_eq!(status.event, Some(EventPacket::implicit_domain_gap(2)));

        let status = reader.read(&mut blocks, Duration::ZERO).unwrap();
        assert_eq!(status.read_count, 1);
        assert_eq!(blocks[0], 8.0);
    }

    #[test]
    fn replaces_stream_reader() {
        let signal = ramp_signal();
        let stream = StreamReader::new(&signal);
        send_ramp(&signal, 0, 8);
        let block = BlockReader::from_existing(&stream, Some(SampleType::Int32), None, 4, 50).unwrap();
        assert!(!stream.is_valid());
        assert_eq!(block.available_count(), 3);

        let mut out = vec![0i32; 12];
        let status = block.read(&mut out, Duration::ZERO).unwrap();
        assert_eq!(status.read_count, 3);
        assert_eq!(out, [0, 1, 2, 3, 2, 3, 4, 5, 4, 5, 6, 7]);
    }

    proptest! {
        #[test]
        fn prop_short_input_yields_no_block(block_size in 1usize..512, overlap in 0usize..100, samples in 0usize..512) {
            let geometry = BlockGeometry::new(block_size, overlap).unwrap();
            if samples < block_size {
                prop_assert_eq!(geometry.available_block_count(samples), 0);
            }
        }

        #[test]
        fn prop_zero_overlap_is_plain_division(block_size in 1usize..512, samples in 0usize..100_000) {
            let geometry = BlockGeometry::new(block_size, 0).unwrap();
            prop_assert_eq!(geometry.available_block_count(samples), samples / block_size);
        }

        #[test]
        fn prop_needed_samples_fit_exactly(block_size in 1usize..256, overlap in 0usize..100, blocks in 1usize..64) {
            let geometry = BlockGeometry::new(block_size, overlap).unwrap();
            let needed = geometry.samples_needed(blocks);
            prop_assert_eq!(geometry.available_block_count(needed), blocks);
            prop_assert!(geometry.available_block_count(needed - 1) < blocks);
        }
    }

    #[test]
    fn invalidate_releases_blocked_block_read() {
        let signal = ramp_signal();
        let reader = BlockReader::new(&signal, 4, 0).unwrap();
        send_ramp(&signal, 0, 2);

        let mut blocks = [-1f64; 8];
        let (status, invalidate_took) = std::thread::scope(|scope| {
            let canceller = scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(50));
                let begun = std::time::Instant::now();
                reader.invalidate();
                begun.elapsed()
            });
            let status = reader.read(&mut blocks, Duration::from_secs(5)).unwrap();
            (status, canceller.join().unwrap())
        });

        assert!(invalidate_took < Duration::from_millis(500));
        assert_eq!(status.status, ReadStatus::Ignored);
        assert!(!status.valid);
        assert_eq!(blocks, [-1.0; 8]);
        assert!(!reader.is_valid());
    }
}
