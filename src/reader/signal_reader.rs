//! Single-signal read state machine
//!
//! A [`SignalReader`] owns one [`Connection`] and a pair of [`TypedReader`]s
//! (value and domain). It walks the queued packets with a cursor, converts
//! samples on request, applies descriptor changes in-band and tracks
//! synchronization against a shared domain start.
//!
//! Data packets pulled off the connection are kept in a small window until
//! the cursor has moved past them and [`SignalReader::release_consumed`] is
//! called, which lets block readers rewind into already read packets.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::sync::SyncState;
use super::typed::{TypedReader, TypedReaderState};
use crate::connection::Connection;
use crate::types::{DataDescriptor, DataPacket, EventPacket, Packet, ReadMode, SampleType};
use crate::{Result, StreamError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    /// Index into the window
    packet: usize,
    /// Next unread sample of that packet
    sample: usize,
}

/// Unread state of an invalidated reader, taken over by its replacement.
#[derive(Debug)]
pub struct Handoff {
    connection: Connection,
    read_mode: ReadMode,
    value_descriptor: Option<Arc<DataDescriptor>>,
    domain_descriptor: Option<Arc<DataDescriptor>>,
    window: VecDeque<DataPacket>,
    cursor: Cursor,
}

impl Handoff {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }
}

/// What lies at the read cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Next {
    Data,
    Event,
    Empty,
}

/// Outcome of [`SignalReader::read_into`].
#[derive(Debug, Default)]
pub(crate) struct ReadProgress {
    pub read: usize,
    pub event: Option<EventPacket>,
    /// Domain value of the first sample read
    pub first_domain: Option<i64>,
}

pub(crate) struct SignalReader {
    connection: Connection,
    value: TypedReader,
    domain: TypedReader,
    read_mode: ReadMode,
    value_descriptor: Option<Arc<DataDescriptor>>,
    domain_descriptor: Option<Arc<DataDescriptor>>,
    window: VecDeque<DataPacket>,
    cursor: Cursor,
    invalid: bool,
    sync: SyncState,
    dropped_samples: u64,
    handed_off: bool,
}

impl SignalReader {
    /// Attach to `connection`, establishing the initial descriptors from the
    /// front of the queue.
    pub(crate) fn attach(
        connection: Connection,
        value_type: Option<SampleType>,
        domain_type: Option<SampleType>,
        read_mode: ReadMode,
    ) -> Self {
        let mut reader = Self {
            connection,
            value: TypedReader::new(value_type, read_mode),
            domain: TypedReader::new(domain_type, read_mode),
            read_mode,
            value_descriptor: None,
            domain_descriptor: None,
            window: VecDeque::new(),
            cursor: Cursor::default(),
            invalid: false,
            sync: SyncState::Unsynchronized,
            dropped_samples: 0,
            handed_off: false,
        };
        reader.establish();
        reader
    }

    /// Continue reading where an invalidated reader stopped.
    pub(crate) fn from_handoff(
        handoff: Handoff,
        value_type: Option<SampleType>,
        domain_type: Option<SampleType>,
    ) -> Self {
        let read_mode = handoff.read_mode;
        let mut reader = Self {
            connection: handoff.connection,
            value: TypedReader::new(value_type, read_mode),
            domain: TypedReader::new(domain_type, read_mode),
            read_mode,
            value_descriptor: handoff.value_descriptor,
            domain_descriptor: handoff.domain_descriptor,
            window: handoff.window,
            cursor: handoff.cursor,
            invalid: false,
            sync: SyncState::Unsynchronized,
            dropped_samples: 0,
            handed_off: false,
        };
        let mut valid = true;
        if let Some(descriptor) = reader.value_descriptor.clone() {
            valid &= reader.value.infer_from_descriptor(&descriptor, read_mode);
        }
        if let Some(descriptor) = reader.domain_descriptor.clone() {
            valid &= reader.domain.infer_from_descriptor(&descriptor, read_mode);
        }
        if !valid {
            debug!("Replacement reader is not compatible with the current descriptors");
            reader.invalid = true;
        }
        reader.establish();
        reader
    }

    /// Invalidate this reader and move its unread state out.
    pub(crate) fn hand_off(&mut self) -> Result<Handoff> {
        if self.handed_off {
            return Err(StreamError::invalid_state("reader was already replaced"));
        }
        self.handed_off = true;
        self.release_consumed();
        let handoff = Handoff {
            connection: self.connection.clone(),
            read_mode: self.read_mode,
            value_descriptor: self.value_descriptor.clone(),
            domain_descriptor: self.domain_descriptor.clone(),
            window: std::mem::take(&mut self.window),
            cursor: std::mem::take(&mut self.cursor),
        };
        self.invalidate();
        debug!(unread = handoff.window.len(), "Reader handed off its connection");
        Ok(handoff)
    }

    /// Pull descriptors from the front of the queue if none are known yet.
    pub(crate) fn establish(&mut self) {
        if self.value.state() != TypedReaderState::Undefined || self.invalid {
            return;
        }
        match self.connection.peek() {
            Some(Packet::Event(event)) if event.is_descriptor_changed() => {
                self.connection.dequeue();
                self.apply_event(&event);
            }
            Some(Packet::Data(packet)) => self.infer_from_packet(&packet),
            _ => {}
        }
    }

    fn infer_from_packet(&mut self, packet: &DataPacket) {
        let mut valid = true;
        if self.value.state() == TypedReaderState::Undefined {
            self.value_descriptor = Some(Arc::clone(packet.descriptor()));
            valid &= self.value.infer_from_descriptor(packet.descriptor(), self.read_mode);
        }
        if let Some(domain) = packet.domain_packet() {
            if self.domain.state() == TypedReaderState::Undefined {
                self.domain_descriptor = Some(Arc::clone(domain.descriptor()));
                valid &= self.domain.infer_from_descriptor(domain.descriptor(), self.read_mode);
            }
        }
        if !valid {
            self.invalidate();
        }
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    pub(crate) fn is_valid(&self) -> bool {
        !self.invalid
    }

    pub(crate) fn invalidate(&mut self) {
        if !self.invalid {
            debug!("Signal reader invalidated");
        }
        self.invalid = true;
        self.window.clear();
        self.cursor = Cursor::default();
    }

    pub(crate) fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    pub(crate) fn value_reader(&self) -> &TypedReader {
        &self.value
    }

    pub(crate) fn value_reader_mut(&mut self) -> &mut TypedReader {
        &mut self.value
    }

    pub(crate) fn domain_reader(&self) -> &TypedReader {
        &self.domain
    }

    pub(crate) fn domain_reader_mut(&mut self) -> &mut TypedReader {
        &mut self.domain
    }

    pub(crate) fn value_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.value_descriptor.as_ref()
    }

    pub(crate) fn domain_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.domain_descriptor.as_ref()
    }

    pub(crate) fn sync_state(&self) -> SyncState {
        self.sync
    }

    pub(crate) fn reset_sync(&mut self) {
        self.sync = SyncState::Unsynchronized;
    }

    pub(crate) fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    /// Unread samples already pulled into the window.
    fn window_remaining(&self) -> usize {
        self.window
            .iter()
            .skip(self.cursor.packet)
            .map(DataPacket::sample_count)
            .sum::<usize>()
            .saturating_sub(self.cursor.sample)
    }

    /// Samples readable before the next event packet.
    pub(crate) fn available(&self) -> usize {
        if self.invalid {
            return 0;
        }
        self.window_remaining() + self.connection.available_samples(false)
    }

    /// Whether an event packet is queued and will stop the next long read.
    pub(crate) fn event_pending(&self) -> bool {
        self.connection.has_event_packet()
    }

    /// Move the cursor onto the next unread sample, pulling data packets from
    /// the connection as needed. Event packets are left in the queue.
    pub(crate) fn advance_to_data(&mut self) -> Next {
        loop {
            if let Some(packet) = self.window.get(self.cursor.packet) {
                if self.cursor.sample < packet.sample_count() {
                    return Next::Data;
                }
                self.cursor.packet += 1;
                self.cursor.sample = 0;
                continue;
            }
            match self.connection.peek() {
                None => return Next::Empty,
                Some(Packet::Event(_)) => return Next::Event,
                Some(Packet::Data(_)) => {
                    if let Some(Packet::Data(packet)) = self.connection.dequeue() {
                        self.infer_from_packet(&packet);
                        trace!(id = packet.id(), samples = packet.sample_count(), "Pulled data packet");
                        self.window.push_back(packet);
                    }
                }
            }
        }
    }

    /// Dequeue and apply the event at the front of the queue.
    pub(crate) fn take_event(&mut self) -> Option<EventPacket> {
        match self.connection.peek() {
            Some(Packet::Event(_)) => {}
            _ => return None,
        }
        let Some(Packet::Event(event)) = self.connection.dequeue() else {
            return None;
        };
        self.apply_event(&event);
        Some(event)
    }

    fn apply_event(&mut self, event: &EventPacket) {
        match event {
            EventPacket::DataDescriptorChanged { value_descriptor, domain_descriptor } => {
                self.window.clear();
                self.cursor = Cursor::default();
                self.sync = SyncState::Unsynchronized;

                let mut valid = true;
                if let Some(descriptor) = value_descriptor {
                    self.value_descriptor = Some(Arc::clone(descriptor));
                    valid &= self.value.handle_descriptor_changed(descriptor, self.read_mode);
                }
                if let Some(descriptor) = domain_descriptor {
                    self.domain_descriptor = Some(Arc::clone(descriptor));
                    valid &= self.domain.handle_descriptor_changed(descriptor, self.read_mode);
                }

                if valid {
                    debug!(
                        value = ?self.value.read_type(),
                        domain = ?self.domain.read_type(),
                        "Descriptor changed"
                    );
                } else {
                    self.invalidate();
                }
            }
            EventPacket::ImplicitDomainGapDetected { gap } => {
                debug!(gap, "Implicit domain gap detected");
                self.sync = SyncState::Unsynchronized;
            }
        }
    }

    /// Drop window packets entirely behind the cursor.
    pub(crate) fn release_consumed(&mut self) {
        while let Some(packet) = self.window.get(self.cursor.packet) {
            if self.cursor.sample < packet.sample_count() {
                break;
            }
            self.cursor.packet += 1;
            self.cursor.sample = 0;
        }
        let consumed = self.cursor.packet.min(self.window.len());
        self.window.drain(..consumed);
        self.cursor.packet -= consumed;
    }

    /// Step the cursor back `samples` samples, possibly into earlier window packets.
    pub(crate) fn rewind(&mut self, mut samples: usize) -> Result<()> {
        while samples > 0 {
            if self.cursor.sample >= samples {
                self.cursor.sample -= samples;
                return Ok(());
            }
            samples -= self.cursor.sample;
            if self.cursor.packet == 0 {
                return Err(StreamError::invalid_state("cannot rewind past released packets"));
            }
            self.cursor.packet -= 1;
            self.cursor.sample = self.window[self.cursor.packet].sample_count();
        }
        Ok(())
    }

    /// Throw away unread samples up to the next event packet. Returns the
    /// number of samples discarded.
    pub(crate) fn discard_until_event(&mut self) -> usize {
        let mut discarded = self.window_remaining();
        self.window.clear();
        self.cursor = Cursor::default();
        while let Some(Packet::Data(packet)) = self.connection.peek() {
            discarded += packet.sample_count();
            self.connection.dequeue();
        }
        if discarded > 0 {
            trace!(discarded, "Discarded samples preceding event");
        }
        discarded
    }

    /// Read up to `count` samples into `values` (and `domain`, when given),
    /// stopping early at an event packet or when the queue runs dry.
    ///
    /// Buffers must hold `count` samples of the value (and domain) reader's
    /// sample size.
    pub(crate) fn read_into(
        &mut self,
        values: &mut [u8],
        mut domain: Option<&mut [u8]>,
        count: usize,
    ) -> Result<ReadProgress> {
        let mut progress = ReadProgress::default();

        while progress.read < count && !self.invalid {
            match self.advance_to_data() {
                Next::Empty => break,
                Next::Event => {
                    progress.event = self.take_event();
                    break;
                }
                Next::Data => {}
            }
            if self.invalid {
                break;
            }

            let packet = self.window[self.cursor.packet].clone();
            let offset = self.cursor.sample;
            let n = (packet.sample_count() - offset).min(count - progress.read);

            if let Some(domain_out) = domain.as_deref_mut() {
                let Some(domain_packet) = packet.domain_packet() else {
                    if progress.read == 0 {
                        return Err(StreamError::invalid_state("data packet has no linked domain packet"));
                    }
                    warn!(read = progress.read, "Domain packet missing, stopping read early");
                    break;
                };
                let size = self.domain.sample_size().ok_or_else(|| {
                    StreamError::invalid_state("domain descriptor is not known")
                })?;
                self.domain.read_data(domain_packet.data(), offset, &mut domain_out[progress.read * size..], n)?;
            }

            let size = self.value.sample_size().ok_or_else(|| {
                StreamError::invalid_state("value descriptor is not known")
            })?;
            self.value.read_data(packet.data(), offset, &mut values[progress.read * size..], n)?;

            if progress.read == 0 {
                progress.first_domain = packet.domain_packet().and_then(|d| d.value_i64(offset));
            }
            self.cursor.sample += n;
            progress.read += n;
        }

        trace!(read = progress.read, requested = count, event = progress.event.is_some(), "Read samples");
        Ok(progress)
    }

    /// Domain value of the sample under the cursor, pulling a packet if needed.
    pub(crate) fn current_domain_value(&mut self) -> Option<i64> {
        if self.advance_to_data() != Next::Data {
            return None;
        }
        let packet = &self.window[self.cursor.packet];
        packet.domain_packet()?.value_i64(self.cursor.sample)
    }

    /// Skip samples whose domain value precedes `target` (in this signal's own
    /// domain ticks). The first sample at or after `target` becomes the sync point.
    pub(crate) fn synchronize(&mut self, target: i64) -> SyncState {
        if self.invalid {
            return self.sync;
        }
        loop {
            if self.advance_to_data() != Next::Data {
                self.sync = SyncState::Synchronizing;
                return self.sync;
            }
            let packet = self.window[self.cursor.packet].clone();
            let Some(domain) = packet.domain_packet() else {
                warn!("Cannot synchronize a packet without domain");
                self.invalidate();
                return self.sync;
            };

            let start = self.cursor.sample;
            let end = packet.sample_count();
            let index = first_at_or_after(domain, start, end, target);
            self.dropped_samples += (index - start) as u64;
            self.cursor.sample = index;

            if index < end {
                self.sync = SyncState::Synchronized;
                self.release_consumed();
                trace!(target, index, dropped = self.dropped_samples, "Signal synchronized");
                return self.sync;
            }
            self.release_consumed();
        }
    }
}

/// First index in `lo..hi` whose domain value is `>= target`, or `hi`.
fn first_at_or_after(domain: &DataPacket, mut lo: usize, mut hi: usize, target: i64) -> usize {
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match domain.value_i64(mid) {
            Some(value) if value < target => lo = mid + 1,
            _ => hi = mid,
        }
    }
    lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Signal;
    use crate::test_utils::{domain_signal, f64_descriptor, send_ramp};
    use crate::types::{decode_samples, EventPacket};

    fn read_f64(reader: &mut SignalReader, count: usize) -> (Vec<f64>, ReadProgress) {
        let mut bytes = vec![0u8; count * 8];
        let progress = reader.read_into(&mut bytes, None, count).unwrap();
        let mut values = vec![0f64; progress.read];
        decode_samples(&bytes, &mut values);
        (values, progress)
    }

    #[test]
    fn attach_consumes_initial_descriptor_event() {
        let signal = Signal::with_domain(f64_descriptor(), domain_signal(1000)).unwrap();
        let reader = SignalReader::attach(signal.connect(), None, None, ReadMode::Scaled);
        assert_eq!(reader.value_reader().read_type(), Some(SampleType::Float64));
        assert_eq!(reader.domain_reader().read_type(), Some(SampleType::Int64));
        assert!(reader.connection().is_empty());
    }

    #[test]
    fn resumes_mid_packet_and_spans_packets() {
        let signal = Signal::with_domain(f64_descriptor(), domain_signal(1000)).unwrap();
        let mut reader = SignalReader::attach(signal.connect(), None, None, ReadMode::Scaled);
        send_ramp(&signal, 0, 4);
        send_ramp(&signal, 4, 4);

        let (first, progress) = read_f64(&mut reader, 3);
        assert_eq!(first, [0.0, 1.0, 2.0]);
        assert_eq!(progress.first_domain, Some(0));

        let (second, progress) = read_f64(&mut reader, 4);
        assert_eq!(second, [3.0, 4.0, 5.0, 6.0]);
        assert_eq!(progress.first_domain, Some(3));
        assert_eq!(reader.available(), 1);
    }

    #[test]
    fn rewind_steps_back_across_packet_boundary() {
        let signal = Signal::with_domain(f64_descriptor(), domain_signal(1000)).unwrap();
        let mut reader = SignalReader::attach(signal.connect(), None, None, ReadMode::Scaled);
        send_ramp(&signal, 0, 3);
        send_ramp(&signal, 3, 3);

        let (values, _) = read_f64(&mut reader, 4);
        assert_eq!(values, [0.0, 1.0, 2.0, 3.0]);
        reader.rewind(2).unwrap();
        reader.release_consumed();
        let (values, _) = read_f64(&mut reader, 4);
        assert_eq!(values, [2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn gap_event_is_reported_without_invalidating() {
        let signal = Signal::with_domain(f64_descriptor(), domain_signal(1000)).unwrap();
        let mut reader = SignalReader::attach(signal.connect(), None, None, ReadMode::Scaled);
        send_ramp(&signal, 0, 2);
        signal.send_event(EventPacket::implicit_domain_gap(10));
        send_ramp(&signal, 12, 2);

        let (values, progress) = read_f64(&mut reader, 4);
        assert_eq!(values, [0.0, 1.0]);
        assert_eq!(progress.event, Some(EventPacket::implicit_domain_gap(10)));
        assert!(reader.is_valid());
        let (values, _) = read_f64(&mut reader, 4);
        assert_eq!(values, [12.0, 13.0]);
    }

    #[test]
    fn synchronize_drops_samples_before_target() {
        let signal = Signal::with_domain(f64_descriptor(), domain_signal(1000)).unwrap();
        let mut reader = SignalReader::attach(signal.connect(), None, None, ReadMode::Scaled);
        assert_eq!(reader.synchronize(5), SyncState::Synchronizing);

        send_ramp(&signal, 0, 4);
        send_ramp(&signal, 4, 4);
        assert_eq!(reader.synchronize(5), SyncState::Synchronized);
        assert_eq!(reader.dropped_samples(), 5);
        assert_eq!(reader.current_domain_value(), Some(5));

        // Ties resolve to the equal sample, not the next one.
        assert_eq!(reader.synchronize(5), SyncState::Synchronized);
        assert_eq!(reader.dropped_samples(), 5);
    }

    #[test]
    fn missing_domain_packet_is_invalid_state_on_first_sample() {
        let signal = Signal::new(f64_descriptor()).unwrap();
        let mut reader = SignalReader::attach(signal.connect(), None, Some(SampleType::Int64), ReadMode::Scaled);
        signal
            .send_packet(DataPacket::from_samples(signal.descriptor(), &[1.0f64], None).unwrap())
            .unwrap();
        let mut values = [0u8; 8];
        let mut domain = [0u8; 8];
        let err = reader.read_into(&mut values, Some(&mut domain), 1).unwrap_err();
        assert!(matches!(err, StreamError::InvalidState { .. }));
        assert_eq!(reader.available(), 1);
    }

    #[test]
    fn hand_off_moves_unread_packets() {
        let signal = Signal::with_domain(f64_descriptor(), domain_signal(1000)).unwrap();
        let mut old = SignalReader::attach(signal.connect(), None, None, ReadMode::Scaled);
        send_ramp(&signal, 0, 4);
        let _ = read_f64(&mut old, 1);

        let handoff = old.hand_off().unwrap();
        assert!(!old.is_valid());
        assert!(old.hand_off().is_err());
        let mut replacement = SignalReader::from_handoff(handoff, Some(SampleType::Int32), None);
        assert!(replacement.is_valid());
        let mut bytes = vec![0u8; 12];
        let progress = replacement.read_into(&mut bytes, None, 3).unwrap();
        let mut values = [0i32; 3];
        decode_samples(&bytes, &mut values);
        assert_eq!(progress.read, 3);
        assert_eq!(values, [1, 2, 3]);
    }
}
