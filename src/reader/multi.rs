//! Lock-step reads over several signals sharing a domain
//!
//! All signals are brought onto one common tick resolution (see
//! [`sync`](super::sync)). Before the first read every signal drops the
//! samples preceding a common start tick; afterwards each read delivers the
//! same stretch of the domain for every signal. A signal running at
//! `1/divider` of the common rate contributes `count / divider` samples.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::notifier::Notifier;
use super::sync::{self, CommonDomain, SyncState};
use super::{SignalReader, deadline, elements_per_sample, listen};
use crate::config::{MultiReaderConfig, ReaderConfig};
use crate::connection::Signal;
use crate::types::{
    DataDescriptor, EventPacket, MultiReaderStatus, ReadMode, ReadTimeoutType, Sample, SampleType,
    decode_samples,
};
use crate::{Result, StreamError};

/// Passes over all signals before giving up on finding a shared start tick.
const MAX_SYNC_PASSES: usize = 8;

struct MultiState {
    readers: Vec<SignalReader>,
    config: MultiReaderConfig,
    common: Option<CommonDomain>,
    invalid: bool,
    /// Common tick of the next sample to deliver, once synchronized
    next_tick: Option<i64>,
}

impl MultiState {
    fn is_valid(&self) -> bool {
        !self.invalid && self.readers.iter().all(|r| r.is_valid())
    }

    fn invalidate(&mut self) {
        self.invalid = true;
        self.common = None;
        self.next_tick = None;
        for reader in &mut self.readers {
            reader.invalidate();
        }
    }

    /// Recompute the common domain from the current domain descriptors.
    fn realign(&mut self) {
        self.next_tick = None;
        let domains: Option<Vec<Arc<DataDescriptor>>> =
            self.readers.iter().map(|r| r.domain_descriptor().cloned()).collect();
        let Some(domains) = domains else {
            warn!("Every signal of a multi reader needs a domain");
            self.invalidate();
            return;
        };
        let domains: Vec<&DataDescriptor> = domains.iter().map(Arc::as_ref).collect();
        match sync::align(&domains, self.config.required_common_sample_rate) {
            Ok(common) => {
                debug!(
                    rate = common.sample_rate(),
                    ticks_per_second = common.ticks_per_second,
                    sample_multiple = common.sample_multiple,
                    "Multi reader domains aligned"
                );
                self.common = Some(common);
            }
            Err(reason) => {
                warn!(%reason, "Signals cannot be read in lock-step");
                self.invalidate();
            }
        }
    }

    /// Move every signal onto the same common start tick. Returns true once
    /// all signals are synchronized.
    fn synchronize(&mut self) -> bool {
        if self.next_tick.is_some() {
            return true;
        }
        let Some(common) = self.common.clone() else {
            return false;
        };

        let mut start: Option<i64> = None;
        for (reader, alignment) in self.readers.iter_mut().zip(&common.members) {
            let Some(own) = reader.current_domain_value() else {
                return false;
            };
            let tick = alignment.to_common(own);
            start = Some(start.map_or(tick, |s| s.max(tick)));
        }
        let Some(mut start) = start else {
            return false;
        };
        if self.config.start_on_full_unit_of_domain {
            start = common.ceil_to_unit(start);
        }

        for _ in 0..MAX_SYNC_PASSES {
            let mut latest = start;
            for (reader, alignment) in self.readers.iter_mut().zip(&common.members) {
                if reader.synchronize(alignment.to_own_ceil(start)) != SyncState::Synchronized {
                    if !reader.is_valid() {
                        self.invalid = true;
                    }
                    return false;
                }
                let Some(own) = reader.current_domain_value() else {
                    return false;
                };
                latest = latest.max(alignment.to_common(own));
            }
            if latest == start {
                debug!(start, dropped = self.dropped_samples(), "Signals synchronized");
                self.next_tick = Some(start);
                return true;
            }
            start = latest;
        }

        warn!(start, "Signal sample grids never coincide");
        self.invalidate();
        false
    }

    fn dropped_samples(&self) -> u64 {
        self.readers.iter().map(SignalReader::dropped_samples).sum()
    }

    fn divider(&self, index: usize) -> usize {
        self.common.as_ref().map_or(1, |c| c.members[index].divider)
    }

    fn sample_multiple(&self) -> usize {
        self.common.as_ref().map_or(1, |c| c.sample_multiple)
    }

    /// Common-rate samples every signal can deliver before its next event.
    fn ready_count(&self) -> usize {
        if self.invalid {
            return 0;
        }
        let ready = (0..self.readers.len())
            .map(|i| self.readers[i].available() * self.divider(i))
            .min()
            .unwrap_or(0);
        ready - ready % self.sample_multiple()
    }

    fn event_pending(&self) -> bool {
        self.readers.iter().any(SignalReader::event_pending)
    }

    /// Consume the events of signals that cannot contribute another full
    /// read unit before them. Their leftover samples are dropped and every
    /// signal resynchronizes afterwards.
    fn take_blocking_events(&mut self) -> BTreeMap<usize, EventPacket> {
        let multiple = self.sample_multiple();
        let mut events = BTreeMap::new();
        for index in 0..self.readers.len() {
            let divider = self.divider(index);
            let reader = &mut self.readers[index];
            if reader.event_pending() && reader.available() * divider < multiple {
                let dropped = reader.discard_until_event();
                if let Some(event) = reader.take_event() {
                    trace!(index, dropped, event = event.id(), "Signal event");
                    events.insert(index, event);
                }
            }
        }
        if !events.is_empty() {
            let descriptors_changed = events.values().any(EventPacket::is_descriptor_changed);
            self.restart(descriptors_changed);
        }
        events
    }

    fn restart(&mut self, descriptors_changed: bool) {
        self.next_tick = None;
        for reader in &mut self.readers {
            reader.reset_sync();
        }
        if !self.is_valid() {
            self.invalidate();
        } else if descriptors_changed {
            self.realign();
        }
    }
}

/// Reads several signals in lock-step on their common domain.
///
/// Signals must share a domain unit and use linear domain rules with sample
/// periods that are exact multiples of the common period. A set of signals
/// that violates this (e.g. 1000 Hz and 1024 Hz) yields a reader that is
/// invalid from construction on.
///
/// ```rust
/// use daqflow::connection::Signal;
/// use daqflow::reader::MultiReader;
/// use daqflow::types::{DataDescriptor, DataPacket, Ratio, SampleType};
/// use std::time::Duration;
///
/// let domain = |rate| {
///     let descriptor = DataDescriptor::builder(SampleType::Int64)
///         .linear_rule(1, 0)
///         .tick_resolution(Ratio::per(rate).unwrap())
///         .unit("s")
///         .build()
///         .unwrap();
///     Signal::new(descriptor).unwrap()
/// };
/// let value = || DataDescriptor::builder(SampleType::Float64).build().unwrap();
/// let fast = Signal::with_domain(value(), domain(1000)).unwrap();
/// let slow = Signal::with_domain(value(), domain(500)).unwrap();
/// let reader = MultiReader::new(&[fast.clone(), slow.clone()]).unwrap();
///
/// for (signal, count) in [(&fast, 8), (&slow, 4)] {
///     let domain = DataPacket::implicit(signal.domain_descriptor().unwrap(), count, 0).unwrap();
///     let values: Vec<f64> = (0..count).map(|i| i as f64).collect();
///     signal
///         .send_packet(DataPacket::from_samples(signal.descriptor(), &values, Some(domain)).unwrap())
///         .unwrap();
/// }
///
/// let mut fast_out = [0f64; 8];
/// let mut slow_out = [0f64; 4];
/// let status = reader.read(&mut [&mut fast_out[..], &mut slow_out[..]], Duration::ZERO).unwrap();
/// assert_eq!(status.read_count, 8);
/// assert_eq!(slow_out, [0.0, 1.0, 2.0, 3.0]);
/// ```
pub struct MultiReader {
    state: Mutex<MultiState>,
    notifier: Arc<Notifier>,
    timeout_type: ReadTimeoutType,
}

impl MultiReader {
    /// Reader with inferred types in scaled mode.
    pub fn new(signals: &[Signal]) -> Result<Self> {
        Self::from_config(signals, &ReaderConfig::default(), &MultiReaderConfig::default())
    }

    pub fn with_types(
        signals: &[Signal],
        value_type: Option<SampleType>,
        domain_type: Option<SampleType>,
        read_mode: ReadMode,
    ) -> Result<Self> {
        let config = ReaderConfig { value_type, domain_type, read_mode, ..ReaderConfig::default() };
        Self::from_config(signals, &config, &MultiReaderConfig::default())
    }

    /// Fails only for an empty signal list; incompatible signals produce an
    /// invalid reader.
    pub fn from_config(signals: &[Signal], reader: &ReaderConfig, multi: &MultiReaderConfig) -> Result<Self> {
        if signals.is_empty() {
            return Err(StreamError::invalid_parameter("multi reader needs at least one signal"));
        }
        let notifier = Arc::new(Notifier::new());
        let readers = signals
            .iter()
            .map(|signal| {
                let signal_reader =
                    SignalReader::attach(signal.connect(), reader.value_type, reader.domain_type, reader.read_mode);
                listen(signal_reader.connection(), &notifier);
                signal_reader
            })
            .collect();

        let mut state = MultiState { readers, config: *multi, common: None, invalid: false, next_tick: None };
        if state.is_valid() {
            state.realign();
        } else {
            state.invalidate();
        }
        info!(
            signals = signals.len(),
            valid = state.is_valid(),
            rate = ?state.common.as_ref().map(CommonDomain::sample_rate),
            "Multi reader attached"
        );
        Ok(Self { state: Mutex::new(state), notifier, timeout_type: reader.timeout_type })
    }

    pub fn with_timeout_type(mut self, timeout_type: ReadTimeoutType) -> Self {
        self.timeout_type = timeout_type;
        self
    }

    /// Read up to the common count fitting every buffer. `values[i]` receives
    /// signal `i`; `read_count` of the status is in common-rate samples.
    pub fn read<V: Sample>(&self, values: &mut [&mut [V]], timeout: Duration) -> Result<MultiReaderStatus> {
        self.read_impl::<V, i64>(values, None, timeout)
    }

    /// Like [`read`](Self::read), also filling `domain[i]` with signal `i`'s domain values.
    pub fn read_with_domain<V: Sample, D: Sample>(
        &self,
        values: &mut [&mut [V]],
        domain: &mut [&mut [D]],
        timeout: Duration,
    ) -> Result<MultiReaderStatus> {
        self.read_impl(values, Some(domain), timeout)
    }

    fn read_impl<V: Sample, D: Sample>(
        &self,
        values: &mut [&mut [V]],
        mut domain: Option<&mut [&mut [D]]>,
        timeout: Duration,
    ) -> Result<MultiReaderStatus> {
        let mut state = self.state.lock();
        if !state.is_valid() {
            return Ok(MultiReaderStatus::ignored());
        }
        let signals = state.readers.len();
        if values.len() != signals || domain.as_deref().is_some_and(|d| d.len() != signals) {
            return Err(StreamError::invalid_parameter(format!(
                "expected one buffer per signal ({})",
                signals
            )));
        }
        let deadline = deadline(timeout);

        if !state.synchronize() && !timeout.is_zero() {
            self.notifier.wait_until(&mut state, deadline, |s| {
                s.synchronize() || !s.is_valid() || s.event_pending()
            });
        }
        if !state.is_valid() {
            return Ok(MultiReaderStatus::failed());
        }
        if state.next_tick.is_none() {
            let events = state.take_blocking_events();
            if events.is_empty() {
                return Ok(MultiReaderStatus::ok(0, None));
            }
            return Ok(MultiReaderStatus::event(0, events, state.is_valid(), None));
        }

        let mut elements = Vec::with_capacity(signals);
        for reader in &state.readers {
            elements.push(elements_per_sample::<V>(reader.value_reader(), "value")?);
            if domain.is_some() {
                elements_per_sample::<D>(reader.domain_reader(), "domain")?;
            }
        }
        let mut count = (0..signals)
            .map(|i| values[i].len() / elements[i] * state.divider(i))
            .min()
            .unwrap_or(0);
        if let Some(domain) = domain.as_deref() {
            let fits = (0..signals).map(|i| domain[i].len() * state.divider(i)).min().unwrap_or(0);
            count = count.min(fits);
        }
        count -= count % state.sample_multiple();
        if count == 0 {
            return Ok(MultiReaderStatus::ok(0, state.next_tick));
        }

        if !timeout.is_zero() {
            let needed = match self.timeout_type {
                ReadTimeoutType::All => count,
                ReadTimeoutType::Any => state.sample_multiple(),
            };
            self.notifier.wait_until(&mut state, deadline, |s| {
                !s.is_valid() || s.ready_count() >= needed || s.event_pending()
            });
            if !state.is_valid() {
                return Ok(MultiReaderStatus::ignored());
            }
            if state.next_tick.is_none() {
                return Ok(MultiReaderStatus::ok(0, None));
            }
        }

        let ready = state.ready_count().min(count);
        if ready == 0 {
            let events = state.take_blocking_events();
            if events.is_empty() {
                return Ok(MultiReaderStatus::ok(0, state.next_tick));
            }
            return Ok(MultiReaderStatus::event(0, events, state.is_valid(), None));
        }

        if domain.is_some() {
            if let Some(index) = state.readers.iter_mut().position(|r| r.current_domain_value().is_none()) {
                return Err(StreamError::invalid_state(format!(
                    "signal {} has a data packet without a linked domain packet",
                    index
                )));
            }
        }

        let start = state.next_tick;
        let mut events = BTreeMap::new();
        let mut drifted = false;
        for index in 0..signals {
            let divider = state.divider(index);
            let alignment = state.common.as_ref().map(|c| c.members[index]);
            let n = ready / divider;
            let value_len = n * elements[index];
            let mut value_bytes = vec![0u8; value_len * V::SIZE];
            let mut domain_bytes = domain.as_ref().map(|_| vec![0u8; n * D::SIZE]);

            let reader = &mut state.readers[index];
            let progress = reader.read_into(&mut value_bytes, domain_bytes.as_deref_mut(), n)?;
            reader.release_consumed();

            let first = progress
                .first_domain
                .zip(alignment)
                .map(|(own, alignment)| alignment.to_common(own));
            if progress.read != n || first != start {
                drifted = true;
            }
            if let Some(event) = progress.event {
                events.insert(index, event);
            }

            let read_len = progress.read * elements[index];
            decode_samples(&value_bytes[..read_len * V::SIZE], &mut values[index][..read_len]);
            if let (Some(out), Some(bytes)) = (domain.as_deref_mut(), domain_bytes) {
                decode_samples(&bytes[..progress.read * D::SIZE], &mut out[index][..progress.read]);
            }
        }

        if drifted || !events.is_empty() {
            if drifted {
                warn!(start = ?start, "Signals drifted apart, resynchronizing");
            }
            let descriptors_changed = events.values().any(EventPacket::is_descriptor_changed);
            state.restart(descriptors_changed);
        } else {
            let period = state.common.as_ref().map(|c| c.period);
            state.next_tick = start.zip(period).map(|(tick, period)| tick + ready as i64 * period);
        }
        trace!(read = ready, offset = ?start, "Multi read");

        if events.is_empty() {
            Ok(MultiReaderStatus::ok(ready, start))
        } else {
            Ok(MultiReaderStatus::event(ready, events, state.is_valid(), start))
        }
    }

    /// Common-rate samples readable by every signal before its next event.
    pub fn available_count(&self) -> usize {
        self.state.lock().ready_count()
    }

    /// Samples dropped across all signals while synchronizing.
    pub fn dropped_samples(&self) -> u64 {
        self.state.lock().dropped_samples()
    }

    pub fn is_synchronized(&self) -> bool {
        self.state.lock().next_tick.is_some()
    }

    pub fn is_valid(&self) -> bool {
        self.state.lock().is_valid()
    }

    pub fn invalidate(&self) {
        self.state.lock().invalidate();
        self.notifier.wake();
    }

    pub fn signal_count(&self) -> usize {
        self.state.lock().readers.len()
    }

    /// Common sample rate in samples per domain unit, while valid.
    pub fn sample_rate(&self) -> Option<f64> {
        self.state.lock().common.as_ref().map(CommonDomain::sample_rate)
    }
}

impl std::fmt::Debug for MultiReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MultiReader")
            .field("signals", &state.readers.len())
            .field("valid", &state.is_valid())
            .field("next_tick", &state.next_tick)
            .finish()
    }
}
