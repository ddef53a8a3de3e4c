//! Sequential sample reader

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    Handoff, Reader, Shared, SignalReader, Transform, deadline, elements_per_sample, status_of,
};
use crate::config::ReaderConfig;
use crate::connection::{Connection, Signal};
use crate::types::{ReadMode, ReadTimeoutType, ReaderStatus, Sample, SampleType, decode_samples};
use crate::{Result, StreamError};

/// Reads converted samples (and optionally their domain values) from one signal.
///
/// Cloning yields another handle to the same reader state.
#[derive(Clone)]
pub struct StreamReader {
    shared: Arc<Shared>,
    timeout_type: ReadTimeoutType,
}

impl StreamReader {
    /// Reader with inferred types in scaled mode.
    pub fn new(signal: &Signal) -> Self {
        Self::from_config(signal, &ReaderConfig::default())
    }

    pub fn with_types(
        signal: &Signal,
        value_type: Option<SampleType>,
        domain_type: Option<SampleType>,
        read_mode: ReadMode,
    ) -> Self {
        let config = ReaderConfig { value_type, domain_type, read_mode, ..ReaderConfig::default() };
        Self::from_config(signal, &config)
    }

    pub fn from_config(signal: &Signal, config: &ReaderConfig) -> Self {
        Self::from_connection(signal.connect(), config)
    }

    /// Attach to an already connected input.
    pub fn from_connection(connection: Connection, config: &ReaderConfig) -> Self {
        let reader = SignalReader::attach(connection, config.value_type, config.domain_type, config.read_mode);
        info!(
            value = ?reader.value_reader().read_type(),
            domain = ?reader.domain_reader().read_type(),
            mode = ?config.read_mode,
            "Stream reader attached"
        );
        Self { shared: Shared::new(reader), timeout_type: config.timeout_type }
    }

    /// Replace `old` with a reader producing different types. `old` becomes
    /// invalid; unread packets carry over.
    pub fn from_existing(
        old: &impl Reader,
        value_type: Option<SampleType>,
        domain_type: Option<SampleType>,
    ) -> Result<Self> {
        Ok(Self::from_handoff(old.hand_off()?, value_type, domain_type, ReadTimeoutType::All))
    }

    pub(crate) fn from_handoff(
        handoff: Handoff,
        value_type: Option<SampleType>,
        domain_type: Option<SampleType>,
        timeout_type: ReadTimeoutType,
    ) -> Self {
        let reader = SignalReader::from_handoff(handoff, value_type, domain_type);
        debug!(valid = reader.is_valid(), "Stream reader created from existing reader");
        Self { shared: Shared::new(reader), timeout_type }
    }

    /// Set the timeout policy of subsequent reads.
    pub fn with_timeout_type(mut self, timeout_type: ReadTimeoutType) -> Self {
        self.timeout_type = timeout_type;
        self
    }

    /// Read up to `values.len()` samples.
    ///
    /// With a non-zero `timeout` the call waits until the requested count
    /// ([`ReadTimeoutType::All`]) or any sample ([`ReadTimeoutType::Any`]) is
    /// available, an event is queued, or the timeout elapses. Samples are
    /// never fabricated: on timeout only what arrived is delivered.
    pub fn read<V: Sample>(&self, values: &mut [V], timeout: Duration) -> Result<ReaderStatus> {
        self.read_impl::<V, i64>(values, None, timeout)
    }

    /// Like [`read`](Self::read), also filling `domain` with the converted
    /// domain values of the delivered samples.
    pub fn read_with_domain<V: Sample, D: Sample>(
        &self,
        values: &mut [V],
        domain: &mut [D],
        timeout: Duration,
    ) -> Result<ReaderStatus> {
        self.read_impl(values, Some(domain), timeout)
    }

    /// Read `count` samples on tokio's blocking pool.
    pub async fn read_async<V: Sample>(&self, count: usize, timeout: Duration) -> Result<(Vec<V>, ReaderStatus)> {
        let reader = self.clone();
        tokio::task::spawn_blocking(move || {
            let elements = {
                let guard = reader.shared.reader.lock();
                elements_per_sample::<V>(guard.value_reader(), "value").unwrap_or(1)
            };
            let mut values = vec![V::default(); count * elements];
            let status = reader.read(&mut values, timeout)?;
            values.truncate(status.read_count * elements);
            Ok((values, status))
        })
        .await
        .map_err(|e| StreamError::invalid_state(format!("blocking read task failed: {}", e)))?
    }

    fn read_impl<V: Sample, D: Sample>(
        &self,
        values: &mut [V],
        domain: Option<&mut [D]>,
        timeout: Duration,
    ) -> Result<ReaderStatus> {
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
        let value_elements = elements_per_sample::<V>(reader.value_reader(), "value")?;
        let mut count = values.len() / value_elements;
        if let Some(domain) = domain.as_deref() {
            elements_per_sample::<D>(reader.domain_reader(), "domain")?;
            count = count.min(domain.len());
        }
        if count == 0 {
            return Ok(ReaderStatus::ok(0, None));
        }

        if !timeout.is_zero() {
            let needed = match self.timeout_type {
                ReadTimeoutType::All => count,
                ReadTimeoutType::Any => 1,
            };
            self.shared.notifier.wait_until(&mut reader, deadline, |r| {
                !r.is_valid() || r.available() >= needed || r.event_pending()
            });
            if !reader.is_valid() {
                return Ok(ReaderStatus::ignored());
            }
            // Another handle may have read past a descriptor change meanwhile.
            if elements_per_sample::<V>(reader.value_reader(), "value")? != value_elements {
                return Ok(ReaderStatus::ok(0, None));
            }
            if domain.is_some() {
                elements_per_sample::<D>(reader.domain_reader(), "domain")?;
            }
        }

        let mut value_bytes = vec![0u8; count * value_elements * V::SIZE];
        let mut domain_bytes = domain.as_ref().map(|_| vec![0u8; count * D::SIZE]);
        let progress = reader.read_into(&mut value_bytes, domain_bytes.as_deref_mut(), count)?;
        reader.release_consumed();

        let read = progress.read;
        decode_samples(&value_bytes[..read * value_elements * V::SIZE], &mut values[..read * value_elements]);
        if let (Some(out), Some(bytes)) = (domain, domain_bytes) {
            decode_samples(&bytes[..read * D::SIZE], &mut out[..read]);
        }
        Ok(status_of(progress, read, reader.is_valid()))
    }

    /// Samples readable before the next event.
    pub fn available_count(&self) -> usize {
        self.shared.reader.lock().available()
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

    pub fn read_mode(&self) -> ReadMode {
        self.shared.reader.lock().read_mode()
    }

    pub fn timeout_type(&self) -> ReadTimeoutType {
        self.timeout_type
    }

    pub fn set_value_transform(&self, transform: Option<Transform>) {
        self.shared.reader.lock().value_reader_mut().set_transform(transform);
    }

    pub fn set_domain_transform(&self, transform: Option<Transform>) {
        self.shared.reader.lock().domain_reader_mut().set_transform(transform);
    }
}

impl Reader for StreamReader {
    fn available_count(&self) -> usize {
        StreamReader::available_count(self)
    }

    fn is_valid(&self) -> bool {
        StreamReader::is_valid(self)
    }

    fn invalidate(&self) {
        StreamReader::invalidate(self)
    }

    fn hand_off(&self) -> Result<Handoff> {
        self.shared.hand_off()
    }
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reader = self.shared.reader.lock();
        f.debug_struct("StreamReader")
            .field("value_type", &reader.value_reader().read_type())
            .field("domain_type", &reader.domain_reader().read_type())
            .field("valid", &reader.is_valid())
            .field("timeout_type", &self.timeout_type)
            .finish()
    }
}
