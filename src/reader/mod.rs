//! Readers pulling converted samples out of signal connections.
//!
//! # Architecture
//!
//! ```text
//! Connection ──► SignalReader ──┬── TypedReader (value)
//!                               └── TypedReader (domain)
//!                    ▲
//!     StreamReader / BlockReader / MultiReader (one mutex + notifier each)
//! ```
//!
//! - [`StreamReader`] reads sequential samples
//! - [`BlockReader`] reads fixed-size, optionally overlapping blocks
//! - [`MultiReader`] reads several signals in lock-step on a common domain
//! - [`PacketReader`] hands out whole packets without conversion
//!
//! Every read reports a [`ReaderStatus`](crate::types::ReaderStatus). An
//! invalid reader never blocks and never writes to the destination; it
//! reports [`ReadStatus::Ignored`](crate::types::ReadStatus::Ignored) until it
//! is replaced through `from_existing`.
//!
//! ## Usage Example
//!
//! ```rust
//! use daqflow::connection::Signal;
//! use daqflow::reader::StreamReader;
//! use daqflow::types::{DataDescriptor, DataPacket, SampleType};
//! use std::time::Duration;
//!
//! let signal = Signal::new(DataDescriptor::builder(SampleType::Int32).build().unwrap()).unwrap();
//! let reader = StreamReader::new(&signal);
//!
//! signal
//!     .send_packet(DataPacket::from_samples(signal.descriptor(), &[1i32, 2, 3], None).unwrap())
//!     .unwrap();
//!
//! let mut values = [0i32; 3];
//! let status = reader.read(&mut values, Duration::ZERO).unwrap();
//! assert_eq!(status.read_count, 3);
//! assert_eq!(values, [1, 2, 3]);
//! ```

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::connection::{Connection, PacketListener};
use crate::types::{ReaderStatus, Sample};
use crate::{Result, StreamError};

mod block;
pub(crate) mod convert;
mod multi;
mod notifier;
mod packet_reader;
mod signal_reader;
mod stream;
mod sync;
mod typed;

pub use block::{BlockGeometry, BlockReader};
pub use multi::MultiReader;
pub use packet_reader::PacketReader;
pub use signal_reader::Handoff;
pub use stream::StreamReader;
pub use sync::SyncState;
pub use typed::{Transform, TypedReader, TypedReaderState};

use notifier::Notifier;
use signal_reader::{ReadProgress, SignalReader};

/// Behaviour shared by single-signal readers.
pub trait Reader: Send + Sync {
    /// Readable units (samples or whole blocks) before the next event.
    fn available_count(&self) -> usize;

    fn is_valid(&self) -> bool;

    /// Make every further read return an ignored status.
    fn invalidate(&self);

    /// Invalidate this reader and hand its connection and unread packets to
    /// a replacement. Fails if the reader was already replaced.
    fn hand_off(&self) -> Result<Handoff>;
}

/// A signal reader behind its own mutex, woken by its own notifier.
pub(crate) struct Shared {
    pub(crate) reader: Mutex<SignalReader>,
    pub(crate) notifier: Arc<Notifier>,
}

impl Shared {
    pub(crate) fn new(reader: SignalReader) -> Arc<Self> {
        let notifier = Arc::new(Notifier::new());
        listen(reader.connection(), &notifier);
        Arc::new(Self { reader: Mutex::new(reader), notifier })
    }

    /// Invalidate and wake a read blocked on this reader.
    pub(crate) fn invalidate(&self) {
        self.reader.lock().invalidate();
        self.notifier.wake();
    }

    pub(crate) fn hand_off(&self) -> Result<Handoff> {
        let handoff = self.reader.lock().hand_off();
        self.notifier.wake();
        handoff
    }
}

pub(crate) fn listen(connection: &Connection, notifier: &Arc<Notifier>) {
    let weak: Weak<Notifier> = Arc::downgrade(notifier);
    connection.set_listener(weak as Weak<dyn PacketListener>);
}

pub(crate) fn deadline(timeout: Duration) -> Instant {
    Instant::now() + timeout
}

/// Elements of `V` making up one delivered sample of `typed`.
pub(crate) fn elements_per_sample<V: Sample>(typed: &TypedReader, what: &str) -> Result<usize> {
    let read_type = typed
        .read_type()
        .ok_or_else(|| StreamError::invalid_state(format!("{} descriptor is not known yet", what)))?;
    if read_type != V::SAMPLE_TYPE {
        return Err(StreamError::invalid_sample_type(
            Some(V::SAMPLE_TYPE),
            format!("{} reader produces {}", what, read_type),
        ));
    }
    Ok((typed.sample_size().unwrap_or(V::SIZE) / V::SIZE).max(1))
}

pub(crate) fn status_of(progress: ReadProgress, read_count: usize, valid: bool) -> ReaderStatus {
    match progress.event {
        Some(event) => ReaderStatus::event(read_count, event, valid, progress.first_domain),
        None if valid => ReaderStatus::ok(read_count, progress.first_domain),
        None => ReaderStatus::failed(read_count, progress.first_domain),
    }
}
