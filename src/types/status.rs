//! Status values returned by reader operations

use std::collections::BTreeMap;

use super::EventPacket;

/// Outcome category of a read call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum ReadStatus {
    /// Samples were read (possibly fewer than requested on timeout)
    Ok,
    /// Reading stopped at an event packet, which was consumed
    Event,
    /// The read could not be performed
    Fail,
    /// The reader is invalid; nothing was read or written
    Ignored,
}

/// Result of a single-signal read.
///
/// For block readers `read_count` counts whole blocks, otherwise samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderStatus {
    pub status: ReadStatus,
    /// Whether the reader can still be used
    pub valid: bool,
    pub read_count: usize,
    /// Event packet that stopped the read
    pub event: Option<EventPacket>,
    /// Domain value of the first delivered sample, when known
    pub offset: Option<i64>,
}

impl ReaderStatus {
    pub(crate) fn ok(read_count: usize, offset: Option<i64>) -> Self {
        Self { status: ReadStatus::Ok, valid: true, read_count, event: None, offset }
    }

    pub(crate) fn event(read_count: usize, event: EventPacket, valid: bool, offset: Option<i64>) -> Self {
        Self { status: ReadStatus::Event, valid, read_count, event: Some(event), offset }
    }

    /// The reader became invalid during the read without an event.
    pub(crate) fn failed(read_count: usize, offset: Option<i64>) -> Self {
        Self { status: ReadStatus::Fail, valid: false, read_count, event: None, offset }
    }

    pub(crate) fn ignored() -> Self {
        Self { status: ReadStatus::Ignored, valid: false, read_count: 0, event: None, offset: None }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReadStatus::Ok
    }

    pub fn is_event(&self) -> bool {
        self.status == ReadStatus::Event
    }
}

/// Result of a multi-signal read.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiReaderStatus {
    pub status: ReadStatus,
    pub valid: bool,
    /// Samples delivered per signal at the common sample rate
    pub read_count: usize,
    /// Events consumed, keyed by signal index
    pub events: BTreeMap<usize, EventPacket>,
    /// Common-domain tick of the first delivered sample
    pub offset: Option<i64>,
}

impl MultiReaderStatus {
    pub(crate) fn ok(read_count: usize, offset: Option<i64>) -> Self {
        Self { status: ReadStatus::Ok, valid: true, read_count, events: BTreeMap::new(), offset }
    }

    pub(crate) fn event(
        read_count: usize,
        events: BTreeMap<usize, EventPacket>,
        valid: bool,
        offset: Option<i64>,
    ) -> Self {
        Self { status: ReadStatus::Event, valid, read_count, events, offset }
    }

    pub(crate) fn failed() -> Self {
        Self { status: ReadStatus::Fail, valid: false, read_count: 0, events: BTreeMap::new(), offset: None }
    }

    pub(crate) fn ignored() -> Self {
        Self {
            status: ReadStatus::Ignored,
            valid: false,
            read_count: 0,
            events: BTreeMap::new(),
            offset: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReadStatus::Ok
    }

    pub fn is_event(&self) -> bool {
        self.status == ReadStatus::Event
    }
}
