//! Packet types for the producer/consumer queue

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use super::{DataDescriptor, DataRule, EventPacket, Sample, Scalar, encode_samples};
use crate::allocator::Region;
use crate::{Result, StreamError};

static NEXT_PACKET_ID: AtomicU64 = AtomicU64::new(1);

/// A queued packet: sample data or an in-band event.
#[derive(Debug, Clone)]
pub enum Packet {
    Data(DataPacket),
    Event(EventPacket),
}

impl Packet {
    pub fn as_data(&self) -> Option<&DataPacket> {
        match self {
            Packet::Data(data) => Some(data),
            Packet::Event(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&EventPacket> {
        match self {
            Packet::Event(event) => Some(event),
            Packet::Data(_) => None,
        }
    }

    /// Sample count for data packets, zero for events.
    pub fn sample_count(&self) -> usize {
        self.as_data().map(DataPacket::sample_count).unwrap_or(0)
    }
}

impl From<DataPacket> for Packet {
    fn from(packet: DataPacket) -> Self {
        Packet::Data(packet)
    }
}

impl From<EventPacket> for Packet {
    fn from(event: EventPacket) -> Self {
        Packet::Event(event)
    }
}

/// Backing memory of a data packet.
enum PacketBuffer {
    /// Heap buffer owned by the packet
    Heap(Box<[u8]>),
    /// Region of a ring allocator arena, reclaimed on drop
    Arena(Region),
    /// No buffer: values follow from the linear rule
    Implicit,
}

impl std::fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketBuffer::Heap(b) => write!(f, "Heap({} bytes)", b.len()),
            PacketBuffer::Arena(r) => write!(f, "Arena({:?})", r),
            PacketBuffer::Implicit => f.write_str("Implicit"),
        }
    }
}

#[derive(Debug)]
struct DataPacketInner {
    id: u64,
    descriptor: Arc<DataDescriptor>,
    sample_count: usize,
    offset: i64,
    buffer: PacketBuffer,
    domain: Option<DataPacket>,
    computed: OnceLock<Box<[u8]>>,
}

/// Shared, write-once block of samples.
///
/// Cloning is cheap; the backing memory is released when the last clone is
/// dropped. A value packet holds its domain packet; domain packets never
/// point back at value packets.
#[derive(Debug, Clone)]
pub struct DataPacket {
    inner: Arc<DataPacketInner>,
}

impl DataPacket {
    /// Create a packet from raw little-endian bytes.
    pub fn new(
        descriptor: Arc<DataDescriptor>,
        sample_count: usize,
        data: Vec<u8>,
        domain: Option<DataPacket>,
    ) -> Result<Self> {
        check_explicit_len(&descriptor, sample_count, data.len())?;
        check_domain(sample_count, domain.as_ref())?;
        Ok(Self::assemble(descriptor, sample_count, 0, PacketBuffer::Heap(data.into()), domain))
    }

    /// Create a packet from typed samples.
    pub fn from_samples<T: Sample>(
        descriptor: Arc<DataDescriptor>,
        samples: &[T],
        domain: Option<DataPacket>,
    ) -> Result<Self> {
        if T::SAMPLE_TYPE != descriptor.sample_type {
            return Err(StreamError::invalid_sample_type(
                Some(T::SAMPLE_TYPE),
                format!("descriptor sample type is {}", descriptor.sample_type),
            ));
        }
        let count = samples.len() / descriptor.elements_per_sample();
        Self::new(descriptor, count, encode_samples(samples), domain)
    }

    /// Create an implicit packet for a linear-rule descriptor.
    pub fn implicit(descriptor: Arc<DataDescriptor>, sample_count: usize, offset: i64) -> Result<Self> {
        if descriptor.rule.is_explicit() {
            return Err(StreamError::invalid_descriptor(
                "implicit packets require a linear rule descriptor",
            ));
        }
        Ok(Self::assemble(descriptor, sample_count, offset, PacketBuffer::Implicit, None))
    }

    pub(crate) fn from_region(
        descriptor: Arc<DataDescriptor>,
        sample_count: usize,
        region: Region,
        domain: Option<DataPacket>,
    ) -> Self {
        Self::assemble(descriptor, sample_count, 0, PacketBuffer::Arena(region), domain)
    }

    fn assemble(
        descriptor: Arc<DataDescriptor>,
        sample_count: usize,
        offset: i64,
        buffer: PacketBuffer,
        domain: Option<DataPacket>,
    ) -> Self {
        Self {
            inner: Arc::new(DataPacketInner {
                id: NEXT_PACKET_ID.fetch_add(1, Ordering::Relaxed),
                descriptor,
                sample_count,
                offset,
                buffer,
                domain,
                computed: OnceLock::new(),
            }),
        }
    }

    /// Process-unique packet id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn descriptor(&self) -> &Arc<DataDescriptor> {
        &self.inner.descriptor
    }

    pub fn sample_count(&self) -> usize {
        self.inner.sample_count
    }

    /// Packet offset used by the linear rule.
    pub fn offset(&self) -> i64 {
        self.inner.offset
    }

    /// Linked domain packet, if any.
    pub fn domain_packet(&self) -> Option<&DataPacket> {
        self.inner.domain.as_ref()
    }

    /// Raw backing bytes. Empty for implicit packets.
    pub fn raw_data(&self) -> &[u8] {
        match &self.inner.buffer {
            PacketBuffer::Heap(bytes) => bytes,
            PacketBuffer::Arena(region) => region.as_slice(),
            PacketBuffer::Implicit => &[],
        }
    }

    /// Sample bytes in the descriptor's sample type. Implicit packets are
    /// materialized on first access.
    pub fn data(&self) -> &[u8] {
        match self.inner.descriptor.rule {
            DataRule::Explicit => self.raw_data(),
            DataRule::Linear { delta, start } => self
                .inner
                .computed
                .get_or_init(|| self.materialize_linear(delta, start)),
        }
    }

    /// Whether the packet's memory lives in a ring allocator arena.
    pub fn is_arena_backed(&self) -> bool {
        matches!(self.inner.buffer, PacketBuffer::Arena(_))
    }

    /// Decoded value of sample `index` (first element for dimensioned samples).
    pub fn scalar_at(&self, index: usize) -> Option<Scalar> {
        if index >= self.sample_count() {
            return None;
        }
        let desc = &self.inner.descriptor;
        if let DataRule::Linear { delta, start } = desc.rule {
            return Some(Scalar::Int(self.offset() + start + index as i64 * delta));
        }
        let size = desc.raw_sample_size()?;
        let bytes = self.data().get(index * size..(index + 1) * size)?;
        crate::reader::convert::decode_scalar(desc.sample_type, bytes)
    }

    /// Domain-style integer value of sample `index`.
    pub fn value_i64(&self, index: usize) -> Option<i64> {
        self.scalar_at(index).map(Scalar::as_i64)
    }

    pub fn ptr_eq(&self, other: &DataPacket) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn materialize_linear(&self, delta: i64, start: i64) -> Box<[u8]> {
        let sample_type = self.inner.descriptor.sample_type;
        let size = sample_type.size().unwrap_or(8);
        let mut out = vec![0u8; self.sample_count() * size];
        for (i, chunk) in out.chunks_exact_mut(size).enumerate() {
            let value = Scalar::Int(self.offset() + start + i as i64 * delta);
            crate::reader::convert::encode_scalar(sample_type, value, chunk);
        }
        out.into_boxed_slice()
    }
}

fn check_explicit_len(descriptor: &DataDescriptor, sample_count: usize, len: usize) -> Result<()> {
    if !descriptor.rule.is_explicit() {
        return Err(StreamError::invalid_descriptor(
            "explicit packets require an explicit rule descriptor",
        ));
    }
    let size = descriptor.raw_sample_size().ok_or_else(|| {
        StreamError::invalid_sample_type(
            Some(descriptor.sample_type),
            "variable-size sample types cannot be packed into data packets",
        )
    })?;
    if size * sample_count != len {
        return Err(StreamError::invalid_parameter(format!(
            "{} samples of {} bytes need {} bytes, got {}",
            sample_count,
            size,
            size * sample_count,
            len
        )));
    }
    Ok(())
}

fn check_domain(sample_count: usize, domain: Option<&DataPacket>) -> Result<()> {
    match domain {
        Some(d) if d.sample_count() != sample_count => Err(StreamError::invalid_parameter(format!(
            "domain packet has {} samples, value packet has {}",
            d.sample_count(),
            sample_count
        ))),
        _ => Ok(()),
    }
}
