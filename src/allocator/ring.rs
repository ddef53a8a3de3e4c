//! Fixed-capacity circular arena backing data packet payloads
//!
//! The allocator hands out contiguous regions at a write cursor and reclaims
//! them strictly in allocation order: the read cursor only advances past a
//! region once that region and every older region have been released.

use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::AllocatorConfig;
use crate::types::{DataDescriptor, DataPacket, Sample};
use crate::{Result, StreamError};

/// Default arena size in samples when sized from a descriptor.
pub const DEFAULT_CAPACITY_SAMPLES: usize = 1024;

/// Backing bytes of one arena generation.
struct Arena {
    bytes: Box<[UnsafeCell<u8>]>,
}

// SAFETY: regions handed out by the ring never overlap while live, and a
// region's bytes are only written through the single `PacketWriter` that owns
// it before the packet is published. After publication access is read-only.
unsafe impl Sync for Arena {}
unsafe impl Send for Arena {}

impl Arena {
    fn new(capacity: usize) -> Self {
        Self { bytes: std::iter::repeat_with(|| UnsafeCell::new(0u8)).take(capacity).collect() }
    }

    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.bytes.as_ptr())
    }
}

#[derive(Debug)]
struct Slot {
    id: u64,
    start: usize,
    len: usize,
    released: bool,
}

#[derive(Debug)]
struct RingState {
    /// Live allocations, oldest first
    slots: VecDeque<Slot>,
    read: usize,
    write: usize,
    generation: u64,
    next_id: u64,
}

struct RingShared {
    capacity: usize,
    state: Mutex<RingState>,
    arena: Mutex<Arc<Arena>>,
}

impl RingShared {
    fn release(&self, id: u64, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            trace!(id, "Ignoring release of region from a reset arena generation");
            return;
        }

        match state.slots.iter_mut().find(|slot| slot.id == id) {
            Some(slot) => slot.released = true,
            None => return,
        }

        while state.slots.front().is_some_and(|slot| slot.released) {
            if let Some(slot) = state.slots.pop_front() {
                trace!(id = slot.id, start = slot.start, len = slot.len, "Reclaimed arena region");
            }
        }

        match state.slots.front() {
            Some(oldest) => state.read = oldest.start,
            None => {
                // Drained: restart at the arena start for maximal contiguous space.
                state.read = 0;
                state.write = 0;
            }
        }
    }
}

/// Outcome of a successful allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStatus {
    /// The full requested sample count was granted
    Ok,
    /// Only `granted` of `requested` samples fit contiguously
    AdjustedSize { requested: usize, granted: usize },
}

/// A reserved, not yet published packet.
#[derive(Debug)]
pub struct Allocation {
    pub status: AllocationStatus,
    pub writer: PacketWriter,
}

/// Region of an arena owned by exactly one packet.
pub struct Region {
    arena: Arc<Arena>,
    ring: Arc<RingShared>,
    id: u64,
    generation: u64,
    start: usize,
    len: usize,
}

impl Region {
    pub fn as_slice(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: [start, start + len) lies inside the arena this region keeps
        // alive, and no writer exists once the region is shared.
        unsafe { std::slice::from_raw_parts(self.arena.base().add(self.start), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: the region is exclusively owned by its writer and does not
        // overlap any other live region of the same arena.
        unsafe { std::slice::from_raw_parts_mut(self.arena.base().add(self.start), self.len) }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("id", &self.id)
            .field("start", &self.start)
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        if self.len > 0 {
            self.ring.release(self.id, self.generation);
        }
    }
}

/// Write access to a freshly allocated region, consumed by [`PacketWriter::finish`].
#[derive(Debug)]
pub struct PacketWriter {
    region: Region,
    descriptor: Arc<DataDescriptor>,
    sample_count: usize,
    domain: Option<DataPacket>,
}

impl PacketWriter {
    /// Samples this packet will hold.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Writable payload bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.region.as_mut_slice()
    }

    /// Encode `samples` at the start of the payload. Returns the number of
    /// scalar elements written, capped at the region size.
    pub fn write_samples<T: Sample>(&mut self, samples: &[T]) -> Result<usize> {
        if T::SAMPLE_TYPE != self.descriptor.sample_type {
            return Err(StreamError::invalid_sample_type(
                Some(T::SAMPLE_TYPE),
                format!("packet sample type is {}", self.descriptor.sample_type),
            ));
        }
        let out = self.region.as_mut_slice();
        let mut written = 0;
        for (value, chunk) in samples.iter().zip(out.chunks_exact_mut(T::SIZE)) {
            value.write_le(chunk);
            written += 1;
        }
        Ok(written)
    }

    /// Replace the linked domain packet, e.g. after an adjusted-size grant.
    pub fn set_domain(&mut self, domain: Option<DataPacket>) {
        self.domain = domain;
    }

    /// Publish the packet. The domain packet, if any, must match the granted count.
    pub fn finish(self) -> Result<DataPacket> {
        if let Some(domain) = &self.domain {
            if domain.sample_count() != self.sample_count {
                return Err(StreamError::invalid_parameter(format!(
                    "domain packet has {} samples, allocation holds {}",
                    domain.sample_count(),
                    self.sample_count
                )));
            }
        }
        Ok(DataPacket::from_region(self.descriptor, self.sample_count, self.region, self.domain))
    }
}

/// Circular packet arena with FIFO reclaim.
///
/// Cloning yields another handle to the same arena.
#[derive(Clone)]
pub struct PacketRingAllocator {
    shared: Arc<RingShared>,
}

impl PacketRingAllocator {
    /// Create an arena of `capacity_bytes`.
    pub fn new(capacity_bytes: usize) -> Result<Self> {
        if capacity_bytes == 0 {
            return Err(StreamError::invalid_parameter("arena capacity must be non-zero"));
        }
        debug!(capacity_bytes, "Creating packet ring allocator");
        Ok(Self {
            shared: Arc::new(RingShared {
                capacity: capacity_bytes,
                state: Mutex::new(RingState {
                    slots: VecDeque::new(),
                    read: 0,
                    write: 0,
                    generation: 0,
                    next_id: 1,
                }),
                arena: Mutex::new(Arc::new(Arena::new(capacity_bytes))),
            }),
        })
    }

    /// Arena sized for `capacity_samples` samples of `element_size` bytes.
    pub fn with_sample_capacity(capacity_samples: usize, element_size: usize) -> Result<Self> {
        let bytes = capacity_samples.checked_mul(element_size).ok_or_else(|| {
            StreamError::invalid_parameter("arena capacity overflows usize")
        })?;
        Self::new(bytes)
    }

    /// Arena sized for [`DEFAULT_CAPACITY_SAMPLES`] samples of the descriptor's raw size.
    pub fn for_descriptor(descriptor: &DataDescriptor) -> Result<Self> {
        let size = descriptor.raw_sample_size().ok_or_else(|| {
            StreamError::invalid_sample_type(
                Some(descriptor.sample_type),
                "variable-size samples cannot be arena allocated",
            )
        })?;
        Self::with_sample_capacity(DEFAULT_CAPACITY_SAMPLES, size)
    }

    pub fn from_config(config: &AllocatorConfig) -> Result<Self> {
        Self::with_sample_capacity(config.capacity_samples, config.element_size)
    }

    /// Reserve a region for `sample_count` samples of `descriptor`.
    ///
    /// Returns [`AllocationStatus::AdjustedSize`] when only a smaller, non-empty
    /// count fits contiguously, and [`StreamError::OutOfMemory`] when not even
    /// one sample fits. Never blocks.
    pub fn allocate(
        &self,
        descriptor: Arc<DataDescriptor>,
        sample_count: usize,
        domain: Option<DataPacket>,
    ) -> Result<Allocation> {
        if !descriptor.rule.is_explicit() {
            return Err(StreamError::invalid_descriptor(
                "implicit (linear rule) packets carry no payload to allocate",
            ));
        }
        let unit = descriptor.raw_sample_size().ok_or_else(|| {
            StreamError::invalid_sample_type(
                Some(descriptor.sample_type),
                "variable-size samples cannot be arena allocated",
            )
        })?;

        let requested_bytes = sample_count.checked_mul(unit).ok_or_else(|| {
            StreamError::invalid_parameter("requested packet size overflows usize")
        })?;

        let (region, granted_bytes) = self.reserve(requested_bytes, unit)?;
        let granted = granted_bytes / unit;
        let status = if granted == sample_count {
            AllocationStatus::Ok
        } else {
            debug!(requested = sample_count, granted, "Adjusted allocation size");
            AllocationStatus::AdjustedSize { requested: sample_count, granted }
        };

        Ok(Allocation {
            status,
            writer: PacketWriter { region, descriptor, sample_count: granted, domain },
        })
    }

    fn reserve(&self, want: usize, unit: usize) -> Result<(Region, usize)> {
        let arena = Arc::clone(&self.shared.arena.lock());
        let mut state = self.shared.state.lock();
        let capacity = self.shared.capacity;

        if want == 0 {
            let region = Region {
                arena,
                ring: Arc::clone(&self.shared),
                id: 0,
                generation: state.generation,
                start: state.write,
                len: 0,
            };
            return Ok((region, 0));
        }

        let (tail_space, head_space) = if state.slots.is_empty() {
            (capacity, 0)
        } else if state.write > state.read {
            (capacity - state.write, state.read)
        } else {
            (state.read - state.write, 0)
        };

        let tail_units = tail_space / unit * unit;
        let head_units = head_space / unit * unit;

        let (start, len) = if want <= tail_space {
            (state.write, want)
        } else if want <= head_space {
            (0, want)
        } else if tail_units >= head_units && tail_units >= unit {
            (state.write, tail_units)
        } else if head_units >= unit {
            (0, head_units)
        } else {
            trace!(want, read = state.read, write = state.write, "Arena full");
            return Err(StreamError::out_of_memory(want, capacity));
        };

        let id = state.next_id;
        state.next_id += 1;
        state.slots.push_back(Slot { id, start, len, released: false });
        state.write = start + len;
        if state.slots.len() == 1 {
            state.read = start;
        }

        trace!(id, start, len, "Reserved arena region");
        Ok((
            Region {
                arena,
                ring: Arc::clone(&self.shared),
                id,
                generation: state.generation,
                start,
                len,
            },
            len,
        ))
    }

    /// Forcibly reclaim the whole arena.
    ///
    /// Must only be called once producers have stopped allocating. Packets
    /// still held by consumers keep their memory; it is detached from the
    /// ring and dropped with them.
    pub fn reset(&self) {
        let mut arena = self.shared.arena.lock();
        let mut state = self.shared.state.lock();
        let dropped = state.slots.len();
        state.slots.clear();
        state.read = 0;
        state.write = 0;
        state.generation += 1;
        *arena = Arc::new(Arena::new(self.shared.capacity));
        debug!(dropped, generation = state.generation, "Packet ring allocator reset");
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Bytes not covered by live allocations.
    pub fn available(&self) -> usize {
        let state = self.shared.state.lock();
        let used: usize = state.slots.iter().map(|slot| slot.len).sum();
        self.shared.capacity - used
    }

    /// Number of allocations not yet reclaimed.
    pub fn live_allocations(&self) -> usize {
        self.shared.state.lock().slots.len()
    }

    pub fn read_position(&self) -> usize {
        self.shared.state.lock().read
    }

    pub fn write_position(&self) -> usize {
        self.shared.state.lock().write
    }
}

impl std::fmt::Debug for PacketRingAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("PacketRingAllocator")
            .field("capacity", &self.shared.capacity)
            .field("read", &state.read)
            .field("write", &state.write)
            .field("live", &state.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SampleType, decode_samples};
    use proptest::prelude::*;

    fn f64_desc() -> Arc<DataDescriptor> {
        Arc::new(DataDescriptor::builder(SampleType::Float64).build().unwrap())
    }

    fn packet(alloc: &PacketRingAllocator, count: usize) -> DataPacket {
        let allocation = alloc.allocate(f64_desc(), count, None).unwrap();
        assert_eq!(allocation.status, AllocationStatus::Ok);
        allocation.writer.finish().unwrap()
    }

    #[test]
    fn ok_then_adjusted_then_out_of_memory() {
        let alloc = PacketRingAllocator::new(1024).unwrap();

        let first = alloc.allocate(f64_desc(), 16, None).unwrap();
        assert_eq!(first.status, AllocationStatus::Ok);
        let _first = first.writer.finish().unwrap();

        let second = alloc.allocate(f64_desc(), 1024, None).unwrap();
        assert_eq!(
            second.status,
            AllocationStatus::AdjustedSize { requested: 1024, granted: 112 }
        );
        assert_eq!(second.writer.sample_count(), 112);
        let _second = second.writer.finish().unwrap();

        let third = alloc.allocate(f64_desc(), 2, None);
        assert!(matches!(third, Err(StreamError::OutOfMemory { .. })));
        assert_eq!(alloc.available(), 0);
    }

    #[test]
    fn fifo_reclaim_waits_for_oldest() {
        let alloc = PacketRingAllocator::new(1024).unwrap();
        let a = packet(&alloc, 32);
        let b = packet(&alloc, 32);
        let c = packet(&alloc, 32);
        assert_eq!(alloc.read_position(), 0);
        assert_eq!(alloc.write_position(), 768);

        drop(c);
        assert_eq!(alloc.live_allocations(), 3);
        assert_eq!(alloc.read_position(), 0);

        drop(a);
        assert_eq!(alloc.live_allocations(), 2);
        assert_eq!(alloc.read_position(), 256);

        drop(b);
        assert_eq!(alloc.live_allocations(), 0);
        assert_eq!(alloc.available(), 1024);
    }

    #[test]
    fn wraps_to_arena_start_once_head_is_reclaimed() {
        let alloc = PacketRingAllocator::new(1024).unwrap();
        let a = packet(&alloc, 64);
        let _b = packet(&alloc, 48);
        drop(a);
        // 16 units left at the tail, 64 free at the head.
        let wrapped = alloc.allocate(f64_desc(), 40, None).unwrap();
        assert_eq!(wrapped.status, AllocationStatus::Ok);
        let wrapped = wrapped.writer.finish().unwrap();
        assert_eq!(alloc.write_position(), 320);
        assert!(wrapped.is_arena_backed());
    }

    #[test]
    fn out_of_memory_keeps_existing_packets_intact() {
        let alloc = PacketRingAllocator::new(64).unwrap();
        let mut allocation = alloc.allocate(f64_desc(), 8, None).unwrap();
        allocation.writer.write_samples(&[1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]).unwrap();
        let full = allocation.writer.finish().unwrap();

        assert!(alloc.allocate(f64_desc(), 1, None).is_err());

        let mut values = [0f64; 8];
        decode_samples(full.raw_data(), &mut values);
        assert_eq!(values, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn reset_detaches_live_packets() {
        let alloc = PacketRingAllocator::new(64).unwrap();
        let mut allocation = alloc.allocate(f64_desc(), 8, None).unwrap();
        allocation.writer.write_samples(&[9.0f64; 8]).unwrap();
        let old = allocation.writer.finish().unwrap();

        alloc.reset();
        assert_eq!(alloc.available(), 64);
        let mut fresh = alloc.allocate(f64_desc(), 8, None).unwrap();
        fresh.writer.write_samples(&[1.0f64; 8]).unwrap();
        let _fresh = fresh.writer.finish().unwrap();

        let mut values = [0f64; 8];
        decode_samples(old.raw_data(), &mut values);
        assert_eq!(values, [9.0; 8]);
        drop(old);
        assert_eq!(alloc.live_allocations(), 1);
    }

    #[test]
    fn rejects_implicit_and_variable_size_descriptors() {
        let alloc = PacketRingAllocator::new(64).unwrap();
        let linear = Arc::new(
            DataDescriptor::builder(SampleType::Int64).linear_rule(1, 0).build().unwrap(),
        );
        assert!(alloc.allocate(linear, 1, None).is_err());
        let text = Arc::new(DataDescriptor::builder(SampleType::String).build().unwrap());
        assert!(alloc.allocate(text, 1, None).is_err());
        assert!(PacketRingAllocator::new(0).is_err());
    }

    proptest! {
        #[test]
        fn prop_release_order_never_reclaims_live_oldest(
            order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let alloc = PacketRingAllocator::new(8 * 64).unwrap();
            let mut packets: Vec<Option<DataPacket>> =
                (0..6).map(|_| Some(packet(&alloc, 8))).collect();

            for (step, index) in order.iter().enumerate() {
                packets[*index] = None;
                let oldest_live = packets.iter().position(Option::is_some);
                match oldest_live {
                    Some(oldest) => {
                        prop_assert_eq!(alloc.read_position(), oldest * 64);
                        prop_assert_eq!(alloc.live_allocations(), 6 - oldest);
                    }
                    None => prop_assert_eq!(step, 5),
                }
            }
            prop_assert_eq!(alloc.live_allocations(), 0);
        }
    }
}
