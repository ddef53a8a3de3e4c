//! Packet payload memory.
//!
//! [`PacketRingAllocator`] backs data packets with regions of a fixed-size
//! circular arena. Regions are reclaimed in allocation order once the packet
//! owning them (and every older packet) has been dropped, so a slow consumer
//! holding an old packet applies backpressure to the producer.
//!
//! ```rust
//! use daqflow::allocator::{AllocationStatus, PacketRingAllocator};
//! use daqflow::types::{DataDescriptor, SampleType};
//! use std::sync::Arc;
//!
//! let descriptor = Arc::new(DataDescriptor::builder(SampleType::Float64).build().unwrap());
//! let allocator = PacketRingAllocator::new(1024).unwrap();
//!
//! let mut allocation = allocator.allocate(descriptor, 4, None).unwrap();
//! assert_eq!(allocation.status, AllocationStatus::Ok);
//! allocation.writer.write_samples(&[0.0f64, 0.5, 1.0, 1.5]).unwrap();
//! let packet = allocation.writer.finish().unwrap();
//!
//! assert_eq!(allocator.live_allocations(), 1);
//! drop(packet);
//! assert_eq!(allocator.live_allocations(), 0);
//! ```

mod ring;

pub use ring::{
    Allocation, AllocationStatus, DEFAULT_CAPACITY_SAMPLES, PacketRingAllocator, PacketWriter,
    Region,
};
