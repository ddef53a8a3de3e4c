//! Test fixtures for descriptors, signals and packet senders
//!
//! Shared by unit tests and benches. Fixture builders
//! panic on invalid input since they only ever see hard-coded values.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::Arc;

use crate::connection::Signal;
use crate::types::{DataDescriptor, DataPacket, Ratio, SampleType, Scaling};

/// Origin shared by every fixture domain.
pub const FIXTURE_ORIGIN: &str = "1970-01-01T00:00:00Z";

/// Plain `Float64` value descriptor.
pub fn f64_descriptor() -> DataDescriptor {
    DataDescriptor::builder(SampleType::Float64)
        .name("value")
        .unit("V")
        .build()
        .expect("valid Float64 descriptor")
}

/// Plain `Int32` value descriptor.
pub fn i32_descriptor() -> DataDescriptor {
    DataDescriptor::builder(SampleType::Int32)
        .name("counter")
        .build()
        .expect("valid Int32 descriptor")
}

/// Raw `Int16` samples post-scaled to `Float64` by `scale`.
pub fn scaled_i16_descriptor(scale: f64) -> DataDescriptor {
    DataDescriptor::builder(SampleType::Int16)
        .name("adc")
        .unit("V")
        .post_scaling(Scaling::linear(SampleType::Int16, SampleType::Float64, scale, 0.0))
        .build()
        .expect("valid scaled Int16 descriptor")
}

/// Linear `Int64` domain ticking `rate` times per second.
pub fn linear_domain_descriptor(rate: i64) -> DataDescriptor {
    DataDescriptor::builder(SampleType::Int64)
        .name("time")
        .linear_rule(1, 0)
        .tick_resolution(Ratio::per(rate).expect("positive rate"))
        .origin(FIXTURE_ORIGIN)
        .unit("s")
        .build()
        .expect("valid linear domain descriptor")
}

/// Domain signal for [`linear_domain_descriptor`].
pub fn domain_signal(rate: i64) -> Signal {
    Signal::new(linear_domain_descriptor(rate)).expect("valid domain signal")
}

/// Send `count` `Float64` samples valued `start, start + 1, ...` whose
/// implicit domain packet starts at tick `start`. Returns the sent packet.
pub fn send_ramp(signal: &Signal, start: i64, count: usize) -> DataPacket {
    let domain = signal.domain_descriptor().map(|descriptor| {
        DataPacket::implicit(descriptor, count, start).expect("implicit domain packet")
    });
    let values: Vec<f64> = (0..count).map(|i| (start + i as i64) as f64).collect();
    let packet = DataPacket::from_samples(signal.descriptor(), &values, domain).expect("ramp packet");
    signal.send_packet(packet.clone()).expect("descriptor matches");
    packet
}

/// Build `count` random-looking but deterministic `Int16` samples.
pub fn pseudo_random_i16(count: usize, seed: u32) -> Vec<i16> {
    let mut state = seed.max(1);
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as i16
        })
        .collect()
}

/// Shared descriptor for building packets by hand.
pub fn shared(descriptor: DataDescriptor) -> Arc<DataDescriptor> {
    Arc::new(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_carries_domain_offsets() {
        let signal = Signal::with_domain(f64_descriptor(), domain_signal(100)).unwrap();
        let packet = send_ramp(&signal, 7, 3);
        let domain = packet.domain_packet().unwrap();
        assert_eq!(domain.value_i64(0), Some(7));
        assert_eq!(domain.value_i64(2), Some(9));
        assert_eq!(packet.scalar_at(1).map(|s| s.as_f64()), Some(8.0));
    }

    #[test]
    fn pseudo_random_is_deterministic() {
        assert_eq!(pseudo_random_i16(16, 3), pseudo_random_i16(16, 3));
        assert_ne!(pseudo_random_i16(16, 3), pseudo_random_i16(16, 4));
    }
}
